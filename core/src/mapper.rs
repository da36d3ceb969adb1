use crate::{
    dispatch::{select_handlers, Binding, Candidate, DispatchKey, Handler, Policy},
    error::{Error, Result},
    format::Format,
    json::JsonMapping,
    reflect::{downcast, Mapped, Reflect},
    request::{Fields, MapFrom, MapResult, MapTo, Target},
    type_id::{TypeIds, TypeMapping},
    types::{Shape, TypeSpec},
    value::Value,
};

struct HandlerEntry {
    handler: Box<dyn Handler>,
    bindings: Vec<Binding>,
}

/// Chain of handlers that mapping requests are dispatched through.
pub struct Mapper {
    handlers: Vec<HandlerEntry>,
}

impl Default for Mapper {
    fn default() -> Self {
        Self::new()
            .with_handler(JsonMapping::new())
            .with_handler(TypeMapping::new())
    }
}

impl Mapper {
    /// Mapper with no handlers at all.
    pub fn new() -> Self {
        Self { handlers: vec![] }
    }

    pub fn with_handler(mut self, handler: impl Handler + 'static) -> Self {
        self.add_handler(handler);
        self
    }

    pub fn add_handler(&mut self, handler: impl Handler + 'static) -> &mut Self {
        let bindings = handler.bindings();
        self.handlers.push(HandlerEntry {
            handler: Box::new(handler),
            bindings,
        });
        self
    }

    pub fn handlers(&self) -> impl Iterator<Item = &dyn Handler> {
        self.handlers.iter().map(|entry| entry.handler.as_ref())
    }

    pub fn select<'a>(
        &'a self,
        policy: Policy,
        key: &DispatchKey,
        format: &Format,
    ) -> Vec<Candidate<'a>> {
        select_handlers(
            self.handlers
                .iter()
                .map(|entry| (entry.handler.as_ref(), entry.bindings.as_slice())),
            policy,
            key,
            format,
        )
    }

    /// Invokes every eligible handler, tells if any of them contributed.
    pub fn handle_from(&self, request: &mut MapFrom) -> Result<bool> {
        let candidates = self.select(Policy::MapsFrom, &request.key(), request.format());
        tracing::trace!(request = %request, candidates = candidates.len(), "dispatching");
        let mut handled = false;
        for candidate in candidates {
            let contribution = candidate
                .handler
                .maps_from(candidate.binding.member, request, self)?;
            handled |= request.push(contribution);
        }
        Ok(handled)
    }

    /// Invokes every eligible handler, tells if any of them contributed.
    pub fn handle_to(&self, request: &mut MapTo) -> Result<bool> {
        let candidates = self.select(Policy::MapsTo, &request.key(), request.format());
        tracing::trace!(request = %request, candidates = candidates.len(), "dispatching");
        let mut handled = false;
        for candidate in candidates {
            let contribution = candidate
                .handler
                .maps_to(candidate.binding.member, request, self)?;
            handled |= request.push(contribution);
        }
        Ok(handled)
    }

    pub fn map_from(&self, object: &dyn Reflect, format: &Format) -> Result<MapResult<Value>> {
        self.map_from_with(object, format, |_| {})
    }

    pub fn map_from_with<F>(
        &self,
        object: &dyn Reflect,
        format: &Format,
        configure: F,
    ) -> Result<MapResult<Value>>
    where
        F: FnOnce(&mut MapFrom),
    {
        let mut request = MapFrom::new(object, format.clone())?;
        configure(&mut request);
        self.map_from_request(request)
    }

    pub fn map_from_request(&self, mut request: MapFrom) -> Result<MapResult<Value>> {
        let description = request.to_string();
        if !self.handle_from(&mut request)? {
            tracing::debug!(request = %description, "not handled");
            return Err(Error::NotHandled(description));
        }
        request.into_result().ok_or(Error::NotHandled(description))
    }

    /// Maps a member or element of the parent request subject, immediately.
    pub fn map_from_nested(
        &self,
        parent: &MapFrom,
        subject: &dyn Reflect,
        fields: Fields,
        declared: Option<TypeSpec>,
    ) -> Result<Value> {
        let request = parent.nested(subject, fields, declared)?;
        let description = request.to_string();
        self.map_from_request(request)?
            .ready()
            .ok_or(Error::DeferredResult(description))
    }

    pub fn map_to(
        &self,
        value: &Value,
        format: &Format,
        target: Option<Target>,
    ) -> Result<MapResult<Box<dyn Reflect>>> {
        self.map_to_with(value, format, target, |_| {})
    }

    pub fn map_to_with<F>(
        &self,
        value: &Value,
        format: &Format,
        target: Option<Target>,
        configure: F,
    ) -> Result<MapResult<Box<dyn Reflect>>>
    where
        F: FnOnce(&mut MapTo),
    {
        let target = Self::infer_target(value, target)?;
        let mut request = MapTo::new(value, format.clone(), target)?;
        configure(&mut request);
        self.map_to_request(request)
    }

    pub fn map_to_request(&self, mut request: MapTo) -> Result<MapResult<Box<dyn Reflect>>> {
        let description = request.to_string();
        if !self.handle_to(&mut request)? {
            tracing::debug!(request = %description, "not handled");
            return Err(Error::NotHandled(description));
        }
        request.into_result().ok_or(Error::NotHandled(description))
    }

    /// Maps a member or element of the parent request value, immediately.
    pub fn map_to_nested(
        &self,
        parent: &MapTo,
        value: &Value,
        target: Option<Target>,
    ) -> Result<Box<dyn Reflect>> {
        let target = Self::infer_target(value, target)?;
        let request = parent.nested(value, target)?;
        let description = request.to_string();
        self.map_to_request(request)?
            .ready()
            .ok_or(Error::DeferredResult(description))
    }

    /// Maps into `T` and requires an immediate result.
    pub fn map_to_type<T: Mapped>(&self, value: &Value, format: &Format) -> Result<T> {
        self.map_to_type_with::<T, _>(value, format, |_| {})
    }

    pub fn map_to_type_with<T, F>(&self, value: &Value, format: &Format, configure: F) -> Result<T>
    where
        T: Mapped,
        F: FnOnce(&mut MapTo),
    {
        let result = self.map_to_with(value, format, Some(Target::of::<T>()), configure)?;
        match result.ready() {
            Some(result) => T::from_reflect(result),
            None => Err(Error::DeferredResult(format!("MapTo | {} {}", format, value))),
        }
    }

    /// Looks up the type registered under identifier `id`.
    pub fn get_type_from_id(&self, id: impl Into<Value>) -> Result<TypeSpec> {
        let id = id.into();
        let Some(text) = id.as_str() else {
            return Err(Error::InvalidTypeId(id));
        };
        let id = Value::String(TypeIds::normalize(text));
        let result = self.map_to(&id, &Format::TYPE_ID, None)?;
        match result.ready() {
            Some(result) => downcast(result),
            None => Err(Error::DeferredResult(format!(
                "MapTo | {} {}",
                Format::TYPE_ID,
                id
            ))),
        }
    }

    /// Checks array targets and turns a single type into a list of it for array values.
    /// Lists and optionals are left as they are, so are leaves that read arrays themselves.
    fn infer_target(value: &Value, target: Option<Target>) -> Result<Option<Target>> {
        match target {
            Some(Target::Array(Some(element))) if matches!(*element, Target::Instance(_)) => {
                Err(Error::ArrayTypeNotInferable)
            }
            Some(Target::Type(spec)) if value.is_array() && Self::wraps_in_array(&spec, value) => {
                Ok(Some(Target::array_of(Target::Type(spec))))
            }
            target => Ok(target),
        }
    }

    fn wraps_in_array(spec: &TypeSpec, value: &Value) -> bool {
        match *spec.shape() {
            Shape::List { .. } | Shape::Optional { .. } => false,
            Shape::Leaf { from_value } => from_value(value).is_err(),
            Shape::Object { .. } | Shape::Abstract | Shape::Opaque => true,
        }
    }
}
