use crate::{
    dispatch::{Array, DispatchKey},
    error::{Error, Result},
    format::Format,
    reflect::{Mapped, Reflect, ReflectRef},
    type_id::TypeIdHandling,
    types::{TypeKey, TypeSpec},
    value::Value,
};
use futures::{
    future::{self, LocalBoxFuture},
    Future, FutureExt,
};
use std::fmt::Display;

/// What a single handler invocation produced.
pub enum Contribution<T> {
    None,
    Value(T),
    Pending(LocalBoxFuture<'static, Result<Option<T>>>),
}

impl<T> Contribution<T> {
    pub fn pending<F>(future: F) -> Self
    where
        F: Future<Output = Result<Option<T>>> + 'static,
    {
        Self::Pending(future.boxed_local())
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

impl<T> From<Option<T>> for Contribution<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => Self::Value(value),
            None => Self::None,
        }
    }
}

/// Final outcome of a mapping request.
pub enum MapResult<T> {
    Ready(T),
    Deferred(LocalBoxFuture<'static, Result<T>>),
}

impl<T: 'static> MapResult<T> {
    pub fn is_deferred(&self) -> bool {
        matches!(self, Self::Deferred(_))
    }

    pub fn ready(self) -> Option<T> {
        match self {
            Self::Ready(value) => Some(value),
            Self::Deferred(_) => None,
        }
    }

    pub fn into_future(self) -> LocalBoxFuture<'static, Result<T>> {
        match self {
            Self::Ready(value) => future::ready(Ok(value)).boxed_local(),
            Self::Deferred(future) => future,
        }
    }

    pub async fn resolve(self) -> Result<T> {
        self.into_future().await
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for MapResult<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ready(value) => f.debug_tuple("Ready").field(value).finish(),
            Self::Deferred(_) => f.write_str("Deferred"),
        }
    }
}

enum Slot<T> {
    Ready(T),
    Pending(LocalBoxFuture<'static, Result<Option<T>>>),
}

/// Results contributed by handlers, kept in invocation order.
pub struct Accumulator<T> {
    slots: Vec<Slot<T>>,
}

impl<T> Default for Accumulator<T> {
    fn default() -> Self {
        Self { slots: vec![] }
    }
}

impl<T: 'static> Accumulator<T> {
    /// Returns true if contribution was accepted.
    pub fn push(&mut self, contribution: Contribution<T>) -> bool {
        match contribution {
            Contribution::None => return false,
            Contribution::Value(value) => self.slots.push(Slot::Ready(value)),
            Contribution::Pending(future) => self.slots.push(Slot::Pending(future)),
        }
        true
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn is_deferred(&self) -> bool {
        self.slots
            .iter()
            .any(|slot| matches!(slot, Slot::Pending(_)))
    }

    /// First immediate result, if any.
    pub fn first(&self) -> Option<&T> {
        self.slots.iter().find_map(|slot| match slot {
            Slot::Ready(value) => Some(value),
            Slot::Pending(_) => None,
        })
    }

    /// Reduces slots into the primary result. Immediate results win unless anything
    /// is pending, then all slots settle and the first one holding a value is surfaced.
    pub fn reduce(self, request: String) -> Option<MapResult<T>> {
        if self.slots.is_empty() {
            return None;
        }
        if !self.is_deferred() {
            return self.slots.into_iter().find_map(|slot| match slot {
                Slot::Ready(value) => Some(MapResult::Ready(value)),
                Slot::Pending(_) => None,
            });
        }
        let futures = self
            .slots
            .into_iter()
            .map(|slot| match slot {
                Slot::Ready(value) => future::ready(Ok(Some(value))).boxed_local(),
                Slot::Pending(future) => future,
            })
            .collect::<Vec<_>>();
        Some(MapResult::Deferred(
            async move {
                let mut first = None;
                for result in future::join_all(futures).await {
                    if let Some(value) = result? {
                        if first.is_none() {
                            first = Some(value);
                        }
                    }
                }
                first.ok_or(Error::NotHandled(request))
            }
            .boxed_local(),
        ))
    }
}

/// Request-scoped member selection.
#[derive(Debug, Default, Clone, PartialEq)]
pub enum Fields {
    #[default]
    All,
    Exclude,
    Include(Vec<(String, Fields)>),
}

impl Fields {
    /// Reads `true`, `false` or a record of nested selections.
    pub fn from_value(spec: &Value) -> Self {
        match spec {
            Value::Null | Value::Bool(true) => Self::All,
            Value::Record(entries) => Self::Include(
                entries
                    .iter()
                    .map(|(key, spec)| (key.to_owned(), Self::from_value(spec)))
                    .collect(),
            ),
            _ => Self::Exclude,
        }
    }

    pub fn only<K: ToString>(keys: impl IntoIterator<Item = K>) -> Self {
        Self::Include(
            keys.into_iter()
                .map(|key| (key.to_string(), Self::All))
                .collect(),
        )
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Self::All)
    }

    /// Selection for a member, or `None` when the member is excluded.
    pub fn member(&self, name: &str) -> Option<Fields> {
        match self {
            Self::All => Some(Self::All),
            Self::Exclude => None,
            Self::Include(entries) => entries
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, fields)| fields.clone())
                .filter(|fields| *fields != Self::Exclude),
        }
    }
}

/// What a raw value should be mapped into.
pub enum Target {
    Type(TypeSpec),
    Instance(Box<dyn Reflect>),
    /// List of the element target, or of whatever elements hold.
    Array(Option<Box<Target>>),
}

impl Target {
    pub fn of<T: Mapped>() -> Self {
        Self::Type(T::type_spec())
    }

    pub fn instance(value: impl Reflect) -> Self {
        Self::Instance(Box::new(value))
    }

    pub fn array_of(element: Target) -> Self {
        Self::Array(Some(Box::new(element)))
    }

    pub fn key(&self) -> DispatchKey {
        match self {
            Self::Type(spec) => DispatchKey::new(spec.key(), spec.is_list()),
            Self::Instance(value) => DispatchKey::new(
                value.type_key(),
                matches!(value.reflect_ref(), ReflectRef::List(_)),
            ),
            Self::Array(_) => DispatchKey::new(TypeKey::of::<Array>(), true),
        }
    }

    pub fn name(&self) -> &'static str {
        self.key().key.name()
    }

    /// Target of list elements, if it can be told.
    pub fn element(&self) -> Option<Target> {
        match self {
            Self::Type(spec) => spec.element().map(Self::Type),
            Self::Array(element) => element.as_ref().and_then(|element| element.try_clone()),
            Self::Instance(_) => None,
        }
    }

    pub fn try_clone(&self) -> Option<Target> {
        match self {
            Self::Type(spec) => Some(Self::Type(*spec)),
            Self::Array(element) => Some(Self::Array(
                element
                    .as_ref()
                    .and_then(|element| element.try_clone())
                    .map(Box::new),
            )),
            Self::Instance(_) => None,
        }
    }
}

impl std::fmt::Debug for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Type(spec) => f.debug_tuple("Type").field(spec).finish(),
            Self::Instance(value) => f.debug_tuple("Instance").field(value).finish(),
            Self::Array(element) => f.debug_tuple("Array").field(element).finish(),
        }
    }
}

fn is_missing(subject: &dyn Reflect) -> bool {
    matches!(
        subject.reflect_ref(),
        ReflectRef::Optional(None) | ReflectRef::Primitive(Value::Null)
    )
}

/// Request to map an object into its representation.
pub struct MapFrom<'a> {
    subject: &'a dyn Reflect,
    format: Format,
    fields: Fields,
    type_id_handling: TypeIdHandling,
    declared: Option<TypeSpec>,
    results: Accumulator<Value>,
}

impl<'a> MapFrom<'a> {
    pub fn new(subject: &'a dyn Reflect, format: Format) -> Result<Self> {
        if is_missing(subject) {
            return Err(Error::MissingSubject);
        }
        Ok(Self {
            subject,
            format,
            fields: Default::default(),
            type_id_handling: Default::default(),
            declared: None,
            results: Default::default(),
        })
    }

    /// Request for a nested subject that inherits this request options.
    /// Nested `null` is a plain value, only the top level subject is required.
    pub fn nested<'b>(
        &self,
        subject: &'b dyn Reflect,
        fields: Fields,
        declared: Option<TypeSpec>,
    ) -> Result<MapFrom<'b>> {
        Ok(MapFrom {
            subject,
            format: self.format.clone(),
            fields,
            type_id_handling: self.type_id_handling,
            declared,
            results: Default::default(),
        })
    }

    pub fn subject(&self) -> &'a dyn Reflect {
        self.subject
    }

    pub fn format(&self) -> &Format {
        &self.format
    }

    pub fn key(&self) -> DispatchKey {
        DispatchKey::new(
            self.subject.type_key(),
            matches!(self.subject.reflect_ref(), ReflectRef::List(_)),
        )
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    pub fn set_fields(&mut self, fields: Fields) -> &mut Self {
        self.fields = fields;
        self
    }

    pub fn type_id_handling(&self) -> TypeIdHandling {
        self.type_id_handling
    }

    pub fn set_type_id_handling(&mut self, handling: TypeIdHandling) -> &mut Self {
        self.type_id_handling = handling;
        self
    }

    /// Statically declared type of the subject.
    pub fn declared(&self) -> Option<TypeSpec> {
        self.declared
    }

    pub fn set_declared(&mut self, declared: Option<TypeSpec>) -> &mut Self {
        self.declared = declared;
        self
    }

    pub fn set_declared_type<T: Mapped>(&mut self) -> &mut Self {
        self.set_declared(Some(T::type_spec()))
    }

    pub fn push(&mut self, contribution: Contribution<Value>) -> bool {
        self.results.push(contribution)
    }

    pub fn result(&self) -> Option<&Value> {
        self.results.first()
    }

    pub fn into_result(self) -> Option<MapResult<Value>> {
        let request = self.to_string();
        self.results.reduce(request)
    }
}

impl Display for MapFrom<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MapFrom | {} to {}", self.subject.type_key(), self.format)
    }
}

/// Request to map a representation into an object.
pub struct MapTo<'a> {
    value: &'a Value,
    format: Format,
    target: Option<Target>,
    key: DispatchKey,
    dynamic: bool,
    ignore_case: bool,
    results: Accumulator<Box<dyn Reflect>>,
}

impl<'a> MapTo<'a> {
    pub fn new(value: &'a Value, format: Format, target: Option<Target>) -> Result<Self> {
        if value.is_null() {
            return Err(Error::MissingValue);
        }
        let key = target
            .as_ref()
            .map(|target| target.key())
            .unwrap_or_else(|| DispatchKey::new(TypeKey::of::<Value>(), value.is_array()));
        Ok(Self {
            value,
            format,
            target,
            key,
            dynamic: false,
            ignore_case: false,
            results: Default::default(),
        })
    }

    /// Request for a nested value that inherits this request options.
    pub fn nested<'b>(&self, value: &'b Value, target: Option<Target>) -> Result<MapTo<'b>> {
        let mut result = MapTo::new(value, self.format.clone(), target)?;
        result.dynamic = self.dynamic;
        result.ignore_case = self.ignore_case;
        Ok(result)
    }

    pub fn value(&self) -> &'a Value {
        self.value
    }

    pub fn format(&self) -> &Format {
        &self.format
    }

    pub fn key(&self) -> DispatchKey {
        self.key
    }

    pub fn target(&self) -> Option<&Target> {
        self.target.as_ref()
    }

    pub fn target_spec(&self) -> Option<TypeSpec> {
        match &self.target {
            Some(Target::Type(spec)) => Some(*spec),
            _ => None,
        }
    }

    /// Takes the instance supplied for in-place population.
    pub fn take_instance(&mut self) -> Option<Box<dyn Reflect>> {
        match self.target.take() {
            Some(Target::Instance(instance)) => Some(instance),
            target => {
                self.target = target;
                None
            }
        }
    }

    pub fn dynamic(&self) -> bool {
        self.dynamic
    }

    pub fn set_dynamic(&mut self, dynamic: bool) -> &mut Self {
        self.dynamic = dynamic;
        self
    }

    pub fn ignore_case(&self) -> bool {
        self.ignore_case
    }

    pub fn set_ignore_case(&mut self, ignore_case: bool) -> &mut Self {
        self.ignore_case = ignore_case;
        self
    }

    pub fn push(&mut self, contribution: Contribution<Box<dyn Reflect>>) -> bool {
        self.results.push(contribution)
    }

    pub fn result(&self) -> Option<&dyn Reflect> {
        self.results.first().map(|value| &**value)
    }

    pub fn into_result(self) -> Option<MapResult<Box<dyn Reflect>>> {
        let request = self.to_string();
        self.results.reduce(request)
    }
}

impl Display for MapTo<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MapTo | {} {}", self.format, self.value)
    }
}
