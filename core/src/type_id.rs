use crate::{
    annotations::Annotations,
    dispatch::{Binding, Constraint, Handler},
    error::{Error, Result},
    format::{Format, FormatTags},
    mapper::Mapper,
    reflect::{Mapped, Reflect},
    request::{Contribution, MapTo},
    types::{TypeHierarchy, TypeKey, TypeSpec},
    value::Value,
};
use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

/// Default name of the representation property holding a type identifier.
pub const DEFAULT_TYPE_ID_PROPERTY: &str = "$type";

lazy_static::lazy_static! {
    static ref TYPE_IDS: RwLock<TypeIdTable> = Default::default();
}

type Accessor = Arc<dyn Fn(&dyn Reflect) -> Option<Value> + Send + Sync>;

struct DynamicId {
    member: &'static str,
    accessor: Accessor,
}

#[derive(Default)]
struct TypeIdTable {
    types: HashMap<String, TypeSpec>,
    ids: HashMap<TypeKey, String>,
    dynamic: HashMap<TypeKey, DynamicId>,
    properties: HashMap<TypeKey, String>,
}

fn poisoned() -> Error {
    Error::Message("type id registry lock is poisoned".to_owned())
}

fn validate_property(property: &str) -> Result<()> {
    if property.trim().is_empty() {
        return Err(Error::InvalidTypeIdProperty(property.to_owned()));
    }
    Ok(())
}

/// When representations carry type identifiers.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum TypeIdHandling {
    #[default]
    None,
    Always,
    /// Only when runtime type differs from the declared one.
    Auto,
}

/// Registry of type identifiers used for polymorphic reconstruction.
pub struct TypeIds;

impl TypeIds {
    /// Removes all whitespace.
    pub fn normalize(id: &str) -> String {
        id.chars().filter(|c| !c.is_whitespace()).collect()
    }

    /// Identifier inferred from the type name, if it names a plain nominal type.
    pub fn infer(key: TypeKey) -> Result<String> {
        let name = key.name();
        if name.starts_with("dyn ")
            || name.contains(|c: char| "<>()[]{}&*; ".contains(c))
        {
            return Err(Error::TypeIdNotInferable(name));
        }
        Ok(name.rsplit("::").next().unwrap_or(name).to_owned())
    }

    pub fn register<T: Mapped>() -> Result<String> {
        Self::register_spec(T::type_spec(), None, None)
    }

    pub fn register_named<T: Mapped>(id: &str) -> Result<String> {
        Self::register_spec(T::type_spec(), Some(id), None)
    }

    /// Registers `spec` under `id`, inferred when omitted or blank, optionally
    /// overriding the property that carries identifiers for this type.
    pub fn register_spec(
        spec: TypeSpec,
        id: Option<&str>,
        property: Option<&str>,
    ) -> Result<String> {
        let key = spec.key();
        let id = match id.map(Self::normalize) {
            Some(id) if !id.is_empty() => id,
            _ => Self::infer(key)?,
        };
        if let Some(property) = property {
            validate_property(property)?;
        }
        let mut table = TYPE_IDS.write().map_err(|_| poisoned())?;
        if let Some(existing) = table.types.get(&id) {
            if existing.key() != key {
                return Err(Error::DuplicateTypeId(id, existing.name(), key.name()));
            }
        }
        if let Some(assigned) = table.ids.get(&key) {
            if *assigned != id {
                return Err(Error::TypeIdAlreadyAssigned(key.name(), assigned.clone(), id));
            }
        }
        table.types.insert(id.clone(), spec);
        table.ids.insert(key, id.clone());
        if let Some(property) = property {
            table.properties.insert(key, property.to_owned());
        }
        tracing::debug!(id = %id, type_name = key.name(), "registered type id");
        Ok(id)
    }

    /// Computes identifiers of `T` instances with `accessor`, exposed as `member`.
    /// The member is never mapped on its own.
    pub fn register_dynamic<T, F>(member: &'static str, accessor: F) -> Result<()>
    where
        T: Mapped,
        F: Fn(&T) -> Value + Send + Sync + 'static,
    {
        let spec = T::type_spec();
        let key = spec.key();
        if spec
            .member(member)
            .map(|info| info.is_settable())
            .unwrap_or(false)
        {
            return Err(Error::InvalidTypeIdMember {
                owner: key.name(),
                member: member.to_owned(),
            });
        }
        let accessor: Accessor = Arc::new(move |object: &dyn Reflect| {
            object.downcast_ref::<T>().map(&accessor)
        });
        TYPE_IDS
            .write()
            .map_err(|_| poisoned())?
            .dynamic
            .insert(key, DynamicId { member, accessor });
        Annotations::ignore::<T>(member)?;
        tracing::debug!(type_name = key.name(), member, "registered dynamic type id");
        Ok(())
    }

    pub fn register_property<T: ?Sized + 'static>(property: &str) -> Result<()> {
        Self::register_property_key(TypeKey::of::<T>(), property)
    }

    pub fn register_property_key(key: TypeKey, property: &str) -> Result<()> {
        validate_property(property)?;
        TYPE_IDS
            .write()
            .map_err(|_| poisoned())?
            .properties
            .insert(key, property.to_owned());
        Ok(())
    }

    pub fn unregister<T: ?Sized + 'static>() -> Result<()> {
        let key = TypeKey::of::<T>();
        let mut table = TYPE_IDS.write().map_err(|_| poisoned())?;
        if let Some(id) = table.ids.remove(&key) {
            table.types.remove(&id);
        }
        table.dynamic.remove(&key);
        table.properties.remove(&key);
        Ok(())
    }

    pub fn is_registered<T: ?Sized + 'static>() -> bool {
        TYPE_IDS
            .read()
            .map(|table| table.ids.contains_key(&TypeKey::of::<T>()))
            .unwrap_or(false)
    }

    /// Never fails, unknown identifiers are simply not resolved.
    pub fn resolve(id: &str) -> Option<TypeSpec> {
        let id = Self::normalize(id);
        TYPE_IDS
            .read()
            .ok()
            .and_then(|table| table.types.get(&id).copied())
    }

    /// Static identifier of a type, inherited from the nearest identified ancestor.
    pub fn id_of_type(key: TypeKey) -> Option<String> {
        let table = TYPE_IDS.read().ok()?;
        std::iter::once(key)
            .chain(TypeHierarchy::ancestors(key))
            .find_map(|key| table.ids.get(&key).cloned())
    }

    /// Identifier of an instance: computed one for its exact type first, then static one.
    pub fn id_of(object: &dyn Reflect) -> Result<Option<String>> {
        let key = object.type_key();
        let computed = {
            let table = TYPE_IDS.read().map_err(|_| poisoned())?;
            table
                .dynamic
                .get(&key)
                .map(|dynamic| (dynamic.member, dynamic.accessor.clone()))
        };
        if let Some((member, accessor)) = computed {
            return match accessor(object) {
                Some(Value::String(id)) => Ok(Some(id)),
                found => Err(Error::InvalidDynamicTypeId {
                    member: member.to_owned(),
                    found: found.unwrap_or_default(),
                }),
            };
        }
        Ok(Self::id_of_type(key))
    }

    /// Property carrying identifiers in representations of given type.
    pub fn property_of(key: TypeKey) -> String {
        TYPE_IDS
            .read()
            .ok()
            .and_then(|table| {
                std::iter::once(key)
                    .chain(TypeHierarchy::ancestors(key))
                    .find_map(|key| table.properties.get(&key).cloned())
            })
            .unwrap_or_else(|| DEFAULT_TYPE_ID_PROPERTY.to_owned())
    }

    /// Finds the type identified by a representation read as `requested`.
    ///
    /// The property of `requested` is tried first, then properties overridden for
    /// other types. Those only count when the type they resolve to uses them and
    /// can be read as `requested`. Returns the property holding the identifier, or
    /// the one of `requested` if none does.
    pub fn identify(value: &Value, requested: TypeKey) -> (String, Option<TypeSpec>) {
        let property = Self::property_of(requested);
        if let Some(spec) = value
            .get(&property)
            .and_then(Value::as_str)
            .and_then(Self::resolve)
        {
            return (property, Some(spec));
        }
        let mut overrides = match TYPE_IDS.read() {
            Ok(table) => table.properties.values().cloned().collect::<Vec<_>>(),
            Err(_) => vec![],
        };
        overrides.push(DEFAULT_TYPE_ID_PROPERTY.to_owned());
        let untyped =
            requested == TypeKey::of::<Value>() || requested == TypeKey::of::<dyn Reflect>();
        overrides.sort();
        overrides.dedup();
        let found = overrides
            .into_iter()
            .filter(|candidate| *candidate != property)
            .find_map(|candidate| {
                let spec = value
                    .get(&candidate)
                    .and_then(Value::as_str)
                    .and_then(Self::resolve)?;
                let accepted = Self::property_of(spec.key()) == candidate
                    && (untyped || TypeHierarchy::is_assignable(spec.key(), requested));
                accepted.then_some((candidate, spec))
            });
        match found {
            Some((candidate, spec)) => (candidate, Some(spec)),
            None => (property, None),
        }
    }
}

/// Answers type identifier lookups made in `Format::TYPE_ID`.
pub struct TypeMapping;

impl TypeMapping {
    pub fn new() -> Self {
        if let Err(error) = FormatTags::register::<Self>([Format::TYPE_ID]) {
            tracing::warn!(%error, "type id handler left untagged");
        }
        Self
    }
}

impl Default for TypeMapping {
    fn default() -> Self {
        Self::new()
    }
}

impl Handler for TypeMapping {
    fn handler_key(&self) -> TypeKey {
        TypeKey::of::<Self>()
    }

    fn bindings(&self) -> Vec<Binding> {
        vec![Binding::maps_to("type_from_id", Constraint::Any)]
    }

    fn maps_to(
        &self,
        _member: &str,
        request: &mut MapTo,
        _composer: &Mapper,
    ) -> Result<Contribution<Box<dyn Reflect>>> {
        Ok(request
            .value()
            .as_str()
            .and_then(TypeIds::resolve)
            .map(|spec| Box::new(spec) as Box<dyn Reflect>)
            .into())
    }
}
