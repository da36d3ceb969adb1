use crate::{
    annotations::Annotations,
    dispatch::{Array, Binding, Constraint, Handler},
    error::{Error, Result},
    format::{Format, FormatTags},
    mapper::Mapper,
    reflect::{Reflect, ReflectMut, ReflectRef, Struct},
    request::{Contribution, Fields, MapFrom, MapTo, Target},
    type_id::{TypeIdHandling, TypeIds},
    types::{MemberInfo, Shape, TypeHierarchy, TypeKey},
    value::Value,
};
use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use regex::Regex;
use std::any::type_name;

lazy_static::lazy_static! {
    static ref PATTERN: Option<Regex> = Regex::new(r"^/(.*)/([a-zA-Z]*)$").ok();
}

const FROM_DATE: &str = "map_from_date";
const FROM_REGEX: &str = "map_from_regex";
const FROM_ARRAY: &str = "map_from_array";
const FROM_OBJECT: &str = "map_from_object";
const TO_DATE: &str = "map_to_date";
const TO_REGEX: &str = "map_to_regex";
const TO_ARRAY: &str = "map_to_array";
const TO_OBJECT: &str = "map_to_object";

/// Canonical mapping between objects and JSON-like representation trees.
///
/// Dates are written as RFC 3339 text with millisecond precision, patterns as
/// `/pattern/`, lists element by element and objects member by member.
pub struct JsonMapping;

impl JsonMapping {
    pub fn new() -> Self {
        if let Err(error) = FormatTags::register::<Self>([Format::JSON, Format::JSON_CONTENT_TYPE])
        {
            tracing::warn!(%error, "JSON handler left untagged");
        }
        Self
    }
}

impl Default for JsonMapping {
    fn default() -> Self {
        Self::new()
    }
}

impl Handler for JsonMapping {
    fn handler_key(&self) -> TypeKey {
        TypeKey::of::<Self>()
    }

    fn bindings(&self) -> Vec<Binding> {
        vec![
            Binding::maps_from(FROM_DATE, Constraint::of::<DateTime<Utc>>()),
            Binding::maps_from(FROM_REGEX, Constraint::of::<Regex>()),
            Binding::maps_from(FROM_ARRAY, Constraint::of::<Array>()),
            Binding::maps_from(FROM_OBJECT, Constraint::Any),
            Binding::maps_to(TO_DATE, Constraint::of::<DateTime<Utc>>()),
            Binding::maps_to(TO_REGEX, Constraint::of::<Regex>()),
            Binding::maps_to(TO_ARRAY, Constraint::of::<Array>()),
            Binding::maps_to(TO_OBJECT, Constraint::Any),
        ]
    }

    fn maps_from(
        &self,
        member: &str,
        request: &MapFrom,
        composer: &Mapper,
    ) -> Result<Contribution<Value>> {
        let result = match member {
            FROM_DATE => map_from_date(request),
            FROM_REGEX => map_from_regex(request),
            FROM_ARRAY => map_from_array(request, composer)?,
            FROM_OBJECT => map_from_object(request, composer)?,
            _ => None,
        };
        Ok(result.into())
    }

    fn maps_to(
        &self,
        member: &str,
        request: &mut MapTo,
        composer: &Mapper,
    ) -> Result<Contribution<Box<dyn Reflect>>> {
        let result = match member {
            TO_DATE => map_to_date(request)?,
            TO_REGEX => map_to_regex(request)?,
            TO_ARRAY => map_to_array(request, composer)?,
            TO_OBJECT => map_to_object(request, composer)?,
            _ => None,
        };
        Ok(result.into())
    }
}

fn map_from_date(request: &MapFrom) -> Option<Value> {
    request
        .subject()
        .downcast_ref::<DateTime<Utc>>()
        .map(|date| Value::String(date.to_rfc3339_opts(SecondsFormat::Millis, true)))
}

fn map_from_regex(request: &MapFrom) -> Option<Value> {
    request
        .subject()
        .downcast_ref::<Regex>()
        .map(|pattern| Value::String(format!("/{}/", pattern.as_str())))
}

fn map_from_array(request: &MapFrom, composer: &Mapper) -> Result<Option<Value>> {
    let ReflectRef::List(items) = request.subject().reflect_ref() else {
        return Ok(None);
    };
    let element = request.declared().and_then(|declared| declared.element());
    items
        .into_iter()
        .map(|item| match item.reflect_ref() {
            ReflectRef::Optional(None) => Ok(Value::Null),
            ReflectRef::Primitive(value) => Ok(value),
            _ => composer.map_from_nested(request, item, request.fields().clone(), element),
        })
        .collect::<Result<Vec<_>>>()
        .map(|items| Some(Value::Array(items)))
}

/// Keeps requested top-level keys of an already built representation.
fn project(value: Value, fields: &Fields) -> Value {
    match (fields, &value) {
        (Fields::Include(entries), Value::Record(_)) => Value::Record(
            entries
                .iter()
                .filter(|(_, fields)| *fields != Fields::Exclude)
                .filter_map(|(key, _)| value.get(key).map(|item| (key.to_owned(), item.clone())))
                .collect(),
        ),
        _ => value,
    }
}

fn map_from_object(request: &MapFrom, composer: &Mapper) -> Result<Option<Value>> {
    let subject = request.subject();
    let object = match subject.reflect_ref() {
        ReflectRef::Optional(None) | ReflectRef::List(_) => return Ok(None),
        ReflectRef::Primitive(value) => return Ok(Some(value)),
        ReflectRef::Optional(Some(inner)) => {
            let declared = request.declared().map(|declared| declared.unwrap_optional());
            return composer
                .map_from_nested(request, inner, request.fields().clone(), declared)
                .map(Some);
        }
        reflected => reflected,
    };
    if *request.fields() == Fields::Exclude {
        return Ok(Some(Value::record()));
    }
    if let Some(representation) = subject.to_representation() {
        return Ok(Some(project(representation?, request.fields())));
    }
    match object {
        ReflectRef::Raw(value) => Ok(Some(project(value.clone(), request.fields()))),
        ReflectRef::Struct(object) => write_struct(request, object, composer).map(Some),
        _ => Ok(None),
    }
}

fn emits_type_id(request: &MapFrom, runtime: TypeKey) -> bool {
    match request.type_id_handling() {
        TypeIdHandling::None => false,
        TypeIdHandling::Always => true,
        TypeIdHandling::Auto => request
            .declared()
            .map(|declared| declared.unwrap_optional().key() != runtime)
            .unwrap_or(false),
    }
}

fn write_struct(request: &MapFrom, object: &dyn Struct, composer: &Mapper) -> Result<Value> {
    let owner = object.type_key();
    let mut result = Value::record();
    if emits_type_id(request, owner) {
        if let Some(id) = TypeIds::id_of(request.subject())? {
            result.insert(TypeIds::property_of(owner), id);
        }
    }
    for info in object.members() {
        let name = info.name();
        let Some(fields) = request.fields().member(name) else {
            continue;
        };
        let annotation = Annotations::get(owner, name);
        if annotation.ignore {
            continue;
        }
        let Some(member) = object.member(name) else {
            continue;
        };
        let value = match member.reflect_ref() {
            ReflectRef::Optional(None) => continue,
            ReflectRef::Primitive(value) => value,
            _ => composer.map_from_nested(request, member, fields, Some(info.type_spec()))?,
        };
        if annotation.root {
            if let Value::Record(entries) = value {
                for (key, value) in entries {
                    result.insert(key, value);
                }
            }
        } else {
            result.insert(name, value);
        }
    }
    if let Some(Value::Record(extra)) = object.extra() {
        for (key, value) in extra {
            if request.fields().member(key).is_some() && !Annotations::is_ignored(owner, key) {
                result.insert(key, value.clone());
            }
        }
    }
    Ok(result)
}

fn invalid<T: ?Sized>(value: &Value) -> Error {
    Error::InvalidValue {
        expected: type_name::<T>(),
        found: value.clone(),
    }
}

fn map_to_date(request: &MapTo) -> Result<Option<Box<dyn Reflect>>> {
    let value = request.value();
    let date = match value {
        Value::String(text) => DateTime::parse_from_rfc3339(text)
            .map(|date| date.with_timezone(&Utc))
            .map_err(|_| invalid::<DateTime<Utc>>(value))?,
        Value::Number(number) => number
            .to_i64()
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single())
            .ok_or_else(|| invalid::<DateTime<Utc>>(value))?,
        _ => return Ok(None),
    };
    Ok(Some(Box::new(date)))
}

/// Reads `/pattern/flags` or a bare pattern. Flags without inline equivalent are dropped.
fn parse_pattern(text: &str) -> Option<Regex> {
    let captures = PATTERN.as_ref().and_then(|pattern| pattern.captures(text));
    let source = match captures {
        Some(captures) => {
            let pattern = captures.get(1).map(|item| item.as_str()).unwrap_or_default();
            let flags = captures
                .get(2)
                .map(|item| item.as_str())
                .unwrap_or_default()
                .chars()
                .filter(|flag| "imsux".contains(*flag))
                .collect::<String>();
            if flags.is_empty() {
                pattern.to_owned()
            } else {
                format!("(?{}){}", flags, pattern)
            }
        }
        None => text.to_owned(),
    };
    Regex::new(&source).ok()
}

fn map_to_regex(request: &MapTo) -> Result<Option<Box<dyn Reflect>>> {
    let value = request.value();
    let Value::String(text) = value else {
        return Ok(None);
    };
    match parse_pattern(text) {
        Some(pattern) => Ok(Some(Box::new(pattern))),
        None => Err(invalid::<Regex>(value)),
    }
}

/// Result of reading `null`, or `None` when the target cannot hold it.
fn read_null(target: Option<&Target>) -> Result<Option<Box<dyn Reflect>>> {
    let Some(target) = target else {
        return Ok(Some(Box::new(Value::Null)));
    };
    let Target::Type(spec) = target else {
        return Ok(None);
    };
    match *spec.shape() {
        Shape::Optional { wrap, .. } => wrap(None).map(Some),
        Shape::Abstract => Ok(Some(Box::new(Value::Null))),
        Shape::Leaf { from_value } if spec.key() == TypeKey::of::<Value>() => {
            from_value(&Value::Null).map(Some)
        }
        _ => Ok(None),
    }
}

fn read(
    request: &MapTo,
    value: &Value,
    target: Option<Target>,
    composer: &Mapper,
) -> Result<Option<Box<dyn Reflect>>> {
    if value.is_null() {
        return read_null(target.as_ref());
    }
    composer.map_to_nested(request, value, target).map(Some)
}

fn map_to_array(request: &MapTo, composer: &Mapper) -> Result<Option<Box<dyn Reflect>>> {
    let value = request.value();
    let Value::Array(items) = value else {
        return Ok(None);
    };
    let element = request.target().and_then(|target| target.element());
    let collect = request.target_spec().and_then(|spec| match *spec.shape() {
        Shape::List { collect, .. } => Some(collect),
        _ => None,
    });
    let items = items
        .iter()
        .map(|item| {
            let target = element.as_ref().and_then(|element| element.try_clone());
            read(request, item, target, composer)?.ok_or_else(|| Error::InvalidValue {
                expected: element.as_ref().map(|element| element.name()).unwrap_or("element"),
                found: item.clone(),
            })
        })
        .collect::<Result<Vec<_>>>()?;
    match collect {
        Some(collect) => collect(items).map(Some),
        None => Ok(Some(Box::new(items))),
    }
}

fn map_to_object(request: &mut MapTo, composer: &Mapper) -> Result<Option<Box<dyn Reflect>>> {
    let value = request.value();
    if let Some(spec) = request.target_spec() {
        match *spec.shape() {
            Shape::Leaf { from_value } => return from_value(value).map(Some),
            Shape::Optional { inner, wrap } => {
                let inner = composer.map_to_nested(request, value, Some(Target::Type(inner())))?;
                return wrap(Some(inner)).map(Some);
            }
            Shape::List { .. } | Shape::Opaque => return Ok(None),
            Shape::Object { .. } | Shape::Abstract => {}
        }
    }
    if value.is_array() {
        return Ok(None);
    }
    if value.is_primitive() {
        return Ok(match request.target() {
            None => Some(Box::new(value.clone())),
            Some(Target::Type(spec)) if matches!(spec.shape(), Shape::Abstract) => {
                Some(Box::new(value.clone()))
            }
            _ => None,
        });
    }
    let requested = request
        .target()
        .map(|target| target.key().key)
        .unwrap_or_else(TypeKey::of::<Value>);
    let (property, resolved) = TypeIds::identify(value, requested);
    let mut object = match request.take_instance() {
        Some(instance) => {
            if let Some(resolved) = resolved {
                if !TypeHierarchy::is_assignable(instance.type_key(), resolved.key()) {
                    return Err(Error::TypeMismatch {
                        expected: resolved.name(),
                        found: instance.type_key().name(),
                    });
                }
            }
            instance
        }
        None => {
            let declared = request.target_spec();
            if let (Some(resolved), Some(declared)) = (resolved, declared) {
                if matches!(declared.shape(), Shape::Object { .. })
                    && !TypeHierarchy::is_assignable(resolved.key(), declared.key())
                {
                    return Err(Error::TypeMismatch {
                        expected: declared.name(),
                        found: resolved.name(),
                    });
                }
            }
            let Some(spec) = resolved.or(declared) else {
                return Ok(Some(Box::new(value.clone())));
            };
            match *spec.shape() {
                Shape::Object { construct, .. } => construct(),
                Shape::Leaf { from_value } => return from_value(value).map(Some),
                Shape::Abstract => return Ok(Some(Box::new(value.clone()))),
                _ => return Ok(None),
            }
        }
    };
    if let ReflectMut::Struct(target) = object.reflect_mut() {
        populate(request, value, &property, target, composer)?;
    }
    Ok(Some(object))
}

fn assign(
    request: &MapTo,
    object: &mut dyn Struct,
    info: &MemberInfo,
    value: &Value,
    composer: &Mapper,
) -> Result<()> {
    let target = Target::Type(info.type_spec());
    if let Some(value) = read(request, value, Some(target), composer)? {
        object.set_member(info.name(), value)?;
    }
    Ok(())
}

fn populate(
    request: &MapTo,
    value: &Value,
    property: &str,
    object: &mut dyn Struct,
    composer: &Mapper,
) -> Result<()> {
    let owner = object.type_key();
    let members = object.members();
    for info in members.iter().filter(|info| info.is_settable()) {
        let annotation = Annotations::get(owner, info.name());
        if annotation.root && !annotation.ignore {
            assign(request, object, info, value, composer)?;
        }
    }
    let Some(entries) = value.as_record() else {
        return Ok(());
    };
    for (key, item) in entries {
        if key == property {
            continue;
        }
        let exact = members.iter().find(|info| info.name() == key);
        let matched = exact.or_else(|| {
            if !request.ignore_case() {
                return None;
            }
            let key = key.to_lowercase();
            members.iter().find(|info| info.name().to_lowercase() == key)
        });
        match matched {
            Some(info) => {
                let annotation = Annotations::get(owner, info.name());
                if annotation.root || annotation.ignore || !info.is_settable() {
                    continue;
                }
                assign(request, object, info, item, composer)?;
            }
            None if request.dynamic() && !Annotations::is_ignored(owner, key) => {
                match object.extra_mut() {
                    Some(extra) => {
                        if !extra.is_record() {
                            *extra = Value::record();
                        }
                        extra.insert(key, item.clone());
                    }
                    None => {
                        tracing::trace!(owner = owner.name(), key = %key, "no ad hoc members")
                    }
                }
            }
            None => tracing::trace!(owner = owner.name(), key = %key, "dropped key"),
        }
    }
    Ok(())
}
