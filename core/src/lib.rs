pub mod annotations;
pub mod de;
pub mod dispatch;
pub mod error;
pub mod format;
pub mod json;
pub mod mapper;
pub mod reflect;
pub mod request;
pub mod ser;
pub mod type_id;
pub mod types;
pub mod value;

#[cfg(test)]
mod tests;

pub use crate::{
    annotations::{Annotations, MemberAnnotation},
    de::from_value,
    dispatch::{select_handlers, Array, Binding, Candidate, Constraint, DispatchKey, Handler, Policy},
    error::{Error, Result},
    format::{Format, FormatTags},
    json::JsonMapping,
    mapper::Mapper,
    reflect::{downcast, Mapped, Reflect, ReflectMut, ReflectRef, Struct},
    request::{Accumulator, Contribution, Fields, MapFrom, MapResult, MapTo, Target},
    ser::to_value,
    type_id::{TypeIdHandling, TypeIds, TypeMapping, DEFAULT_TYPE_ID_PROPERTY},
    types::{MemberInfo, Shape, TypeHierarchy, TypeKey, TypeSpec},
    value::{Number, Value},
};
#[cfg(feature = "derive")]
pub use object_mapping_derive::Mapped;
