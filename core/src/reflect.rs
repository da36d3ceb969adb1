use crate::{
    de::from_value,
    error::{Error, Result},
    types::{MemberInfo, TypeKey, TypeSpec},
    value::Value,
};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::de::DeserializeOwned;
use std::any::{type_name, Any};

/// Runtime view over a mappable value.
/// Prefer to implement using `Mapped` derive macro.
pub trait Reflect: Any {
    fn type_key(&self) -> TypeKey;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    fn into_any(self: Box<Self>) -> Box<dyn Any>;

    fn reflect_ref(&self) -> ReflectRef<'_>;

    fn reflect_mut(&mut self) -> ReflectMut<'_> {
        ReflectMut::Other
    }

    /// Custom conversion into representation that takes over member reflection.
    fn to_representation(&self) -> Option<Result<Value>> {
        None
    }
}

impl dyn Reflect {
    pub fn is<T: Any>(&self) -> bool {
        self.as_any().is::<T>()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    pub fn downcast_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.as_any_mut().downcast_mut::<T>()
    }
}

impl std::fmt::Debug for dyn Reflect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "dyn Reflect({})", self.type_key())
    }
}

pub enum ReflectRef<'a> {
    /// Null, bool, number or string, already unwrapped.
    Primitive(Value),
    /// Representation tree carried as data.
    Raw(&'a Value),
    Struct(&'a dyn Struct),
    List(Vec<&'a dyn Reflect>),
    Optional(Option<&'a dyn Reflect>),
    Opaque,
}

pub enum ReflectMut<'a> {
    Struct(&'a mut dyn Struct),
    Other,
}

/// Object with named members.
pub trait Struct: Reflect {
    fn members(&self) -> &'static [MemberInfo];

    fn member(&self, name: &str) -> Option<&dyn Reflect>;

    fn set_member(&mut self, name: &str, value: Box<dyn Reflect>) -> Result<()>;

    /// Bag of ad hoc members attached while reading with `dynamic` enabled.
    fn extra(&self) -> Option<&Value> {
        None
    }

    fn extra_mut(&mut self) -> Option<&mut Value> {
        None
    }
}

/// Statically known mappable type.
pub trait Mapped: Reflect + Sized {
    fn type_spec() -> TypeSpec;

    fn from_reflect(value: Box<dyn Reflect>) -> Result<Self> {
        downcast(value)
    }
}

pub fn downcast<T: Any>(value: Box<dyn Reflect>) -> Result<T> {
    let found = value.type_key().name();
    value
        .into_any()
        .downcast::<T>()
        .map(|value| *value)
        .map_err(|_| Error::TypeMismatch {
            expected: type_name::<T>(),
            found,
        })
}

fn leaf_from_value<T>(value: &Value) -> Result<Box<dyn Reflect>>
where
    T: Reflect + DeserializeOwned,
{
    Ok(Box::new(from_value::<T>(value)?))
}

macro_rules! impl_any {
    () => {
        fn type_key(&self) -> TypeKey {
            TypeKey::of::<Self>()
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }

        fn into_any(self: Box<Self>) -> Box<dyn Any> {
            self
        }
    };
}

macro_rules! impl_reflect {
    (@copy $( $type:ty ),+ ) => {
        $(
            impl Reflect for $type {
                impl_any!();

                fn reflect_ref(&self) -> ReflectRef<'_> {
                    ReflectRef::Primitive(Value::from(*self))
                }
            }

            impl Mapped for $type {
                fn type_spec() -> TypeSpec {
                    TypeSpec::leaf::<Self>(leaf_from_value::<Self>)
                }
            }
        )+
    };
    (@opaque $( $type:ty ),+ ) => {
        $(
            impl Reflect for $type {
                impl_any!();

                fn reflect_ref(&self) -> ReflectRef<'_> {
                    ReflectRef::Opaque
                }
            }

            impl Mapped for $type {
                fn type_spec() -> TypeSpec {
                    TypeSpec::opaque::<Self>()
                }
            }
        )+
    };
}

impl_reflect!(@copy bool, char, i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64);
impl_reflect!(@opaque DateTime<Utc>, Regex, TypeSpec);

impl Reflect for String {
    impl_any!();

    fn reflect_ref(&self) -> ReflectRef<'_> {
        ReflectRef::Primitive(Value::String(self.clone()))
    }
}

impl Mapped for String {
    fn type_spec() -> TypeSpec {
        TypeSpec::leaf::<Self>(leaf_from_value::<Self>)
    }
}

fn value_from_value(value: &Value) -> Result<Box<dyn Reflect>> {
    Ok(Box::new(value.clone()))
}

impl Reflect for Value {
    impl_any!();

    fn reflect_ref(&self) -> ReflectRef<'_> {
        if self.is_primitive() {
            ReflectRef::Primitive(self.clone())
        } else {
            ReflectRef::Raw(self)
        }
    }
}

impl Mapped for Value {
    fn type_spec() -> TypeSpec {
        TypeSpec::leaf::<Self>(value_from_value)
    }
}

impl<T: Mapped> Reflect for Option<T> {
    impl_any!();

    fn reflect_ref(&self) -> ReflectRef<'_> {
        ReflectRef::Optional(self.as_ref().map(|value| value as &dyn Reflect))
    }
}

fn wrap_optional<T: Mapped>(value: Option<Box<dyn Reflect>>) -> Result<Box<dyn Reflect>> {
    Ok(Box::new(value.map(T::from_reflect).transpose()?))
}

impl<T: Mapped> Mapped for Option<T> {
    fn type_spec() -> TypeSpec {
        TypeSpec::optional::<Self>(T::type_spec, wrap_optional::<T>)
    }

    fn from_reflect(value: Box<dyn Reflect>) -> Result<Self> {
        if value.type_key() == TypeKey::of::<Self>() {
            downcast(value)
        } else {
            T::from_reflect(value).map(Some)
        }
    }
}

impl<T: Mapped> Reflect for Vec<T> {
    impl_any!();

    fn reflect_ref(&self) -> ReflectRef<'_> {
        ReflectRef::List(self.iter().map(|item| item as &dyn Reflect).collect())
    }
}

fn collect_list<T: Mapped>(items: Vec<Box<dyn Reflect>>) -> Result<Box<dyn Reflect>> {
    Ok(Box::new(
        items
            .into_iter()
            .map(T::from_reflect)
            .collect::<Result<Vec<T>>>()?,
    ))
}

impl<T: Mapped> Mapped for Vec<T> {
    fn type_spec() -> TypeSpec {
        TypeSpec::list::<Self>(T::type_spec, collect_list::<T>)
    }
}

// Boxed values behave as the value they hold.
impl Reflect for Box<dyn Reflect> {
    fn type_key(&self) -> TypeKey {
        (**self).type_key()
    }

    fn as_any(&self) -> &dyn Any {
        (**self).as_any()
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        (**self).as_any_mut()
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        (*self).into_any()
    }

    fn reflect_ref(&self) -> ReflectRef<'_> {
        (**self).reflect_ref()
    }

    fn reflect_mut(&mut self) -> ReflectMut<'_> {
        (**self).reflect_mut()
    }

    fn to_representation(&self) -> Option<Result<Value>> {
        (**self).to_representation()
    }
}

impl Mapped for Box<dyn Reflect> {
    fn type_spec() -> TypeSpec {
        TypeSpec::abstract_of::<dyn Reflect>()
    }

    fn from_reflect(value: Box<dyn Reflect>) -> Result<Self> {
        Ok(value)
    }
}
