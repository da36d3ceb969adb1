use crate::de::ValueVisitor;
use serde::{
    ser::{SerializeMap, SerializeSeq},
    Deserialize, Deserializer, Serialize, Serializer,
};
use std::fmt::Display;

#[derive(Debug, Clone, Copy, PartialOrd)]
pub enum Number {
    SignedInteger(i64),
    UnsignedInteger(u64),
    Float(f64),
}

impl Number {
    pub fn as_signed_integer(&self) -> Option<i64> {
        match self {
            Self::SignedInteger(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_unsigned_integer(&self) -> Option<u64> {
        match self {
            Self::UnsignedInteger(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn to_i64(&self) -> Option<i64> {
        match *self {
            Self::SignedInteger(v) => Some(v),
            Self::UnsignedInteger(v) => i64::try_from(v).ok(),
            Self::Float(v) if v.fract() == 0.0 && v >= i64::MIN as f64 && v <= i64::MAX as f64 => {
                Some(v as i64)
            }
            Self::Float(_) => None,
        }
    }

    pub fn to_u64(&self) -> Option<u64> {
        match *self {
            Self::SignedInteger(v) => u64::try_from(v).ok(),
            Self::UnsignedInteger(v) => Some(v),
            Self::Float(v) if v.fract() == 0.0 && v >= 0.0 && v <= u64::MAX as f64 => {
                Some(v as u64)
            }
            Self::Float(_) => None,
        }
    }

    pub fn to_f64(&self) -> f64 {
        match *self {
            Self::SignedInteger(v) => v as f64,
            Self::UnsignedInteger(v) => v as f64,
            Self::Float(v) => v,
        }
    }
}

impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        match (*self, *other) {
            (Self::SignedInteger(a), Self::SignedInteger(b)) => a == b,
            (Self::UnsignedInteger(a), Self::UnsignedInteger(b)) => a == b,
            (Self::SignedInteger(a), Self::UnsignedInteger(b))
            | (Self::UnsignedInteger(b), Self::SignedInteger(a)) => {
                u64::try_from(a).map(|a| a == b).unwrap_or(false)
            }
            _ => self.to_f64() == other.to_f64(),
        }
    }
}

impl Display for Number {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SignedInteger(v) => write!(f, "{}", v),
            Self::UnsignedInteger(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
        }
    }
}

impl Serialize for Number {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Self::SignedInteger(v) => serializer.serialize_i64(*v),
            Self::UnsignedInteger(v) => serializer.serialize_u64(*v),
            Self::Float(v) => serializer.serialize_f64(*v),
        }
    }
}

macro_rules! impl_number_from {
    ($type:ty => $variant:ident) => {
        impl From<$type> for Number {
            fn from(value: $type) -> Self {
                Self::$variant(value as _)
            }
        }

        impl From<$type> for Value {
            fn from(value: $type) -> Self {
                Self::Number(Number::$variant(value as _))
            }
        }
    };
}

impl_number_from!(i8 => SignedInteger);
impl_number_from!(i16 => SignedInteger);
impl_number_from!(i32 => SignedInteger);
impl_number_from!(i64 => SignedInteger);
impl_number_from!(isize => SignedInteger);
impl_number_from!(u8 => UnsignedInteger);
impl_number_from!(u16 => UnsignedInteger);
impl_number_from!(u32 => UnsignedInteger);
impl_number_from!(u64 => UnsignedInteger);
impl_number_from!(usize => UnsignedInteger);
impl_number_from!(f32 => Float);
impl_number_from!(f64 => Float);

/// JSON-like representation tree produced and consumed by mapping.
///
/// Records keep insertion order, but compare equal regardless of it.
#[derive(Debug, Default, Clone)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Array(Vec<Value>),
    Record(Vec<(String, Value)>),
}

impl Value {
    pub fn null() -> Self {
        Self::Null
    }

    pub fn bool(value: bool) -> Self {
        Self::Bool(value)
    }

    pub fn number(value: impl Into<Number>) -> Self {
        Self::Number(value.into())
    }

    pub fn string(value: impl ToString) -> Self {
        Self::String(value.to_string())
    }

    pub fn array() -> Self {
        Self::Array(Default::default())
    }

    pub fn array_from<T: Into<Value>>(value: impl IntoIterator<Item = T>) -> Self {
        Self::Array(value.into_iter().map(|item| item.into()).collect())
    }

    pub fn item(self, value: impl Into<Value>) -> Self {
        match self {
            Self::Array(mut result) => {
                result.push(value.into());
                Self::Array(result)
            }
            _ => self,
        }
    }

    pub fn record() -> Self {
        Self::Record(Default::default())
    }

    pub fn record_from<K: ToString, V: Into<Value>>(
        value: impl IntoIterator<Item = (K, V)>,
    ) -> Self {
        Self::Record(
            value
                .into_iter()
                .map(|(key, value)| (key.to_string(), value.into()))
                .collect(),
        )
    }

    pub fn property(mut self, key: impl ToString, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Sets the record entry under `key`, replacing an existing one in place.
    /// Returns the replaced value. Does nothing for non-record values.
    pub fn insert(&mut self, key: impl ToString, value: impl Into<Value>) -> Option<Value> {
        if let Self::Record(result) = self {
            let key = key.to_string();
            let value = value.into();
            if let Some((_, item)) = result.iter_mut().find(|(k, _)| k == &key) {
                return Some(std::mem::replace(item, value));
            }
            result.push((key, value));
        }
        None
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        if let Self::Record(result) = self {
            if let Some(index) = result.iter().position(|(k, _)| k == key) {
                return Some(result.remove(index).1);
            }
        }
        None
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Self::Record(v) => v.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        match self {
            Self::Record(v) => v.iter_mut().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.as_record()
            .unwrap_or_default()
            .iter()
            .map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Array(v) => v.len(),
            Self::Record(v) => v.len(),
            _ => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Self::Array(_))
    }

    pub fn is_record(&self) -> bool {
        matches!(self, Self::Record(_))
    }

    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            Self::Null | Self::Bool(_) | Self::Number(_) | Self::String(_)
        )
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<&Number> {
        match self {
            Self::Number(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v.as_str()),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Self::Array(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&[(String, Value)]> {
        match self {
            Self::Record(v) => Some(v),
            _ => None,
        }
    }

    /// Short kind name used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Array(_) => "array",
            Self::Record(_) => "record",
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => a == b,
            (Self::Record(a), Self::Record(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .all(|(key, value)| other.get(key).map(|v| v == value).unwrap_or(false))
            }
            _ => false,
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::String(v) => f.write_str(v),
            _ => match serde_json::to_string(self) {
                Ok(text) => f.write_str(&text),
                Err(_) => f.write_str(self.kind()),
            },
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<char> for Value {
    fn from(value: char) -> Self {
        Self::String(value.to_string())
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<Number> for Value {
    fn from(value: Number) -> Self {
        Self::Number(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(|value| value.into()).unwrap_or_default()
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(value: Vec<T>) -> Self {
        Self::array_from(value)
    }
}

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Bool(v) => serializer.serialize_bool(*v),
            Self::Number(v) => v.serialize(serializer),
            Self::String(v) => serializer.serialize_str(v),
            Self::Array(v) => {
                let mut seq = serializer.serialize_seq(Some(v.len()))?;
                for item in v {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Self::Record(v) => {
                let mut map = serializer.serialize_map(Some(v.len()))?;
                for (k, v) in v {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(ValueVisitor)
    }
}
