use crate::value::Value;
use std::fmt::Display;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone)]
pub enum Error {
    Message(String),
    ExpectedMapEntry,
    ExpectedUnitVariant,
    ExpectedNewTypeVariant,
    ExpectedTupleVariant,
    ExpectedStructVariant,
    KeyMustBeString(Value),
    /// Mapping subject is absent.
    MissingSubject,
    /// Raw value to map from is absent.
    MissingValue,
    ArrayTypeNotInferable,
    /// Type identifier lookup got something that is not a string.
    InvalidTypeId(Value),
    /// Names the request no handler accepted.
    NotHandled(String),
    TypeIdNotInferable(&'static str),
    /// (normalized id, already registered type, rejected type)
    DuplicateTypeId(String, &'static str, &'static str),
    /// (type, assigned id, rejected id)
    TypeIdAlreadyAssigned(&'static str, String, String),
    InvalidTypeIdMember {
        owner: &'static str,
        member: String,
    },
    InvalidDynamicTypeId {
        member: String,
        found: Value,
    },
    InvalidTypeIdProperty(String),
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },
    InvalidValue {
        expected: &'static str,
        found: Value,
    },
    NotConstructible(&'static str),
    UnknownMember {
        owner: &'static str,
        member: String,
    },
    ReadOnlyMember {
        owner: &'static str,
        member: String,
    },
    DeferredResult(String),
    /// (type, base)
    InvalidHierarchy(&'static str, &'static str),
}

impl Error {
    pub fn is_not_handled(&self) -> bool {
        matches!(self, Self::NotHandled(_))
    }
}

impl serde::ser::Error for Error {
    fn custom<T: Display>(msg: T) -> Self {
        Error::Message(msg.to_string())
    }
}

impl serde::de::Error for Error {
    fn custom<T: Display>(msg: T) -> Self {
        Error::Message(msg.to_string())
    }
}

impl Display for Error {
    fn fmt(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::Message(msg) => formatter.write_str(msg),
            Error::ExpectedMapEntry => formatter.write_str("expected map entry"),
            Error::ExpectedUnitVariant => formatter.write_str("expected unit variant"),
            Error::ExpectedNewTypeVariant => formatter.write_str("expected newtype variant"),
            Error::ExpectedTupleVariant => formatter.write_str("expected tuple variant"),
            Error::ExpectedStructVariant => formatter.write_str("expected struct variant"),
            Error::KeyMustBeString(key) => write!(formatter, "map key must be a string: {}", key),
            Error::MissingSubject => formatter.write_str("the object argument is required"),
            Error::MissingValue => formatter.write_str("the value argument is required"),
            Error::ArrayTypeNotInferable => formatter.write_str("cannot infer array type"),
            Error::InvalidTypeId(id) => write!(formatter, "invalid type id: {}", id),
            Error::NotHandled(request) => write!(formatter, "{} not handled", request),
            Error::TypeIdNotInferable(name) => write!(
                formatter,
                "type id cannot be inferred from `{}`, please specify it explicitly",
                name
            ),
            Error::DuplicateTypeId(id, registered, rejected) => write!(
                formatter,
                "type id `{}` of `{}` is already registered for `{}`",
                id, rejected, registered
            ),
            Error::TypeIdAlreadyAssigned(name, assigned, rejected) => write!(
                formatter,
                "type `{}` already has type id `{}`, cannot assign `{}`",
                name, assigned, rejected
            ),
            Error::InvalidTypeIdMember { owner, member } => write!(
                formatter,
                "type id accessor can only be applied to computed or read-only members, `{}::{}` is a settable member",
                owner, member
            ),
            Error::InvalidDynamicTypeId { member, found } => write!(
                formatter,
                "type id accessor `{}` returned invalid identifier {}",
                member, found
            ),
            Error::InvalidTypeIdProperty(name) => {
                write!(formatter, "invalid type id property name: `{}`", name)
            }
            Error::TypeMismatch { expected, found } => write!(
                formatter,
                "expected instance compatible with `{}`, found `{}`",
                expected, found
            ),
            Error::InvalidValue { expected, found } => {
                write!(formatter, "cannot map {} into `{}`", found, expected)
            }
            Error::NotConstructible(name) => {
                write!(formatter, "type `{}` cannot be constructed", name)
            }
            Error::UnknownMember { owner, member } => {
                write!(formatter, "type `{}` has no member `{}`", owner, member)
            }
            Error::ReadOnlyMember { owner, member } => {
                write!(formatter, "member `{}::{}` is read-only", owner, member)
            }
            Error::DeferredResult(request) => write!(
                formatter,
                "{} produced a deferred result where an immediate one was required",
                request
            ),
            Error::InvalidHierarchy(name, base) => {
                write!(formatter, "`{}` cannot extend `{}`", name, base)
            }
        }
    }
}

impl std::error::Error for Error {}
