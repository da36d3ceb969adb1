use crate::{
    error::Result,
    format::{Format, FormatTags},
    mapper::Mapper,
    reflect::Reflect,
    request::{Contribution, MapFrom, MapTo},
    types::{TypeHierarchy, TypeKey},
    value::Value,
};

/// Marker key standing for any list-shaped type.
pub enum Array {}

/// Direction of a mapping method and the variance it is matched with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// Object into representation, matched contravariantly.
    MapsFrom,
    /// Representation into object, matched covariantly.
    MapsTo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Constraint {
    Any,
    Type(TypeKey),
}

impl Constraint {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self::Type(TypeKey::of::<T>())
    }
}

/// Declares that a handler member serves requests of given policy and type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binding {
    pub member: &'static str,
    pub policy: Policy,
    pub constraint: Constraint,
}

impl Binding {
    pub fn maps_from(member: &'static str, constraint: Constraint) -> Self {
        Self {
            member,
            policy: Policy::MapsFrom,
            constraint,
        }
    }

    pub fn maps_to(member: &'static str, constraint: Constraint) -> Self {
        Self {
            member,
            policy: Policy::MapsTo,
            constraint,
        }
    }
}

/// Type a request is dispatched by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchKey {
    pub key: TypeKey,
    /// Request subject or target is list-shaped.
    pub list: bool,
}

impl DispatchKey {
    pub fn new(key: TypeKey, list: bool) -> Self {
        Self { key, list }
    }
}

/// Provider of mapping methods.
///
/// Format tags registered for `handler_key()` (or for one of its members) restrict
/// which formats a binding serves.
pub trait Handler {
    fn handler_key(&self) -> TypeKey;

    fn bindings(&self) -> Vec<Binding>;

    fn maps_from(
        &self,
        _member: &str,
        _request: &MapFrom,
        _composer: &Mapper,
    ) -> Result<Contribution<Value>> {
        Ok(Contribution::None)
    }

    fn maps_to(
        &self,
        _member: &str,
        _request: &mut MapTo,
        _composer: &Mapper,
    ) -> Result<Contribution<Box<dyn Reflect>>> {
        Ok(Contribution::None)
    }
}

pub struct Candidate<'a> {
    pub handler: &'a dyn Handler,
    pub binding: Binding,
}

/// Lower is more specific, `None` is not eligible.
fn rank(policy: Policy, constraint: Constraint, key: &DispatchKey) -> Option<usize> {
    let Constraint::Type(constraint) = constraint else {
        return Some(usize::MAX);
    };
    let array = TypeKey::of::<Array>();
    match policy {
        Policy::MapsFrom => std::iter::once(key.key)
            .chain(TypeHierarchy::ancestors(key.key))
            .chain(key.list.then_some(array))
            .position(|item| item == constraint),
        Policy::MapsTo => {
            if constraint == key.key || (key.list && constraint == array) {
                Some(0)
            } else if TypeHierarchy::is_assignable(constraint, key.key) {
                Some(1)
            } else {
                None
            }
        }
    }
}

/// Selects handler members serving a request, in chain order and, within one handler,
/// from the most specific binding to the least.
pub fn select_handlers<'a>(
    entries: impl IntoIterator<Item = (&'a dyn Handler, &'a [Binding])>,
    policy: Policy,
    key: &DispatchKey,
    format: &Format,
) -> Vec<Candidate<'a>> {
    let mut result = vec![];
    for (handler, bindings) in entries {
        let owner = handler.handler_key();
        let mut eligible = bindings
            .iter()
            .filter(|binding| binding.policy == policy)
            .filter_map(|binding| {
                rank(policy, binding.constraint, key).map(|rank| (rank, *binding))
            })
            .filter(|(_, binding)| FormatTags::accepts(owner, Some(binding.member), format))
            .collect::<Vec<_>>();
        eligible.sort_by_key(|(rank, _)| *rank);
        result.extend(
            eligible
                .into_iter()
                .map(|(_, binding)| Candidate { handler, binding }),
        );
    }
    result
}
