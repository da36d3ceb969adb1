use crate::{
    error::{Error, Result},
    reflect::Reflect,
    value::Value,
};
use std::{
    any::{type_name, TypeId},
    collections::HashMap,
    hash::{Hash, Hasher},
    sync::RwLock,
};

lazy_static::lazy_static! {
    static ref HIERARCHY: RwLock<HashMap<TypeKey, TypeKey>> = Default::default();
}

/// Identity of a Rust type, comparable by `TypeId` and carrying its name for diagnostics.
#[derive(Clone, Copy)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl std::fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name)
    }
}

impl std::fmt::Display for TypeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name)
    }
}

/// Explicit single-base type lineage, the Rust stand-in for class inheritance.
pub struct TypeHierarchy;

impl TypeHierarchy {
    /// Declares `B` as the direct base of `T`.
    pub fn extend<T, B>() -> Result<()>
    where
        T: ?Sized + 'static,
        B: ?Sized + 'static,
    {
        Self::extend_key(TypeKey::of::<T>(), TypeKey::of::<B>())
    }

    pub fn extend_key(key: TypeKey, base: TypeKey) -> Result<()> {
        if key == base {
            return Err(Error::InvalidHierarchy(key.name(), base.name()));
        }
        let mut hierarchy = HIERARCHY
            .write()
            .map_err(|_| Error::Message("type hierarchy lock is poisoned".to_owned()))?;
        if let Some(existing) = hierarchy.get(&key) {
            if *existing == base {
                return Ok(());
            }
            return Err(Error::InvalidHierarchy(key.name(), base.name()));
        }
        let mut current = Some(base);
        while let Some(ancestor) = current {
            if ancestor == key {
                return Err(Error::InvalidHierarchy(key.name(), base.name()));
            }
            current = hierarchy.get(&ancestor).copied();
        }
        hierarchy.insert(key, base);
        tracing::debug!(type_name = key.name(), base = base.name(), "registered type base");
        Ok(())
    }

    pub fn base_of(key: TypeKey) -> Option<TypeKey> {
        HIERARCHY
            .read()
            .ok()
            .and_then(|hierarchy| hierarchy.get(&key).copied())
    }

    /// Ancestors of `key`, nearest first.
    pub fn ancestors(key: TypeKey) -> Vec<TypeKey> {
        let mut result = vec![];
        if let Ok(hierarchy) = HIERARCHY.read() {
            let mut current = hierarchy.get(&key).copied();
            while let Some(ancestor) = current {
                result.push(ancestor);
                current = hierarchy.get(&ancestor).copied();
            }
        }
        result
    }

    /// Tells if a value of type `key` can stand where `target` is expected.
    pub fn is_assignable(key: TypeKey, target: TypeKey) -> bool {
        key == target || Self::ancestors(key).contains(&target)
    }
}

pub type FromValue = fn(&Value) -> Result<Box<dyn Reflect>>;
pub type Construct = fn() -> Box<dyn Reflect>;
pub type Collect = fn(Vec<Box<dyn Reflect>>) -> Result<Box<dyn Reflect>>;
pub type Wrap = fn(Option<Box<dyn Reflect>>) -> Result<Box<dyn Reflect>>;

#[derive(Clone, Copy)]
pub enum Shape {
    /// Converted from a single representation value at once.
    Leaf { from_value: FromValue },
    /// Default-constructed and populated member by member.
    Object {
        members: &'static [MemberInfo],
        construct: Construct,
    },
    /// Cannot be constructed, only resolved to a concrete type.
    Abstract,
    List {
        element: fn() -> TypeSpec,
        collect: Collect,
    },
    Optional { inner: fn() -> TypeSpec, wrap: Wrap },
    /// Only dedicated handlers know how to map it.
    Opaque,
}

impl Shape {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Leaf { .. } => "leaf",
            Self::Object { .. } => "object",
            Self::Abstract => "abstract",
            Self::List { .. } => "list",
            Self::Optional { .. } => "optional",
            Self::Opaque => "opaque",
        }
    }
}

/// Runtime description of a mappable type: its identity and how to build it.
#[derive(Clone, Copy)]
pub struct TypeSpec {
    key: TypeKey,
    shape: Shape,
}

impl TypeSpec {
    pub fn new(key: TypeKey, shape: Shape) -> Self {
        Self { key, shape }
    }

    pub fn leaf<T: ?Sized + 'static>(from_value: FromValue) -> Self {
        Self::new(TypeKey::of::<T>(), Shape::Leaf { from_value })
    }

    pub fn object<T: 'static>(members: &'static [MemberInfo], construct: Construct) -> Self {
        Self::new(TypeKey::of::<T>(), Shape::Object { members, construct })
    }

    pub fn abstract_of<T: ?Sized + 'static>() -> Self {
        Self::new(TypeKey::of::<T>(), Shape::Abstract)
    }

    pub fn list<T: 'static>(element: fn() -> TypeSpec, collect: Collect) -> Self {
        Self::new(TypeKey::of::<T>(), Shape::List { element, collect })
    }

    pub fn optional<T: 'static>(inner: fn() -> TypeSpec, wrap: Wrap) -> Self {
        Self::new(TypeKey::of::<T>(), Shape::Optional { inner, wrap })
    }

    pub fn opaque<T: ?Sized + 'static>() -> Self {
        Self::new(TypeKey::of::<T>(), Shape::Opaque)
    }

    pub fn key(&self) -> TypeKey {
        self.key
    }

    pub fn name(&self) -> &'static str {
        self.key.name()
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn is_list(&self) -> bool {
        matches!(self.shape, Shape::List { .. })
    }

    pub fn members(&self) -> &'static [MemberInfo] {
        match self.shape {
            Shape::Object { members, .. } => members,
            _ => &[],
        }
    }

    pub fn member(&self, name: &str) -> Option<&'static MemberInfo> {
        self.members().iter().find(|member| member.name() == name)
    }

    pub fn construct(&self) -> Result<Box<dyn Reflect>> {
        match self.shape {
            Shape::Object { construct, .. } => Ok(construct()),
            _ => Err(Error::NotConstructible(self.name())),
        }
    }

    pub fn element(&self) -> Option<TypeSpec> {
        match self.shape {
            Shape::List { element, .. } => Some(element()),
            _ => None,
        }
    }

    /// Type that is actually stored behind an optional, or self otherwise.
    pub fn unwrap_optional(&self) -> TypeSpec {
        match self.shape {
            Shape::Optional { inner, .. } => inner().unwrap_optional(),
            _ => *self,
        }
    }
}

impl PartialEq for TypeSpec {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl std::fmt::Debug for TypeSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeSpec")
            .field("key", &self.key)
            .field("shape", &self.shape.kind())
            .finish()
    }
}

/// Statically declared member of an object type.
#[derive(Clone, Copy)]
pub struct MemberInfo {
    name: &'static str,
    ty: fn() -> TypeSpec,
    settable: bool,
}

impl MemberInfo {
    pub const fn new(name: &'static str, ty: fn() -> TypeSpec) -> Self {
        Self {
            name,
            ty,
            settable: true,
        }
    }

    pub const fn read_only(name: &'static str, ty: fn() -> TypeSpec) -> Self {
        Self {
            name,
            ty,
            settable: false,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn type_spec(&self) -> TypeSpec {
        (self.ty)()
    }

    pub fn is_settable(&self) -> bool {
        self.settable
    }
}

impl std::fmt::Debug for MemberInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemberInfo")
            .field("name", &self.name)
            .field("type", &self.type_spec().key())
            .field("settable", &self.settable)
            .finish()
    }
}
