use crate::{
    error::{Error, Result},
    types::{TypeHierarchy, TypeKey},
};
use std::{collections::HashMap, sync::RwLock};

lazy_static::lazy_static! {
    static ref ANNOTATIONS: RwLock<HashMap<(TypeKey, String), MemberAnnotation>> =
        Default::default();
}

fn poisoned() -> Error {
    Error::Message("annotation store lock is poisoned".to_owned())
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MemberAnnotation {
    /// Never written nor read.
    pub ignore: bool,
    /// Merged into the parent on write, read from the whole parent value.
    pub root: bool,
}

/// Per-member mapping flags, looked up through type ancestors.
pub struct Annotations;

impl Annotations {
    pub fn ignore<T: ?Sized + 'static>(member: &str) -> Result<()> {
        Self::update(TypeKey::of::<T>(), member, |annotation| {
            annotation.ignore = true
        })
    }

    pub fn root<T: ?Sized + 'static>(member: &str) -> Result<()> {
        Self::update(TypeKey::of::<T>(), member, |annotation| annotation.root = true)
    }

    pub fn update(
        owner: TypeKey,
        member: &str,
        f: impl FnOnce(&mut MemberAnnotation),
    ) -> Result<()> {
        let mut annotations = ANNOTATIONS.write().map_err(|_| poisoned())?;
        let annotation = annotations
            .entry((owner, member.to_owned()))
            .or_default();
        f(annotation);
        tracing::debug!(
            owner = owner.name(),
            member,
            ignore = annotation.ignore,
            root = annotation.root,
            "annotated member"
        );
        Ok(())
    }

    pub fn clear<T: ?Sized + 'static>() -> Result<()> {
        let owner = TypeKey::of::<T>();
        ANNOTATIONS
            .write()
            .map_err(|_| poisoned())?
            .retain(|(key, _), _| *key != owner);
        Ok(())
    }

    pub fn get(owner: TypeKey, member: &str) -> MemberAnnotation {
        let Ok(annotations) = ANNOTATIONS.read() else {
            return Default::default();
        };
        std::iter::once(owner)
            .chain(TypeHierarchy::ancestors(owner))
            .find_map(|key| annotations.get(&(key, member.to_owned())).copied())
            .unwrap_or_default()
    }

    pub fn is_ignored(owner: TypeKey, member: &str) -> bool {
        Self::get(owner, member).ignore
    }

    pub fn is_root(owner: TypeKey, member: &str) -> bool {
        Self::get(owner, member).root
    }
}
