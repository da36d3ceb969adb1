use crate::{
    error::{Error, Result},
    types::TypeKey,
};
use std::{
    borrow::Cow,
    collections::{HashMap, HashSet},
    sync::RwLock,
};

lazy_static::lazy_static! {
    static ref FORMAT_TAGS: RwLock<HashMap<(TypeKey, Option<String>), HashSet<Format>>> =
        Default::default();
}

/// Opaque token naming a target representation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Format(Cow<'static, str>);

impl Format {
    pub const JSON: Self = Self(Cow::Borrowed("json"));
    pub const JSON_CONTENT_TYPE: Self = Self(Cow::Borrowed("application/json"));
    /// Resolves type identifiers into types.
    pub const TYPE_ID: Self = Self(Cow::Borrowed("type-id"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for Format {
    fn from(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }
}

/// Formats supported by handler types and by their individual members.
pub struct FormatTags;

impl FormatTags {
    pub fn register<T: ?Sized + 'static>(
        formats: impl IntoIterator<Item = Format>,
    ) -> Result<()> {
        Self::register_key(TypeKey::of::<T>(), None, formats)
    }

    pub fn register_member<T: ?Sized + 'static>(
        member: &str,
        formats: impl IntoIterator<Item = Format>,
    ) -> Result<()> {
        Self::register_key(TypeKey::of::<T>(), Some(member), formats)
    }

    pub fn register_key(
        owner: TypeKey,
        member: Option<&str>,
        formats: impl IntoIterator<Item = Format>,
    ) -> Result<()> {
        let formats = formats.into_iter().collect::<Vec<_>>();
        if formats.is_empty() {
            return Ok(());
        }
        let mut tags = FORMAT_TAGS
            .write()
            .map_err(|_| Error::Message("format tag registry lock is poisoned".to_owned()))?;
        tracing::debug!(
            owner = owner.name(),
            member = member.unwrap_or_default(),
            formats = ?formats,
            "registered format tags"
        );
        tags.entry((owner, member.map(|member| member.to_owned())))
            .or_default()
            .extend(formats);
        Ok(())
    }

    pub fn formats(owner: TypeKey, member: Option<&str>) -> HashSet<Format> {
        FORMAT_TAGS
            .read()
            .ok()
            .and_then(|tags| {
                tags.get(&(owner, member.map(|member| member.to_owned())))
                    .cloned()
            })
            .unwrap_or_default()
    }

    /// Member tags win over owner tags; no tags at all match any format.
    pub fn accepts(owner: TypeKey, member: Option<&str>, format: &Format) -> bool {
        let mut tags = member
            .map(|member| Self::formats(owner, Some(member)))
            .unwrap_or_default();
        if tags.is_empty() {
            tags = Self::formats(owner, None);
        }
        tags.is_empty() || tags.contains(format)
    }
}
