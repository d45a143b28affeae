//! Identity types: type keys, type identities, object keys, events

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Governed type identifier in `Kind.group/version` form - cheaply cloneable.
///
/// Core-group types drop the group: `ConfigMap.v1`.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct TypeKey(Arc<str>);

impl TypeKey {
    pub fn new(s: impl Into<String>) -> Self {
        Self(Arc::from(s.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Split at the first `.` into kind and apiVersion, then the apiVersion into group and version.
    pub fn parse(&self) -> Result<TypeIdentity> {
        let (kind, api_version) = self
            .0
            .split_once('.')
            .ok_or_else(|| Error::InvalidTypeKey(self.0.to_string()))?;
        if kind.is_empty() || api_version.is_empty() {
            return Err(Error::InvalidTypeKey(self.0.to_string()));
        }
        TypeIdentity::from_api_version(api_version, kind)
            .map_err(|_| Error::InvalidTypeKey(self.0.to_string()))
    }
}

impl std::fmt::Display for TypeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for TypeKey {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for TypeKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<TypeKey> for String {
    fn from(key: TypeKey) -> Self {
        key.0.to_string()
    }
}

/// Group, version and kind of an object.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct TypeIdentity {
    pub group: String,
    pub version: String,
    pub kind: String,
}

impl TypeIdentity {
    pub fn new(group: impl Into<String>, version: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            kind: kind.into(),
        }
    }

    /// `example.com/v1` → group `example.com`, version `v1`; `v1` → core group.
    pub fn from_api_version(api_version: &str, kind: &str) -> Result<Self> {
        let (group, version) = match api_version.split_once('/') {
            Some((group, version)) => (group, version),
            None => ("", api_version),
        };
        if version.is_empty() || kind.is_empty() {
            return Err(Error::InvalidObject(format!(
                "cannot derive type from apiVersion '{}' and kind '{}'",
                api_version, kind
            )));
        }
        Ok(Self::new(group, version, kind))
    }

    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }

    pub fn type_key(&self) -> TypeKey {
        TypeKey::new(format!("{}.{}", self.kind, self.api_version()))
    }
}

impl std::fmt::Display for TypeIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.kind, self.api_version())
    }
}

/// Namespace and name of an object.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}/{}", self.namespace, self.name)
        }
    }
}

/// Lifecycle event that fires a hook list.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventName {
    Created,
    Updated,
    Deleted,
}

impl EventName {
    pub fn all() -> &'static [EventName] {
        &[Self::Created, Self::Updated, Self::Deleted]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
        }
    }
}

impl std::fmt::Display for EventName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for EventName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "created" | "create" => Ok(Self::Created),
            "updated" | "update" => Ok(Self::Updated),
            "deleted" | "delete" => Ok(Self::Deleted),
            other => Err(Error::Config(format!("unknown event '{}'", other))),
        }
    }
}
