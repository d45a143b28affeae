//! Schema-erased object access.
//!
//! Triggering instances arrive as arbitrary JSON documents. Everything that
//! reads them (resolver, both engines, the coordinators) goes through
//! [`Instance`] instead of walking the document itself.

use crate::error::{Error, Result};
use crate::types::{ObjectKey, TypeIdentity};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Read-only view over an untyped cluster object.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Instance(Value);

impl Instance {
    /// Wrap a document. Anything but a JSON object is rejected.
    pub fn new(value: Value) -> Result<Self> {
        if !value.is_object() {
            return Err(Error::InvalidObject("object document must be a mapping".into()));
        }
        Ok(Self(value))
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let value: Value = serde_yaml::from_str(yaml)?;
        Self::new(value)
    }

    pub fn from_serializable<T: Serialize>(object: &T) -> Result<Self> {
        Self::new(serde_json::to_value(object)?)
    }

    pub fn into_typed<T: serde::de::DeserializeOwned>(self) -> Result<T> {
        Ok(serde_json::from_value(self.0)?)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    pub fn api_version(&self) -> &str {
        self.str_field("apiVersion")
    }

    pub fn kind(&self) -> &str {
        self.str_field("kind")
    }

    pub fn type_identity(&self) -> Result<TypeIdentity> {
        TypeIdentity::from_api_version(self.api_version(), self.kind())
    }

    pub fn namespace(&self) -> &str {
        self.str_field("metadata.namespace")
    }

    pub fn name(&self) -> &str {
        self.str_field("metadata.name")
    }

    pub fn generate_name(&self) -> &str {
        self.str_field("metadata.generateName")
    }

    pub fn uid(&self) -> &str {
        self.str_field("metadata.uid")
    }

    pub fn generation(&self) -> Option<i64> {
        self.get_field("metadata.generation").and_then(Value::as_i64)
    }

    pub fn deletion_timestamp(&self) -> Option<&str> {
        self.get_field("metadata.deletionTimestamp")
            .and_then(Value::as_str)
    }

    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(self.namespace(), self.name())
    }

    pub fn spec(&self) -> Option<&Value> {
        self.get_field("spec")
    }

    /// Look up a dotted path (`spec.database.size`). Missing segments yield `None`;
    /// so does traversing through a non-mapping or an empty path.
    pub fn get_field(&self, path: &str) -> Option<&Value> {
        if path.split('.').all(str::is_empty) {
            return None;
        }
        let mut current = &self.0;
        for segment in path.split('.').filter(|s| !s.is_empty()) {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    fn str_field(&self, path: &str) -> &str {
        self.get_field(path).and_then(Value::as_str).unwrap_or("")
    }

    // ------------------------------------------------------------
    // Mutation used by cluster implementations when persisting.
    // ------------------------------------------------------------

    pub fn set_metadata(&mut self, field: &str, value: impl Into<Value>) {
        let Some(root) = self.0.as_object_mut() else {
            return;
        };
        let metadata = root
            .entry("metadata")
            .or_insert_with(|| Value::Object(Map::new()));
        if !metadata.is_object() {
            *metadata = Value::Object(Map::new());
        }
        if let Some(metadata) = metadata.as_object_mut() {
            metadata.insert(field.to_string(), value.into());
        }
    }
}

/// Set `value` at a dotted path inside `root`, creating intermediate mappings.
/// Fails when a path segment already holds a non-mapping.
pub fn set_nested_field(root: &mut Map<String, Value>, path: &str, value: Value) -> Result<()> {
    let segments: Vec<&str> = path.split('.').filter(|s| !s.is_empty()).collect();
    let Some((last, parents)) = segments.split_last() else {
        return Err(Error::InvalidObject(format!("empty field path '{}'", path)));
    };

    let mut current = root;
    for segment in parents {
        let entry = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        current = entry.as_object_mut().ok_or_else(|| {
            Error::InvalidObject(format!(
                "field path '{}' crosses non-mapping segment '{}'",
                path, segment
            ))
        })?;
    }
    current.insert(last.to_string(), value);
    Ok(())
}
