//! Cluster abstraction: the object store the pipeline reads from and writes to.
//!
//! Renderers read triggering instances and create ConfigMaps and Jobs through
//! this trait. The store decides where objects actually live.
//! In-tree: an in-memory store (tests, dry runs). The controller crate adds a
//! file-backed one.

use crate::error::{Error, Result};
use crate::instance::Instance;
use crate::types::{ObjectKey, TypeIdentity, TypeKey};
use chrono::Utc;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

/// Pluggable object store.
#[async_trait::async_trait]
pub trait Cluster: Send + Sync {
    /// Read one object. Absent objects are `Error::NotFound`.
    async fn get(&self, type_id: &TypeIdentity, key: &ObjectKey) -> Result<Instance>;

    /// Create an object. Existing objects are `Error::AlreadyExists`.
    /// Honors `metadata.generateName` when `metadata.name` is empty.
    async fn create(&self, object: Instance) -> Result<Instance>;

    /// All objects of one type, ordered by namespace then name.
    async fn list(&self, type_id: &TypeIdentity) -> Result<Vec<Instance>>;

    /// Human-readable location of the store.
    fn location(&self) -> String;
}

/// Create a typed object and read the stored form back.
pub async fn create_typed<T>(cluster: &dyn Cluster, object: &T) -> Result<T>
where
    T: Serialize + DeserializeOwned,
{
    let created = cluster.create(Instance::from_serializable(object)?).await?;
    created.into_typed()
}

/// Fill server-assigned metadata: generated name, uid, creation timestamp, generation.
pub fn prepare_for_create(mut object: Instance) -> Result<Instance> {
    object.type_identity()?;
    if object.name().is_empty() {
        if object.generate_name().is_empty() {
            return Err(Error::InvalidObject(format!(
                "{} has neither metadata.name nor metadata.generateName",
                object.kind()
            )));
        }
        let name = format!("{}{}", object.generate_name(), random_suffix());
        object.set_metadata("name", name);
    }
    if object.uid().is_empty() {
        object.set_metadata("uid", uuid::Uuid::new_v4().to_string());
    }
    object.set_metadata("creationTimestamp", Utc::now().to_rfc3339());
    if object.generation().is_none() {
        object.set_metadata("generation", 1);
    }
    Ok(object)
}

fn random_suffix() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..5].to_string()
}

// ============================================================
// In-memory store
// ============================================================

type StoreKey = (TypeKey, ObjectKey);

/// Concurrent in-memory store. Used by dry runs and tests.
#[derive(Default)]
pub struct MemoryCluster {
    objects: DashMap<StoreKey, Instance>,
    /// Kinds whose creates fail with a cluster error (fault injection).
    failing_kinds: DashMap<String, String>,
}

impl MemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert an object, assigning server metadata when missing.
    pub fn insert(&self, object: Instance) -> Result<Instance> {
        let object = prepare_for_create(object)?;
        let key = (object.type_identity()?.type_key(), object.key());
        self.objects.insert(key, object.clone());
        Ok(object)
    }

    pub fn remove(&self, type_id: &TypeIdentity, key: &ObjectKey) -> Option<Instance> {
        self.objects
            .remove(&(type_id.type_key(), key.clone()))
            .map(|(_, v)| v)
    }

    /// Every stored object of a given apiVersion and kind.
    pub fn objects_of(&self, api_version: &str, kind: &str) -> Vec<Instance> {
        let mut found: Vec<Instance> = self
            .objects
            .iter()
            .filter(|e| e.value().api_version() == api_version && e.value().kind() == kind)
            .map(|e| e.value().clone())
            .collect();
        found.sort_by_key(|o| o.key());
        found
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Make every subsequent create of `kind` fail with `Error::Cluster`.
    pub fn fail_creates_of(&self, kind: &str, message: &str) {
        self.failing_kinds.insert(kind.to_string(), message.to_string());
    }
}

#[async_trait::async_trait]
impl Cluster for MemoryCluster {
    async fn get(&self, type_id: &TypeIdentity, key: &ObjectKey) -> Result<Instance> {
        self.objects
            .get(&(type_id.type_key(), key.clone()))
            .map(|e| e.value().clone())
            .ok_or_else(|| Error::NotFound(format!("{} {}", type_id, key)))
    }

    async fn create(&self, object: Instance) -> Result<Instance> {
        if let Some(message) = self.failing_kinds.get(object.kind()) {
            return Err(Error::Cluster(message.value().clone()));
        }
        let object = prepare_for_create(object)?;
        let type_id = object.type_identity()?;
        let key = (type_id.type_key(), object.key());
        match self.objects.entry(key) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(Error::AlreadyExists(format!(
                "{} {}",
                type_id,
                object.key()
            ))),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                debug!(kind = object.kind(), key = %object.key(), "created object");
                slot.insert(object.clone());
                Ok(object)
            }
        }
    }

    async fn list(&self, type_id: &TypeIdentity) -> Result<Vec<Instance>> {
        let type_key = type_id.type_key();
        let mut found: Vec<Instance> = self
            .objects
            .iter()
            .filter(|e| e.key().0 == type_key)
            .map(|e| e.value().clone())
            .collect();
        found.sort_by_key(|o| o.key());
        Ok(found)
    }

    fn location(&self) -> String {
        "memory".into()
    }
}
