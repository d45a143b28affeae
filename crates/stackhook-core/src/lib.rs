//! stackhook-core: data model, object access, and the cluster seam

pub mod catalog;
pub mod cluster;
pub mod error;
pub mod instance;
pub mod objects;
pub mod types;

pub use catalog::{
    ArtifactSource, Behavior, BehaviorCatalog, BindingTarget, EngineChoice, EngineType,
    FieldBinding, HookSpec, OverlayConfig, StackConfiguration,
};
pub use cluster::{create_typed, Cluster, MemoryCluster};
pub use error::{Error, Result};
pub use instance::Instance;
pub use objects::{ConfigMap, Job, OwnerReference};
pub use types::{EventName, ObjectKey, TypeIdentity, TypeKey};
