//! Config distributor: hands engine input to execution units as ConfigMaps.
//!
//! Names are content-addressed, so re-rendering an unchanged instance targets
//! the same ConfigMap and any change targets a new one. An existing ConfigMap
//! with the computed name already holds the right content and counts as success.

use crate::artifact::{distributed_name, EngineArtifact};
use stackhook_core::{create_typed, Cluster, ConfigMap, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Handle to a distributed ConfigMap.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfigHandle {
    pub name: String,
    pub namespace: String,
    /// False when the ConfigMap already existed.
    pub created: bool,
}

pub struct ConfigDistributor {
    cluster: Arc<dyn Cluster>,
}

impl ConfigDistributor {
    pub fn new(cluster: Arc<dyn Cluster>) -> Self {
        Self { cluster }
    }

    pub async fn distribute(
        &self,
        namespace: &str,
        name: &str,
        files: &BTreeMap<String, String>,
    ) -> Result<ConfigHandle> {
        let final_name = distributed_name(name, files)?;
        let config_map = ConfigMap::new(namespace, &final_name, files.clone());

        match create_typed(self.cluster.as_ref(), &config_map).await {
            Ok(_) => {
                info!(config = %final_name, namespace, "distributed engine configuration");
                Ok(ConfigHandle {
                    name: final_name,
                    namespace: namespace.to_string(),
                    created: true,
                })
            }
            Err(e) if e.is_already_exists() => {
                debug!(config = %final_name, namespace, "engine configuration already exists");
                Ok(ConfigHandle {
                    name: final_name,
                    namespace: namespace.to_string(),
                    created: false,
                })
            }
            Err(e) => Err(e),
        }
    }

    pub async fn distribute_artifact(&self, artifact: &EngineArtifact) -> Result<ConfigHandle> {
        self.distribute(&artifact.namespace, &artifact.base_name, &artifact.files)
            .await
    }
}
