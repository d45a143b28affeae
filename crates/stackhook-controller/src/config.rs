//! Controller configuration
//!
//! Deadlines, images, watch cadence and the catalog object's location.
//! Loaded from TOML at startup, falls back to defaults if no config file exists.

use serde::{Deserialize, Serialize};
use stackhook_core::{Error, ObjectKey, Result};
use stackhook_engines::EngineImages;
use std::path::Path;
use std::time::Duration;

/// Top-level controller configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Per-pass deadlines and redelivery.
    pub reconcile: ReconcileConfig,
    /// Render and apply stage images.
    pub images: EngineImages,
    /// Directory watcher cadence.
    pub watch: WatchConfig,
    /// Where the StackConfiguration object lives.
    pub catalog: CatalogConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Wall-clock budget for one render pass. Store calls still pending at the deadline are dropped.
    pub pass_timeout_secs: u64,
    /// Budget for registering one loop with the host.
    pub setup_timeout_secs: u64,
    /// Delay before a pass that hit a transient failure is redelivered.
    pub requeue_secs: u64,
    /// Bounded queue depth per governed type.
    pub queue_depth: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Poll interval in milliseconds.
    pub poll_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub namespace: String,
    pub name: String,
}

// ============================================================
// Defaults
// ============================================================

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            reconcile: ReconcileConfig::default(),
            images: EngineImages::default(),
            watch: WatchConfig::default(),
            catalog: CatalogConfig::default(),
        }
    }
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self { pass_timeout_secs: 60, setup_timeout_secs: 60, requeue_secs: 10, queue_depth: 64 }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self { poll_ms: 500 }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self { namespace: "default".into(), name: "stack-configuration".into() }
    }
}

impl ReconcileConfig {
    pub fn pass_timeout(&self) -> Duration {
        Duration::from_secs(self.pass_timeout_secs)
    }

    pub fn setup_timeout(&self) -> Duration {
        Duration::from_secs(self.setup_timeout_secs)
    }

    pub fn requeue_after(&self) -> Duration {
        Duration::from_secs(self.requeue_secs)
    }
}

impl WatchConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_ms)
    }
}

impl CatalogConfig {
    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(&self.namespace, &self.name)
    }
}

// ============================================================
// Loading
// ============================================================

impl ControllerConfig {
    /// Load config from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => match Self::parse(&content) {
                Ok(config) => {
                    tracing::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {}; using defaults", path.display(), e);
                    Self::default()
                }
            },
            Err(_) => {
                tracing::info!("No config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Strict parse. Unlike [`load`](Self::load), errors are returned.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Write the current config as TOML (for generating a default config file).
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }
}
