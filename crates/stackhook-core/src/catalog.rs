//! Behavior catalog: the parsed form of a StackConfiguration object.
//!
//! A StackConfiguration declares, per governed type, which hooks run on which
//! lifecycle event, the artifact image the hooks read templates from, and the
//! rendering engine. Engines can be declared at three levels: on the hook, on
//! the type's behavior, and at the top of the configuration.

use crate::error::Result;
use crate::types::{EventName, ObjectKey, TypeKey};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const STACK_CONFIGURATION_GROUP: &str = "stacks.crossplane.io";
pub const STACK_CONFIGURATION_VERSION: &str = "v1alpha1";
pub const STACK_CONFIGURATION_KIND: &str = "StackConfiguration";

// ============================================================
// Engine selection
// ============================================================

/// Engine variant named by an [`EngineChoice`].
///
/// Unknown names are kept verbatim so dispatch can report them.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EngineType {
    Chart,
    Overlay,
    #[default]
    Unset,
    Unrecognized(String),
}

impl EngineType {
    pub fn is_set(&self) -> bool {
        !matches!(self, Self::Unset)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Chart => "helm2",
            Self::Overlay => "kustomize",
            Self::Unset => "",
            Self::Unrecognized(name) => name,
        }
    }
}

impl From<String> for EngineType {
    fn from(s: String) -> Self {
        match s.trim() {
            "" => Self::Unset,
            "helm2" | "helm" | "chart" => Self::Chart,
            "kustomize" | "overlay" => Self::Overlay,
            other => Self::Unrecognized(other.to_string()),
        }
    }
}

impl From<EngineType> for String {
    fn from(t: EngineType) -> Self {
        t.as_str().to_string()
    }
}

impl std::fmt::Display for EngineType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unset => write!(f, "<unset>"),
            other => write!(f, "{}", other.as_str()),
        }
    }
}

/// Where a binding's value lands: one field of one object in the rendered output.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BindingTarget {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    pub field_path: String,
}

/// Copies one dotted field of the triggering instance into a rendered object.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldBinding {
    #[serde(alias = "fromPath")]
    pub from: String,
    pub to: BindingTarget,
}

/// Overlay engine payload.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OverlayConfig {
    /// Kustomization document template. Opaque apart from the fields the engine injects.
    #[serde(default)]
    pub kustomization: serde_json::Value,
    #[serde(default)]
    pub overlays: Vec<FieldBinding>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineChoice {
    #[serde(rename = "type", default)]
    pub engine_type: EngineType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kustomize: Option<OverlayConfig>,
}

impl EngineChoice {
    pub fn chart() -> Self {
        Self {
            engine_type: EngineType::Chart,
            kustomize: None,
        }
    }

    pub fn overlay(config: OverlayConfig) -> Self {
        Self {
            engine_type: EngineType::Overlay,
            kustomize: Some(config),
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.engine_type.is_set() && self.kustomize.is_none()
    }

    /// Fill whatever this level leaves empty from a lower-precedence level.
    /// The type and the overlay payload are inherited independently.
    pub fn inherit(&mut self, fallback: &EngineChoice) {
        if !self.engine_type.is_set() {
            self.engine_type = fallback.engine_type.clone();
        }
        if self.kustomize.is_none() {
            self.kustomize = fallback.kustomize.clone();
        }
    }
}

// ============================================================
// Behaviors
// ============================================================

/// One artifact directory rendered by one engine.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HookSpec {
    /// Path inside the artifact. Empty means the artifact root.
    #[serde(default)]
    pub directory: String,
    #[serde(default, skip_serializing_if = "EngineChoice::is_empty")]
    pub engine: EngineChoice,
}

impl HookSpec {
    pub fn new(directory: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            engine: EngineChoice::default(),
        }
    }

    pub fn with_engine(mut self, engine: EngineChoice) -> Self {
        self.engine = engine;
        self
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtifactSource {
    pub image: String,
}

/// Everything declared for one governed type.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Behavior {
    #[serde(default, skip_serializing_if = "EngineChoice::is_empty")]
    pub engine: EngineChoice,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<ArtifactSource>,
    /// Keyed by event name as written. Names that are not a known event
    /// (or alias) never match and are reported by [`Behavior::unknown_events`].
    #[serde(default)]
    pub hooks: BTreeMap<String, Vec<HookSpec>>,
}

impl Behavior {
    /// Hooks declared for `event` under its canonical name or an alias.
    pub fn hooks_for(&self, event: EventName) -> &[HookSpec] {
        self.hooks
            .iter()
            .find(|(name, _)| name.parse::<EventName>().ok() == Some(event))
            .map(|(_, hooks)| hooks.as_slice())
            .unwrap_or(&[])
    }

    /// Replace the hooks for `event`, dropping any alias spelling of it.
    pub fn set_hooks(&mut self, event: EventName, hooks: Vec<HookSpec>) {
        self.hooks
            .retain(|name, _| name.parse::<EventName>().ok() != Some(event));
        self.hooks.insert(event.as_str().to_string(), hooks);
    }

    pub fn unknown_events(&self) -> Vec<&str> {
        self.hooks
            .keys()
            .filter(|name| name.parse::<EventName>().is_err())
            .map(String::as_str)
            .collect()
    }
}

// ============================================================
// Source document
// ============================================================

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Behaviors {
    #[serde(default, skip_serializing_if = "EngineChoice::is_empty")]
    pub engine: EngineChoice,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<ArtifactSource>,
    #[serde(default)]
    pub crds: BTreeMap<TypeKey, Behavior>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StackConfigurationSpec {
    #[serde(default)]
    pub behaviors: Behaviors,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StackConfigurationMeta {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub namespace: String,
}

/// The declarative configuration object a catalog is built from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackConfiguration {
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_kind")]
    pub kind: String,
    #[serde(default)]
    pub metadata: StackConfigurationMeta,
    #[serde(default)]
    pub spec: StackConfigurationSpec,
}

fn default_api_version() -> String {
    format!("{}/{}", STACK_CONFIGURATION_GROUP, STACK_CONFIGURATION_VERSION)
}

fn default_kind() -> String {
    STACK_CONFIGURATION_KIND.to_string()
}

impl StackConfiguration {
    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(&self.metadata.namespace, &self.metadata.name)
    }
}

// ============================================================
// Catalog
// ============================================================

/// Immutable snapshot of every behavior a StackConfiguration declares.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BehaviorCatalog {
    /// Lowest-precedence engine, used when neither hook nor behavior names one.
    pub default_engine: EngineChoice,
    /// Fallback artifact source for behaviors without their own.
    pub source: Option<ArtifactSource>,
    pub behaviors: BTreeMap<TypeKey, Behavior>,
}

impl BehaviorCatalog {
    pub fn from_configuration(config: &StackConfiguration) -> Self {
        let behaviors = &config.spec.behaviors;
        Self {
            default_engine: behaviors.engine.clone(),
            source: behaviors.source.clone(),
            behaviors: behaviors.crds.clone(),
        }
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: StackConfiguration = serde_yaml::from_str(yaml)?;
        Ok(Self::from_configuration(&config))
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let config: StackConfiguration = serde_json::from_value(value)?;
        Ok(Self::from_configuration(&config))
    }

    pub fn get(&self, key: &TypeKey) -> Option<&Behavior> {
        self.behaviors.get(key)
    }

    pub fn type_keys(&self) -> impl Iterator<Item = &TypeKey> {
        self.behaviors.keys()
    }

    pub fn len(&self) -> usize {
        self.behaviors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.behaviors.is_empty()
    }

    /// Behavior-level image, else the catalog-level one.
    pub fn artifact_source<'a>(&'a self, behavior: &'a Behavior) -> Option<&'a str> {
        behavior
            .source
            .as_ref()
            .or(self.source.as_ref())
            .map(|s| s.image.as_str())
            .filter(|image| !image.is_empty())
    }

    /// Check every key parses. Returns the offending keys.
    pub fn invalid_keys(&self) -> Vec<TypeKey> {
        self.behaviors
            .keys()
            .filter(|key| key.parse().is_err())
            .cloned()
            .collect()
    }

    /// Hook keys that name no known event, per type. Their hooks never run.
    pub fn unknown_events(&self) -> Vec<(TypeKey, String)> {
        self.behaviors
            .iter()
            .flat_map(|(key, behavior)| {
                behavior
                    .unknown_events()
                    .into_iter()
                    .map(move |event| (key.clone(), event.to_string()))
            })
            .collect()
    }
}
