//! Fixed mount layout shared with the render and apply images.
//!
//! These paths, volume names and file keys are the contract between the
//! controller and the containers it schedules. Changing any of them breaks
//! existing engine images.

use serde::{Deserialize, Serialize};

/// Read-only artifact tree inside the stack image.
pub const REGISTRY_ROOT: &str = "/.registry/resources";
/// Staged copy of the hook's artifact directory.
pub const STAGING_DIR: &str = "/usr/share/input/";
/// Mounted engine configuration (the distributed ConfigMap).
pub const ENGINE_CONFIG_DIR: &str = "/usr/share/engine-configuration/";
/// Rendered manifests awaiting apply.
pub const RENDERED_DIR: &str = "/usr/share/resource-configuration/";

pub const STAGING_VOLUME: &str = "stack-configuration";
pub const ENGINE_CONFIG_VOLUME: &str = "engine-configuration";
pub const RENDERED_VOLUME: &str = "resource-configuration";

pub const VALUES_KEY: &str = "values.yaml";
pub const KUSTOMIZATION_KEY: &str = "kustomization.yaml";
pub const OVERLAYS_KEY: &str = "overlays.yaml";

pub const FETCH_CONTAINER: &str = "load-stack";
pub const ENGINE_CONTAINER: &str = "engine";
pub const APPLY_CONTAINER: &str = "kubectl";

/// Images for the render and apply stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineImages {
    /// Chart templating image.
    pub chart: String,
    /// Apply image; also runs the overlay build.
    pub apply: String,
}

impl Default for EngineImages {
    fn default() -> Self {
        Self {
            chart: "crossplane/helm-engine:latest".into(),
            apply: "crossplane/kubectl:latest".into(),
        }
    }
}

/// Path of a hook directory inside the artifact tree. Empty means the root.
pub fn registry_path(directory: &str) -> String {
    let directory = directory.trim_matches('/');
    if directory.is_empty() {
        REGISTRY_ROOT.to_string()
    } else {
        format!("{}/{}", REGISTRY_ROOT, directory)
    }
}

/// Relative path from one absolute directory to another, computed lexically.
pub fn relative_path(from_dir: &str, to_dir: &str) -> String {
    let from: Vec<&str> = from_dir.split('/').filter(|s| !s.is_empty()).collect();
    let to: Vec<&str> = to_dir.split('/').filter(|s| !s.is_empty()).collect();
    let common = from.iter().zip(&to).take_while(|(a, b)| a == b).count();

    let mut parts: Vec<&str> = std::iter::repeat("..").take(from.len() - common).collect();
    parts.extend(&to[common..]);
    if parts.is_empty() {
        ".".to_string()
    } else {
        parts.join("/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staged_artifacts_relative_to_engine_config() {
        assert_eq!(relative_path(ENGINE_CONFIG_DIR, STAGING_DIR), "../input");
    }

    #[test]
    fn relative_path_edge_cases() {
        assert_eq!(relative_path("/a/b", "/a/b"), ".");
        assert_eq!(relative_path("/a/b", "/a/b/c"), "c");
        assert_eq!(relative_path("/a/b/c", "/x"), "../../../x");
    }

    #[test]
    fn registry_path_defaults_to_root() {
        assert_eq!(registry_path(""), "/.registry/resources");
        assert_eq!(registry_path("/charts/widget/"), "/.registry/resources/charts/widget");
    }
}
