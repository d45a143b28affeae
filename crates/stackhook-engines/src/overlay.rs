//! Overlay engine: builds a kustomization over the staged artifact directory
//! and patches it with fields copied from the instance.
//!
//! The generated kustomization lives in the engine-configuration mount and
//! points back at the staged artifacts through a relative path, since the
//! overlay tool only resolves relative resources.

use crate::artifact::EngineArtifact;
use crate::job::{stage, ExecutionUnitBuilder};
use crate::layout::{
    relative_path, EngineImages, ENGINE_CONFIG_DIR, ENGINE_CONFIG_VOLUME, ENGINE_CONTAINER,
    KUSTOMIZATION_KEY, OVERLAYS_KEY, RENDERED_DIR, RENDERED_VOLUME, STAGING_DIR, STAGING_VOLUME,
};
use serde_json::{Map, Value};
use stackhook_core::instance::set_nested_field;
use stackhook_core::objects::VolumeMount;
use stackhook_core::{Error, FieldBinding, HookSpec, Instance, Job, OverlayConfig, Result};
use tracing::debug;

pub const JOB_PREFIX: &str = "kustomize-template-apply-";
pub const LABEL_PREFIX: &str = "crossplane.io";

const ENGINE_NAME: &str = "kustomize";

#[derive(Clone, Debug)]
pub struct OverlayEngine {
    images: EngineImages,
}

impl OverlayEngine {
    pub fn new(images: EngineImages) -> Self {
        Self { images }
    }

    pub fn create_config(&self, instance: &Instance, hook: &HookSpec) -> Result<EngineArtifact> {
        let config = hook
            .engine
            .kustomize
            .as_ref()
            .ok_or_else(|| Error::engine_config(ENGINE_NAME, "kustomize configuration is empty"))?;

        let patches = build_patches(instance, &config.overlays)?;
        let kustomization = build_kustomization(instance, config, !patches.is_empty())?;

        let mut overlays = String::new();
        for patch in &patches {
            overlays.push_str("---\n");
            overlays.push_str(&serde_yaml::to_string(patch)?);
        }

        Ok(EngineArtifact::new(instance.uid(), instance.namespace())
            .with_file(KUSTOMIZATION_KEY, serde_yaml::to_string(&kustomization)?)
            .with_file(OVERLAYS_KEY, overlays))
    }

    /// No separate render container: the apply stage builds the overlay itself.
    pub fn build_execution_unit(
        &self,
        instance: &Instance,
        config_name: &str,
        source_image: &str,
        hook: &HookSpec,
    ) -> Result<Job> {
        let script = format!(
            "kubectl apply --namespace {} --kustomize {}",
            instance.namespace(),
            ENGINE_CONFIG_DIR
        );
        let apply = stage(
            ENGINE_CONTAINER,
            &self.images.apply,
            &["bash", "-c"],
            vec![script],
            vec![
                VolumeMount::new(STAGING_VOLUME, STAGING_DIR),
                VolumeMount::new(RENDERED_VOLUME, RENDERED_DIR),
                VolumeMount::new(ENGINE_CONFIG_VOLUME, ENGINE_CONFIG_DIR),
            ],
        );

        ExecutionUnitBuilder::new(instance, JOB_PREFIX)
            .fetch_from(source_image, &hook.directory)
            .engine_config(config_name)
            .apply_stage(apply)
            .build()
    }
}

/// Extend the template: staged resources, patch file, name prefix, identifying labels.
fn build_kustomization(
    instance: &Instance,
    config: &OverlayConfig,
    has_patches: bool,
) -> Result<Value> {
    let mut doc = match &config.kustomization {
        Value::Null => Map::new(),
        Value::Object(map) => map.clone(),
        _ => {
            return Err(Error::engine_config(
                ENGINE_NAME,
                "kustomization template must be a mapping",
            ))
        }
    };

    let resources = doc
        .entry("resources")
        .or_insert_with(|| Value::Array(Vec::new()));
    let resources = resources.as_array_mut().ok_or_else(|| {
        Error::engine_config(ENGINE_NAME, "kustomization resources must be a list")
    })?;
    resources.push(Value::String(relative_path(ENGINE_CONFIG_DIR, STAGING_DIR)));

    if has_patches {
        doc.insert(
            "patchesStrategicMerge".into(),
            Value::Array(vec![Value::String(OVERLAYS_KEY.into())]),
        );
    }

    let prefix = match doc.get("namePrefix") {
        None | Some(Value::Null) => "",
        Some(Value::String(prefix)) => prefix.as_str(),
        Some(_) => {
            return Err(Error::engine_config(
                ENGINE_NAME,
                "kustomization namePrefix must be a string",
            ))
        }
    };
    let prefix = format!("{}-{}", instance.name(), prefix);
    doc.insert("namePrefix".into(), Value::String(prefix));

    let labels = doc
        .entry("commonLabels")
        .or_insert_with(|| Value::Object(Map::new()));
    let labels = labels.as_object_mut().ok_or_else(|| {
        Error::engine_config(ENGINE_NAME, "kustomization commonLabels must be a mapping")
    })?;
    for (field, value) in [
        ("name", instance.name()),
        ("namespace", instance.namespace()),
        ("uid", instance.uid()),
    ] {
        labels.insert(format!("{}/{}", LABEL_PREFIX, field), Value::String(value.into()));
    }

    Ok(Value::Object(doc))
}

/// One minimal patch object per binding whose source field exists on the instance.
fn build_patches(instance: &Instance, bindings: &[FieldBinding]) -> Result<Vec<Value>> {
    let mut patches = Vec::new();
    for binding in bindings {
        let Some(value) = instance.get_field(&binding.from) else {
            debug!(from = %binding.from, "binding source absent on instance; skipping");
            continue;
        };

        let target = &binding.to;
        let mut metadata = Map::new();
        metadata.insert("name".into(), Value::String(target.name.clone()));
        if !target.namespace.is_empty() {
            metadata.insert("namespace".into(), Value::String(target.namespace.clone()));
        }

        let mut patch = Map::new();
        patch.insert("apiVersion".into(), Value::String(target.api_version.clone()));
        patch.insert("kind".into(), Value::String(target.kind.clone()));
        patch.insert("metadata".into(), Value::Object(metadata));
        set_nested_field(&mut patch, &target.field_path, value.clone())
            .map_err(|e| Error::engine_config(ENGINE_NAME, e.to_string()))?;

        patches.push(Value::Object(patch));
    }
    Ok(patches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use stackhook_core::BindingTarget;

    fn instance() -> Instance {
        Instance::new(json!({
            "apiVersion": "example.com/v1",
            "kind": "Widget",
            "metadata": {"name": "w1", "namespace": "team-a", "uid": "u-1"},
            "spec": {"replicas": 2}
        }))
        .unwrap()
    }

    #[test]
    fn empty_from_binding_emits_no_patch() {
        let binding = FieldBinding {
            from: String::new(),
            to: BindingTarget {
                api_version: "apps/v1".into(),
                kind: "Deployment".into(),
                name: "widget".into(),
                namespace: String::new(),
                field_path: "spec.template".into(),
            },
        };
        assert!(build_patches(&instance(), &[binding]).unwrap().is_empty());
    }

    #[test]
    fn non_string_name_prefix_rejected() {
        let config = OverlayConfig {
            kustomization: json!({"namePrefix": 7}),
            overlays: vec![],
        };
        let err = build_kustomization(&instance(), &config, false).unwrap_err();
        assert!(matches!(err, Error::EngineConfig { .. }));
    }

    #[test]
    fn kustomization_prefix_and_labels() {
        let config = OverlayConfig {
            kustomization: json!({"namePrefix": "base-", "commonLabels": {"app": "widget"}}),
            overlays: vec![],
        };
        let doc = build_kustomization(&instance(), &config, false).unwrap();
        assert_eq!(doc["namePrefix"], json!("w1-base-"));
        assert_eq!(doc["resources"], json!(["../input"]));
        assert_eq!(doc["commonLabels"]["app"], json!("widget"));
        assert_eq!(doc["commonLabels"]["crossplane.io/uid"], json!("u-1"));
        assert!(doc.get("patchesStrategicMerge").is_none());
    }

    #[test]
    fn kustomization_template_must_be_mapping() {
        let config = OverlayConfig {
            kustomization: json!(["not", "a", "mapping"]),
            overlays: vec![],
        };
        assert!(build_kustomization(&instance(), &config, false).is_err());
    }
}
