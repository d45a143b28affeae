//! Chart engine: renders a chart directory with the instance's spec as values.

use crate::artifact::EngineArtifact;
use crate::job::{stage, ExecutionUnitBuilder};
use crate::layout::{
    EngineImages, APPLY_CONTAINER, ENGINE_CONFIG_DIR, ENGINE_CONFIG_VOLUME, ENGINE_CONTAINER,
    RENDERED_DIR, RENDERED_VOLUME, STAGING_DIR, STAGING_VOLUME, VALUES_KEY,
};
use stackhook_core::objects::VolumeMount;
use stackhook_core::{HookSpec, Instance, Job, Result};
use tracing::debug;

pub const JOB_PREFIX: &str = "helm-template-apply-";

#[derive(Clone, Debug)]
pub struct ChartEngine {
    images: EngineImages,
}

impl ChartEngine {
    pub fn new(images: EngineImages) -> Self {
        Self { images }
    }

    /// Serialize `spec` as the values file.
    ///
    /// A missing spec renders an empty mapping; an instance with no
    /// configurable fields is still a valid input.
    pub fn create_config(&self, instance: &Instance, _hook: &HookSpec) -> Result<EngineArtifact> {
        let values = match instance.spec() {
            Some(spec) => serde_yaml::to_string(spec)?,
            None => {
                debug!(key = %instance.key(), "instance has no spec; rendering empty values");
                serde_yaml::to_string(&serde_json::Value::Object(Default::default()))?
            }
        };
        Ok(EngineArtifact::new(instance.uid(), instance.namespace()).with_file(VALUES_KEY, values))
    }

    pub fn build_execution_unit(
        &self,
        instance: &Instance,
        config_name: &str,
        source_image: &str,
        hook: &HookSpec,
    ) -> Result<Job> {
        let namespace = instance.namespace().to_string();
        let values_file = format!("{}{}", ENGINE_CONFIG_DIR, VALUES_KEY);

        let render = stage(
            ENGINE_CONTAINER,
            &self.images.chart,
            &["helm"],
            vec![
                "template".into(),
                "--output-dir".into(),
                RENDERED_DIR.into(),
                "--namespace".into(),
                namespace.clone(),
                "--values".into(),
                values_file,
                STAGING_DIR.into(),
            ],
            vec![
                VolumeMount::new(STAGING_VOLUME, STAGING_DIR),
                VolumeMount::new(RENDERED_VOLUME, RENDERED_DIR),
                VolumeMount::new(ENGINE_CONFIG_VOLUME, ENGINE_CONFIG_DIR),
            ],
        );

        // Debug flags here would mix log output into the manifests being applied.
        let apply = stage(
            APPLY_CONTAINER,
            &self.images.apply,
            &["kubectl"],
            vec![
                "apply".into(),
                "--namespace".into(),
                namespace,
                "-R".into(),
                "-f".into(),
                RENDERED_DIR.into(),
            ],
            vec![VolumeMount::new(RENDERED_VOLUME, RENDERED_DIR)],
        );

        ExecutionUnitBuilder::new(instance, JOB_PREFIX)
            .fetch_from(source_image, &hook.directory)
            .engine_config(config_name)
            .render_stage(render)
            .apply_stage(apply)
            .build()
    }
}
