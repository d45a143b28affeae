//! Execution unit builder: the fetch → render → apply batch Job.
//!
//! Every unit has the same frame: a fetch stage copying the hook's artifact
//! directory into the staging volume, three volumes (staging, rendered output,
//! engine configuration), an owner reference to the triggering instance, zero
//! retries and no restarts. Engines contribute the render and apply stages.

use crate::layout::{
    registry_path, ENGINE_CONFIG_VOLUME, FETCH_CONTAINER, RENDERED_VOLUME, STAGING_DIR,
    STAGING_VOLUME,
};
use stackhook_core::objects::{
    Container, JobSpec, ObjectMeta, PodSpec, PodTemplateSpec, PullPolicy, RestartPolicy, Volume,
    VolumeMount,
};
use stackhook_core::{Error, Instance, Job, OwnerReference, Result};

/// Retrying a partially applied render is not safe yet.
pub const BACKOFF_LIMIT: i32 = 0;

pub struct ExecutionUnitBuilder<'a> {
    instance: &'a Instance,
    generate_name: String,
    source_image: String,
    directory: String,
    config_name: String,
    render_stages: Vec<Container>,
    apply_stages: Vec<Container>,
}

impl<'a> ExecutionUnitBuilder<'a> {
    pub fn new(instance: &'a Instance, generate_name: impl Into<String>) -> Self {
        Self {
            instance,
            generate_name: generate_name.into(),
            source_image: String::new(),
            directory: String::new(),
            config_name: String::new(),
            render_stages: Vec::new(),
            apply_stages: Vec::new(),
        }
    }

    /// Artifact image and the directory inside it to stage.
    pub fn fetch_from(mut self, source_image: &str, directory: &str) -> Self {
        self.source_image = source_image.to_string();
        self.directory = directory.to_string();
        self
    }

    /// ConfigMap mounted as the engine-configuration volume.
    pub fn engine_config(mut self, config_name: &str) -> Self {
        self.config_name = config_name.to_string();
        self
    }

    /// Init container run after the fetch stage.
    pub fn render_stage(mut self, container: Container) -> Self {
        self.render_stages.push(container);
        self
    }

    /// Main container; runs once every init container has completed.
    pub fn apply_stage(mut self, container: Container) -> Self {
        self.apply_stages.push(container);
        self
    }

    pub fn build(self) -> Result<Job> {
        if self.source_image.is_empty() {
            return Err(Error::MissingArtifactSource(self.instance.kind().to_string()));
        }
        if self.config_name.is_empty() {
            return Err(Error::InvalidObject(
                "execution unit needs a distributed engine configuration".into(),
            ));
        }
        if self.apply_stages.is_empty() {
            return Err(Error::InvalidObject("execution unit has no apply stage".into()));
        }

        let owner = OwnerReference::to(self.instance)?;

        let mut init_containers = vec![self.fetch_stage()];
        init_containers.extend(self.render_stages);

        let metadata = ObjectMeta {
            generate_name: self.generate_name,
            namespace: self.instance.namespace().to_string(),
            owner_references: vec![owner],
            ..Default::default()
        };
        let spec = JobSpec {
            backoff_limit: BACKOFF_LIMIT,
            template: PodTemplateSpec {
                spec: PodSpec {
                    restart_policy: RestartPolicy::Never,
                    init_containers,
                    containers: self.apply_stages,
                    volumes: vec![
                        Volume::empty_dir(STAGING_VOLUME),
                        Volume::empty_dir(RENDERED_VOLUME),
                        Volume::config_map(ENGINE_CONFIG_VOLUME, self.config_name),
                    ],
                },
            },
        };
        Ok(Job::new(metadata, spec))
    }

    fn fetch_stage(&self) -> Container {
        // The trailing "/." copies the directory's contents rather than the directory.
        let from = format!("{}/.", registry_path(&self.directory));
        Container {
            name: FETCH_CONTAINER.into(),
            image: self.source_image.clone(),
            command: vec!["cp".into(), "-R".into(), from, STAGING_DIR.into()],
            args: Vec::new(),
            volume_mounts: vec![VolumeMount::new(STAGING_VOLUME, STAGING_DIR)],
            // The artifact image is expected to already be on the node.
            image_pull_policy: PullPolicy::Never,
        }
    }
}

/// A stage container with the standard pull policy.
pub fn stage(
    name: &str,
    image: &str,
    command: &[&str],
    args: Vec<String>,
    volume_mounts: Vec<VolumeMount>,
) -> Container {
    Container {
        name: name.to_string(),
        image: image.to_string(),
        command: command.iter().map(|s| s.to_string()).collect(),
        args,
        volume_mounts,
        image_pull_policy: PullPolicy::Never,
    }
}
