//! Closed set of rendering engines, selected by a hook's resolved engine type.

use crate::artifact::EngineArtifact;
use crate::chart::ChartEngine;
use crate::layout::EngineImages;
use crate::overlay::OverlayEngine;
use stackhook_core::{EngineChoice, EngineType, Error, HookSpec, Instance, Job, Result};

#[derive(Clone, Debug)]
pub enum RenderingEngine {
    Chart(ChartEngine),
    Overlay(OverlayEngine),
}

impl RenderingEngine {
    /// Engine for a fully inherited choice. Unset and unknown names fail here,
    /// before anything is written to the cluster.
    pub fn for_choice(choice: &EngineChoice, images: &EngineImages) -> Result<Self> {
        match &choice.engine_type {
            EngineType::Chart => Ok(Self::Chart(ChartEngine::new(images.clone()))),
            EngineType::Overlay => Ok(Self::Overlay(OverlayEngine::new(images.clone()))),
            EngineType::Unset => Err(Error::UnrecognizedEngine(EngineType::Unset.to_string())),
            EngineType::Unrecognized(name) => Err(Error::UnrecognizedEngine(name.clone())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Chart(_) => "helm2",
            Self::Overlay(_) => "kustomize",
        }
    }

    pub fn create_config(&self, instance: &Instance, hook: &HookSpec) -> Result<EngineArtifact> {
        if instance.uid().is_empty() {
            return Err(Error::InvalidObject(format!(
                "{} has no uid to name its engine configuration",
                instance.key()
            )));
        }
        match self {
            Self::Chart(engine) => engine.create_config(instance, hook),
            Self::Overlay(engine) => engine.create_config(instance, hook),
        }
    }

    pub fn build_execution_unit(
        &self,
        instance: &Instance,
        config_name: &str,
        source_image: &str,
        hook: &HookSpec,
    ) -> Result<Job> {
        match self {
            Self::Chart(engine) => {
                engine.build_execution_unit(instance, config_name, source_image, hook)
            }
            Self::Overlay(engine) => {
                engine.build_execution_unit(instance, config_name, source_image, hook)
            }
        }
    }
}
