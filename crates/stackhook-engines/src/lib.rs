//! stackhook-engines: engine configuration, config distribution, execution units

pub mod artifact;
pub mod chart;
pub mod distributor;
pub mod engine;
pub mod job;
pub mod layout;
pub mod overlay;

pub use artifact::{content_hash, distributed_name, EngineArtifact};
pub use chart::ChartEngine;
pub use distributor::{ConfigDistributor, ConfigHandle};
pub use engine::RenderingEngine;
pub use job::ExecutionUnitBuilder;
pub use layout::EngineImages;
pub use overlay::OverlayEngine;
