//! stackhook-controller: hook resolution, render and setup coordinators, loop hosting

pub mod config;
pub mod host;
pub mod local;
pub mod registry;
pub mod render;
pub mod resolver;
pub mod setup;
pub mod snapshot;
pub mod status;
pub mod watcher;

pub use config::ControllerConfig;
pub use host::{Action, ChannelHost, ControllerHost, EventSource, LoopHandle, ReconcileRequest, Reconciler};
pub use local::LocalCluster;
pub use registry::ControllerRegistry;
pub use render::{HookReport, PassOutcome, PassReport, RenderCoordinator, Submission};
pub use resolver::{derive_event, resolve, Resolution, ResolvedHooks};
pub use setup::{SetupCoordinator, SetupReport};
pub use snapshot::SharedCatalog;
pub use status::{LogStatusReporter, StatusReporter};
pub use watcher::DirectoryEventSource;
