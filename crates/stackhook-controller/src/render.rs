//! Render coordinator: one per governed type.
//!
//! A pass fetches the instance, resolves its hooks against the current
//! catalog snapshot, and runs each hook in declaration order:
//! engine config → distribute → execution unit → submit. A failing hook is
//! recorded and the next hook still runs. The whole pass shares one deadline.

use crate::config::ControllerConfig;
use crate::host::{Action, ReconcileRequest, Reconciler};
use crate::resolver::{derive_event, resolve, Resolution};
use crate::snapshot::SharedCatalog;
use crate::status::StatusReporter;
use async_trait::async_trait;
use stackhook_core::{
    create_typed, Cluster, Error, EventName, HookSpec, Instance, ObjectKey, Result,
    TypeIdentity, TypeKey,
};
use stackhook_engines::{ConfigDistributor, ConfigHandle, EngineImages, RenderingEngine};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

// ============================================================
// Pass results
// ============================================================

/// How far a pass got.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassOutcome {
    /// The instance was gone by the time it was read.
    InstanceGone,
    NoBehaviorConfigured,
    NoHooksForEvent,
    /// Hooks ran; see the per-hook reports.
    Executed,
}

impl fmt::Display for PassOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::InstanceGone => "instance-gone",
            Self::NoBehaviorConfigured => "no-behavior",
            Self::NoHooksForEvent => "no-hooks",
            Self::Executed => "executed",
        };
        write!(f, "{}", s)
    }
}

/// What a successful hook left in the cluster.
#[derive(Clone, Debug, PartialEq)]
pub struct Submission {
    pub engine: &'static str,
    pub config: ConfigHandle,
    pub job_name: String,
}

#[derive(Debug)]
pub struct HookReport {
    /// Position in the declared hook list.
    pub index: usize,
    pub hook: HookSpec,
    pub outcome: Result<Submission>,
}

impl HookReport {
    pub fn error(&self) -> Option<&Error> {
        self.outcome.as_ref().err()
    }
}

/// Aggregated result of one pass: every hook's outcome, in order.
#[derive(Debug)]
pub struct PassReport {
    pub key: ObjectKey,
    pub event: Option<EventName>,
    pub outcome: PassOutcome,
    pub hooks: Vec<HookReport>,
}

impl PassReport {
    fn skipped(key: ObjectKey, event: Option<EventName>, outcome: PassOutcome) -> Self {
        Self {
            key,
            event,
            outcome,
            hooks: Vec::new(),
        }
    }

    pub fn first_error(&self) -> Option<&Error> {
        self.hooks.iter().find_map(HookReport::error)
    }

    pub fn failed_hooks(&self) -> impl Iterator<Item = &HookReport> {
        self.hooks.iter().filter(|h| h.outcome.is_err())
    }

    pub fn submitted(&self) -> impl Iterator<Item = &Submission> {
        self.hooks.iter().filter_map(|h| h.outcome.as_ref().ok())
    }

    /// True when a redelivery could change the result.
    pub fn should_retry(&self) -> bool {
        self.failed_hooks()
            .filter_map(HookReport::error)
            .any(Error::is_transient)
    }
}

// ============================================================
// Coordinator
// ============================================================

pub struct RenderCoordinator {
    type_id: TypeIdentity,
    cluster: Arc<dyn Cluster>,
    catalog: SharedCatalog,
    distributor: ConfigDistributor,
    images: EngineImages,
    status: Arc<dyn StatusReporter>,
    pass_timeout: Duration,
}

impl RenderCoordinator {
    pub fn new(
        type_id: TypeIdentity,
        cluster: Arc<dyn Cluster>,
        catalog: SharedCatalog,
        config: &ControllerConfig,
        status: Arc<dyn StatusReporter>,
    ) -> Self {
        Self {
            type_id,
            distributor: ConfigDistributor::new(cluster.clone()),
            cluster,
            catalog,
            images: config.images.clone(),
            status,
            pass_timeout: config.reconcile.pass_timeout(),
        }
    }

    pub fn type_id(&self) -> &TypeIdentity {
        &self.type_id
    }

    pub fn type_key(&self) -> TypeKey {
        self.type_id.type_key()
    }

    /// Run one pass under the pass deadline.
    ///
    /// Errors are pass-level only: reading the instance failed or the deadline
    /// expired. Hook failures are in the report.
    pub async fn reconcile(&self, request: &ReconcileRequest) -> Result<PassReport> {
        match tokio::time::timeout(self.pass_timeout, self.run_pass(request)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(type_id = %self.type_id, key = %request.key, "pass abandoned at deadline");
                Err(Error::DeadlineExceeded(self.pass_timeout))
            }
        }
    }

    async fn run_pass(&self, request: &ReconcileRequest) -> Result<PassReport> {
        let instance = match self.cluster.get(&self.type_id, &request.key).await {
            Ok(instance) => instance,
            Err(e) if e.is_not_found() => {
                debug!(type_id = %self.type_id, key = %request.key, "instance gone; nothing to do");
                return Ok(PassReport::skipped(request.key.clone(), request.event, PassOutcome::InstanceGone));
            }
            Err(e) => return Err(e),
        };

        let event = derive_event(&instance, request.event);
        let catalog = self.catalog.snapshot().await;

        let report = match resolve(&instance, &catalog, event)? {
            Resolution::NoBehaviorConfigured(type_key) => {
                info!(%type_key, "no behavior configured");
                PassReport::skipped(instance.key(), Some(event), PassOutcome::NoBehaviorConfigured)
            }
            Resolution::NoHooksForEvent(type_key, event) => {
                info!(%type_key, %event, "no hooks for event");
                PassReport::skipped(instance.key(), Some(event), PassOutcome::NoHooksForEvent)
            }
            Resolution::Hooks(resolved) => {
                info!(
                    type_key = %resolved.type_key,
                    key = %instance.key(),
                    %event,
                    hooks = resolved.hooks.len(),
                    "running hooks"
                );
                let mut hooks = Vec::with_capacity(resolved.hooks.len());
                for (index, hook) in resolved.hooks.into_iter().enumerate() {
                    let outcome = self.run_hook(&instance, resolved.source.as_deref(), &hook).await;
                    match &outcome {
                        Ok(submission) => info!(
                            index,
                            directory = %hook.directory,
                            engine = submission.engine,
                            config = %submission.config.name,
                            job = %submission.job_name,
                            "hook submitted"
                        ),
                        Err(e) => warn!(
                            index,
                            directory = %hook.directory,
                            engine = %hook.engine.engine_type,
                            "hook failed: {}",
                            e
                        ),
                    }
                    hooks.push(HookReport { index, hook, outcome });
                }
                PassReport {
                    key: instance.key(),
                    event: Some(event),
                    outcome: PassOutcome::Executed,
                    hooks,
                }
            }
        };

        if let Err(e) = self.status.report(&instance, &report).await {
            warn!(key = %instance.key(), "status report failed: {}", e);
        }
        Ok(report)
    }

    /// Everything that can fail without touching the cluster is checked
    /// before the ConfigMap is created.
    async fn run_hook(
        &self,
        instance: &Instance,
        source: Option<&str>,
        hook: &HookSpec,
    ) -> Result<Submission> {
        let engine = RenderingEngine::for_choice(&hook.engine, &self.images)?;
        let artifact = engine.create_config(instance, hook)?;
        let source = source.ok_or_else(|| Error::MissingArtifactSource(self.type_key().to_string()))?;

        let config = self.distributor.distribute_artifact(&artifact).await?;
        let job = engine.build_execution_unit(instance, &config.name, source, hook)?;
        let created = create_typed(self.cluster.as_ref(), &job).await?;

        Ok(Submission {
            engine: engine.name(),
            config,
            job_name: created.metadata.name,
        })
    }
}

#[async_trait]
impl Reconciler for RenderCoordinator {
    async fn handle(&self, request: ReconcileRequest) -> Result<Action> {
        let report = self.reconcile(&request).await?;
        if report.should_retry() {
            return Ok(Action::Requeue);
        }
        Ok(Action::Done)
    }
}
