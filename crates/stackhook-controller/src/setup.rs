//! Setup coordinator: stands up one render loop per governed type.
//!
//! Runs on every change of the StackConfiguration object: it publishes the new
//! catalog to all render coordinators and registers loops for types that do
//! not have one yet. Types already in the registry are skipped. Types dropped
//! from the catalog keep their loop; its passes resolve to no behavior.

use crate::config::ControllerConfig;
use crate::host::{Action, ControllerHost, LoopHandle, ReconcileRequest, Reconciler};
use crate::registry::ControllerRegistry;
use crate::render::RenderCoordinator;
use crate::snapshot::SharedCatalog;
use crate::status::StatusReporter;
use async_trait::async_trait;
use stackhook_core::catalog::{
    STACK_CONFIGURATION_GROUP, STACK_CONFIGURATION_KIND, STACK_CONFIGURATION_VERSION,
};
use stackhook_core::{
    BehaviorCatalog, Cluster, Error, ObjectKey, Result, StackConfiguration, TypeIdentity, TypeKey,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Type identity of the catalog source object.
pub fn stack_configuration_type() -> TypeIdentity {
    TypeIdentity::new(
        STACK_CONFIGURATION_GROUP,
        STACK_CONFIGURATION_VERSION,
        STACK_CONFIGURATION_KIND,
    )
}

#[derive(Debug, Default)]
pub struct SetupReport {
    pub registered: Vec<TypeKey>,
    /// Already had a loop.
    pub skipped: Vec<TypeKey>,
    pub failed: Vec<(TypeKey, Error)>,
}

impl SetupReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    /// Registration failures that a later sync could fix.
    pub fn should_retry(&self) -> bool {
        self.failed.iter().any(|(_, e)| e.is_transient())
    }
}

pub struct SetupCoordinator {
    cluster: Arc<dyn Cluster>,
    host: Arc<dyn ControllerHost>,
    registry: Arc<ControllerRegistry>,
    catalog: SharedCatalog,
    status: Arc<dyn StatusReporter>,
    config: ControllerConfig,
}

impl SetupCoordinator {
    pub fn new(
        cluster: Arc<dyn Cluster>,
        host: Arc<dyn ControllerHost>,
        registry: Arc<ControllerRegistry>,
        status: Arc<dyn StatusReporter>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            cluster,
            host,
            registry,
            catalog: SharedCatalog::default(),
            status,
            config,
        }
    }

    pub fn registry(&self) -> &Arc<ControllerRegistry> {
        &self.registry
    }

    pub fn catalog(&self) -> &SharedCatalog {
        &self.catalog
    }

    /// Publish `catalog` and register a render loop for every type without one.
    pub async fn setup(&self, catalog: BehaviorCatalog) -> SetupReport {
        let catalog = self.catalog.publish(catalog).await;
        let mut report = SetupReport::default();

        for type_key in catalog.type_keys() {
            if self.registry.contains(type_key) {
                debug!(%type_key, "loop already registered");
                report.skipped.push(type_key.clone());
                continue;
            }
            match self.register(type_key).await {
                Ok(()) => report.registered.push(type_key.clone()),
                Err(e) => {
                    warn!(%type_key, "registration failed: {}", e);
                    report.failed.push((type_key.clone(), e));
                }
            }
        }

        info!(
            registered = report.registered.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "setup pass complete"
        );
        report
    }

    async fn register(&self, type_key: &TypeKey) -> Result<()> {
        let type_id = type_key.parse()?;
        let coordinator = Arc::new(RenderCoordinator::new(
            type_id.clone(),
            self.cluster.clone(),
            self.catalog.clone(),
            &self.config,
            self.status.clone(),
        ));

        let timeout = self.config.reconcile.setup_timeout();
        let handle = tokio::time::timeout(timeout, self.host.register(type_id, coordinator))
            .await
            .map_err(|_| Error::DeadlineExceeded(timeout))??;

        if let Some(duplicate) = self.registry.insert(type_key.clone(), handle) {
            // Lost a race with a concurrent setup pass.
            duplicate.join().await;
        }
        Ok(())
    }

    /// Read the StackConfiguration at `key` and run [`setup`](Self::setup) on it.
    /// `Ok(None)` when the object does not exist.
    pub async fn sync(&self, key: &ObjectKey) -> Result<Option<SetupReport>> {
        let object = match self.cluster.get(&stack_configuration_type(), key).await {
            Ok(object) => object,
            Err(e) if e.is_not_found() => {
                debug!(%key, "no stack configuration");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        let configuration: StackConfiguration = object.into_typed()?;
        let catalog = BehaviorCatalog::from_configuration(&configuration);
        for type_key in catalog.invalid_keys() {
            warn!(%type_key, "catalog type key does not parse");
        }
        for (type_key, event) in catalog.unknown_events() {
            warn!(%type_key, %event, "unknown event name; hooks skipped");
        }
        Ok(Some(self.setup(catalog).await))
    }

    /// Register this coordinator as the loop for the StackConfiguration type
    /// and queue an initial sync of the configured catalog object.
    pub async fn start(self: Arc<Self>) -> Result<LoopHandle> {
        let initial = ReconcileRequest::new(self.config.catalog.key());
        let host = self.host.clone();
        let handle = host.register(stack_configuration_type(), self).await?;
        handle.enqueue(initial).await?;
        Ok(handle)
    }
}

#[async_trait]
impl Reconciler for SetupCoordinator {
    async fn handle(&self, request: ReconcileRequest) -> Result<Action> {
        let timeout = self.config.reconcile.pass_timeout();
        let report = tokio::time::timeout(timeout, self.sync(&request.key))
            .await
            .map_err(|_| Error::DeadlineExceeded(timeout))??;
        match report {
            Some(report) if report.should_retry() => Ok(Action::Requeue),
            _ => Ok(Action::Done),
        }
    }
}
