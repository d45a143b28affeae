//! Shared catalog snapshot.
//!
//! The setup coordinator publishes a new catalog on every sync; render passes
//! take an `Arc` to whatever is current when they start and keep it for the
//! whole pass.

use stackhook_core::BehaviorCatalog;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Clone, Default)]
pub struct SharedCatalog {
    inner: Arc<RwLock<Arc<BehaviorCatalog>>>,
}

impl SharedCatalog {
    pub fn new(catalog: BehaviorCatalog) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(catalog))),
        }
    }

    pub async fn snapshot(&self) -> Arc<BehaviorCatalog> {
        self.inner.read().await.clone()
    }

    /// Replace the current catalog. Passes already running keep the old one.
    pub async fn publish(&self, catalog: BehaviorCatalog) -> Arc<BehaviorCatalog> {
        let catalog = Arc::new(catalog);
        *self.inner.write().await = catalog.clone();
        catalog
    }
}
