//! Registry of running reconcile loops, one per governed type.

use crate::host::{LoopHandle, ReconcileRequest};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use stackhook_core::TypeKey;
use tokio::sync::mpsc;
use tracing::info;

#[derive(Default)]
pub struct ControllerRegistry {
    loops: DashMap<TypeKey, LoopHandle>,
}

impl ControllerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &TypeKey) -> bool {
        self.loops.contains_key(key)
    }

    /// Keep `handle` unless a loop is already registered for `key`.
    /// A rejected handle is returned so the caller can stop it.
    pub fn insert(&self, key: TypeKey, handle: LoopHandle) -> Option<LoopHandle> {
        match self.loops.entry(key) {
            Entry::Occupied(_) => Some(handle),
            Entry::Vacant(slot) => {
                slot.insert(handle);
                None
            }
        }
    }

    /// Queue of the loop for `key`.
    pub fn sender(&self, key: &TypeKey) -> Option<mpsc::Sender<ReconcileRequest>> {
        self.loops.get(key).map(|handle| handle.sender())
    }

    pub fn keys(&self) -> Vec<TypeKey> {
        let mut keys: Vec<TypeKey> = self.loops.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.loops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loops.is_empty()
    }

    /// Stop every loop and wait for in-flight passes.
    pub async fn shutdown(&self) {
        for key in self.keys() {
            if let Some((_, handle)) = self.loops.remove(&key) {
                handle.join().await;
                info!(type_key = %key, "reconcile loop deregistered");
            }
        }
    }
}
