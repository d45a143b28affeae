//! Directory watcher for a [`LocalCluster`](crate::local::LocalCluster) tree
//!
//! Polls object file modification times under one type's directory. New and
//! modified files become reconcile requests; so do removed files (the pass
//! finds the object gone and does nothing). Every file present when the watch
//! starts is delivered once.

use crate::host::{EventSource, ReconcileRequest};
use crate::local::{key_for_path, type_dir};
use async_trait::async_trait;
use stackhook_core::{ObjectKey, TypeIdentity};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use walkdir::WalkDir;

pub struct DirectoryEventSource {
    root: PathBuf,
    poll_interval: Duration,
}

impl DirectoryEventSource {
    pub fn new(root: impl AsRef<Path>, poll_interval: Duration) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            poll_interval,
        }
    }
}

#[async_trait]
impl EventSource for DirectoryEventSource {
    async fn watch(
        &self,
        type_id: TypeIdentity,
        queue: mpsc::Sender<ReconcileRequest>,
        cancel: CancellationToken,
    ) {
        let dir = type_dir(&self.root, &type_id);
        let mut snapshot = DirectorySnapshot::default();
        info!(type_id = %type_id, dir = %dir.display(), "directory watch started");

        loop {
            for key in snapshot.rescan(&dir) {
                debug!(type_id = %type_id, %key, "object file changed");
                if queue.send(ReconcileRequest::new(key)).await.is_err() {
                    info!(type_id = %type_id, "reconcile queue closed, stopping watch");
                    return;
                }
            }
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }
}

/// Last seen modification time per object file.
#[derive(Default)]
pub struct DirectorySnapshot {
    mtimes: HashMap<PathBuf, SystemTime>,
}

impl DirectorySnapshot {
    /// Keys whose files appeared, changed or disappeared since the last scan.
    pub fn rescan(&mut self, dir: &Path) -> Vec<ObjectKey> {
        let mut current = HashMap::new();
        for entry in WalkDir::new(dir)
            .min_depth(2)
            .max_depth(2)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            let Some(modified) = entry.metadata().ok().and_then(|m| m.modified().ok()) else {
                continue;
            };
            current.insert(entry.into_path(), modified);
        }

        let mut changed: Vec<ObjectKey> = Vec::new();
        for (path, modified) in &current {
            if self.mtimes.get(path) != Some(modified) {
                changed.extend(key_for_path(dir, path));
            }
        }
        for path in self.mtimes.keys() {
            if !current.contains_key(path) {
                changed.extend(key_for_path(dir, path));
            }
        }

        self.mtimes = current;
        changed.sort();
        changed.dedup();
        changed
    }
}
