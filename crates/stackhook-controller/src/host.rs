//! Control-loop host: runs one reconcile loop per registered type.
//!
//! The host is the substrate seam: coordinators hand it a [`Reconciler`] for a
//! type and get back a [`LoopHandle`]. [`ChannelHost`] is the in-process host:
//! one tokio task per type draining a bounded queue, one request at a time.
//! Loops for different types never block each other.

use async_trait::async_trait;
use stackhook_core::{Error, EventName, ObjectKey, Result, TypeIdentity};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// "Reconcile this key now", optionally with the event that caused it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconcileRequest {
    pub key: ObjectKey,
    pub event: Option<EventName>,
}

impl ReconcileRequest {
    pub fn new(key: ObjectKey) -> Self {
        Self { key, event: None }
    }

    pub fn with_event(mut self, event: EventName) -> Self {
        self.event = Some(event);
        self
    }
}

/// What the loop does after a pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    Done,
    /// Redeliver the same request after the host's requeue delay.
    Requeue,
}

/// Handles one request for one type.
#[async_trait]
pub trait Reconciler: Send + Sync {
    async fn handle(&self, request: ReconcileRequest) -> Result<Action>;
}

/// Feeds requests for one type into its loop (a watch).
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Runs until `cancel` fires or the loop's queue closes.
    async fn watch(
        &self,
        type_id: TypeIdentity,
        queue: mpsc::Sender<ReconcileRequest>,
        cancel: CancellationToken,
    );
}

/// Dynamic registration of reconcile loops.
#[async_trait]
pub trait ControllerHost: Send + Sync {
    async fn register(&self, type_id: TypeIdentity, reconciler: Arc<dyn Reconciler>) -> Result<LoopHandle>;
}

/// A running loop.
#[derive(Debug)]
pub struct LoopHandle {
    type_id: TypeIdentity,
    queue: mpsc::Sender<ReconcileRequest>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl LoopHandle {
    pub fn type_id(&self) -> &TypeIdentity {
        &self.type_id
    }

    pub fn sender(&self) -> mpsc::Sender<ReconcileRequest> {
        self.queue.clone()
    }

    pub async fn enqueue(&self, request: ReconcileRequest) -> Result<()> {
        self.queue
            .send(request)
            .await
            .map_err(|_| Error::registration(self.type_id.type_key(), "reconcile loop has stopped"))
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Stop and wait for the in-flight pass to finish.
    pub async fn join(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            warn!(type_id = %self.type_id, "reconcile loop ended abnormally: {}", e);
        }
    }
}

// ============================================================
// In-process host
// ============================================================

pub struct ChannelHost {
    requeue_after: Duration,
    queue_depth: usize,
    events: Option<Arc<dyn EventSource>>,
    cancel: CancellationToken,
}

impl ChannelHost {
    pub fn new(requeue_after: Duration, queue_depth: usize) -> Self {
        Self {
            requeue_after,
            queue_depth: queue_depth.max(1),
            events: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Start a watch from `events` alongside every registered loop.
    pub fn with_event_source(mut self, events: Arc<dyn EventSource>) -> Self {
        self.events = Some(events);
        self
    }

    /// Stops every loop this host started.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

#[async_trait]
impl ControllerHost for ChannelHost {
    async fn register(&self, type_id: TypeIdentity, reconciler: Arc<dyn Reconciler>) -> Result<LoopHandle> {
        if self.cancel.is_cancelled() {
            return Err(Error::registration(type_id.type_key(), "host is shut down"));
        }

        let (tx, rx) = mpsc::channel(self.queue_depth);
        let cancel = self.cancel.child_token();

        if let Some(events) = &self.events {
            let events = events.clone();
            let (type_id, queue, cancel) = (type_id.clone(), tx.clone(), cancel.clone());
            tokio::spawn(async move { events.watch(type_id, queue, cancel).await });
        }

        let task = tokio::spawn(run_loop(
            type_id.clone(),
            reconciler,
            rx,
            tx.clone(),
            cancel.clone(),
            self.requeue_after,
        ));
        info!(type_id = %type_id, "reconcile loop started");

        Ok(LoopHandle {
            type_id,
            queue: tx,
            cancel,
            task,
        })
    }
}

/// Sequential per type: the next request is taken only after the current pass returns.
async fn run_loop(
    type_id: TypeIdentity,
    reconciler: Arc<dyn Reconciler>,
    mut rx: mpsc::Receiver<ReconcileRequest>,
    requeue: mpsc::Sender<ReconcileRequest>,
    cancel: CancellationToken,
    requeue_after: Duration,
) {
    loop {
        let request = tokio::select! {
            _ = cancel.cancelled() => break,
            next = rx.recv() => match next {
                Some(request) => request,
                None => break,
            },
        };

        debug!(type_id = %type_id, key = %request.key, "reconciling");
        match reconciler.handle(request.clone()).await {
            Ok(Action::Done) => {}
            Ok(Action::Requeue) => {
                schedule_requeue(request, requeue.clone(), cancel.clone(), requeue_after);
            }
            Err(e) if e.is_transient() => {
                warn!(type_id = %type_id, key = %request.key, "pass failed, redelivering: {}", e);
                schedule_requeue(request, requeue.clone(), cancel.clone(), requeue_after);
            }
            Err(e) => {
                error!(type_id = %type_id, key = %request.key, "pass failed: {}", e);
            }
        }
    }
    info!(type_id = %type_id, "reconcile loop stopped");
}

fn schedule_requeue(
    request: ReconcileRequest,
    queue: mpsc::Sender<ReconcileRequest>,
    cancel: CancellationToken,
    after: Duration,
) {
    tokio::spawn(async move {
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = tokio::time::sleep(after) => {
                let _ = queue.send(request).await;
            }
        }
    });
}
