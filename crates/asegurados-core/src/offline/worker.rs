//! Runs an [`OfflineCacheManager`] on its own task.
//!
//! Lifecycle events are handled one at a time in arrival order, so a fetch
//! sent during install waits for the install to finish. Each fetch is then
//! answered on a task of its own: a stalled request blocks only its caller.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::debug;

use super::{CacheError, CachePhase, OfflineCacheManager, Registration};
use crate::net::{Fetch, FetchError, Request, Response};

/// Buffer size for the worker event channel.
/// Requests are small and answered quickly; 32 leaves headroom for bursts.
const CHANNEL_BUFFER_SIZE: usize = 32;

enum WorkerEvent {
    Install(oneshot::Sender<Result<(), CacheError>>),
    Activate(oneshot::Sender<Result<Vec<String>, CacheError>>),
    Register(oneshot::Sender<Result<Registration, CacheError>>),
    Fetch(Request, oneshot::Sender<Result<Response, FetchError>>),
    Settle(oneshot::Sender<()>),
}

/// Handle on a running offline worker. Cloning shares the same worker; the
/// worker stops once every handle is dropped.
#[derive(Clone)]
pub struct OfflineWorker {
    tx: mpsc::Sender<WorkerEvent>,
    phase: watch::Receiver<CachePhase>,
    generation: String,
}

impl OfflineWorker {
    /// Start the worker on the current tokio runtime.
    pub fn spawn(manager: OfflineCacheManager) -> Self {
        let (tx, rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
        let phase = manager.subscribe();
        let generation = manager.generation().to_string();

        tokio::spawn(run(Arc::new(manager), rx));

        Self {
            tx,
            phase,
            generation,
        }
    }

    pub fn generation(&self) -> &str {
        &self.generation
    }

    pub fn phase(&self) -> CachePhase {
        *self.phase.borrow()
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> WorkerEvent,
    ) -> Option<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx.send(make(reply_tx)).await.ok()?;
        reply_rx.await.ok()
    }

    pub async fn install(&self) -> Result<(), CacheError> {
        self.request(WorkerEvent::Install)
            .await
            .unwrap_or(Err(CacheError::WorkerGone))
    }

    pub async fn activate(&self) -> Result<Vec<String>, CacheError> {
        self.request(WorkerEvent::Activate)
            .await
            .unwrap_or(Err(CacheError::WorkerGone))
    }

    /// Install if needed, then activate.
    pub async fn register(&self) -> Result<Registration, CacheError> {
        self.request(WorkerEvent::Register)
            .await
            .unwrap_or(Err(CacheError::WorkerGone))
    }

    /// Wait for detached dataset refreshes. Call before shutting down so the
    /// last good dataset makes it into the cache.
    pub async fn settle(&self) {
        let _ = self.request(WorkerEvent::Settle).await;
    }
}

#[async_trait]
impl Fetch for OfflineWorker {
    async fn fetch(&self, request: Request) -> Result<Response, FetchError> {
        self.request(|reply| WorkerEvent::Fetch(request, reply))
            .await
            .unwrap_or(Err(FetchError::WorkerGone))
    }
}

async fn run(manager: Arc<OfflineCacheManager>, mut rx: mpsc::Receiver<WorkerEvent>) {
    debug!(generation = %manager.generation(), "Offline worker started");

    while let Some(event) = rx.recv().await {
        match event {
            WorkerEvent::Install(reply) => {
                let _ = reply.send(manager.install().await);
            }
            WorkerEvent::Activate(reply) => {
                let _ = reply.send(manager.activate().await);
            }
            WorkerEvent::Register(reply) => {
                let _ = reply.send(manager.register().await);
            }
            WorkerEvent::Fetch(request, reply) => {
                let manager = manager.clone();
                tokio::spawn(async move {
                    let _ = reply.send(manager.handle_fetch(request).await);
                });
            }
            WorkerEvent::Settle(reply) => {
                manager.settle().await;
                let _ = reply.send(());
            }
        }
    }

    manager.settle().await;
    debug!(generation = %manager.generation(), "Offline worker stopped");
}
