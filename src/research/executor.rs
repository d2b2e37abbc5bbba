//! Bounded pool for concurrent research executions.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::{oneshot, Semaphore};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::ResearchOrchestrator;
use crate::config::DEFAULT_MAX_CONCURRENT_RUNS;
use crate::error::ResearchError;
use crate::progress::{report_isolated, SharedProgress};
use crate::types::{ProgressEvent, ResearchMetadata, ResearchRequest, ResearchResult};

/// Handle to a submitted research task.
pub struct ResearchHandle {
    id: Uuid,
    cancel: CancellationToken,
    started: Arc<AtomicBool>,
    result_rx: oneshot::Receiver<ResearchResult>,
    fallback: ResearchMetadata,
}

impl ResearchHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Request cancellation.
    ///
    /// A task still waiting for a slot resolves to a cancelled result without
    /// contacting the service; a running one stops at its next poll boundary.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token that cancels this task; usable after [`wait`](Self::wait) consumed the handle.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Whether the task has acquired a slot and begun executing.
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    pub async fn wait(self) -> ResearchResult {
        let Self {
            result_rx, fallback, ..
        } = self;
        result_rx
            .await
            .unwrap_or_else(|_| ResearchResult::failed(&ResearchError::Cancelled, fallback, 0.0))
    }
}

/// Runs at most `pool_size` research executions at a time.
#[derive(Clone)]
pub struct ResearchExecutor {
    orchestrator: Arc<ResearchOrchestrator>,
    slots: Arc<Semaphore>,
    pool_size: usize,
    runtime: Handle,
}

impl ResearchExecutor {
    /// Pool with the default size on the current runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn new(orchestrator: Arc<ResearchOrchestrator>) -> Self {
        Self::with_runtime(orchestrator, DEFAULT_MAX_CONCURRENT_RUNS, Handle::current())
    }

    pub fn with_runtime(orchestrator: Arc<ResearchOrchestrator>, pool_size: usize, runtime: Handle) -> Self {
        let pool_size = pool_size.max(1);
        Self {
            orchestrator,
            slots: Arc::new(Semaphore::new(pool_size)),
            pool_size,
            runtime,
        }
    }

    /// Same runtime, different pool size.
    pub fn with_pool_size(self, pool_size: usize) -> Self {
        Self::with_runtime(self.orchestrator, pool_size, self.runtime)
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }

    pub fn orchestrator(&self) -> &Arc<ResearchOrchestrator> {
        &self.orchestrator
    }

    /// Queue `request`; it starts once a slot is free.
    pub fn submit(&self, request: ResearchRequest, progress: SharedProgress) -> ResearchHandle {
        let id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        let started = Arc::new(AtomicBool::new(false));
        let (result_tx, result_rx) = oneshot::channel();
        let fallback = ResearchMetadata::for_request(&request);

        let orchestrator = self.orchestrator.clone();
        let slots = self.slots.clone();
        let task_cancel = cancel.clone();
        let task_started = started.clone();

        tracing::info!(%id, query_length = request.query().len(), "Research task submitted");
        self.runtime.spawn(async move {
            let permit = tokio::select! {
                biased;
                _ = task_cancel.cancelled() => None,
                permit = slots.acquire_owned() => permit.ok(),
            };

            let result = match permit {
                Some(_permit) => {
                    task_started.store(true, Ordering::Release);
                    tracing::debug!(%id, "Research task started");
                    orchestrator
                        .execute(&request, progress.as_ref(), &task_cancel)
                        .await
                }
                None => {
                    tracing::info!(%id, "Research task cancelled before start");
                    let error = ResearchError::Cancelled;
                    report_isolated(
                        progress.as_ref(),
                        &ProgressEvent::new(format!("Research failed: {error}"), 1.0)
                            .with("success", false)
                            .with("error", error.to_string()),
                    );
                    ResearchResult::failed(&error, ResearchMetadata::for_request(&request), 0.0)
                }
            };
            let _ = result_tx.send(result);
        });

        ResearchHandle {
            id,
            cancel,
            started,
            result_rx,
            fallback,
        }
    }

    /// Submit and wait for the result.
    pub async fn run(&self, request: ResearchRequest, progress: SharedProgress) -> ResearchResult {
        self.submit(request, progress).wait().await
    }

    /// Blocking form of [`run`](Self::run) for callers outside the runtime.
    ///
    /// # Panics
    ///
    /// Panics when called from within an asynchronous execution context.
    pub fn run_blocking(&self, request: ResearchRequest, progress: SharedProgress) -> ResearchResult {
        let handle = self.submit(request, progress);
        self.runtime.block_on(handle.wait())
    }
}
