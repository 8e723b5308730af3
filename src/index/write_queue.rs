//! Background worker that applies queued jobs to the index.
//!
//! Exactly one worker runs per [`IndexManager`](crate::IndexManager); it is
//! the only writer of the index. Jobs run one at a time on a blocking
//! thread. A failed job goes back to the tail of the queue until it has
//! failed `max_tries` times, then it is dropped and counted in
//! [`WorkerStats::dropped`]. When the queue empties after a write, the
//! worker optimizes the index and swaps in a fresh searcher snapshot.

use crate::error::GriddleError;
use crate::index::config::ManagerConfig;
use crate::index::job::{Job, JobKind, JobQueue};
use crate::index::searcher::SearcherCache;
use crate::index::Index;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// State shared between the manager and its worker.
pub(crate) struct Shared {
    pub index: Arc<Index>,
    pub queue: JobQueue,
    pub searcher: SearcherCache,
    pub stats: WorkerStats,
    pub config: ManagerConfig,
    /// Writes have been applied since the searcher was last refreshed.
    pub dirty: AtomicBool,
}

#[derive(Default)]
pub struct WorkerStats {
    enqueued: AtomicU64,
    rejected: AtomicU64,
    executed: AtomicU64,
    retried: AtomicU64,
    dropped: AtomicU64,
    refreshes: AtomicU64,
    refresh_failures: AtomicU64,
}

/// Point-in-time copy of the worker counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub pending: usize,
    pub enqueued: u64,
    /// Calls refused for invalid input or a duplicate optimize.
    pub rejected: u64,
    pub executed: u64,
    pub retried: u64,
    /// Jobs abandoned after exhausting their retries.
    pub dropped: u64,
    pub refreshes: u64,
    pub refresh_failures: u64,
}

impl WorkerStats {
    pub(crate) fn record_enqueued(&self) {
        self.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_refresh(&self, ok: bool) {
        if ok {
            self.refreshes.fetch_add(1, Ordering::Relaxed);
        } else {
            self.refresh_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub(crate) fn snapshot(&self, pending: usize) -> StatsSnapshot {
        StatsSnapshot {
            pending,
            enqueued: self.enqueued.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            executed: self.executed.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            refreshes: self.refreshes.load(Ordering::Relaxed),
            refresh_failures: self.refresh_failures.load(Ordering::Relaxed),
        }
    }
}

pub(crate) fn spawn_worker(shared: Arc<Shared>, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(run_worker(shared, cancel))
}

async fn run_worker(shared: Arc<Shared>, cancel: CancellationToken) {
    tracing::info!(
        "[WORKER] started, pending={}, max_tries={}",
        shared.queue.len(),
        shared.config.max_tries
    );

    loop {
        if cancel.is_cancelled() {
            break;
        }

        let Some(job) = shared.queue.dequeue_front() else {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = shared.queue.wait(shared.config.poll_interval) => {}
            }
            continue;
        };

        process_job(&shared, job).await;
        shared.queue.finish();
    }

    tracing::info!(
        "[WORKER] stopped, {} jobs left pending",
        shared.queue.len()
    );
}

async fn process_job(shared: &Shared, job: Job) {
    let kind = job.kind();
    let index = Arc::clone(&shared.index);

    let handle = tokio::task::spawn_blocking(move || {
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| job.execute(&index)))
            .unwrap_or_else(|panic_info| Err(GriddleError::JobFailed(panic_message(panic_info))));
        (job, result)
    });

    let (mut job, result) = match handle.await {
        Ok(done) => done,
        Err(e) => {
            tracing::error!("[WORKER] {:?} job lost, blocking task failed: {}", kind, e);
            shared.stats.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        }
    };

    let succeeded = match result {
        Ok(()) => {
            shared.stats.executed.fetch_add(1, Ordering::Relaxed);
            shared.dirty.store(true, Ordering::SeqCst);
            tracing::debug!(
                job_id = %job.id(),
                "[WORKER] {:?} job done after {} failures",
                kind,
                job.error_count()
            );
            true
        }
        Err(e) => {
            let failures = job.record_failure();
            if failures < shared.config.max_tries {
                tracing::warn!(
                    job_id = %job.id(),
                    error_code = e.code(),
                    "[WORKER] {:?} job failed ({}/{}), requeueing: {}",
                    kind,
                    failures,
                    shared.config.max_tries,
                    e
                );
                shared.stats.retried.fetch_add(1, Ordering::Relaxed);
                shared.queue.enqueue(job);
            } else {
                tracing::error!(
                    job_id = %job.id(),
                    error_code = e.code(),
                    created_at = %job.created_at(),
                    "[WORKER] {:?} job dropped after {} failures: {}",
                    kind,
                    failures,
                    e
                );
                shared.stats.dropped.fetch_add(1, Ordering::Relaxed);
            }
            false
        }
    };

    if shared.queue.is_empty() && shared.dirty.swap(false, Ordering::SeqCst) {
        let just_optimized = succeeded && kind == JobKind::Optimize;
        refresh_after_drain(shared, just_optimized).await;
    }
}

/// Optimize the index (unless an OPTIMIZE job just ran) and swap in a fresh
/// searcher. Failures are logged; the worker keeps going.
async fn refresh_after_drain(shared: &Shared, skip_optimize: bool) {
    let index = Arc::clone(&shared.index);
    let opened = tokio::task::spawn_blocking(move || {
        if !skip_optimize {
            if let Err(e) = index.optimize() {
                tracing::warn!("[WORKER] drain optimize failed: {}", e);
            }
        }
        index.open_searcher()
    })
    .await;

    match opened {
        Ok(Ok(searcher)) => {
            shared.searcher.replace(searcher);
            shared.stats.record_refresh(true);
        }
        Ok(Err(e)) => {
            tracing::error!("[WORKER] searcher refresh failed: {}", e);
            shared.stats.record_refresh(false);
            shared.dirty.store(true, Ordering::SeqCst);
        }
        Err(e) => {
            tracing::error!("[WORKER] searcher refresh task failed: {}", e);
            shared.stats.record_refresh(false);
            shared.dirty.store(true, Ordering::SeqCst);
        }
    }
}

fn panic_message(panic_info: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic_info.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic_info.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic in job".to_string()
    }
}
