use crate::error::{GriddleError, Result};
use crate::index::config::ManagerConfig;
use crate::index::job::{Job, JobKind, JobQueue};
use crate::index::schema::Schema;
use crate::index::searcher::SearcherCache;
use crate::index::write_queue::{spawn_worker, Shared, StatsSnapshot, WorkerStats};
use crate::index::Index;
use crate::query::{QueryExecutor, SearchQuery};
use crate::types::{Document, Filter, Hits, Sort};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Whether the worker is allowed to apply queued jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexStatus {
    Normal,
    /// Jobs are accepted and queued but not executed until the status
    /// returns to [`IndexStatus::Normal`].
    Rebuilding,
}

struct WorkerHandle {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Coordinates asynchronous updates to a single index.
///
/// Producers on any thread call [`add`](Self::add), [`remove`](Self::remove)
/// and [`optimize`](Self::optimize); each call validates its input, queues a
/// job and returns immediately. One background worker, spawned with
/// [`start`](Self::start), applies the jobs in order and publishes a new
/// searcher snapshot whenever the queue drains. [`search`](Self::search)
/// always reads the cached snapshot and never waits on the queue.
///
/// # Examples
///
/// ```rust,no_run
/// use griddle::index::schema::{FieldOptions, Schema};
/// use griddle::{IndexManager, ManagerConfig, SearchQuery};
/// use serde_json::json;
/// use std::time::Duration;
///
/// # async fn run() -> griddle::Result<()> {
/// let schema = Schema::builder()
///     .add_text_field("title", FieldOptions::default())
///     .build()?;
/// let manager = IndexManager::open_in_dir("./data/books", schema, ManagerConfig::default())?;
/// manager.start()?;
///
/// manager.add_json(&json!({"id": 1, "title": "Pancakes at dawn"}));
/// manager.wait_for_drain(Duration::from_secs(5)).await;
///
/// let hits = manager.search(&SearchQuery::text("pancakes"), None, &[], 10)?;
/// assert_eq!(hits.size(), 1);
/// manager.stop().await;
/// # Ok(())
/// # }
/// ```
pub struct IndexManager {
    shared: Arc<Shared>,
    worker: Mutex<Option<WorkerHandle>>,
}

impl IndexManager {
    /// Wrap an existing index. The worker is not started.
    ///
    /// # Errors
    ///
    /// [`GriddleError::Config`] if `config` is invalid or names a different
    /// identifier field than the index schema.
    pub fn new(index: Arc<Index>, config: ManagerConfig) -> Result<Arc<Self>> {
        config.validate()?;
        if index.schema().id_field() != config.id_field {
            return Err(GriddleError::Config(format!(
                "id field '{}' does not match index id field '{}'",
                config.id_field,
                index.schema().id_field()
            )));
        }

        let searcher = SearcherCache::open(&index)?;
        tracing::info!(
            "[QUEUE] manager ready, {} documents visible",
            searcher.load().num_docs()
        );

        Ok(Arc::new(IndexManager {
            shared: Arc::new(Shared {
                index,
                queue: JobQueue::new(),
                searcher,
                stats: WorkerStats::default(),
                config,
                dirty: AtomicBool::new(false),
            }),
            worker: Mutex::new(None),
        }))
    }

    /// Open the index at `path`, creating it with `schema` if absent.
    pub fn open_in_dir<P: AsRef<Path>>(
        path: P,
        schema: Schema,
        config: ManagerConfig,
    ) -> Result<Arc<Self>> {
        let index = Index::open_or_create(path, schema)?.configured(&config);
        Self::new(Arc::new(index), config)
    }

    pub fn in_memory(schema: Schema, config: ManagerConfig) -> Result<Arc<Self>> {
        let index = Index::create_in_ram(schema)?.configured(&config);
        Self::new(Arc::new(index), config)
    }

    /// Queue an upsert of `document`.
    ///
    /// Returns false, without queueing anything, if the document has no
    /// integer identifier or does not fit the schema.
    pub fn add(&self, document: Document) -> bool {
        let id_field = &self.shared.config.id_field;
        let Some(id) = document.id(id_field) else {
            tracing::error!(
                "[QUEUE] add rejected: document has no integer '{}' field",
                id_field
            );
            self.shared.stats.record_rejected();
            return false;
        };

        let prepared = match self.shared.index.converter().to_tantivy(&document) {
            Ok(doc) => doc,
            Err(e) => {
                tracing::error!(error_code = e.code(), "[QUEUE] add rejected for id {}: {}", id, e);
                self.shared.stats.record_rejected();
                return false;
            }
        };

        self.enqueue(Job::new(JobKind::Add, move |index| {
            index.upsert_prepared(id, prepared.clone())
        }));
        true
    }

    /// Queue an upsert of a document given as a JSON object.
    pub fn add_json(&self, value: &serde_json::Value) -> bool {
        if value.is_null() {
            tracing::error!("[QUEUE] add rejected: no document given");
            self.shared.stats.record_rejected();
            return false;
        }
        match Document::from_json(value) {
            Ok(document) => self.add(document),
            Err(e) => {
                tracing::error!(error_code = e.code(), "[QUEUE] add rejected: {}", e);
                self.shared.stats.record_rejected();
                false
            }
        }
    }

    /// Queue removal of every document whose identifier is `id`.
    pub fn remove(&self, id: i64) -> bool {
        self.enqueue(Job::new(JobKind::Remove, move |index| index.remove_by_id(id)));
        true
    }

    /// Queue a removal by an identifier taken from request JSON.
    pub fn remove_json(&self, value: &serde_json::Value) -> bool {
        match value.as_i64() {
            Some(id) => self.remove(id),
            None => {
                tracing::error!("[QUEUE] remove rejected: '{}' is not an integer id", value);
                self.shared.stats.record_rejected();
                false
            }
        }
    }

    /// Queue an optimize. Returns false if one is already pending.
    pub fn optimize(&self) -> bool {
        self.submit(Job::optimize())
    }

    /// Queue an arbitrary job. OPTIMIZE jobs are de-duplicated like
    /// [`optimize`](Self::optimize).
    pub fn submit(&self, job: Job) -> bool {
        if job.kind() == JobKind::Optimize {
            if !self.shared.queue.enqueue_optimize(job) {
                tracing::debug!("[QUEUE] optimize already pending, skipped");
                self.shared.stats.record_rejected();
                return false;
            }
            self.shared.stats.record_enqueued();
            return true;
        }
        self.enqueue(job);
        true
    }

    fn enqueue(&self, job: Job) {
        tracing::trace!(job_id = %job.id(), "[QUEUE] enqueue {:?}", job.kind());
        self.shared.queue.enqueue(job);
        self.shared.stats.record_enqueued();
    }

    /// Search the current snapshot.
    ///
    /// Documents written since the last drain are not visible yet.
    pub fn search(
        &self,
        query: &SearchQuery,
        filter: Option<&Filter>,
        sort: &[Sort],
        limit: usize,
    ) -> Result<Hits> {
        let searcher = self.shared.searcher.load();
        QueryExecutor::new(&self.shared.index).execute(&searcher, query, filter, sort, limit)
    }

    pub fn status(&self) -> IndexStatus {
        if self.shared.queue.is_paused() {
            IndexStatus::Rebuilding
        } else {
            IndexStatus::Normal
        }
    }

    pub fn set_status(&self, status: IndexStatus) {
        match status {
            IndexStatus::Rebuilding => self.shared.queue.pause(),
            IndexStatus::Normal => self.shared.queue.resume(),
        }
        tracing::info!(
            "[QUEUE] status {:?}, {} jobs pending",
            status,
            self.shared.queue.len()
        );
    }

    /// Spawn the worker on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// [`GriddleError::WorkerRunning`] if a worker is already running, or
    /// [`GriddleError::Config`] when called outside a tokio runtime.
    pub fn start(&self) -> Result<()> {
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(GriddleError::Config(
                "start() must be called inside a tokio runtime".to_string(),
            ));
        }

        let mut worker = self.worker.lock();
        if let Some(existing) = worker.as_ref() {
            if !existing.handle.is_finished() {
                return Err(GriddleError::WorkerRunning);
            }
        }

        let cancel = CancellationToken::new();
        let handle = spawn_worker(Arc::clone(&self.shared), cancel.clone());
        *worker = Some(WorkerHandle { cancel, handle });
        Ok(())
    }

    /// Ask the worker to exit after its current job and wait up to the
    /// configured stop timeout.
    ///
    /// Returns true if the worker exited in time or was not running.
    /// Queued jobs stay queued for a later [`start`](Self::start).
    pub async fn stop(&self) -> bool {
        let Some(WorkerHandle { cancel, handle }) = self.worker.lock().take() else {
            return true;
        };
        cancel.cancel();
        self.shared.queue.wake();

        match tokio::time::timeout(self.shared.config.stop_timeout, handle).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                tracing::error!("[WORKER] worker task failed: {}", e);
                false
            }
            Err(_) => {
                tracing::warn!(
                    "[WORKER] did not stop within {}ms",
                    self.shared.config.stop_timeout.as_millis()
                );
                false
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .as_ref()
            .is_some_and(|w| !w.handle.is_finished())
    }

    /// Number of queued jobs, excluding one in flight.
    pub fn pending(&self) -> usize {
        self.shared.queue.len()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot(self.shared.queue.len())
    }

    pub fn index(&self) -> &Arc<Index> {
        &self.shared.index
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.shared.config
    }

    /// The snapshot searches currently run against.
    pub fn searcher(&self) -> Arc<tantivy::Searcher> {
        self.shared.searcher.load()
    }

    /// Wait until every queued job has run and the searcher reflects the
    /// result. Returns false on timeout.
    pub async fn wait_for_drain(&self, timeout: Duration) -> bool {
        let started = Instant::now();
        loop {
            if self.shared.queue.is_idle() && !self.shared.dirty.load(Ordering::SeqCst) {
                return true;
            }
            if started.elapsed() >= timeout {
                return false;
            }
            tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
        }
    }

    /// Run `f` against the index while queued jobs are held back.
    ///
    /// The status is set to [`IndexStatus::Rebuilding`] and any in-flight
    /// job is allowed to finish before `f` runs on a blocking thread. The
    /// status returns to [`IndexStatus::Normal`] afterwards whether or not
    /// `f` succeeded; jobs queued meanwhile then run in order.
    pub async fn rebuild<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&Index) -> Result<()> + Send + 'static,
    {
        self.set_status(IndexStatus::Rebuilding);
        while self.shared.queue.is_in_flight() {
            tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
        }

        let index = Arc::clone(&self.shared.index);
        let started = Instant::now();
        let result = tokio::task::spawn_blocking(move || f(index.as_ref()))
            .await
            .unwrap_or_else(|e| Err(GriddleError::JobFailed(format!("rebuild task failed: {}", e))));
        match &result {
            Ok(()) => tracing::info!("[INDEX] rebuild done in {}ms", started.elapsed().as_millis()),
            Err(e) => tracing::error!(error_code = e.code(), "[INDEX] rebuild failed: {}", e),
        }

        let refreshed = if self.shared.queue.is_empty() {
            self.refresh_searcher()
        } else {
            self.shared.dirty.store(true, Ordering::SeqCst);
            Ok(())
        };
        self.set_status(IndexStatus::Normal);

        result?;
        refreshed
    }

    /// Reload the cached searcher from the latest commit.
    pub fn refresh_searcher(&self) -> Result<()> {
        let result = self.shared.searcher.refresh(&self.shared.index);
        if let Err(e) = &result {
            tracing::error!("[SEARCHER] refresh failed: {}", e);
        }
        self.shared.stats.record_refresh(result.is_ok());
        result
    }
}

impl Drop for IndexManager {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.get_mut().take() {
            worker.cancel.cancel();
        }
    }
}
