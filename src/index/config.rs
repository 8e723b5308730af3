use crate::error::{GriddleError, Result};
use std::env;
use std::time::Duration;

/// Tantivy refuses writers with less than 15 MB of heap per indexing thread.
pub const MIN_WRITER_HEAP_BYTES: usize = 15_000_000;

#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Name of the integer field holding each document's unique identifier.
    pub id_field: String,
    /// Failed executions after which a job is dropped.
    pub max_tries: u32,
    /// Upper bound on how long an idle worker sleeps before re-checking.
    pub poll_interval: Duration,
    /// How long `stop()` waits for the worker to exit.
    pub stop_timeout: Duration,
    /// How long a writer acquisition retries while the index is locked.
    pub lock_timeout: Duration,
    pub writer_heap_bytes: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        ManagerConfig {
            id_field: "id".to_string(),
            max_tries: 10,
            poll_interval: Duration::from_millis(100),
            stop_timeout: Duration::from_secs(10),
            lock_timeout: Duration::from_secs(10),
            writer_heap_bytes: 20_000_000,
        }
    }
}

impl ManagerConfig {
    pub fn from_env() -> Self {
        let defaults = ManagerConfig::default();
        ManagerConfig {
            id_field: env::var("GRIDDLE_ID_FIELD")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.id_field),
            max_tries: env::var("GRIDDLE_MAX_TRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_tries),
            poll_interval: env::var("GRIDDLE_POLL_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
            stop_timeout: env::var("GRIDDLE_STOP_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.stop_timeout),
            lock_timeout: env::var("GRIDDLE_LOCK_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.lock_timeout),
            writer_heap_bytes: env::var("GRIDDLE_WRITER_HEAP_MB")
                .ok()
                .and_then(|s| s.parse::<usize>().ok())
                .and_then(|mb| mb.checked_mul(1024 * 1024))
                .unwrap_or(defaults.writer_heap_bytes),
        }
    }

    pub fn with_id_field(mut self, id_field: impl Into<String>) -> Self {
        self.id_field = id_field.into();
        self
    }

    pub fn with_max_tries(mut self, max_tries: u32) -> Self {
        self.max_tries = max_tries;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_stop_timeout(mut self, stop_timeout: Duration) -> Self {
        self.stop_timeout = stop_timeout;
        self
    }

    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.id_field.is_empty() {
            return Err(GriddleError::Config("id_field must not be empty".to_string()));
        }
        if self.max_tries == 0 {
            return Err(GriddleError::Config(
                "max_tries must be at least 1".to_string(),
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(GriddleError::Config(
                "poll_interval must be non-zero".to_string(),
            ));
        }
        if self.writer_heap_bytes < MIN_WRITER_HEAP_BYTES {
            return Err(GriddleError::Config(format!(
                "writer heap {} bytes is below the {} byte minimum",
                self.writer_heap_bytes, MIN_WRITER_HEAP_BYTES
            )));
        }
        Ok(())
    }
}
