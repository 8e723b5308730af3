//! Units of index work and the queue that holds them until the worker runs
//! them.

use crate::error::Result;
use crate::index::Index;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;
use tokio::sync::Notify;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Add,
    Remove,
    Optimize,
}

/// Work executed against the index. Called once per attempt, so it must be
/// safe to run again after a failure.
pub type JobCallback = Box<dyn Fn(&Index) -> Result<()> + Send + Sync>;

pub struct Job {
    id: Uuid,
    kind: JobKind,
    callback: JobCallback,
    error_count: u32,
    created_at: DateTime<Utc>,
}

impl Job {
    pub fn new<F>(kind: JobKind, callback: F) -> Self
    where
        F: Fn(&Index) -> Result<()> + Send + Sync + 'static,
    {
        Job {
            id: Uuid::new_v4(),
            kind,
            callback: Box::new(callback),
            error_count: 0,
            created_at: Utc::now(),
        }
    }

    pub fn optimize() -> Self {
        Job::new(JobKind::Optimize, |index| index.optimize())
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    pub fn error_count(&self) -> u32 {
        self.error_count
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn execute(&self, index: &Index) -> Result<()> {
        (self.callback)(index)
    }

    /// Count a failed attempt; returns the new failure count.
    pub(crate) fn record_failure(&mut self) -> u32 {
        self.error_count += 1;
        self.error_count
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("error_count", &self.error_count)
            .field("created_at", &self.created_at)
            .finish()
    }
}

struct QueueState {
    jobs: VecDeque<Job>,
    /// A job has been handed to the worker and not yet finished.
    in_flight: bool,
    /// Paused queues hand out no jobs; enqueueing still works.
    paused: bool,
}

/// Unbounded FIFO shared by any number of producers and a single consumer.
///
/// Pausing, dequeueing and the in-flight flag share one lock, so once
/// [`pause`](Self::pause) returns and [`is_idle`](Self::is_idle) reports no
/// job in flight, no job can start until the queue is resumed.
pub struct JobQueue {
    state: Mutex<QueueState>,
    notify: Notify,
}

impl JobQueue {
    pub fn new() -> Self {
        JobQueue {
            state: Mutex::new(QueueState {
                jobs: VecDeque::new(),
                in_flight: false,
                paused: false,
            }),
            notify: Notify::new(),
        }
    }

    /// Append at the tail and wake the consumer.
    pub fn enqueue(&self, job: Job) {
        self.state.lock().jobs.push_back(job);
        self.notify.notify_one();
    }

    /// Append an OPTIMIZE job unless one is already pending.
    pub fn enqueue_optimize(&self, job: Job) -> bool {
        {
            let mut state = self.state.lock();
            if state.jobs.iter().any(|j| j.kind == JobKind::Optimize) {
                return false;
            }
            state.jobs.push_back(job);
        }
        self.notify.notify_one();
        true
    }

    /// Take the head job unless the queue is paused or empty, marking it in
    /// flight until [`finish`](Self::finish) is called.
    pub fn dequeue_front(&self) -> Option<Job> {
        let mut state = self.state.lock();
        if state.paused || state.in_flight {
            return None;
        }
        let job = state.jobs.pop_front()?;
        state.in_flight = true;
        Some(job)
    }

    pub fn finish(&self) {
        self.state.lock().in_flight = false;
    }

    pub fn len(&self) -> usize {
        self.state.lock().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().jobs.is_empty()
    }

    pub fn has_pending_optimize(&self) -> bool {
        self.state
            .lock()
            .jobs
            .iter()
            .any(|j| j.kind == JobKind::Optimize)
    }

    /// No pending jobs and none in flight.
    pub fn is_idle(&self) -> bool {
        let state = self.state.lock();
        state.jobs.is_empty() && !state.in_flight
    }

    pub fn is_in_flight(&self) -> bool {
        self.state.lock().in_flight
    }

    pub fn pause(&self) {
        self.state.lock().paused = true;
    }

    pub fn resume(&self) {
        self.state.lock().paused = false;
        self.notify.notify_one();
    }

    pub fn is_paused(&self) -> bool {
        self.state.lock().paused
    }

    /// Wake the consumer without enqueueing anything.
    pub fn wake(&self) {
        self.notify.notify_one();
    }

    /// Wait for an enqueue or wake-up, at most `max_wait`.
    pub async fn wait(&self, max_wait: Duration) {
        let _ = tokio::time::timeout(max_wait, self.notify.notified()).await;
    }
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new()
    }
}
