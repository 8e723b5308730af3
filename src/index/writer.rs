use crate::error::Result;
use std::ops::{Deref, DerefMut};
use std::time::{Duration, Instant};

/// An index writer that holds the index's exclusive writer lock.
///
/// The lock is released when the writer is dropped or [`finish`](Self::finish)ed.
pub struct ManagedIndexWriter {
    inner: tantivy::IndexWriter,
    acquired_at: Instant,
}

impl ManagedIndexWriter {
    pub(crate) fn new(inner: tantivy::IndexWriter) -> Self {
        ManagedIndexWriter {
            inner,
            acquired_at: Instant::now(),
        }
    }

    /// How long this writer has held the lock.
    pub fn held_for(&self) -> Duration {
        self.acquired_at.elapsed()
    }

    /// Wait for background merges and release the writer lock.
    pub fn finish(self) -> Result<()> {
        let held = self.held_for();
        self.inner.wait_merging_threads()?;
        tracing::trace!("[INDEX] writer released after {}ms", held.as_millis());
        Ok(())
    }
}

impl std::fmt::Debug for ManagedIndexWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedIndexWriter")
            .field("acquired_at", &self.acquired_at)
            .finish_non_exhaustive()
    }
}

impl Deref for ManagedIndexWriter {
    type Target = tantivy::IndexWriter;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl DerefMut for ManagedIndexWriter {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}
