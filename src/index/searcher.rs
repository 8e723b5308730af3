use crate::error::Result;
use crate::index::Index;
use arc_swap::ArcSwap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tantivy::Searcher;

/// The single read snapshot shared by all searches.
///
/// Readers pin the current snapshot with [`load`](Self::load) and keep using
/// it even if it is replaced meanwhile. Replacement swaps the whole
/// snapshot; a snapshot is never modified.
pub struct SearcherCache {
    current: ArcSwap<Searcher>,
    generation: AtomicU64,
}

impl SearcherCache {
    pub fn new(searcher: Searcher) -> Self {
        SearcherCache {
            current: ArcSwap::from_pointee(searcher),
            generation: AtomicU64::new(0),
        }
    }

    /// Open the initial snapshot of `index`.
    pub fn open(index: &Index) -> Result<Self> {
        Ok(Self::new(index.open_searcher()?))
    }

    pub fn load(&self) -> Arc<Searcher> {
        self.current.load_full()
    }

    pub fn replace(&self, searcher: Searcher) {
        let docs = searcher.num_docs();
        self.current.store(Arc::new(searcher));
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!(
            "[SEARCHER] refreshed to generation {} ({} docs)",
            generation,
            docs
        );
    }

    /// Open a new snapshot of `index` and swap it in.
    pub fn refresh(&self, index: &Index) -> Result<()> {
        self.replace(index.open_searcher()?);
        Ok(())
    }

    /// Number of times the snapshot has been replaced.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::schema::Schema;
    use crate::types::Document;

    #[test]
    fn pinned_snapshot_survives_refresh() {
        let index = Index::create_in_ram(Schema::builder().build().unwrap()).unwrap();
        let cache = SearcherCache::open(&index).unwrap();
        let pinned = cache.load();

        index.upsert(&Document::new().with("id", 1i64)).unwrap();
        assert_eq!(cache.load().num_docs(), 0);

        cache.refresh(&index).unwrap();
        assert_eq!(cache.generation(), 1);
        assert_eq!(cache.load().num_docs(), 1);
        assert_eq!(pinned.num_docs(), 0);
    }
}
