pub mod config;
pub mod document;
pub mod job;
pub mod manager;
pub mod schema;
pub mod searcher;
pub mod write_queue;
pub mod writer;

use crate::error::{GriddleError, Result};
use crate::types::{Document, FieldValue};
use config::ManagerConfig;
use document::DocumentConverter;
use schema::Schema;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tantivy::directory::error::LockError;
use tantivy::directory::{Directory, INDEX_WRITER_LOCK};
use tantivy::{Index as TantivyIndex, TantivyDocument, TantivyError};
pub use writer::ManagedIndexWriter;

const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// Where an [`Index`] keeps its files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexLocation {
    Directory(PathBuf),
    Memory,
}

/// A handle to a single Tantivy index, on disk or in memory.
///
/// Mutations go through a [`ManagedIndexWriter`] obtained from
/// [`Index::acquire_writer`], which waits for the exclusive writer lock.
/// The convenience methods ([`Index::upsert`], [`Index::remove_by_id`],
/// [`Index::optimize`]) each acquire a writer, commit, and release it.
///
/// Reads use snapshots from [`Index::open_searcher`]; a snapshot never
/// changes after it is opened.
///
/// # Examples
///
/// ```rust,no_run
/// use griddle::index::schema::{FieldOptions, Schema};
/// use griddle::index::Index;
/// use griddle::types::Document;
///
/// # fn main() -> griddle::Result<()> {
/// let schema = Schema::builder()
///     .add_text_field("title", FieldOptions::default())
///     .build()?;
/// let index = Index::create_in_ram(schema)?;
/// index.upsert(&Document::new().with("id", 1i64).with("title", "Hello"))?;
/// assert_eq!(index.size()?, 1);
/// # Ok(())
/// # }
/// ```
pub struct Index {
    inner: TantivyIndex,
    reader: tantivy::IndexReader,
    schema: Schema,
    converter: Arc<DocumentConverter>,
    location: IndexLocation,
    writer_heap_bytes: usize,
    lock_timeout: Duration,
}

impl Index {
    /// Create a new index at `path`.
    ///
    /// Creates the directory (and parents) if it does not exist.
    pub fn create_in_dir<P: AsRef<Path>>(path: P, schema: Schema) -> Result<Self> {
        std::fs::create_dir_all(path.as_ref())?;
        let inner = TantivyIndex::create_in_dir(path.as_ref(), schema.to_tantivy())?;
        tracing::info!("[INDEX] created index at {}", path.as_ref().display());
        Self::from_parts(
            inner,
            schema,
            IndexLocation::Directory(path.as_ref().to_path_buf()),
        )
    }

    /// Create a new index held entirely in memory.
    pub fn create_in_ram(schema: Schema) -> Result<Self> {
        let inner = TantivyIndex::create_in_ram(schema.to_tantivy());
        Self::from_parts(inner, schema, IndexLocation::Memory)
    }

    /// Open an existing index at `path` whose identifier field is `id_field`.
    pub fn open_in_dir<P: AsRef<Path>>(path: P, id_field: &str) -> Result<Self> {
        let inner = TantivyIndex::open_in_dir(path.as_ref())?;
        let schema = Schema::from_tantivy(&inner.schema(), id_field)?;
        tracing::info!("[INDEX] opened index at {}", path.as_ref().display());
        Self::from_parts(
            inner,
            schema,
            IndexLocation::Directory(path.as_ref().to_path_buf()),
        )
    }

    /// Open the index at `path`, creating it with `schema` if absent.
    ///
    /// An existing index keeps its own schema.
    pub fn open_or_create<P: AsRef<Path>>(path: P, schema: Schema) -> Result<Self> {
        if path.as_ref().join("meta.json").exists() {
            Self::open_in_dir(path, schema.id_field())
        } else {
            Self::create_in_dir(path, schema)
        }
    }

    fn from_parts(inner: TantivyIndex, schema: Schema, location: IndexLocation) -> Result<Self> {
        let reader = inner
            .reader_builder()
            .reload_policy(tantivy::ReloadPolicy::Manual)
            .try_into()?;
        let converter = Arc::new(DocumentConverter::new(&schema, &inner.schema())?);
        let defaults = ManagerConfig::default();
        Ok(Index {
            inner,
            reader,
            schema,
            converter,
            location,
            writer_heap_bytes: defaults.writer_heap_bytes,
            lock_timeout: defaults.lock_timeout,
        })
    }

    /// Apply the writer heap size and lock timeout from `config`.
    pub fn configured(mut self, config: &ManagerConfig) -> Self {
        self.writer_heap_bytes = config.writer_heap_bytes;
        self.lock_timeout = config.lock_timeout;
        self
    }

    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    pub fn location(&self) -> &IndexLocation {
        &self.location
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Access the underlying Tantivy index.
    pub fn inner(&self) -> &TantivyIndex {
        &self.inner
    }

    pub fn converter(&self) -> Arc<DocumentConverter> {
        Arc::clone(&self.converter)
    }

    /// Whether some writer currently holds the exclusive writer lock.
    pub fn is_locked(&self) -> bool {
        match self.inner.directory().acquire_lock(&INDEX_WRITER_LOCK) {
            Ok(_probe) => false,
            Err(LockError::LockBusy) => true,
            Err(e) => {
                tracing::warn!("[INDEX] writer lock probe failed: {}", e);
                true
            }
        }
    }

    /// Acquire the exclusive writer, retrying while another writer holds the
    /// lock.
    ///
    /// # Errors
    ///
    /// [`GriddleError::IndexLocked`] once the lock timeout has elapsed.
    pub fn acquire_writer(&self) -> Result<ManagedIndexWriter> {
        let started = Instant::now();
        loop {
            match self
                .inner
                .writer_with_num_threads(1, self.writer_heap_bytes)
            {
                Ok(writer) => return Ok(ManagedIndexWriter::new(writer)),
                Err(TantivyError::LockFailure(LockError::LockBusy, _)) => {
                    let waited = started.elapsed();
                    if waited >= self.lock_timeout {
                        tracing::warn!(
                            "[INDEX] gave up on writer lock after {}ms",
                            waited.as_millis()
                        );
                        return Err(GriddleError::IndexLocked {
                            waited_ms: waited.as_millis() as u64,
                        });
                    }
                    std::thread::sleep(LOCK_RETRY_INTERVAL);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Add a document through an explicit writer. Caller commits.
    pub fn add_document(&self, writer: &mut ManagedIndexWriter, doc: &Document) -> Result<()> {
        let tantivy_doc = self.converter.to_tantivy(doc)?;
        writer.add_document(tantivy_doc)?;
        Ok(())
    }

    /// Delete every document whose `field` equals `value`. Caller commits.
    pub fn remove_documents(
        &self,
        writer: &mut ManagedIndexWriter,
        field: &str,
        value: &FieldValue,
    ) -> Result<()> {
        let term = self.converter.term(field, value)?;
        writer.delete_term(term);
        Ok(())
    }

    /// Replace every document sharing `doc`'s identifier with `doc`.
    pub fn upsert(&self, doc: &Document) -> Result<()> {
        let id_field = self.schema.id_field();
        let id = doc
            .id(id_field)
            .ok_or_else(|| GriddleError::MissingField(id_field.to_string()))?;
        let tantivy_doc = self.converter.to_tantivy(doc)?;
        self.upsert_prepared(id, tantivy_doc)
    }

    /// Upsert a document that has already been validated and converted.
    pub(crate) fn upsert_prepared(&self, id: i64, tantivy_doc: TantivyDocument) -> Result<()> {
        let mut writer = self.acquire_writer()?;
        writer.delete_term(tantivy::Term::from_field_i64(self.converter.id_field(), id));
        writer.add_document(tantivy_doc)?;
        writer.commit()?;
        writer.finish()
    }

    /// Delete every document with identifier `id` and commit.
    pub fn remove_by_id(&self, id: i64) -> Result<()> {
        let mut writer = self.acquire_writer()?;
        writer.delete_term(tantivy::Term::from_field_i64(self.converter.id_field(), id));
        writer.commit()?;
        writer.finish()
    }

    /// Merge all searchable segments into one and delete stale files.
    pub fn optimize(&self) -> Result<()> {
        let segment_ids = self.inner.searchable_segment_ids()?;
        let mut writer = self.acquire_writer()?;

        if segment_ids.len() > 1 {
            tracing::debug!("[INDEX] merging {} segments", segment_ids.len());
            writer
                .merge(&segment_ids)
                .wait()
                .map_err(|e| GriddleError::Tantivy(e.to_string()))?;
        }

        let gc = writer
            .garbage_collect_files()
            .wait()
            .map_err(|e| GriddleError::Tantivy(e.to_string()))?;
        tracing::debug!(
            "[INDEX] optimize done, gc removed {} files",
            gc.deleted_files.len()
        );
        writer.finish()
    }

    /// Number of live documents in the latest committed state.
    pub fn size(&self) -> Result<u64> {
        Ok(self.open_searcher()?.num_docs())
    }

    /// Open a fresh read-only snapshot of the latest committed state.
    pub fn open_searcher(&self) -> Result<tantivy::Searcher> {
        self.reader.reload()?;
        Ok(self.reader.searcher())
    }

    /// Load the stored fields of a hit.
    pub fn load_document(
        &self,
        searcher: &tantivy::Searcher,
        address: tantivy::DocAddress,
    ) -> Result<Document> {
        let doc: TantivyDocument = searcher.doc(address)?;
        Ok(self.converter.from_tantivy(&doc))
    }
}
