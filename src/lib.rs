//! # Griddle
//!
//! An asynchronous update coordinator for a single full-text index. Built on
//! [Tantivy](https://github.com/quickwit-oss/tantivy).
//!
//! Request handlers on any thread queue document adds, removals and
//! optimizations; one background worker applies them in order, retries the
//! ones that fail, and publishes a fresh searcher snapshot each time the
//! queue drains. Searches read that snapshot without ever waiting on
//! writes.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use griddle::index::schema::{FieldOptions, Schema};
//! use griddle::{IndexManager, ManagerConfig, SearchQuery};
//! use serde_json::json;
//! use std::time::Duration;
//!
//! # #[tokio::main]
//! # async fn main() -> griddle::Result<()> {
//! let schema = Schema::builder()
//!     .add_text_field("title", FieldOptions::default())
//!     .add_float_field("price", FieldOptions::default())
//!     .build()?;
//! let manager = IndexManager::in_memory(schema, ManagerConfig::from_env())?;
//! manager.start()?;
//!
//! manager.add_json(&json!({"id": 1, "title": "Buttermilk pancakes", "price": 4.5}));
//! manager.add_json(&json!({"id": 2, "title": "Waffles", "price": 6.0}));
//! manager.wait_for_drain(Duration::from_secs(5)).await;
//!
//! let hits = manager.search(&SearchQuery::text("pancakes"), None, &[], 10)?;
//! println!("Found {} hits", hits.total);
//! manager.stop().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Rebuilding
//!
//! [`IndexManager::rebuild`] holds queued jobs back while a closure rewrites
//! the index directly; everything queued in the meantime is applied
//! afterwards.

pub mod error;
pub mod index;
pub mod query;
pub mod types;

pub use error::{GriddleError, Result};
pub use index::config::ManagerConfig;
pub use index::job::{Job, JobKind};
pub use index::manager::{IndexManager, IndexStatus};
pub use index::write_queue::StatsSnapshot;
pub use index::{Index, ManagedIndexWriter};
pub use query::{QueryExecutor, SearchQuery};
pub use types::*;
