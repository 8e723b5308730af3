use griddle::index::schema::{FieldOptions, Schema};
use griddle::{IndexManager, ManagerConfig, SearchQuery};
use std::sync::{Arc, Once};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

static TRACING: Once = Once::new();

/// Route logs to the test harness; `RUST_LOG` picks the level.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::registry()
            .with(tracing_subscriber::EnvFilter::new(
                std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".into()),
            ))
            .with(tracing_subscriber::fmt::layer().with_test_writer())
            .try_init();
    });
}

pub fn recipe_schema() -> Schema {
    Schema::builder()
        .add_text_field("title", FieldOptions::default())
        .add_text_field("category", FieldOptions::keyword())
        .add_float_field("price", FieldOptions::default())
        .add_integer_field("servings", FieldOptions::default())
        .add_date_field("published", FieldOptions::default())
        .build()
        .unwrap()
}

pub fn fast_config() -> ManagerConfig {
    ManagerConfig::default()
        .with_poll_interval(Duration::from_millis(10))
        .with_stop_timeout(Duration::from_secs(5))
}

/// In-memory manager with a running worker.
pub fn started_manager() -> Arc<IndexManager> {
    init_tracing();
    let manager = IndexManager::in_memory(recipe_schema(), fast_config()).unwrap();
    manager.start().unwrap();
    manager
}

#[allow(dead_code)]
pub fn count(manager: &IndexManager, query: &SearchQuery) -> usize {
    manager.search(query, None, &[], 100).unwrap().total
}

#[allow(dead_code)]
pub fn ids(hits: &griddle::Hits) -> Vec<i64> {
    hits.iter()
        .map(|h| h.document.id("id").unwrap())
        .collect()
}
