mod common;

use common::{count, fast_config, init_tracing, recipe_schema, DRAIN_TIMEOUT};
use griddle::index::schema::{FieldOptions, Schema};
use griddle::{Document, GriddleError, Index, IndexManager, SearchQuery};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn recipe(id: i64, title: &str) -> Document {
    Document::new().with("id", id).with("title", title)
}

// ============================================================
// ON-DISK INDEXES
// ============================================================

mod on_disk {
    use super::*;

    #[tokio::test(flavor = "multi_thread")]
    async fn documents_survive_reopen() {
        init_tracing();
        let tmp = TempDir::new().unwrap();
        {
            let manager =
                IndexManager::open_in_dir(tmp.path(), recipe_schema(), fast_config()).unwrap();
            manager.start().unwrap();
            for id in 0..10 {
                assert!(manager.add(recipe(id, "Persisted")));
            }
            assert!(manager.wait_for_drain(DRAIN_TIMEOUT).await);
            assert!(manager.stop().await);
        }

        let reopened =
            IndexManager::open_in_dir(tmp.path(), recipe_schema(), fast_config()).unwrap();
        assert_eq!(count(&reopened, &SearchQuery::All), 10);
        assert_eq!(count(&reopened, &SearchQuery::text("persisted")), 10);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn existing_index_keeps_its_schema() {
        let tmp = TempDir::new().unwrap();
        {
            let index = Index::create_in_dir(tmp.path(), recipe_schema()).unwrap();
            index.upsert(&recipe(1, "Original")).unwrap();
        }

        let other = Schema::builder()
            .add_text_field("name", FieldOptions::default())
            .build()
            .unwrap();
        let manager = IndexManager::open_in_dir(tmp.path(), other, fast_config()).unwrap();
        let schema = manager.index().schema();
        assert!(schema.get_field("title").is_some());
        assert!(schema.get_field("name").is_none());
        assert_eq!(count(&manager, &SearchQuery::All), 1);
    }

    #[test]
    fn opening_without_id_field_fails() {
        let tmp = TempDir::new().unwrap();
        Index::create_in_dir(tmp.path(), recipe_schema()).unwrap();
        let err = Index::open_in_dir(tmp.path(), "sku").err().unwrap();
        assert!(matches!(err, GriddleError::InvalidSchema(_)));
    }
}

// ============================================================
// WRITER LOCK
// ============================================================

mod writer_lock {
    use super::*;

    #[tokio::test(flavor = "multi_thread")]
    async fn locked_index_fails_jobs_until_released() {
        init_tracing();
        let config = fast_config()
            .with_max_tries(2)
            .with_lock_timeout(Duration::from_millis(200));
        let manager = IndexManager::in_memory(recipe_schema(), config).unwrap();
        manager.start().unwrap();

        let held = manager.index().acquire_writer().unwrap();
        assert!(manager.index().is_locked());
        assert!(manager.add(recipe(1, "Blocked")));
        assert!(manager.wait_for_drain(DRAIN_TIMEOUT).await);
        assert_eq!(manager.stats().dropped, 1);
        assert_eq!(manager.index().size().unwrap(), 0);

        held.finish().unwrap();
        assert!(!manager.index().is_locked());
        assert!(manager.add(recipe(2, "Free")));
        assert!(manager.wait_for_drain(DRAIN_TIMEOUT).await);
        assert_eq!(count(&manager, &SearchQuery::All), 1);
        assert!(manager.stop().await);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn job_waits_for_short_lived_lock() {
        let config = fast_config().with_lock_timeout(Duration::from_secs(5));
        let manager = IndexManager::in_memory(recipe_schema(), config).unwrap();
        manager.start().unwrap();

        let held = manager.index().acquire_writer().unwrap();
        assert!(manager.add(recipe(1, "Patient")));
        tokio::time::sleep(Duration::from_millis(300)).await;
        held.finish().unwrap();

        assert!(manager.wait_for_drain(DRAIN_TIMEOUT).await);
        assert_eq!(count(&manager, &SearchQuery::All), 1);
        assert_eq!(manager.stats().retried, 0);
        assert!(manager.stop().await);
    }
}

// ============================================================
// INDEX HANDLE
// ============================================================

mod handle {
    use super::*;

    #[test]
    fn explicit_writer_batches_changes() {
        let index = Index::create_in_ram(recipe_schema()).unwrap();
        let mut writer = index.acquire_writer().unwrap();
        for id in 0..3 {
            index.add_document(&mut writer, &recipe(id, "Batch")).unwrap();
        }
        writer.commit().unwrap();
        assert_eq!(index.size().unwrap(), 3);

        index
            .remove_documents(&mut writer, "title", &"batch".into())
            .unwrap();
        writer.commit().unwrap();
        writer.finish().unwrap();
        assert_eq!(index.size().unwrap(), 0);
    }

    #[test]
    fn add_document_validates_against_schema() {
        let index = Index::create_in_ram(recipe_schema()).unwrap();
        let mut writer = index.acquire_writer().unwrap();
        let err = index
            .add_document(&mut writer, &Document::new().with("id", 1i64).with("chef", "Remy"))
            .unwrap_err();
        assert!(matches!(err, GriddleError::FieldNotFound(_)));

        let err = index
            .add_document(&mut writer, &Document::new().with("title", "No id"))
            .unwrap_err();
        assert!(matches!(err, GriddleError::MissingField(_)));
        writer.finish().unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn manager_shares_index_with_direct_callers() {
        let index = Arc::new(Index::create_in_ram(recipe_schema()).unwrap());
        let manager = IndexManager::new(Arc::clone(&index), fast_config()).unwrap();
        manager.start().unwrap();

        assert!(manager.add_json(&json!({"id": 42, "title": "Shared"})));
        assert!(manager.wait_for_drain(DRAIN_TIMEOUT).await);
        assert_eq!(index.size().unwrap(), 1);
        assert!(Arc::ptr_eq(&index, manager.index()));
        assert!(manager.stop().await);
    }
}
