//! Status store contract. Redis tests need a live server:
//! `REDIS_URL=redis://127.0.0.1:6379 cargo test -- --ignored`

use std::time::Duration;

use serde_json::json;
use taskpipe::config::RedisConfig;
use taskpipe::error::Error;
use taskpipe::model::{ErrorRecord, INTERNAL_ERROR, TaskDocument, TaskId, TaskStatus, VALIDATION_ERROR};
use taskpipe::store::{MemoryStore, RedisStore, StatusStore};

async fn redis_store() -> RedisStore {
    let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
    RedisStore::connect(&RedisConfig::new(url)).await.unwrap()
}

#[tokio::test]
async fn memory_store_status_and_result_change_together() {
    let id = TaskId::new();
    let store = MemoryStore::with_statuses([(id, TaskStatus::Pending)]);

    store
        .save_result(id, &["req-1".to_string(), "req-2".to_string()])
        .await
        .unwrap();

    assert_eq!(store.get_status(id).await.unwrap(), Some(TaskStatus::Success));
    assert_eq!(
        store.get_document(id).unwrap(),
        Some(TaskDocument::success(&["req-1".to_string(), "req-2".to_string()]))
    );
}

#[tokio::test]
async fn memory_store_result_then_error_keeps_only_the_error() {
    let id = TaskId::new();
    let store = MemoryStore::new();

    store.save_result(id, &["req-1".to_string()]).await.unwrap();
    store
        .save_error(id, TaskStatus::ServerError, ErrorRecord::new(INTERNAL_ERROR, "boom"))
        .await
        .unwrap();

    assert_eq!(store.get_status(id).await.unwrap(), Some(TaskStatus::ServerError));
    assert_eq!(
        store.get_document(id).unwrap(),
        Some(TaskDocument::failure(ErrorRecord::new(INTERNAL_ERROR, "boom")))
    );
}

#[tokio::test]
async fn memory_store_close_forgets_everything() {
    let id = TaskId::new();
    let store = MemoryStore::with_statuses([(id, TaskStatus::Pending)]);
    store.close().await.unwrap();
    store.close().await.unwrap();
    assert_eq!(store.get_status(id).await.unwrap(), None);
    assert!(store.is_empty());
}

#[tokio::test]
#[ignore] // Requires running Redis
async fn redis_terminal_write_sets_both_keys() {
    let store = redis_store().await;
    let id = TaskId::new();

    store.save_status(id, TaskStatus::Pending).await.unwrap();
    assert_eq!(store.get_status(id).await.unwrap(), Some(TaskStatus::Pending));
    assert_eq!(store.get_document(id).await.unwrap(), None);

    store.save_result(id, &["req-1".to_string()]).await.unwrap();
    assert_eq!(store.get_status(id).await.unwrap(), Some(TaskStatus::Success));
    assert_eq!(
        store.get_document(id).await.unwrap(),
        Some(TaskDocument::success(&["req-1".to_string()]))
    );
}

#[tokio::test]
#[ignore] // Requires running Redis
async fn redis_last_error_write_wins() {
    let store = redis_store().await;
    let id = TaskId::new();

    store
        .save_error(
            id,
            TaskStatus::ClientError,
            ErrorRecord::new(VALIDATION_ERROR, "request does not match request schema")
                .with_details(json!([{"loc": ["x"], "msg": "field required", "type": "value_error.missing"}])),
        )
        .await
        .unwrap();
    store
        .save_error(id, TaskStatus::ServerError, ErrorRecord::new(INTERNAL_ERROR, "failed to process task"))
        .await
        .unwrap();

    assert_eq!(store.get_status(id).await.unwrap(), Some(TaskStatus::ServerError));
    assert_eq!(
        store.get_document(id).await.unwrap(),
        Some(TaskDocument::failure(ErrorRecord::new(INTERNAL_ERROR, "failed to process task")))
    );
}

#[tokio::test]
#[ignore] // Requires running Redis
async fn redis_rejects_non_error_status_for_error_document() {
    let store = redis_store().await;
    let id = TaskId::new();

    let err = store
        .save_error(id, TaskStatus::Cancelled, ErrorRecord::new(INTERNAL_ERROR, "x"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidStatus { .. }));
    assert_eq!(store.get_status(id).await.unwrap(), None);
}

#[tokio::test]
#[ignore] // Requires running Redis
async fn redis_entries_expire() {
    let store = redis_store().await.with_ttl(Duration::from_millis(200));
    let id = TaskId::new();

    store.save_result(id, &["req-1".to_string()]).await.unwrap();
    assert_eq!(store.get_status(id).await.unwrap(), Some(TaskStatus::Success));

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(store.get_status(id).await.unwrap(), None);
    assert_eq!(store.get_document(id).await.unwrap(), None);
}

#[tokio::test]
#[ignore] // Requires running Redis
async fn redis_operations_fail_after_close() {
    let store = redis_store().await;
    store.close().await.unwrap();
    store.close().await.unwrap();

    let err = store.get_status(TaskId::new()).await.unwrap_err();
    assert!(matches!(err, Error::StoreClosed));
}
