//! In-process status store.
//!
//! Status and document live in one [`DashMap`] entry per task, so a terminal
//! write replaces both under the same shard lock. No expiry: entries live
//! until [`close`](StatusStore::close) or process exit.

use async_trait::async_trait;
use dashmap::DashMap;

use super::{StatusStore, ensure_error_status, record_operation};
use crate::error::Result;
use crate::model::{ErrorRecord, TaskDocument, TaskId, TaskStatus};

const BACKEND: &str = "memory";

#[derive(Debug, Clone)]
struct Entry {
    status: TaskStatus,
    /// Serialized [`TaskDocument`], as the networked backend stores it.
    document: Option<String>,
}

/// Thread-safe in-memory status store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<TaskId, Entry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with statuses.
    pub fn with_statuses(statuses: impl IntoIterator<Item = (TaskId, TaskStatus)>) -> Self {
        let entries = statuses
            .into_iter()
            .map(|(id, status)| {
                (
                    id,
                    Entry {
                        status,
                        document: None,
                    },
                )
            })
            .collect();
        Self { entries }
    }

    /// Read the result or error document, if one was written.
    pub fn get_document(&self, task_id: TaskId) -> Result<Option<TaskDocument>> {
        let raw = self
            .entries
            .get(&task_id)
            .and_then(|entry| entry.document.clone());
        Ok(raw.as_deref().map(TaskDocument::from_json).transpose()?)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn write_terminal(&self, task_id: TaskId, status: TaskStatus, document: &TaskDocument) -> Result<()> {
        let document = document.to_json()?;
        self.entries.insert(
            task_id,
            Entry {
                status,
                document: Some(document),
            },
        );
        Ok(())
    }
}

#[async_trait]
impl StatusStore for MemoryStore {
    async fn get_status(&self, task_id: TaskId) -> Result<Option<TaskStatus>> {
        let result = Ok(self.entries.get(&task_id).map(|entry| entry.status));
        record_operation(BACKEND, "get_status", &result);
        result
    }

    async fn save_status(&self, task_id: TaskId, status: TaskStatus) -> Result<()> {
        self.entries
            .entry(task_id)
            .and_modify(|entry| entry.status = status)
            .or_insert(Entry {
                status,
                document: None,
            });
        let result = Ok(());
        record_operation(BACKEND, "save_status", &result);
        result
    }

    async fn save_result(&self, task_id: TaskId, requirements: &[String]) -> Result<()> {
        let result = self.write_terminal(
            task_id,
            TaskStatus::Success,
            &TaskDocument::success(requirements),
        );
        record_operation(BACKEND, "save_result", &result);
        result
    }

    async fn save_error(
        &self,
        task_id: TaskId,
        status: TaskStatus,
        error: ErrorRecord,
    ) -> Result<()> {
        let result = ensure_error_status(status)
            .and_then(|()| self.write_terminal(task_id, status, &TaskDocument::failure(error)));
        record_operation(BACKEND, "save_error", &result);
        result
    }

    async fn close(&self) -> Result<()> {
        self.entries.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::model::{INTERNAL_ERROR, VALIDATION_ERROR};
    use serde_json::json;

    #[tokio::test]
    async fn missing_task_has_no_status() {
        let store = MemoryStore::new();
        assert_eq!(store.get_status(TaskId::new()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn save_status_keeps_existing_document() {
        let id = TaskId::new();
        let store = MemoryStore::new();
        store.save_result(id, &["a".to_string()]).await.unwrap();
        store.save_status(id, TaskStatus::Cancelled).await.unwrap();

        assert_eq!(store.get_status(id).await.unwrap(), Some(TaskStatus::Cancelled));
        assert!(store.get_document(id).unwrap().is_some());
    }

    #[tokio::test]
    async fn last_terminal_write_wins() {
        let id = TaskId::new();
        let store = MemoryStore::with_statuses([(id, TaskStatus::Pending)]);

        store
            .save_error(
                id,
                TaskStatus::ClientError,
                ErrorRecord::new(VALIDATION_ERROR, "bad").with_details(json!([{"loc": ["x"]}])),
            )
            .await
            .unwrap();
        store
            .save_error(
                id,
                TaskStatus::ServerError,
                ErrorRecord::new(INTERNAL_ERROR, "boom"),
            )
            .await
            .unwrap();

        assert_eq!(store.get_status(id).await.unwrap(), Some(TaskStatus::ServerError));
        assert_eq!(
            store.get_document(id).unwrap(),
            Some(TaskDocument::failure(ErrorRecord::new(INTERNAL_ERROR, "boom")))
        );
    }

    #[tokio::test]
    async fn rejected_error_status_writes_nothing() {
        let id = TaskId::new();
        let store = MemoryStore::with_statuses([(id, TaskStatus::Pending)]);

        let err = store
            .save_error(id, TaskStatus::Success, ErrorRecord::new(INTERNAL_ERROR, "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidStatus { .. }));
        assert_eq!(store.get_status(id).await.unwrap(), Some(TaskStatus::Pending));
        assert_eq!(store.get_document(id).unwrap(), None);
    }

    #[tokio::test]
    async fn close_clears_and_is_idempotent() {
        let id = TaskId::new();
        let store = MemoryStore::with_statuses([(id, TaskStatus::Pending)]);
        store.close().await.unwrap();
        store.close().await.unwrap();
        assert!(store.is_empty());
        assert_eq!(store.get_status(id).await.unwrap(), None);
    }
}
