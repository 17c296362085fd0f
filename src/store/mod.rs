//! Status store: task status plus result/error document, keyed by task ID.
//!
//! Two key spaces per task: a small status value that callers poll cheaply,
//! and the (potentially larger) result or error document. Terminal writes
//! set both together so a reader never sees SUCCESS without its result.
//!
//! | Key | Value |
//! |-----|-------|
//! | `status:{task_id}` | status text, e.g. `PENDING` |
//! | `{task_id}` | `{"requirements": [...]}` or `{"error": {...}}` |

pub mod memory;
pub mod redis;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use opentelemetry::KeyValue;
use tracing::{info, warn};

use crate::config::StoreConfig;
use crate::error::{Error, Result};
use crate::model::{ErrorRecord, TaskId, TaskStatus};
use crate::telemetry::metrics;

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

/// Expiry applied to both keys on every write to a networked backend.
pub const KEYS_TTL: Duration = Duration::from_secs(12 * 60 * 60);

/// The contract every status store backend implements.
#[async_trait]
pub trait StatusStore: Send + Sync {
    /// Current status, or `None` if there is no entry or it expired.
    async fn get_status(&self, task_id: TaskId) -> Result<Option<TaskStatus>>;

    /// Unconditionally overwrite the status.
    async fn save_status(&self, task_id: TaskId, status: TaskStatus) -> Result<()>;

    /// Set SUCCESS and store the result document as one unit.
    async fn save_result(&self, task_id: TaskId, requirements: &[String]) -> Result<()>;

    /// Set an error status and store the error document as one unit.
    ///
    /// `status` must be CLIENT_ERROR or SERVER_ERROR.
    async fn save_error(&self, task_id: TaskId, status: TaskStatus, error: ErrorRecord)
    -> Result<()>;

    /// Release underlying resources. Idempotent.
    async fn close(&self) -> Result<()>;
}

/// Key holding the status text.
pub fn status_key(task_id: TaskId) -> String {
    format!("status:{task_id}")
}

/// Key holding the result or error document.
pub fn document_key(task_id: TaskId) -> String {
    task_id.to_string()
}

/// Open the backend selected by configuration.
pub async fn connect(config: &StoreConfig) -> Result<Arc<dyn StatusStore>> {
    match config {
        StoreConfig::Memory => {
            warn!("using in-memory status store; task state will not survive restarts");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreConfig::Redis(redis) => {
            let store = RedisStore::connect(redis).await?;
            info!(secure = redis.secure, "connected to redis status store");
            Ok(Arc::new(store))
        }
    }
}

pub(crate) fn ensure_error_status(status: TaskStatus) -> Result<()> {
    if status.is_error() {
        Ok(())
    } else {
        Err(Error::InvalidStatus {
            status,
            reason: "error documents require CLIENT_ERROR or SERVER_ERROR".to_string(),
        })
    }
}

pub(crate) fn record_operation<T>(backend: &'static str, operation: &'static str, result: &Result<T>) {
    metrics::store_operations().add(
        1,
        &[
            KeyValue::new("backend", backend),
            KeyValue::new("operation", operation),
            KeyValue::new("result", if result.is_ok() { "ok" } else { "error" }),
        ],
    );
}
