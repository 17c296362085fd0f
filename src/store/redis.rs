//! Redis status store.
//!
//! Status and document are plain string keys (see the key table in the
//! parent module). Terminal writes go through a `MULTI/EXEC` pipeline so
//! both keys change together, and every write refreshes the expiry.

use std::sync::Mutex;
use std::time::Duration;

use ::redis::AsyncCommands;
use ::redis::aio::MultiplexedConnection;
use async_trait::async_trait;
use secrecy::ExposeSecret;
use tracing::debug;

use super::{KEYS_TTL, StatusStore, document_key, ensure_error_status, record_operation, status_key};
use crate::config::RedisConfig;
use crate::error::{Error, Result};
use crate::model::{ErrorRecord, TaskDocument, TaskId, TaskStatus};

const BACKEND: &str = "redis";

/// Redis-backed status store.
///
/// Holds a [`MultiplexedConnection`]; each operation works on a cheap clone
/// of it, so the store can be shared across workers.
pub struct RedisStore {
    conn: Mutex<Option<MultiplexedConnection>>,
    ttl: Duration,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore").field("ttl", &self.ttl).finish_non_exhaustive()
    }
}

impl RedisStore {
    /// Connect using the given configuration.
    ///
    /// With TLS enabled and a CA file configured, that bundle becomes the
    /// trust root.
    pub async fn connect(config: &RedisConfig) -> Result<Self> {
        config.validate()?;
        let url = config.connection_url();
        let tls = config.secure || config.url.starts_with("rediss://");

        let client = match config.ca_file {
            Some(ref path) if tls => {
                let root_cert = tokio::fs::read(path).await.map_err(|e| {
                    Error::Config(format!("cannot read redis CA file {}: {e}", path.display()))
                })?;
                ::redis::Client::build_with_tls(
                    url.expose_secret(),
                    ::redis::TlsCertificates {
                        client_tls: None,
                        root_cert: Some(root_cert),
                    },
                )?
            }
            _ => ::redis::Client::open(url.expose_secret())?,
        };

        let conn = client.get_multiplexed_async_connection().await?;
        Ok(Self::with_connection(conn))
    }

    /// Wrap an already established connection.
    pub fn with_connection(conn: MultiplexedConnection) -> Self {
        Self {
            conn: Mutex::new(Some(conn)),
            ttl: KEYS_TTL,
        }
    }

    /// Override the key expiry. Millisecond resolution, at least 1ms.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl.max(Duration::from_millis(1));
        self
    }

    /// Read the result or error document, if one is present.
    pub async fn get_document(&self, task_id: TaskId) -> Result<Option<TaskDocument>> {
        let mut conn = self.connection()?;
        let raw: Option<String> = conn.get(document_key(task_id)).await?;
        Ok(raw.as_deref().map(TaskDocument::from_json).transpose()?)
    }

    fn connection(&self) -> Result<MultiplexedConnection> {
        let guard = self
            .conn
            .lock()
            .map_err(|_| Error::Other("redis connection lock poisoned".to_string()))?;
        guard.clone().ok_or(Error::StoreClosed)
    }

    fn ttl_millis(&self) -> u64 {
        u64::try_from(self.ttl.as_millis()).unwrap_or(u64::MAX)
    }

    async fn write_terminal(
        &self,
        task_id: TaskId,
        status: TaskStatus,
        document: &TaskDocument,
    ) -> Result<()> {
        let document = document.to_json()?;
        let ttl = self.ttl_millis();
        let mut conn = self.connection()?;

        let () = ::redis::pipe()
            .atomic()
            .pset_ex(status_key(task_id), status.as_str(), ttl)
            .ignore()
            .pset_ex(document_key(task_id), document, ttl)
            .ignore()
            .query_async(&mut conn)
            .await?;

        debug!(task_id = %task_id, status = %status, "terminal status written");
        Ok(())
    }
}

#[async_trait]
impl StatusStore for RedisStore {
    async fn get_status(&self, task_id: TaskId) -> Result<Option<TaskStatus>> {
        let result: Result<Option<TaskStatus>> = async {
            let mut conn = self.connection()?;
            let raw: Option<String> = conn.get(status_key(task_id)).await?;
            raw.map(|s| s.parse::<TaskStatus>()).transpose()
        }
        .await;
        record_operation(BACKEND, "get_status", &result);
        result
    }

    async fn save_status(&self, task_id: TaskId, status: TaskStatus) -> Result<()> {
        let result: Result<()> = async {
            let mut conn = self.connection()?;
            let () = conn
                .pset_ex(status_key(task_id), status.as_str(), self.ttl_millis())
                .await?;
            Ok(())
        }
        .await;
        record_operation(BACKEND, "save_status", &result);
        result
    }

    async fn save_result(&self, task_id: TaskId, requirements: &[String]) -> Result<()> {
        let result = self
            .write_terminal(task_id, TaskStatus::Success, &TaskDocument::success(requirements))
            .await;
        record_operation(BACKEND, "save_result", &result);
        result
    }

    async fn save_error(
        &self,
        task_id: TaskId,
        status: TaskStatus,
        error: ErrorRecord,
    ) -> Result<()> {
        let result = match ensure_error_status(status) {
            Ok(()) => {
                self.write_terminal(task_id, status, &TaskDocument::failure(error))
                    .await
            }
            Err(e) => Err(e),
        };
        record_operation(BACKEND, "save_error", &result);
        result
    }

    async fn close(&self) -> Result<()> {
        let mut guard = self
            .conn
            .lock()
            .map_err(|_| Error::Other("redis connection lock poisoned".to_string()))?;
        if guard.take().is_some() {
            debug!("redis status store closed");
        }
        Ok(())
    }
}
