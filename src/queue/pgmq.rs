//! Postgres queue source via pgmq and direct SQLx.
//!
//! Calls pgmq's SQL functions: pgmq.create, pgmq.send, pgmq.read,
//! pgmq.archive. Each message carries one task:
//!
//! ```json
//! {"task_id": "6f1c2a1e-8d0b-4b7e-9f51-2f7b0c9d4a11", "payload": {"test_field_name": "world"}}
//! ```
//!
//! The task's raw payload is the compact JSON encoding of `payload`.

use std::time::Duration;

use async_trait::async_trait;
use opentelemetry::KeyValue;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::{debug, warn};

use super::{Delivery, TaskSource};
use crate::config::QueueConfig;
use crate::error::{Error, Result};
use crate::model::{Task, TaskId};
use crate::telemetry::metrics;

/// Upper bound on the wait between retries after failed reads.
const MAX_RETRY_BACKOFF: Duration = Duration::from_secs(30);

/// A message read from a pgmq queue.
#[derive(Debug, Clone)]
pub struct PgmqMessage {
    pub msg_id: i64,
    pub read_ct: i32,
    pub enqueued_at: chrono::DateTime<chrono::Utc>,
    pub message: serde_json::Value,
}

/// Wire shape of a queued task.
#[derive(Debug, Serialize, Deserialize)]
struct TaskMessage {
    task_id: TaskId,
    payload: serde_json::Value,
}

/// pgmq-backed queue. Owns its connection pool.
pub struct PgmqQueue {
    pool: PgPool,
    queue_name: String,
    visibility_timeout: i32,
    poll_interval: Duration,
}

impl PgmqQueue {
    /// Connect to Postgres and create a connection pool.
    pub async fn connect(config: &QueueConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(config.database_url.expose_secret())
            .await?;
        Ok(Self::with_pool(pool, config))
    }

    /// Use an existing pool. `config.database_url` is ignored.
    pub fn with_pool(pool: PgPool, config: &QueueConfig) -> Self {
        Self {
            pool,
            queue_name: config.queue_name.clone(),
            visibility_timeout: config.visibility_timeout,
            poll_interval: config.poll_interval,
        }
    }

    /// Run all pending migrations (installs the pgmq extension).
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Other(format!("migration failed: {e}")))?;
        Ok(())
    }

    /// Simple health check: run a SELECT 1.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    /// Create the queue (idempotent).
    pub async fn create_queue(&self) -> Result<()> {
        sqlx::query("SELECT pgmq.create($1)")
            .bind(&self.queue_name)
            .execute(&self.pool)
            .await?;
        self.count("create");
        Ok(())
    }

    /// Enqueue a task. Returns the message ID.
    /// delay_seconds: 0 for immediate, >0 for delayed delivery.
    pub async fn send(
        &self,
        task_id: TaskId,
        payload: serde_json::Value,
        delay_seconds: i32,
    ) -> Result<i64> {
        let message = serde_json::to_value(TaskMessage { task_id, payload })?;
        let row: (i64,) = sqlx::query_as("SELECT pgmq.send($1, $2, $3)")
            .bind(&self.queue_name)
            .bind(&message)
            .bind(delay_seconds)
            .fetch_one(&self.pool)
            .await?;
        self.count("send");
        Ok(row.0)
    }

    /// Read the next visible message. Returns None if the queue is empty.
    pub async fn read(&self) -> Result<Option<PgmqMessage>> {
        let row = sqlx::query_as::<_, (i64, i32, chrono::DateTime<chrono::Utc>, serde_json::Value)>(
            "SELECT msg_id, read_ct, enqueued_at, message FROM pgmq.read($1, $2, 1)",
        )
        .bind(&self.queue_name)
        .bind(self.visibility_timeout)
        .fetch_optional(&self.pool)
        .await?;

        let msg = row.map(|(msg_id, read_ct, enqueued_at, message)| PgmqMessage {
            msg_id,
            read_ct,
            enqueued_at,
            message,
        });
        self.count(if msg.is_some() { "read" } else { "read_empty" });
        Ok(msg)
    }

    /// Archive a message (moves it to the archive table, kept for audit).
    pub async fn archive(&self, msg_id: i64) -> Result<()> {
        sqlx::query("SELECT pgmq.archive($1, $2)")
            .bind(&self.queue_name)
            .bind(msg_id)
            .execute(&self.pool)
            .await?;
        self.count("archive");
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Wait before the next attempt after `failures` failed reads in a row:
    /// the poll interval, doubled per failure, capped.
    fn retry_backoff(&self, failures: u32) -> Duration {
        let base = self.poll_interval.max(Duration::from_millis(10));
        base.saturating_mul(1u32 << failures.saturating_sub(1).min(10))
            .min(MAX_RETRY_BACKOFF)
    }

    fn count(&self, operation: &'static str) {
        metrics::queue_operations().add(
            1,
            &[
                KeyValue::new("queue", self.queue_name.clone()),
                KeyValue::new("operation", operation),
            ],
        );
    }
}

/// Faults that reconnecting cannot fix. Everything else is retried.
fn is_fatal(err: &Error) -> bool {
    matches!(
        err,
        Error::Database(sqlx::Error::PoolClosed | sqlx::Error::Configuration(_))
    )
}

/// Turn a pgmq message into a task, or explain why it is not one.
fn decode_message(message: serde_json::Value) -> std::result::Result<Task, String> {
    let TaskMessage { task_id, payload } =
        serde_json::from_value(message).map_err(|e| format!("malformed task message: {e}"))?;
    let raw = serde_json::to_vec(&payload).map_err(|e| format!("unencodable payload: {e}"))?;
    Ok(Task::new(task_id, raw))
}

#[async_trait]
impl TaskSource for PgmqQueue {
    async fn next_task(&self) -> Result<Option<Delivery>> {
        let mut failures = 0u32;
        loop {
            let msg = match self.read().await {
                Ok(Some(msg)) => msg,
                Ok(None) => {
                    failures = 0;
                    tokio::time::sleep(self.poll_interval).await;
                    continue;
                }
                Err(e) if is_fatal(&e) => return Err(e),
                Err(e) => {
                    failures += 1;
                    let backoff = self.retry_backoff(failures);
                    warn!(
                        error = %e,
                        failures,
                        retry_in_ms = backoff.as_millis() as u64,
                        "queue read failed, retrying"
                    );
                    self.count("read_error");
                    tokio::time::sleep(backoff).await;
                    continue;
                }
            };
            failures = 0;

            match decode_message(msg.message) {
                Ok(task) => {
                    debug!(
                        msg_id = msg.msg_id,
                        read_ct = msg.read_ct,
                        enqueued_at = %msg.enqueued_at,
                        task_id = %task.id,
                        "task received"
                    );
                    return Ok(Some(Delivery {
                        task,
                        receipt: Some(msg.msg_id),
                    }));
                }
                Err(reason) => {
                    warn!(msg_id = msg.msg_id, %reason, "archiving poison message");
                    match self.archive(msg.msg_id).await {
                        Ok(()) => {}
                        Err(e) if is_fatal(&e) => return Err(e),
                        // Reappears after the visibility timeout and is archived then.
                        Err(e) => warn!(msg_id = msg.msg_id, error = %e, "failed to archive poison message"),
                    }
                }
            }
        }
    }

    async fn ack(&self, delivery: &Delivery) -> Result<()> {
        match delivery.receipt {
            Some(msg_id) => self.archive(msg_id).await,
            None => Ok(()),
        }
    }
}
