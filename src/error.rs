//! Error types for taskpipe.

use thiserror::Error;

use crate::model::TaskStatus;

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("status {status} is not valid here: {reason}")]
    InvalidStatus { status: TaskStatus, reason: String },

    #[error("status store is closed")]
    StoreClosed,

    #[error("unrecognized status value in store: {0:?}")]
    CorruptStatus(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
