//! Task status and its textual encoding.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Lifecycle status of a task as seen by callers polling the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// Accepted by ingress, waiting for the consumer.
    Pending,
    /// Cancelled by an external actor before processing started.
    Cancelled,
    /// Processed; the result document holds the requirements.
    Success,
    /// Payload rejected by validation. Terminal.
    ClientError,
    /// Processing failed. Terminal.
    ServerError,
}

impl TaskStatus {
    /// Is this a terminal state?
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Success | TaskStatus::ClientError | TaskStatus::ServerError
        )
    }

    /// Terminal statuses that carry an error document.
    pub fn is_error(self) -> bool {
        matches!(self, TaskStatus::ClientError | TaskStatus::ServerError)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::Cancelled => "CANCELLED",
            TaskStatus::Success => "SUCCESS",
            TaskStatus::ClientError => "CLIENT_ERROR",
            TaskStatus::ServerError => "SERVER_ERROR",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "PENDING" => Ok(TaskStatus::Pending),
            "CANCELLED" => Ok(TaskStatus::Cancelled),
            "SUCCESS" => Ok(TaskStatus::Success),
            "CLIENT_ERROR" => Ok(TaskStatus::ClientError),
            "SERVER_ERROR" => Ok(TaskStatus::ServerError),
            other => Err(Error::CorruptStatus(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_encoding_round_trips_for_every_status() {
        for status in [
            TaskStatus::Pending,
            TaskStatus::Cancelled,
            TaskStatus::Success,
            TaskStatus::ClientError,
            TaskStatus::ServerError,
        ] {
            assert_eq!(status.as_str().parse::<TaskStatus>().unwrap(), status);
            assert_eq!(
                serde_json::to_string(&status).unwrap(),
                format!("\"{}\"", status.as_str())
            );
        }
    }

    #[test]
    fn unknown_text_is_corrupt() {
        let err = "pending".parse::<TaskStatus>().unwrap_err();
        assert!(matches!(err, Error::CorruptStatus(ref raw) if raw == "pending"));
    }

    #[test]
    fn only_outcomes_are_terminal() {
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Cancelled.is_terminal());
        assert!(TaskStatus::Success.is_terminal());
        assert!(TaskStatus::ClientError.is_error());
        assert!(TaskStatus::ServerError.is_error());
        assert!(!TaskStatus::Success.is_error());
    }
}
