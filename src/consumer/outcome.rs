//! What happened to a task once the consumer was done with it.

use crate::model::TaskStatus;

/// Why a task was dropped without processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No status record: never registered, or expired.
    NoStatus,
    Cancelled,
    /// Already SUCCESS, CLIENT_ERROR or SERVER_ERROR.
    AlreadyTerminal,
    /// The status lookup itself failed.
    StoreUnavailable,
    /// Another worker is processing the same task ID.
    InFlight,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::NoStatus => "no_status",
            SkipReason::Cancelled => "cancelled",
            SkipReason::AlreadyTerminal => "already_terminal",
            SkipReason::StoreUnavailable => "store_unavailable",
            SkipReason::InFlight => "in_flight",
        }
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Skipped(SkipReason),
    /// The task reached a terminal status. `persisted` is false when the
    /// terminal write failed and the stored status was left as it was.
    Finished { status: TaskStatus, persisted: bool },
}

impl TaskOutcome {
    /// Whether the delivery should be acknowledged to the queue.
    ///
    /// In-flight duplicates are left unacknowledged so the queue delivers
    /// them again later.
    pub fn should_ack(&self) -> bool {
        !matches!(self, TaskOutcome::Skipped(SkipReason::InFlight))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_in_flight_duplicates_stay_unacked() {
        assert!(!TaskOutcome::Skipped(SkipReason::InFlight).should_ack());
        assert!(TaskOutcome::Skipped(SkipReason::Cancelled).should_ack());
        assert!(TaskOutcome::Skipped(SkipReason::StoreUnavailable).should_ack());
        assert!(
            TaskOutcome::Finished {
                status: TaskStatus::Success,
                persisted: false
            }
            .should_ack()
        );
    }
}
