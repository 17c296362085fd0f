//! Task consumer: pulls tasks from a source, gates them on the status
//! store, runs the processing unit and persists the outcome.
//!
//! Per task:
//!
//! 1. status gate: only PENDING tasks go further
//! 2. parse and validate the payload (failure is CLIENT_ERROR)
//! 3. process (failure, panic or timeout is SERVER_ERROR)
//! 4. persist SUCCESS with the requirements
//!
//! No single task can stop the loop. Only a source fault or shutdown does.

mod outcome;

pub use outcome::{SkipReason, TaskOutcome};

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashSet;
use opentelemetry::KeyValue;
use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinSet;
use tracing::{Instrument, Span, error, info, warn};

use crate::error::Result;
use crate::model::{ErrorRecord, INTERNAL_ERROR, Task, TaskId, TaskStatus, VALIDATION_ERROR};
use crate::queue::TaskSource;
use crate::store::StatusStore;
use crate::telemetry::metrics;
use crate::telemetry::task::{record_state_transition, start_task_span};
use crate::unit::ProcessingUnit;

#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Tasks processed at once. 1 processes strictly one after another.
    pub max_concurrent: usize,
    /// Upper bound on one processing unit call. `None` waits forever.
    pub process_timeout: Option<Duration>,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 1,
            process_timeout: None,
        }
    }
}

/// Why the processing step failed. Only the public message is stored;
/// the full fault goes to the log.
#[derive(Debug, thiserror::Error)]
enum ProcessFailure {
    #[error("{0:#}")]
    Failed(anyhow::Error),
    #[error("processing unit panicked: {0}")]
    Panicked(String),
    #[error("processing exceeded {0:?}")]
    TimedOut(Duration),
}

impl ProcessFailure {
    fn public_message(&self) -> &'static str {
        match self {
            ProcessFailure::TimedOut(_) => "task processing timed out",
            _ => "failed to process task",
        }
    }
}

/// Marks a task ID as being processed until dropped.
struct InFlight {
    ids: Arc<DashSet<TaskId>>,
    id: TaskId,
}

impl InFlight {
    fn claim(ids: &Arc<DashSet<TaskId>>, id: TaskId) -> Option<Self> {
        ids.insert(id).then(|| Self {
            ids: Arc::clone(ids),
            id,
        })
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.ids.remove(&self.id);
    }
}

pub struct Consumer<U: ProcessingUnit> {
    store: Arc<dyn StatusStore>,
    unit: Arc<U>,
    config: ConsumerConfig,
    shutdown: Arc<Notify>,
    in_flight: Arc<DashSet<TaskId>>,
}

impl<U: ProcessingUnit> Clone for Consumer<U> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            unit: Arc::clone(&self.unit),
            config: self.config.clone(),
            shutdown: Arc::clone(&self.shutdown),
            in_flight: Arc::clone(&self.in_flight),
        }
    }
}

impl<U: ProcessingUnit> Consumer<U> {
    pub fn new(store: Arc<dyn StatusStore>, unit: Arc<U>, config: ConsumerConfig) -> Self {
        Self {
            store,
            unit,
            config,
            shutdown: Arc::new(Notify::new()),
            in_flight: Arc::new(DashSet::new()),
        }
    }

    /// Signal the consumer loop to stop fetching.
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }

    /// Consume tasks until shutdown or until the source closes.
    ///
    /// Tasks still being processed when the loop stops are awaited before
    /// returning. Returns `Err` only for a source fault.
    pub async fn run<S: TaskSource>(&self, source: Arc<S>) -> Result<()> {
        let max_concurrent = self.config.max_concurrent.max(1);
        let permits = Arc::new(Semaphore::new(max_concurrent));
        let mut workers = JoinSet::new();

        info!(
            max_concurrent,
            process_timeout = ?self.config.process_timeout,
            "consumer started"
        );

        let result = loop {
            // Wait for capacity before fetching so a fetched task never queues
            // up behind busy workers.
            let permit = tokio::select! {
                _ = self.shutdown.notified() => {
                    info!("consumer shutting down");
                    break Ok(());
                }
                permit = Arc::clone(&permits).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break Ok(()),
                },
            };

            let delivery = tokio::select! {
                _ = self.shutdown.notified() => {
                    info!("consumer shutting down");
                    break Ok(());
                }
                next = source.next_task() => match next {
                    Ok(Some(delivery)) => delivery,
                    Ok(None) => {
                        info!("task source closed");
                        break Ok(());
                    }
                    Err(e) => {
                        error!(error = %e, "task source failed, stopping consumer");
                        break Err(e);
                    }
                },
            };

            while let Some(joined) = workers.try_join_next() {
                log_worker_exit(joined);
            }

            let consumer = self.clone();
            let source = Arc::clone(&source);
            workers.spawn(async move {
                let outcome = consumer.handle(&delivery.task).await;
                if outcome.should_ack() {
                    if let Err(e) = source.ack(&delivery).await {
                        warn!(task_id = %delivery.task.id, error = %e, "failed to acknowledge task");
                    }
                }
                drop(permit);
            });
        };

        if !workers.is_empty() {
            info!(remaining = workers.len(), "waiting for in-flight tasks");
        }
        while let Some(joined) = workers.join_next().await {
            log_worker_exit(joined);
        }
        info!("consumer stopped");
        result
    }

    /// Take one task through the status gate, validation, processing and
    /// persistence. Never fails: every fault ends up in the outcome, the
    /// store or the log.
    pub async fn handle(&self, task: &Task) -> TaskOutcome {
        metrics::tasks_received().add(1, &[]);

        let Some(_claim) = InFlight::claim(&self.in_flight, task.id) else {
            warn!(task_id = %task.id, "task already in flight, leaving it for redelivery");
            return skipped(SkipReason::InFlight);
        };

        let span = start_task_span(&task.id);
        self.handle_claimed(task, &span)
            .instrument(span.clone())
            .await
    }

    async fn handle_claimed(&self, task: &Task, span: &Span) -> TaskOutcome {
        match self.store.get_status(task.id).await {
            Ok(Some(TaskStatus::Pending)) => {}
            Ok(None) => {
                warn!("no status record for task, dropping it");
                return skipped(SkipReason::NoStatus);
            }
            Ok(Some(TaskStatus::Cancelled)) => {
                info!("task was cancelled, skipping");
                return skipped(SkipReason::Cancelled);
            }
            Ok(Some(status)) => {
                info!(%status, "task already finished, skipping");
                return skipped(SkipReason::AlreadyTerminal);
            }
            Err(e) => {
                error!(error = %e, "status lookup failed, skipping task");
                return skipped(SkipReason::StoreUnavailable);
            }
        }

        let input = match self.unit.parse_and_validate(&task.payload) {
            Ok(input) => input,
            Err(errors) => {
                warn!(%errors, "payload does not match schema");
                let record = ErrorRecord::new(VALIDATION_ERROR, "request does not match request schema")
                    .with_details(errors.to_details());
                return self
                    .finish_with_error(task.id, span, TaskStatus::ClientError, record)
                    .await;
            }
        };

        let started = Instant::now();
        let processed = self.process(input).await;
        let status = if processed.is_ok() {
            TaskStatus::Success
        } else {
            TaskStatus::ServerError
        };
        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
        metrics::task_duration_ms().record(duration_ms, &[KeyValue::new("status", status.as_str())]);

        match processed {
            Ok(requirements) => {
                let persisted = match self.store.save_result(task.id, &requirements).await {
                    Ok(()) => {
                        info!(requirements = requirements.len(), duration_ms, "task succeeded");
                        true
                    }
                    Err(e) => {
                        // The task stays PENDING: there is no fallback write.
                        error!(error = %e, "failed to persist task result");
                        false
                    }
                };
                finished(span, TaskStatus::Success, persisted)
            }
            Err(failure) => {
                error!(error = %failure, duration_ms, "task processing failed");
                let record = ErrorRecord::new(INTERNAL_ERROR, failure.public_message());
                self.finish_with_error(task.id, span, TaskStatus::ServerError, record)
                    .await
            }
        }
    }

    /// Run the unit in its own task so a panic cannot take the worker down.
    async fn process(&self, input: U::Input) -> std::result::Result<Vec<String>, ProcessFailure> {
        let unit = Arc::clone(&self.unit);
        let mut handle =
            tokio::spawn(async move { unit.process(input).await }.in_current_span());

        let joined = match self.config.process_timeout {
            Some(limit) => match tokio::time::timeout(limit, &mut handle).await {
                Ok(joined) => joined,
                Err(_) => {
                    handle.abort();
                    return Err(ProcessFailure::TimedOut(limit));
                }
            },
            None => handle.await,
        };

        match joined {
            Ok(Ok(requirements)) => Ok(requirements),
            Ok(Err(e)) => Err(ProcessFailure::Failed(e)),
            Err(e) => Err(ProcessFailure::Panicked(e.to_string())),
        }
    }

    async fn finish_with_error(
        &self,
        task_id: TaskId,
        span: &Span,
        status: TaskStatus,
        record: ErrorRecord,
    ) -> TaskOutcome {
        let persisted = match self.store.save_error(task_id, status, record).await {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, %status, "failed to persist task error");
                false
            }
        };
        finished(span, status, persisted)
    }
}

fn skipped(reason: SkipReason) -> TaskOutcome {
    metrics::tasks_skipped().add(1, &[KeyValue::new("reason", reason.as_str())]);
    TaskOutcome::Skipped(reason)
}

fn finished(span: &Span, status: TaskStatus, persisted: bool) -> TaskOutcome {
    if persisted {
        record_state_transition(span, TaskStatus::Pending, status);
    }
    metrics::tasks_finished().add(
        1,
        &[
            KeyValue::new("status", status.as_str()),
            KeyValue::new("persisted", persisted.to_string()),
        ],
    );
    TaskOutcome::Finished { status, persisted }
}

fn log_worker_exit(joined: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        error!(error = %e, "consumer worker exited abnormally");
    }
}
