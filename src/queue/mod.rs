//! Queue sources: where tasks come from.
//!
//! The consumer only needs two things from a queue: the next task (waiting
//! as long as it takes) and a way to acknowledge a task once it has been
//! dealt with. Redelivery and offsets stay with the queue.

pub mod pgmq;

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};

use crate::error::Result;
use crate::model::Task;

pub use self::pgmq::PgmqQueue;

/// A task together with whatever the source needs to acknowledge it.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub task: Task,
    /// Source-specific message handle (the pgmq message ID).
    pub receipt: Option<i64>,
}

impl Delivery {
    pub fn new(task: Task) -> Self {
        Self {
            task,
            receipt: None,
        }
    }
}

#[async_trait]
pub trait TaskSource: Send + Sync + 'static {
    /// Wait for the next task.
    ///
    /// `Ok(None)` means the source is closed for good. An `Err` is an
    /// unrecoverable source fault and stops the consumer.
    async fn next_task(&self) -> Result<Option<Delivery>>;

    /// Acknowledge a delivery that has been handled.
    async fn ack(&self, _delivery: &Delivery) -> Result<()> {
        Ok(())
    }
}

/// In-process source fed through a tokio channel.
///
/// Closes once every sender has been dropped and the buffer is drained.
pub struct ChannelSource {
    rx: Mutex<mpsc::Receiver<Task>>,
}

impl ChannelSource {
    pub fn new(rx: mpsc::Receiver<Task>) -> Self {
        Self { rx: Mutex::new(rx) }
    }

    /// Create a source together with the sender that feeds it.
    pub fn channel(buffer: usize) -> (mpsc::Sender<Task>, Self) {
        let (tx, rx) = mpsc::channel(buffer);
        (tx, Self::new(rx))
    }
}

#[async_trait]
impl TaskSource for ChannelSource {
    async fn next_task(&self) -> Result<Option<Delivery>> {
        Ok(self.rx.lock().await.recv().await.map(Delivery::new))
    }
}
