//! taskpipe CLI: run the consumer, and submit or inspect tasks.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use taskpipe::config::{Config, StoreConfig};
use taskpipe::consumer::Consumer;
use taskpipe::model::{TaskId, TaskStatus};
use taskpipe::queue::PgmqQueue;
use taskpipe::store::{self, RedisStore, StatusStore};
use taskpipe::telemetry::{TelemetryConfig, init_telemetry};
use taskpipe::unit::StubModel;
use tracing::info;

#[derive(Parser)]
#[command(name = "taskpipe", about = "Queue-driven task processing pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the task consumer
    Serve {
        /// Model definition TOML (overrides MODEL_CONFIG)
        #[arg(long)]
        model: Option<PathBuf>,
        /// Maximum tasks processed at once (overrides CONSUMER_MAX_CONCURRENT)
        #[arg(long)]
        max_concurrent: Option<usize>,
        /// Per-task processing timeout in seconds (overrides PROCESS_TIMEOUT_SECS)
        #[arg(long)]
        process_timeout_secs: Option<u64>,
    },
    /// Task operations
    Task {
        #[command(subcommand)]
        action: TaskAction,
    },
}

#[derive(Subcommand)]
enum TaskAction {
    /// Register a task as PENDING and enqueue it
    Submit {
        /// JSON payload
        #[arg(long)]
        payload: String,
    },
    /// Show a task's status and document
    Status {
        /// Task ID
        id: TaskId,
    },
    /// Cancel a task that has not finished yet
    Cancel {
        /// Task ID
        id: TaskId,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        Command::Serve {
            model,
            max_concurrent,
            process_timeout_secs,
        } => cmd_serve(config, model, max_concurrent, process_timeout_secs).await,
        Command::Task { action } => {
            let StoreConfig::Redis(ref redis) = config.store else {
                anyhow::bail!("task commands need a shared store: set REDIS_URL");
            };
            let store = RedisStore::connect(redis).await?;

            let result = match action {
                TaskAction::Submit { payload } => cmd_task_submit(&config, &store, &payload).await,
                TaskAction::Status { id } => cmd_task_status(&store, id).await,
                TaskAction::Cancel { id } => cmd_task_cancel(&store, id).await,
            };
            store.close().await?;
            result
        }
    }
}

async fn cmd_serve(
    mut config: Config,
    model: Option<PathBuf>,
    max_concurrent: Option<usize>,
    process_timeout_secs: Option<u64>,
) -> anyhow::Result<()> {
    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "taskpipe".to_string(),
        default_filter: config.log_level.clone(),
    })?;

    if let Some(n) = max_concurrent {
        anyhow::ensure!(n > 0, "--max-concurrent must be at least 1");
        config.consumer.max_concurrent = n;
    }
    if let Some(secs) = process_timeout_secs {
        config.consumer.process_timeout = Some(Duration::from_secs(secs));
    }

    let unit = match model.or(config.model_config.clone()) {
        Some(path) => StubModel::load(&path)?,
        None => StubModel::default(),
    };
    info!(model = %unit.definition().name, "processing unit loaded");

    let store = store::connect(&config.store).await?;

    match config.queue {
        Some(ref queue_config) => {
            let queue = PgmqQueue::connect(queue_config).await?;
            queue.migrate().await?;
            queue.create_queue().await?;
            info!(queue = queue.queue_name(), "queue ready");

            let consumer = Consumer::new(Arc::clone(&store), Arc::new(unit), config.consumer);
            let ctrl = consumer.clone();
            tokio::spawn(async move {
                tokio::signal::ctrl_c().await.ok();
                ctrl.shutdown();
            });

            let queue = Arc::new(queue);
            let result = consumer.run(Arc::clone(&queue)).await;
            queue.close().await;
            store.close().await?;
            result?;
        }
        None => {
            info!("DATABASE_URL not set, consumer disabled; waiting for Ctrl-C");
            tokio::signal::ctrl_c().await?;
            store.close().await?;
        }
    }

    Ok(())
}

async fn cmd_task_submit(config: &Config, store: &RedisStore, payload: &str) -> anyhow::Result<()> {
    let payload: serde_json::Value =
        serde_json::from_str(payload).context("--payload must be valid JSON")?;
    let queue_config = config
        .queue
        .as_ref()
        .context("task submit needs the queue: set DATABASE_URL")?;
    let queue = PgmqQueue::connect(queue_config).await?;
    queue.migrate().await?;
    queue.create_queue().await?;

    let id = TaskId::new();
    store.save_status(id, TaskStatus::Pending).await?;
    let msg_id = queue.send(id, payload, 0).await?;
    queue.close().await;

    println!("Submitted: {id} (message {msg_id})");
    Ok(())
}

async fn cmd_task_status(store: &RedisStore, id: TaskId) -> anyhow::Result<()> {
    let Some(status) = store.get_status(id).await? else {
        println!("{id}: no status (unknown or expired)");
        return Ok(());
    };
    println!("Status:     {status}");
    if let Some(document) = store.get_document(id).await? {
        println!("Document:   {}", serde_json::to_string_pretty(&document)?);
    }
    Ok(())
}

async fn cmd_task_cancel(store: &RedisStore, id: TaskId) -> anyhow::Result<()> {
    match store.get_status(id).await? {
        None => anyhow::bail!("no task {id} (unknown or expired)"),
        Some(status) if status.is_terminal() => {
            anyhow::bail!("task {id} already finished with {status}")
        }
        Some(_) => {
            store.save_status(id, TaskStatus::Cancelled).await?;
            println!("Cancelled: {id}");
            Ok(())
        }
    }
}
