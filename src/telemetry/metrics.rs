//! Metric instrument factories for taskpipe.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"taskpipe"` meter.

use opentelemetry::metrics::{Counter, Histogram, Meter};

fn meter() -> Meter {
    opentelemetry::global::meter("taskpipe")
}

/// Counter: tasks fetched from the queue source.
pub fn tasks_received() -> Counter<u64> {
    meter()
        .u64_counter("taskpipe.tasks.received")
        .with_description("Number of tasks fetched from the queue")
        .build()
}

/// Counter: tasks dropped at the status gate.
/// Labels: `reason` ("no_status" | "cancelled" | "already_terminal" |
/// "store_unavailable" | "in_flight").
pub fn tasks_skipped() -> Counter<u64> {
    meter()
        .u64_counter("taskpipe.tasks.skipped")
        .with_description("Number of tasks skipped without processing")
        .build()
}

/// Counter: tasks that reached a terminal outcome.
/// Labels: `status`, `persisted` ("true" | "false").
pub fn tasks_finished() -> Counter<u64> {
    meter()
        .u64_counter("taskpipe.tasks.finished")
        .with_description("Number of tasks that reached a terminal outcome")
        .build()
}

/// Histogram: time spent in the processing unit, in milliseconds.
/// Labels: `status`.
pub fn task_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("taskpipe.task.duration_ms")
        .with_description("Processing unit duration in milliseconds")
        .with_unit("ms")
        .build()
}

/// Counter: status store operations.
/// Labels: `backend`, `operation`, `result` ("ok" | "error").
pub fn store_operations() -> Counter<u64> {
    meter()
        .u64_counter("taskpipe.store.operations")
        .with_description("Number of status store operations")
        .build()
}

/// Counter: queue-level operations (create, send, read, archive).
/// Labels: `queue`, `operation`.
pub fn queue_operations() -> Counter<u64> {
    meter()
        .u64_counter("taskpipe.queue.operations")
        .with_description("Number of queue operations")
        .build()
}
