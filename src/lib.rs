//! # taskpipe
//!
//! Asynchronous task pipeline. Tasks arrive on a queue, are gated on a
//! shared status store (so cancelled tasks are never started), validated
//! and processed by a pluggable processing unit, and their outcome is
//! persisted with expiry.
//!
//! Status store backends: in-memory ([`store::MemoryStore`]) and Redis
//! ([`store::RedisStore`]). Queue sources: pgmq ([`queue::PgmqQueue`]) and
//! an in-process channel ([`queue::ChannelSource`]).

pub mod config;
pub mod consumer;
pub mod error;
pub mod model;
pub mod queue;
pub mod store;
pub mod telemetry;
pub mod unit;
