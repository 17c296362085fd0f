//! Core data model.
//!
//! A task is an opaque payload with an identifier. Its lifecycle is tracked
//! by a [`TaskStatus`] in the status store, and its outcome by a
//! [`TaskDocument`] stored alongside.

pub mod document;
pub mod status;
pub mod task;

pub use document::{ErrorRecord, INTERNAL_ERROR, TaskDocument, VALIDATION_ERROR};
pub use status::TaskStatus;
pub use task::{Task, TaskId};
