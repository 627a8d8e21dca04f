//! # task-worker-core
//!
//! A worker runtime for AMQP task queues, built on top of [lapin](https://github.com/amqp-rs/lapin).
//!
//! A worker consumes JSON task messages from one queue, runs each one through a handler you
//! provide - synchronous or asynchronous, your choice - and publishes progress and a terminal
//! success-or-failure callback to a second queue. Concurrency, graceful shutdown, broker
//! acknowledgement and an HTTP health endpoint are all handled for you; you only write the
//! handler.

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    clippy::missing_docs_in_private_items,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    unused_crate_dependencies,
    clippy::as_conversions
)]

// Re-exporting underlying lapin version so you don't have to add the same version as a
// dependency.
pub use lapin;

mod ack;
mod codec;
pub mod config;
mod dispatcher;
pub mod error;
pub mod handler;
pub mod mode;
mod health;
pub mod model;
pub mod progress;
mod publisher;
mod retry;
pub mod runner;

pub use config::{HealthCheckConfig, WorkerConfig};
pub use error::WorkerError;
pub use handler::{AsyncHandler, AsyncProgress, SyncHandler, SyncProgress, TaskProvider};
pub use mode::WorkerMode;
pub use model::{ErrorInfo, IncomingMessage, TaskCallback, TaskStatus};
pub use runner::WorkerRunner;

/// Convenience type for a result with this crate's top-level error.
pub type Result<T> = std::result::Result<T, WorkerError>;
