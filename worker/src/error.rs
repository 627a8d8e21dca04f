//! Worker-specific error types.

use thiserror::Error as ThisError;

/// Errors that prevent the worker from starting at all. Fatal at startup; exit code 2.
#[derive(Debug, ThisError)]
pub enum ConfigError {
    /// `amqp_url` was empty.
    #[error("amqp_url must be set")]
    MissingUrl,
    /// `amqp_in_queue` was empty.
    #[error("amqp_in_queue must be set")]
    MissingInQueue,
    /// `amqp_out_queue` was empty.
    #[error("amqp_out_queue must be set")]
    MissingOutQueue,
    /// Concurrency was set to zero in [`crate::mode::WorkerMode::Infinite`].
    #[error("concurrency must be at least 1, got {0}")]
    InvalidConcurrency(u16),
}

/// Errors that may be produced by [`crate::runner::WorkerRunner::run`].
#[derive(Debug, ThisError)]
pub enum WorkerError {
    /// The worker was misconfigured.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    /// A connection to the AMQP broker could not be established or was lost beyond recovery.
    #[error("broker connection failed: {0}")]
    Connection(#[from] lapin::Error),
    /// Queue declaration or binding failed during startup.
    #[error("failed to declare or bind a queue: {0}")]
    Topology(lapin::Error),
    /// The outgoing publisher could not be placed into confirm mode during startup.
    #[error("failed to set up publisher: {0}")]
    Publisher(#[from] PublishError),
    /// The health endpoint listener could not be bound.
    #[error("failed to bind health endpoint: {0}")]
    HealthBind(#[from] std::io::Error),
}

/// Errors arising while decoding an incoming delivery.
#[derive(Debug, ThisError)]
pub enum DecodeError {
    /// The message body was not valid JSON.
    #[error("message body was not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    /// The JSON root was not an object.
    #[error("message body must be a JSON object, found a {0}")]
    NotAnObject(&'static str),
    /// `task_id` was missing from both the AMQP header and the message body.
    #[error("task_id was missing from both the AMQP header and the message body")]
    MissingTaskId,
}

/// Errors arising while publishing a callback.
#[derive(Debug, ThisError)]
pub enum PublishError {
    /// The underlying `lapin` publish call failed.
    #[error("publish failed: {0}")]
    Lapin(#[from] lapin::Error),
    /// The broker did not confirm the publish within the retry budget.
    #[error("publish was not confirmed after {attempts} attempt(s)")]
    ConfirmTimedOut {
        /// Number of attempts made before giving up.
        attempts: u32,
    },
}
