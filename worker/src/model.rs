//! Core data model: incoming deliveries, outgoing callbacks and handler outcomes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A task message decoded from an AMQP delivery, ready to be handed to a handler.
///
/// The raw delivery handle (used for acknowledgement) is not part of this type - it is
/// owned separately by the [`crate::ack::DeliveryState`] for the lifetime of the delivery.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    /// Unique identifier for this task, taken from the `task_id` AMQP header or body field.
    pub task_id: String,
    /// The decoded JSON body, with `task_id` removed. Arbitrary nested values, opaque to us.
    pub body: Value,
    /// When the task was originally submitted, if the caller provided it.
    pub submission_date: Option<DateTime<Utc>>,
    /// `reply_to` routing override carried by the AMQP message properties, if any.
    pub reply_to: Option<String>,
    /// Correlation id carried by the AMQP message properties, if any.
    pub correlation_id: Option<String>,
}

/// The status of a task, as reported on the outgoing queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// The task has started but not yet reached a terminal state.
    Running,
    /// The task completed successfully.
    Success,
    /// The task failed.
    Failure,
}

/// A callback record published to the outgoing queue.
///
/// Exactly one callback per delivery has `status` of [`TaskStatus::Success`] or
/// [`TaskStatus::Failure`]; that callback is always the last one published for the delivery.
#[derive(Debug, Clone, Serialize)]
pub struct TaskCallback {
    /// Identifier of the task this callback concerns.
    pub task_id: String,
    /// Current status of the task.
    pub status: TaskStatus,
    /// Echoed back from the incoming message, if it carried one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submission_date: Option<DateTime<Utc>>,
    /// When the handler started running.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<DateTime<Utc>>,
    /// When the handler reached a terminal state. Absent on non-terminal callbacks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,
    /// Progress in `[0.0, 1.0]`, when the handler has reported one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    /// The handler's response payload. Unlike the other optional fields, this is emitted as
    /// `null` rather than omitted when absent, since callers expect the key to always exist.
    pub response: Option<Value>,
}

/// A short, structured description of a handler failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// A short machine-readable tag for the kind of failure, e.g. `"decode"` or `"handler"`.
    pub kind: String,
    /// A human-readable description of the failure.
    pub message: String,
}

impl ErrorInfo {
    /// Builds an [`ErrorInfo`] for the given kind and message.
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

/// The terminal payload produced by running a handler to completion.
#[derive(Debug)]
pub enum HandlerOutcome {
    /// The handler returned a value normally.
    Returned(Value),
    /// The handler raised an error.
    Raised(ErrorInfo),
}

impl HandlerOutcome {
    /// Converts the outcome into the `(status, response)` pair used to build the terminal
    /// [`TaskCallback`].
    pub fn into_callback_fields(self) -> (TaskStatus, Value) {
        match self {
            HandlerOutcome::Returned(value) => (TaskStatus::Success, value),
            HandlerOutcome::Raised(error) => {
                let response = serde_json::json!({
                    "error": error.kind,
                    "message": error.message,
                });
                (TaskStatus::Failure, response)
            }
        }
    }
}
