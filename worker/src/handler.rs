//! Uniform invocation surface over synchronous and asynchronous task handlers.
//!
//! Handlers implement either [`SyncHandler`] (run on the bounded blocking thread pool) or
//! [`AsyncHandler`] (run on the cooperative scheduler). Either way, the dispatcher calls them
//! through the same path and isolates any fault - a returned error or a panic - into a
//! [`HandlerOutcome`], never letting it escape and crash the worker.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::model::{ErrorInfo, HandlerOutcome, IncomingMessage};
use crate::progress::ProgressReporter;

/// A thread-safe, blocking façade over the progress reporter, handed to synchronous handlers.
#[derive(Clone)]
pub struct SyncProgress {
    reporter: ProgressReporter,
}

impl SyncProgress {
    pub(crate) fn new(reporter: ProgressReporter) -> Self {
        Self { reporter }
    }

    /// Reports progress. Safe to call from the blocking thread the handler runs on.
    pub fn report(&self, progress: Option<f64>, payload: Option<Value>) {
        self.reporter.report(progress, payload);
    }
}

/// A suspending façade over the progress reporter, handed to asynchronous handlers.
#[derive(Clone)]
pub struct AsyncProgress {
    reporter: ProgressReporter,
}

impl AsyncProgress {
    pub(crate) fn new(reporter: ProgressReporter) -> Self {
        Self { reporter }
    }

    /// Reports progress.
    pub async fn report(&self, progress: Option<f64>, payload: Option<Value>) {
        self.reporter.report_async(progress, payload).await;
    }
}

/// A handler that runs synchronously on a worker thread drawn from the blocking pool.
pub trait SyncHandler: Send {
    /// Executes the task, returning the value to report back, or an error describing the
    /// failure.
    fn execute(
        &mut self,
        message: IncomingMessage,
        progress: SyncProgress,
    ) -> Result<Value, ErrorInfo>;
}

/// A handler that runs on the dispatcher's cooperative scheduler.
#[async_trait]
pub trait AsyncHandler: Send {
    /// Executes the task, returning the value to report back, or an error describing the
    /// failure.
    async fn execute(
        &mut self,
        message: IncomingMessage,
        progress: AsyncProgress,
    ) -> Result<Value, ErrorInfo>;
}

/// Factory producing a fresh handler instance for each delivery. One [`TaskProvider`] is
/// shared by the whole dispatcher; it must be cheap to clone and safe to call concurrently.
#[derive(Clone)]
pub enum TaskProvider {
    /// Produces synchronous handlers.
    Sync(Arc<dyn Fn() -> Box<dyn SyncHandler> + Send + Sync>),
    /// Produces asynchronous handlers.
    Async(Arc<dyn Fn() -> Box<dyn AsyncHandler> + Send + Sync>),
}

impl TaskProvider {
    /// Builds a provider of synchronous handlers from a factory closure.
    pub fn sync<F, H>(factory: F) -> Self
    where
        F: Fn() -> H + Send + Sync + 'static,
        H: SyncHandler + 'static,
    {
        TaskProvider::Sync(Arc::new(move || Box::new(factory()) as Box<dyn SyncHandler>))
    }

    /// Builds a provider of asynchronous handlers from a factory closure.
    pub fn asynchronous<F, H>(factory: F) -> Self
    where
        F: Fn() -> H + Send + Sync + 'static,
        H: AsyncHandler + 'static,
    {
        TaskProvider::Async(Arc::new(move || Box::new(factory()) as Box<dyn AsyncHandler>))
    }
}

/// Invokes the handler produced by `provider`, isolating any error or panic into a
/// [`HandlerOutcome`].
pub(crate) async fn invoke(
    provider: &TaskProvider,
    message: IncomingMessage,
    reporter: ProgressReporter,
) -> HandlerOutcome {
    match provider {
        TaskProvider::Sync(factory) => {
            let mut handler = factory();
            let progress = SyncProgress::new(reporter);
            let joined =
                tokio::task::spawn_blocking(move || handler.execute(message, progress)).await;
            outcome_from_join(joined)
        }
        TaskProvider::Async(factory) => {
            let mut handler = factory();
            let progress = AsyncProgress::new(reporter);
            let joined = tokio::spawn(async move { handler.execute(message, progress).await }).await;
            outcome_from_join(joined)
        }
    }
}

fn outcome_from_join(
    joined: Result<Result<Value, ErrorInfo>, tokio::task::JoinError>,
) -> HandlerOutcome {
    match joined {
        Ok(Ok(value)) => HandlerOutcome::Returned(value),
        Ok(Err(info)) => HandlerOutcome::Raised(info),
        Err(join_error) if join_error.is_panic() => {
            tracing::error!("handler panicked: {join_error}");
            HandlerOutcome::Raised(ErrorInfo::new("panic", join_error.to_string()))
        }
        Err(join_error) => {
            tracing::warn!("handler task was cancelled: {join_error}");
            HandlerOutcome::Raised(ErrorInfo::new("cancelled", join_error.to_string()))
        }
    }
}

#[cfg(test)]
pub(crate) struct NoopSyncHandler;

#[cfg(test)]
impl SyncHandler for NoopSyncHandler {
    fn execute(&mut self, _message: IncomingMessage, _progress: SyncProgress) -> Result<Value, ErrorInfo> {
        Ok(Value::Null)
    }
}

#[cfg(test)]
pub(crate) fn noop_sync_handler() -> NoopSyncHandler {
    NoopSyncHandler
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct ReturningHandler;
    impl SyncHandler for ReturningHandler {
        fn execute(&mut self, message: IncomingMessage, progress: SyncProgress) -> Result<Value, ErrorInfo> {
            progress.report(Some(0.3), None);
            progress.report(Some(0.6), None);
            Ok(json!({ "echoed": message.task_id }))
        }
    }

    struct RaisingHandler;
    impl SyncHandler for RaisingHandler {
        fn execute(&mut self, _message: IncomingMessage, _progress: SyncProgress) -> Result<Value, ErrorInfo> {
            Err(ErrorInfo::new("boom", "it broke"))
        }
    }

    struct PanickingHandler;
    impl SyncHandler for PanickingHandler {
        fn execute(&mut self, _message: IncomingMessage, _progress: SyncProgress) -> Result<Value, ErrorInfo> {
            panic!("handler exploded");
        }
    }

    struct AsyncReturningHandler;
    #[async_trait]
    impl AsyncHandler for AsyncReturningHandler {
        async fn execute(&mut self, message: IncomingMessage, progress: AsyncProgress) -> Result<Value, ErrorInfo> {
            progress.report(Some(0.5), None).await;
            Ok(json!(message.task_id))
        }
    }

    fn message() -> IncomingMessage {
        IncomingMessage {
            task_id: "t1".into(),
            body: json!({}),
            submission_date: None,
            reply_to: None,
            correlation_id: None,
        }
    }

    #[tokio::test]
    async fn sync_handler_returns_value() {
        let provider = TaskProvider::sync(|| ReturningHandler);
        let reporter = ProgressReporter::new(8);
        let outcome = invoke(&provider, message(), reporter).await;
        match outcome {
            HandlerOutcome::Returned(value) => assert_eq!(value["echoed"], "t1"),
            HandlerOutcome::Raised(_) => panic!("expected Returned"),
        }
    }

    #[tokio::test]
    async fn sync_handler_error_becomes_raised() {
        let provider = TaskProvider::sync(|| RaisingHandler);
        let reporter = ProgressReporter::new(8);
        let outcome = invoke(&provider, message(), reporter).await;
        match outcome {
            HandlerOutcome::Raised(info) => assert_eq!(info.kind, "boom"),
            HandlerOutcome::Returned(_) => panic!("expected Raised"),
        }
    }

    #[tokio::test]
    async fn sync_handler_panic_is_isolated() {
        let provider = TaskProvider::sync(|| PanickingHandler);
        let reporter = ProgressReporter::new(8);
        let outcome = invoke(&provider, message(), reporter).await;
        match outcome {
            HandlerOutcome::Raised(info) => assert_eq!(info.kind, "panic"),
            HandlerOutcome::Returned(_) => panic!("expected Raised"),
        }
    }

    #[tokio::test]
    async fn async_handler_returns_value() {
        let provider = TaskProvider::asynchronous(|| AsyncReturningHandler);
        let reporter = ProgressReporter::new(8);
        let outcome = invoke(&provider, message(), reporter).await;
        match outcome {
            HandlerOutcome::Returned(value) => assert_eq!(value, "t1"),
            HandlerOutcome::Raised(_) => panic!("expected Returned"),
        }
    }
}
