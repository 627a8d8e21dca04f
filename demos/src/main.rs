//! Demo worker binary: one sync handler that sleeps in two halves and reports progress after
//! each, one async handler doing the same on the cooperative scheduler. Configuration is read
//! entirely from the environment, since the core crate never does that itself.

use std::thread::sleep;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use task_worker_core::{
    AsyncHandler, AsyncProgress, ErrorInfo, HealthCheckConfig, IncomingMessage, SyncHandler,
    SyncProgress, TaskProvider, WorkerConfig, WorkerError, WorkerMode, WorkerRunner,
};
use tracing_subscriber::EnvFilter;

struct SleepTask;

impl SyncHandler for SleepTask {
    fn execute(&mut self, message: IncomingMessage, progress: SyncProgress) -> Result<Value, ErrorInfo> {
        if message.body.get("failed").and_then(Value::as_bool).unwrap_or(false) {
            return Err(ErrorInfo::new("demo_failure", "Argh"));
        }

        let seconds = message.body.get("sleep").and_then(Value::as_f64).unwrap_or(2.0);
        let half = Duration::from_secs_f64(seconds / 2.0);

        sleep(half);
        progress.report(Some(0.3), None);
        sleep(half);
        progress.report(Some(0.6), None);

        Ok(json!({ "hello": "world" }))
    }
}

struct AsyncSleepTask;

#[async_trait]
impl AsyncHandler for AsyncSleepTask {
    async fn execute(&mut self, message: IncomingMessage, progress: AsyncProgress) -> Result<Value, ErrorInfo> {
        if message.body.get("failed").and_then(Value::as_bool).unwrap_or(false) {
            return Err(ErrorInfo::new("demo_failure", "Argh"));
        }

        let seconds = message.body.get("sleep").and_then(Value::as_f64).unwrap_or(10.0);
        let half = Duration::from_secs_f64(seconds / 2.0);

        tokio::time::sleep(half).await;
        progress.report(Some(0.3), None).await;
        tokio::time::sleep(half).await;
        progress.report(Some(0.6), None).await;

        Ok(json!({ "hello": "world" }))
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Configuration errors (a missing/malformed environment variable, or a rejected
/// [`WorkerConfig`]) exit with code 2; everything else - a broker connection that never came up,
/// an I/O failure binding the health endpoint - exits with code 1.
#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let broker_url = match std::env::var("BROKER_URL") {
        Ok(url) => url,
        Err(_) => {
            tracing::error!("BROKER_URL environment variable is not set");
            std::process::exit(2);
        }
    };
    let in_queue = env_or("IN_QUEUE_NAME", "");
    let out_queue = env_or("OUT_QUEUE_NAME", "");
    let concurrency: u16 = match env_or("WORKER_CONCURRENCY", "5").parse() {
        Ok(concurrency) => concurrency,
        Err(err) => {
            tracing::error!(%err, "WORKER_CONCURRENCY must be a positive integer");
            std::process::exit(2);
        }
    };

    tracing::info!("Launch");

    let provider = if env_or("WORKER_HANDLER", "async") == "sync" {
        TaskProvider::sync(|| SleepTask)
    } else {
        TaskProvider::asynchronous(|| AsyncSleepTask)
    };

    let config = WorkerConfig::new(
        broker_url,
        in_queue,
        out_queue,
        provider,
        WorkerMode::Infinite { concurrency },
    )
    .with_health_check(HealthCheckConfig::new("127.0.0.1", 8000));

    match WorkerRunner::new(config).run().await {
        Ok(()) => {
            tracing::info!("Stopped.");
        }
        Err(err @ WorkerError::Config(_)) => {
            tracing::error!(%err, "configuration error");
            std::process::exit(2);
        }
        Err(err) => {
            tracing::error!(%err, "worker exited with an error");
            std::process::exit(1);
        }
    }
}
