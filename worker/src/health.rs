//! Liveness and readiness HTTP endpoint, exposed alongside the AMQP worker loop.
//!
//! Grounded on `power::server::router`'s `Router::new()...with_state(state)` idiom, adapted to
//! the two flags a worker needs to publish: whether the process is alive at all, and whether it
//! has finished connecting to the broker and is ready to receive traffic behind a load balancer
//! or orchestrator readiness probe.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::HealthCheckConfig;

/// Shared liveness/readiness state, flipped by the runner and dispatcher as the worker moves
/// through its lifecycle.
pub(crate) struct HealthState {
    ready: AtomicBool,
    live: AtomicBool,
}

impl Default for HealthState {
    fn default() -> Self {
        Self {
            ready: AtomicBool::new(false),
            live: AtomicBool::new(true),
        }
    }
}

impl HealthState {
    pub(crate) fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::Release);
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Flipped to `false` for the duration of the drain phase.
    pub(crate) fn set_live(&self, live: bool) {
        self.live.store(live, Ordering::Release);
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }
}

async fn live(State(state): State<Arc<HealthState>>) -> (StatusCode, Json<serde_json::Value>) {
    if state.is_live() {
        (StatusCode::OK, Json(json!({ "status": "ok" })))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "status": "draining" })))
    }
}

async fn ready(State(state): State<Arc<HealthState>>) -> (StatusCode, Json<serde_json::Value>) {
    if state.is_ready() {
        (StatusCode::OK, Json(json!({ "status": "ok" })))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "status": "not_ready" })))
    }
}

fn router(state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/live", get(live))
        .route("/ready", get(ready))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Binds the health listener and serves it until `shutdown` completes. Returns once bound, with
/// the server running in the background, so the caller can proceed to connect to the broker.
pub(crate) async fn serve(
    config: &HealthCheckConfig,
    state: Arc<HealthState>,
    shutdown: tokio_util::sync::CancellationToken,
) -> Result<tokio::task::JoinHandle<()>, std::io::Error> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidInput, "invalid health check address"))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound = listener.local_addr()?;
    info!(addr = %bound, "health endpoint listening");

    let app = router(state);
    let handle = tokio::spawn(async move {
        let serve = axum::serve(listener, app);
        tokio::select! {
            result = serve => {
                if let Err(err) = result {
                    tracing::error!(%err, "health endpoint server error");
                }
            }
            _ = shutdown.cancelled() => {
                info!("health endpoint shutting down");
            }
        }
    });

    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn live_returns_ok_until_draining() {
        let state = Arc::new(HealthState::default());
        let app = router(Arc::clone(&state));
        let response = app
            .clone()
            .oneshot(Request::builder().uri("/live").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "ok");

        state.set_live(false);
        let response = app
            .oneshot(Request::builder().uri("/live").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json_body(response).await["status"], "draining");
    }

    #[tokio::test]
    async fn ready_reflects_state() {
        let state = Arc::new(HealthState::default());
        let app = router(Arc::clone(&state));
        let response = app
            .clone()
            .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        state.set_ready(true);
        let response = app
            .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "ok");
    }
}
