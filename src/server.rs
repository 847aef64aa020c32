/// Status server module
///
/// Read-only control plane over the engine: current status, event history
/// snapshot, and reset. Runs concurrently with the capture loop; handlers
/// only ever take short snapshots of shared state.

use crate::engine::{SecurityStatus, SentryEngine};
use crate::events::SoundEvent;
use axum::extract::State;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use serde::Serialize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Reset acknowledgement
#[derive(Serialize)]
pub struct ResetResponse {
    pub success: bool,
    pub message: String,
}

/// Build the control-plane router
pub fn router(engine: Arc<SentryEngine>) -> Router {
    Router::new()
        .route("/status", get(get_status))
        .route("/history", get(get_history))
        .route("/reset", post(reset))
        .layer(TraceLayer::new_for_http())
        .with_state(engine)
}

/// Serve until the shutdown token fires
pub async fn serve(
    listener: TcpListener,
    engine: Arc<SentryEngine>,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    info!("Status server listening on {}", listener.local_addr()?);

    axum::serve(listener, router(engine))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

/// GET /status
async fn get_status(State(engine): State<Arc<SentryEngine>>) -> Json<SecurityStatus> {
    Json(engine.status().await)
}

/// GET /history
async fn get_history(State(engine): State<Arc<SentryEngine>>) -> Json<Vec<SoundEvent>> {
    Json(engine.history().await)
}

/// POST /reset
async fn reset(State(engine): State<Arc<SentryEngine>>) -> Json<ResetResponse> {
    engine.reset().await;

    Json(ResetResponse {
        success: true,
        message: "System status cleared".to_string(),
    })
}
