//! `playcoach serve` -- HTTP JSON API for gameplay analysis.
//!
//! Endpoints:
//! - GET  /health                 - Server status (exempt from auth)
//! - POST /analyze-gameplay       - Analyze `{ "gameplayText": ... }`
//! - POST /upload-gameplay        - Multipart upload, file in `gameplayFile`
//! - GET  /gameplay-logs          - Caller's history, newest first
//! - GET  /gameplay-logs/stream   - Live history as server-sent events
//! - GET  /files/...              - Uploaded objects (public URLs)
//!
//! The analysis, upload and history routes require `Authorization: Bearer`.
//! /health, /files and unknown paths (JSON 404) do not.
//! Errors are `{ "error": ..., "details"?: ... }`.

mod handlers;
mod middleware;
mod state;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::{Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{middleware as axum_middleware, Json, Router};
use playcoach_pipeline::{AnalysisPipeline, ServiceCell};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;

use self::handlers::{
    handle_analyze, handle_health, handle_list_logs, handle_not_found, handle_stream_logs,
    handle_upload,
};
use self::middleware::auth_middleware;
use self::state::AppState;
use crate::app::build_pipeline;
use crate::config::Config;

/// Maximum request body size: 10 MB.
const MAX_BODY_SIZE: usize = 10 * 1024 * 1024;

/// Construct a JSON error response with the given status code and message.
fn json_error(status: StatusCode, message: &str) -> impl IntoResponse {
    (status, Json(serde_json::json!({"error": message})))
}

/// Build the router for a ready pipeline. Objects under `files_root` are
/// served read-only at `/files`.
pub(crate) fn router(pipeline: AnalysisPipeline, files_root: std::path::PathBuf) -> Router {
    let state = Arc::new(AppState { pipeline });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    // route_layer only runs for matched routes, so unknown paths reach the
    // fallback without a credential.
    let authenticated = Router::new()
        .route("/analyze-gameplay", post(handle_analyze))
        .route("/upload-gameplay", post(handle_upload))
        .route("/gameplay-logs", get(handle_list_logs))
        .route("/gameplay-logs/stream", get(handle_stream_logs))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .route("/health", get(handle_health))
        .merge(authenticated)
        .nest_service("/files", ServeDir::new(files_root))
        .fallback(handle_not_found)
        .layer(cors)
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .with_state(state)
}

/// Start the HTTP server on the given port.
pub(crate) async fn start_server(port: u16, config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let cell = ServiceCell::new();
    let pipeline = build_pipeline(&cell, &config).await?;
    let app = router(pipeline, config.objects_root());

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Playcoach listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server shut down");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C).
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install Ctrl+C handler");
    tracing::info!("received shutdown signal");
}
