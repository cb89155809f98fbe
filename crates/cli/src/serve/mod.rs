//! `stagewatch serve` -- HTTP JSON API for polled job progress.
//!
//! Jobs live in an in-memory `JobStore`. Every status poll lets the job's
//! advance policy move it at most one stage, then renders the visible part of
//! its ledger with the configured snapshot emitter.
//!
//! Endpoints:
//! - GET    /health                        - Server status
//! - POST   /api/start                     - Create a job
//! - POST   /api/status                    - Poll a job (ETag / If-None-Match aware)
//! - POST   /api/upload                    - Upload and normalize a document
//! - GET    /api/projects/{id}             - Job summary, without advancing it
//! - DELETE /api/projects/{id}             - Remove a job
//! - POST   /api/projects/{id}/signal      - Report one completed pipeline stage
//!
//! All responses use Content-Type: application/json.

mod error;
mod handlers;
mod state;
mod status;
mod upload;

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::DefaultBodyLimit;
use axum::http::{Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use stagewatch_storage::{InMemoryJobStore, JobStore};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ServeConfig;

use self::handlers::{
    handle_delete_project, handle_get_project, handle_health, handle_not_found, handle_signal,
    handle_start,
};
use self::state::AppState;
use self::status::handle_status;
use self::upload::handle_upload;

/// Construct a JSON error response with the given status code and message.
fn json_error(status: StatusCode, message: &str) -> impl IntoResponse {
    (status, Json(serde_json::json!({"error": message})))
}

/// Build the application router around `state`.
pub(crate) fn router(state: Arc<AppState>, max_body_size: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers(Any)
        .expose_headers([axum::http::header::ETAG]);

    Router::new()
        .route("/health", get(handle_health))
        .route("/api/start", post(handle_start))
        .route("/api/status", post(handle_status))
        .route("/api/upload", post(handle_upload))
        .route(
            "/api/projects/{id}",
            get(handle_get_project).delete(handle_delete_project),
        )
        .route("/api/projects/{id}/signal", post(handle_signal))
        .fallback(handle_not_found)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(DefaultBodyLimit::max(max_body_size))
        .with_state(state)
}

/// Start the HTTP server and run until Ctrl+C.
pub(crate) async fn start_server(config: ServeConfig) -> Result<(), Box<dyn std::error::Error>> {
    tokio::fs::create_dir_all(&config.upload_dir).await?;

    let store = Arc::new(InMemoryJobStore::new(config.policy()));
    tracing::info!(
        advance = %config.advance,
        policy = store.policy_name(),
        emit_mode = %config.emit_mode,
        stage_threshold_ms = config.stage_threshold_ms,
        upload_dir = %config.upload_dir.display(),
        "job store ready"
    );

    let state = Arc::new(AppState::new(
        store.clone(),
        config.emit_mode,
        config.upload_dir.clone(),
    ));
    let sweeper = tokio::spawn(sweep_expired(
        store,
        config.sweep_interval(),
        config.grace_period(),
    ));

    let app = router(state, config.max_body_size);
    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("stagewatch listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.abort();
    tracing::info!("server shut down");
    Ok(())
}

/// Periodically evict finished jobs whose grace period has run out.
async fn sweep_expired(store: Arc<dyn JobStore>, every: Duration, grace: Duration) {
    let mut ticker = tokio::time::interval(every);
    loop {
        ticker.tick().await;
        match store.evict_expired(Instant::now(), grace).await {
            Ok(evicted) if !evicted.is_empty() => {
                tracing::debug!(?evicted, "sweep evicted jobs");
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "sweep failed"),
        }
    }
}

/// Wait for a shutdown signal (Ctrl+C).
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "could not install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("received shutdown signal");
}
