//! HTTP control API.
//!
//! Thin translator from HTTP verbs to control-plane methods, plus the
//! dashboard page. CORS is wide open so the dashboard can be served from
//! anywhere during development.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::{header, Method, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use super::control::ControlPlane;

#[derive(Clone)]
pub struct AppState {
    pub control: Arc<ControlPlane>,
    pub frontend_path: PathBuf,
}

/// Build the API router.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
        .allow_origin(Any);

    Router::new()
        .route("/api/status", get(status))
        .route("/api/seed", post(set_seed))
        .route("/api/start", post(start))
        .route("/", get(frontend))
        .route("/index.html", get(frontend))
        .fallback(unknown_endpoint)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the API until shutdown.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    info!(
        addr = %listener.local_addr().context("HTTP listener has no local address")?,
        "HTTP API listening"
    );

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            info!("HTTP API shutting down");
        })
        .await
        .context("HTTP server error")
}

async fn status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.control.status())
}

async fn set_seed(State(state): State<AppState>, body: String) -> Response {
    match state.control.set_seed(&body) {
        Ok(()) => Json(json!({
            "status": "success",
            "message": "Seed URL set successfully",
        }))
        .into_response(),
        Err(e) => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

async fn start(State(state): State<AppState>) -> impl IntoResponse {
    state.control.start();
    Json(json!({
        "status": "success",
        "message": "Crawler started successfully",
    }))
}

async fn frontend(State(state): State<AppState>) -> Response {
    match std::fs::read_to_string(&state.frontend_path) {
        Ok(contents) => Html(contents).into_response(),
        Err(e) => {
            warn!(
                path = %state.frontend_path.display(),
                error = %e,
                "cannot open frontend page"
            );
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONTENT_TYPE, "text/html")],
                "<!DOCTYPE html><html><body><h1>Error: Frontend file not found</h1>\
                 <p>The frontend.html file could not be loaded.</p></body></html>",
            )
                .into_response()
        }
    }
}

async fn unknown_endpoint() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": "Unknown endpoint" })),
    )
}
