//! Lingopath Placement Server library.

pub mod handlers;

use std::sync::Arc;
use std::time::Instant;

use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use lingopath_config::AppConfig;
use lingopath_domain::PlacementService;
use lingopath_storage::check_connection;
use sqlx::PgPool;

use handlers::placement::{start_test, submit_answer};

/// Application state shared across handlers.
pub struct AppState {
    pub pool: PgPool,
    pub placement: PlacementService,
    pub config: AppConfig,
    pub start_time: Instant,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
}

#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    pub status: String,
    pub database: String,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let placement = Router::new()
        .route("/placement/{assigned_id}/start", post(start_test))
        .route("/placement/{session_id}/answer", post(submit_answer));

    let api_base = if state.config.api_v1_prefix.is_empty() {
        "/api/v1".to_string()
    } else {
        format!("{}/api/v1", state.config.api_v1_prefix)
    };

    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/ready", get(ready))
        .nest(&api_base, placement)
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check endpoint.
async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let uptime = state.start_time.elapsed().as_secs();

    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: uptime,
    })
}

/// Readiness check endpoint.
async fn ready(State(state): State<Arc<AppState>>) -> Json<ReadyResponse> {
    let db_status = match check_connection(&state.pool).await {
        Ok(()) => "connected",
        Err(_) => "disconnected",
    };

    Json(ReadyResponse {
        status: if db_status == "connected" {
            "ok"
        } else {
            "degraded"
        }
        .to_string(),
        database: db_status.to_string(),
    })
}
