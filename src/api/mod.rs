//! Control surface consumed by the dashboard layer: scheduler status, mode
//! changes, the synchronous manual trigger, and read-only audit feeds.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::error::Result;
use crate::mode::Mode;
use crate::scheduler::{Scheduler, TriggerResponse};
use crate::store::Store;

/// Shared state for API handlers
#[derive(Clone)]
pub struct ApiState {
    pub scheduler: Arc<Scheduler>,
    pub store: Arc<dyn Store>,
}

pub fn create_router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/status", get(get_status))
        .route("/api/mode", post(set_mode))
        .route("/api/trigger", post(trigger_cycle))
        .route("/api/cycles", get(get_cycles))
        .route("/api/decisions", get(get_decisions))
        .route("/api/trades", get(get_trades))
        .route("/api/reflections", get(get_reflections))
        .route("/api/snapshots", get(get_snapshots))
        .with_state(state)
        .layer(cors)
}

/// Serve the control API until the shutdown signal fires
pub async fn serve(
    state: ApiState,
    port: u16,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("control API listening on {addr}");

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
        })
        .await?;
    Ok(())
}

#[derive(Debug, Deserialize)]
struct LimitQuery {
    #[serde(default = "default_limit")]
    limit: i64,
}

fn default_limit() -> i64 {
    50
}

#[derive(Debug, Deserialize)]
struct SetModeRequest {
    mode: Mode,
}

#[derive(Debug, Serialize)]
struct SetModeResponse {
    mode: Mode,
    previous: Mode,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

fn internal_error(e: impl std::fmt::Display) -> (StatusCode, Json<ErrorBody>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorBody {
            error: e.to_string(),
        }),
    )
}

async fn get_status(State(state): State<ApiState>) -> impl IntoResponse {
    Json(state.scheduler.status())
}

async fn set_mode(
    State(state): State<ApiState>,
    Json(request): Json<SetModeRequest>,
) -> impl IntoResponse {
    let previous = state.scheduler.set_mode(request.mode).await;
    Json(SetModeResponse {
        mode: request.mode,
        previous,
    })
}

async fn trigger_cycle(State(state): State<ApiState>) -> impl IntoResponse {
    match state.scheduler.trigger_manual().await {
        Ok(TriggerResponse::Completed(cycle)) => Json(cycle).into_response(),
        Ok(TriggerResponse::Busy) => (
            StatusCode::CONFLICT,
            Json(ErrorBody {
                error: "a cycle is already in flight".to_string(),
            }),
        )
            .into_response(),
        Ok(TriggerResponse::Disabled) => (
            StatusCode::CONFLICT,
            Json(ErrorBody {
                error: "trigger disabled".to_string(),
            }),
        )
            .into_response(),
        Err(e) => internal_error(e).into_response(),
    }
}

async fn get_cycles(
    State(state): State<ApiState>,
    Query(query): Query<LimitQuery>,
) -> impl IntoResponse {
    match state.store.recent_cycles(query.limit).await {
        Ok(cycles) => Json(cycles).into_response(),
        Err(e) => internal_error(e).into_response(),
    }
}

async fn get_decisions(
    State(state): State<ApiState>,
    Query(query): Query<LimitQuery>,
) -> impl IntoResponse {
    match state.store.recent_decisions(query.limit).await {
        Ok(decisions) => Json(decisions).into_response(),
        Err(e) => internal_error(e).into_response(),
    }
}

async fn get_trades(
    State(state): State<ApiState>,
    Query(query): Query<LimitQuery>,
) -> impl IntoResponse {
    match state.store.recent_trades(query.limit).await {
        Ok(trades) => Json(trades).into_response(),
        Err(e) => internal_error(e).into_response(),
    }
}

async fn get_reflections(
    State(state): State<ApiState>,
    Query(query): Query<LimitQuery>,
) -> impl IntoResponse {
    match state.store.recent_reflections(query.limit).await {
        Ok(reflections) => Json(reflections).into_response(),
        Err(e) => internal_error(e).into_response(),
    }
}

async fn get_snapshots(
    State(state): State<ApiState>,
    Query(query): Query<LimitQuery>,
) -> impl IntoResponse {
    match state.store.recent_snapshots(query.limit).await {
        Ok(snapshots) => Json(snapshots).into_response(),
        Err(e) => internal_error(e).into_response(),
    }
}
