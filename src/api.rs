use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::CorsLayer;

use crate::scheduler::{Scheduler, SchedulerStatus, TriggerTarget};

#[derive(Clone)]
pub struct AppState {
    pub scheduler: Scheduler,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/scheduler/status", get(scheduler_status))
        .route("/scheduler/start", post(start_scheduler))
        .route("/scheduler/stop", post(stop_scheduler))
        .route("/scheduler/trigger/{target}", post(trigger_fetch))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(serde::Serialize)]
struct ControlResp {
    message: String,
    status: String,
}

fn resp(
    code: StatusCode,
    message: impl Into<String>,
    status: &str,
) -> (StatusCode, Json<ControlResp>) {
    (
        code,
        Json(ControlResp {
            message: message.into(),
            status: status.to_string(),
        }),
    )
}

async fn scheduler_status(State(state): State<AppState>) -> Json<SchedulerStatus> {
    Json(state.scheduler.status())
}

async fn start_scheduler(State(state): State<AppState>) -> (StatusCode, Json<ControlResp>) {
    match state.scheduler.start() {
        Ok(()) => resp(StatusCode::OK, "meme scheduler started", "running"),
        Err(e) => resp(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("failed to start scheduler: {e:#}"),
            "error",
        ),
    }
}

async fn stop_scheduler(State(state): State<AppState>) -> (StatusCode, Json<ControlResp>) {
    match state.scheduler.stop().await {
        Ok(()) => resp(StatusCode::OK, "meme scheduler stopped", "stopped"),
        Err(e) => resp(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("failed to stop scheduler: {e:#}"),
            "error",
        ),
    }
}

async fn trigger_fetch(
    State(state): State<AppState>,
    Path(target): Path<String>,
) -> (StatusCode, Json<ControlResp>) {
    let target: TriggerTarget = match target.parse() {
        Ok(t) => t,
        Err(e) => return resp(StatusCode::BAD_REQUEST, e.to_string(), "error"),
    };
    match state.scheduler.trigger(target) {
        Ok(()) => resp(
            StatusCode::OK,
            format!("{target} fetch triggered"),
            "triggered",
        ),
        Err(e) => resp(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("failed to trigger {target}: {e:#}"),
            "error",
        ),
    }
}
