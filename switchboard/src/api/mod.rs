//! HTTP API routes
//!
//! Stateless HTTP access to the task engine plus the realtime WebSocket
//! channel. Handlers return structured `{error: {code, message}}` payloads
//! on failure.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use std::sync::Arc;

pub mod tasks;
pub mod websocket;

use crate::app_state::AppState;
use crate::hub::BroadcastHub;

#[derive(Clone)]
pub struct ApiState {
    pub app_state: Arc<AppState>,
    pub hub: BroadcastHub,
}

/// Configure all API routes
pub fn router() -> Router<ApiState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/ws", get(websocket::ws_handler))
        .route("/tasks", post(tasks::submit_task))
        .route("/tasks/{task_id}", get(tasks::get_task))
        .route("/tasks/{task_id}/messages", get(tasks::get_task_messages))
        .route("/tasks/{task_id}/progress", get(tasks::get_task_progress))
}

/// Health check endpoint
pub async fn health_check(State(_state): State<ApiState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "switchboard",
            "version": "0.1.0"
        })),
    )
}
