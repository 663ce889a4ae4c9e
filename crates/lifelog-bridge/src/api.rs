//! REST API endpoints for the bridge.
//!
//! Every handler forwards to the session task; none of them holds a lock or
//! touches the database directly.
//!
//! ## Error Handling
//!
//! All endpoints return structured JSON errors via [`AppError`]. Rejected
//! input returns 400, a stopped session returns 503 and storage failures
//! return 500.
//!
//! # Example
//!
//! ```ignore
//! use axum::Router;
//! use lifelog_bridge::api;
//!
//! let app = api::router().with_state(state);
//! ```

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::Serialize;
use time::OffsetDateTime;

use lifelog_types::{DeviceMessage, QueueRecord};

use crate::bridge;
use crate::session::{SessionClosed, SessionError, SessionStatus};
use crate::settings::{ConfigUpdate, SettingsError};
use crate::state::AppState;

/// Create the API router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/status", get(get_status))
        .route("/api/queue", get(get_queue))
        .route("/api/flush", post(flush))
        .route("/api/device/message", post(device_message))
        .route("/api/config", post(submit_config))
        .route("/api/config/url", get(config_url))
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: OffsetDateTime::now_utc(),
    })
}

/// Service status response.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub version: &'static str,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    /// Number of connected device links.
    pub device_links: usize,
    /// Queue and upload state.
    pub session: SessionStatus,
}

async fn get_status(State(state): State<Arc<AppState>>) -> Result<Json<StatusResponse>, AppError> {
    let session = state.session.status().await?;
    Ok(Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION"),
        started_at: state.started_at,
        device_links: state.device_tx.receiver_count(),
        session,
    }))
}

/// Pending records response.
#[derive(Debug, Serialize)]
pub struct QueueResponse {
    pub count: usize,
    /// Records in upload order, head first.
    pub records: Vec<QueueRecord>,
}

async fn get_queue(State(state): State<Arc<AppState>>) -> Result<Json<QueueResponse>, AppError> {
    let records = state.session.pending().await?;
    Ok(Json(QueueResponse {
        count: records.len(),
        records,
    }))
}

/// Response for requests handed to the session.
#[derive(Debug, Serialize)]
pub struct AcceptedResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

/// Manual upload trigger.
async fn flush(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, AppError> {
    state.session.flush()?;
    Ok((
        StatusCode::ACCEPTED,
        Json(AcceptedResponse {
            status: "flush requested",
            key: None,
        }),
    ))
}

/// Inbound device message.
///
/// Malformed messages are rejected here so the caller gets feedback; the
/// session would otherwise drop them silently.
async fn device_message(
    State(state): State<Arc<AppState>>,
    Json(msg): Json<DeviceMessage>,
) -> Result<impl IntoResponse, AppError> {
    let record = bridge::parse_inbound(&msg).map_err(|e| AppError::BadRequest(e.to_string()))?;
    state.session.device_message(msg)?;
    Ok((
        StatusCode::ACCEPTED,
        Json(AcceptedResponse {
            status: "queued",
            key: Some(record.key),
        }),
    ))
}

/// Configuration UI result, as raw or percent-encoded JSON.
async fn submit_config(
    State(state): State<Arc<AppState>>,
    body: String,
) -> Result<Json<ConfigUpdate>, AppError> {
    let update = state.session.submit_config(body).await?;
    Ok(Json(update))
}

/// Configuration UI URL response.
#[derive(Debug, Serialize)]
pub struct ConfigUrlResponse {
    pub url: String,
}

async fn config_url(State(state): State<Arc<AppState>>) -> Result<Json<ConfigUrlResponse>, AppError> {
    let url = state.session.config_url().await?;
    Ok(Json(ConfigUrlResponse { url }))
}

/// Application error type.
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Unavailable(String),
    Internal(String),
}

impl From<SessionClosed> for AppError {
    fn from(e: SessionClosed) -> Self {
        AppError::Unavailable(e.to_string())
    }
}

impl From<SessionError> for AppError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::Closed(e) => e.into(),
            SessionError::Settings(SettingsError::Store(e)) => AppError::Internal(e.to_string()),
            SessionError::Settings(e) => AppError::BadRequest(e.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = serde_json::json!({
            "error": message,
        });

        (status, Json(body)).into_response()
    }
}
