//! HTTP surface: `POST /liveness` and `GET /health`.

use axum::extract::{DefaultBodyLimit, State};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::Instrument;
use vigil_core::{Challenge, RequestError};

use crate::engine::{EngineError, EngineHandle};

pub const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Clone)]
pub struct AppState {
    pub engine: EngineHandle,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct FrameInput {
    pub image_base64: String,
}

#[derive(Debug, Deserialize)]
pub struct LivenessRequest {
    pub frames: Vec<FrameInput>,
    /// `head_turn` when omitted.
    #[serde(default)]
    pub challenge: Option<String>,
    #[serde(default)]
    pub debug: bool,
}

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub version: &'static str,
    pub started_at: DateTime<Utc>,
}

/// Errors surfaced to HTTP callers. Verdicts, including spoof verdicts,
/// are not errors.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    BadRequest(RequestError),
    #[error("liveness engine unavailable")]
    Unavailable,
    #[error("liveness evaluation timed out")]
    Timeout,
}

impl ApiError {
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::Timeout => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Request(e) => Self::BadRequest(e),
            EngineError::Timeout(_) => Self::Timeout,
            EngineError::ChannelClosed | EngineError::Spawn(_) => Self::Unavailable,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "detail": self.to_string() });
        (self.status_code(), Json(body)).into_response()
    }
}

pub fn router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/liveness", post(liveness))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(state)
}

pub async fn liveness(State(state): State<AppState>, Json(req): Json<LivenessRequest>) -> Response {
    let request_id = uuid::Uuid::new_v4().to_string();
    let span = tracing::info_span!("liveness", request_id = %request_id);

    let challenge = req
        .challenge
        .as_deref()
        .map(Challenge::parse)
        .unwrap_or_default();
    let debug_requested = req.debug;
    let frames: Vec<String> = req.frames.into_iter().map(|f| f.image_base64).collect();

    let result = async {
        tracing::debug!(frames = frames.len(), challenge = %challenge, debug = debug_requested, "request received");
        let result = state.engine.verify(frames, challenge, debug_requested).await;
        if let Err(e) = &result {
            tracing::warn!(error = %e, "liveness request rejected");
        }
        result
    }
    .instrument(span)
    .await;

    let mut response = match result {
        Ok(verdict) => Json(verdict).into_response(),
        Err(e) => ApiError::from(e).into_response(),
    };
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

pub async fn health(State(state): State<AppState>) -> Json<Health> {
    Json(Health {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        started_at: state.started_at,
    })
}
