use super::state::AppState;
use crate::error::CoachError;
use crate::session::{CoachingProfile, CoordinatorSnapshot};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ConfigureRequest {
    pub language: String,
    pub scenario: String,
    pub topic: String,
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    /// Present when the assessment gate is still closed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_ms: Option<u64>,
    pub session: Option<CoordinatorSnapshot>,
}

fn error_response(err: CoachError, session: Option<CoordinatorSnapshot>) -> Response {
    let status = match &err {
        CoachError::RemoteService(_) | CoachError::AssessmentSynthesis(_) => {
            StatusCode::BAD_GATEWAY
        }
        CoachError::AssessmentLocked { .. } | CoachError::InvalidState(_) => StatusCode::CONFLICT,
        CoachError::UnsupportedCapability(_) => StatusCode::NOT_IMPLEMENTED,
        CoachError::Audio(_) | CoachError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let remaining_ms = match &err {
        CoachError::AssessmentLocked { remaining_ms } => Some(*remaining_ms),
        _ => None,
    };

    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
            remaining_ms,
            session,
        }),
    )
        .into_response()
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /session
pub async fn get_session(State(state): State<AppState>) -> impl IntoResponse {
    let coordinator = state.coordinator.lock().await;
    (StatusCode::OK, Json(coordinator.snapshot()))
}

/// POST /session/configure
pub async fn configure(
    State(state): State<AppState>,
    Json(req): Json<ConfigureRequest>,
) -> Response {
    let mut coordinator = state.coordinator.lock().await;
    let profile = CoachingProfile {
        language: req.language,
        scenario: req.scenario,
        topic: req.topic,
    };

    match coordinator.configure(profile) {
        Ok(()) => (StatusCode::OK, Json(coordinator.snapshot())).into_response(),
        Err(e) => error_response(e, Some(coordinator.snapshot())),
    }
}

/// POST /session/chat/start
pub async fn start_chat(State(state): State<AppState>) -> Response {
    let mut coordinator = state.coordinator.lock().await;
    match coordinator.start_text_chat().await {
        Ok(()) => (StatusCode::OK, Json(coordinator.snapshot())).into_response(),
        Err(e) => error_response(e, Some(coordinator.snapshot())),
    }
}

/// POST /session/chat/stop
pub async fn stop_chat(State(state): State<AppState>) -> impl IntoResponse {
    let mut coordinator = state.coordinator.lock().await;
    coordinator.stop_text_chat();
    (StatusCode::OK, Json(coordinator.snapshot()))
}

/// POST /session/message
/// Send one text turn; may be redirected to the assessment
pub async fn send_message(
    State(state): State<AppState>,
    Json(req): Json<SendMessageRequest>,
) -> Response {
    let mut coordinator = state.coordinator.lock().await;

    match coordinator.send_text(&req.text).await {
        Ok(()) => (StatusCode::OK, Json(coordinator.snapshot())).into_response(),
        Err(e) => {
            error!("Failed to send message: {}", e);
            error_response(e, Some(coordinator.snapshot()))
        }
    }
}

/// POST /session/assessment
pub async fn request_assessment(State(state): State<AppState>) -> Response {
    let mut coordinator = state.coordinator.lock().await;
    info!("Assessment requested over HTTP");

    match coordinator.request_assessment().await {
        Ok(()) => (StatusCode::OK, Json(coordinator.snapshot())).into_response(),
        Err(e) => {
            warn!("Assessment request failed: {}", e);
            error_response(e, Some(coordinator.snapshot()))
        }
    }
}

/// GET /session/report
pub async fn get_report(State(state): State<AppState>) -> Response {
    let coordinator = state.coordinator.lock().await;
    match coordinator.report() {
        Some(report) => (StatusCode::OK, Json(report.clone())).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: "No report available".to_string(),
                remaining_ms: None,
                session: None,
            }),
        )
            .into_response(),
    }
}

/// GET /session/report/export
/// Plain-text download of the report
pub async fn export_report(State(state): State<AppState>) -> Response {
    let coordinator = state.coordinator.lock().await;
    match coordinator.export_report() {
        Some(export) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}\"", export.file_name),
                ),
            ],
            export.contents,
        )
            .into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: "No report available".to_string(),
                remaining_ms: None,
                session: None,
            }),
        )
            .into_response(),
    }
}

/// POST /session/reset
pub async fn reset(State(state): State<AppState>) -> impl IntoResponse {
    let mut coordinator = state.coordinator.lock().await;
    coordinator.reset().await;
    (StatusCode::OK, Json(coordinator.snapshot()))
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
