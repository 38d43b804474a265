use super::state::AppState;
use crate::error::{ErrorKind, SessionError};
use crate::session::{SessionNotice, SessionState, SessionStats};
use crate::transcript::Turn;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct SubmitTextRequest {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct StartSessionResponse {
    pub session_id: String,
    pub status: SessionState,
    pub started_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct StopSessionResponse {
    pub session_id: String,
    pub status: SessionState,
    pub stats: SessionStats,
}

/// State after a turn-control command
#[derive(Debug, Serialize)]
pub struct ActionResponse {
    pub status: SessionState,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    #[serde(flatten)]
    pub stats: SessionStats,

    /// Text being heard right now
    pub interim: String,

    pub notice: Option<SessionNotice>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: ErrorKind,
}

fn error_response(err: SessionError) -> Response {
    let status = match &err {
        SessionError::PermissionDenied => StatusCode::FORBIDDEN,
        SessionError::Unsupported(_) => StatusCode::NOT_IMPLEMENTED,
        SessionError::NotActive | SessionError::Busy(_) | SessionError::NothingToRetry => {
            StatusCode::CONFLICT
        }
        SessionError::Closed => StatusCode::SERVICE_UNAVAILABLE,
        SessionError::Capture(_) | SessionError::Exchange(_) => StatusCode::BAD_GATEWAY,
    };

    if status.is_server_error() {
        error!("Session request failed: {}", err);
    } else {
        warn!("Session request rejected: {}", err);
    }

    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
            kind: err.kind(),
        }),
    )
        .into_response()
}

fn action_response(state: &AppState, result: Result<(), SessionError>) -> Response {
    match result {
        Ok(()) => (
            StatusCode::OK,
            Json(ActionResponse {
                status: state.controller.snapshot().state,
            }),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /session/start
/// Start a tutoring session (restarts one already running)
pub async fn start_session(State(state): State<AppState>) -> impl IntoResponse {
    let session_id = state.controller.session_id().to_string();
    info!("Starting tutoring session: {}", session_id);

    if let Err(e) = state.controller.start_session().await {
        return error_response(e);
    }

    let snapshot = state.controller.snapshot();
    (
        StatusCode::OK,
        Json(StartSessionResponse {
            session_id,
            status: snapshot.state,
            started_at: snapshot.started_at,
        }),
    )
        .into_response()
}

/// POST /session/stop
/// Stop the session and return its final statistics
pub async fn stop_session(State(state): State<AppState>) -> impl IntoResponse {
    match state.controller.stop_session().await {
        Ok(stats) => {
            info!(
                "Session stopped after {} turns ({:.1}s)",
                stats.turns_count, stats.duration_secs
            );
            (
                StatusCode::OK,
                Json(StopSessionResponse {
                    session_id: stats.session_id.clone(),
                    status: stats.state,
                    stats,
                }),
            )
                .into_response()
        }
        Err(e) => error_response(e),
    }
}

/// POST /session/text
/// Typed alternative to speaking
pub async fn submit_text(
    State(state): State<AppState>,
    Json(req): Json<SubmitTextRequest>,
) -> impl IntoResponse {
    let result = state.controller.submit_text(req.text).await;
    action_response(&state, result)
}

/// POST /session/listen
pub async fn listen(State(state): State<AppState>) -> impl IntoResponse {
    let result = state.controller.listen().await;
    action_response(&state, result)
}

/// POST /session/finish
pub async fn finish_utterance(State(state): State<AppState>) -> impl IntoResponse {
    let result = state.controller.finish_utterance().await;
    action_response(&state, result)
}

/// POST /session/retry
pub async fn retry(State(state): State<AppState>) -> impl IntoResponse {
    let result = state.controller.retry().await;
    action_response(&state, result)
}

/// POST /session/wake-lock/revoked
/// The host or front end reports that the platform dropped the wake lock
pub async fn wake_lock_revoked(State(state): State<AppState>) -> impl IntoResponse {
    info!("Wake lock revocation reported");
    state.controller.wake_lock_revoked();

    (
        StatusCode::ACCEPTED,
        Json(ActionResponse {
            status: state.controller.snapshot().state,
        }),
    )
}

/// GET /session/status
pub async fn get_status(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.controller.snapshot();
    let stats = SessionStats::from_snapshot(state.controller.session_id(), &snapshot);

    (
        StatusCode::OK,
        Json(StatusResponse {
            stats,
            interim: snapshot.interim,
            notice: snapshot.notice,
        }),
    )
}

/// GET /session/transcript
/// Committed turns of the current (or last) session
pub async fn get_transcript(State(state): State<AppState>) -> impl IntoResponse {
    let transcript: Vec<Turn> = state.controller.snapshot().transcript;
    (StatusCode::OK, Json(transcript))
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
