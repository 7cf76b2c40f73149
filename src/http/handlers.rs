use super::state::{AppState, SessionEntry};
use crate::audio::{create_capture_device, MediaCapture};
use crate::error::VoiceError;
use crate::session::{ConversationSession, SessionMode, TurnState};
use crate::store::{MatchRecord, Profile};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Topic used when a session is created without one
pub const DEFAULT_TOPIC: &str = "Free conversation";

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    /// Existing match to play out; a new match is created when absent
    pub match_id: Option<Uuid>,

    pub user_id: Uuid,

    #[serde(default)]
    pub mode: SessionMode,

    /// Topic for a new match, or a topic change for an existing one
    pub topic: Option<String>,

    /// Display name for the learner's turns
    pub user_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateSessionResponse {
    pub session_id: Uuid,
    pub match_id: Uuid,
    pub mode: SessionMode,
    pub topic: String,
    #[serde(flatten)]
    pub state: TurnState,
}

#[derive(Debug, Serialize)]
pub struct ListenResponse {
    /// False when the session was busy and nothing happened
    pub started: bool,
    #[serde(flatten)]
    pub state: TurnState,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub cancelled: bool,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,

    /// What the user can do about it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
}

fn error_response(status: StatusCode, error: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
            remediation: None,
        }),
    )
        .into_response()
}

fn voice_error_response(err: VoiceError) -> Response {
    let status = match &err {
        VoiceError::PermissionDenied => StatusCode::FORBIDDEN,
        VoiceError::NoDevice | VoiceError::DeviceBusy | VoiceError::Device(_) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        VoiceError::Unsupported | VoiceError::UnsupportedFormat => StatusCode::UNPROCESSABLE_ENTITY,
        VoiceError::Cancelled | VoiceError::InvalidTransition { .. } => StatusCode::CONFLICT,
        VoiceError::NetworkFailure(_) => StatusCode::BAD_GATEWAY,
        VoiceError::Encode(_) | VoiceError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let remediation = err.remediation().map(str::to_string);
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
            remediation,
        }),
    )
        .into_response()
}

fn session_not_found(session_id: Uuid) -> Response {
    error_response(
        StatusCode::NOT_FOUND,
        format!("Session {} not found", session_id),
    )
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /sessions
/// Create a session for an existing or new match and begin it
pub async fn create_session(
    State(state): State<AppState>,
    Json(req): Json<CreateSessionRequest>,
) -> impl IntoResponse {
    let store = &state.services.store;

    let (match_record, topic_change) = match req.match_id {
        Some(match_id) => match store.get_match(match_id).await {
            Ok(Some(record)) => (record, req.topic.clone()),
            Ok(None) => {
                return error_response(
                    StatusCode::NOT_FOUND,
                    format!("Match {} not found", match_id),
                )
            }
            Err(e) => return voice_error_response(e),
        },
        None if req.mode == SessionMode::Partner => {
            return error_response(
                StatusCode::BAD_REQUEST,
                "Partner sessions need the match_id of an existing match",
            )
        }
        None => {
            let topic = req.topic.clone().unwrap_or_else(|| DEFAULT_TOPIC.to_string());
            match store
                .create_match(MatchRecord::new(req.user_id, None, topic))
                .await
            {
                Ok(record) => (record, None),
                Err(e) => return voice_error_response(e),
            }
        }
    };

    if req.mode == SessionMode::Partner {
        match match_record.partner_of(req.user_id) {
            Some(partner) => info!(
                "Partner session for {} with {} on match {}",
                req.user_id, partner, match_record.id
            ),
            None => {
                return error_response(
                    StatusCode::BAD_REQUEST,
                    format!(
                        "Match {} has no partner for user {}",
                        match_record.id, req.user_id
                    ),
                )
            }
        }
    }

    match store.get_profile(req.user_id).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            let name = req.user_name.clone().unwrap_or_else(|| "Learner".to_string());
            let mut profile = Profile::new(name);
            profile.id = req.user_id;
            if let Err(e) = store.upsert_profile(profile).await {
                warn!("Failed to create profile for {}: {}", req.user_id, e);
            }
        }
        Err(e) => warn!("Failed to load profile for {}: {}", req.user_id, e),
    }

    let device = match create_capture_device(&state.template.capture_source) {
        Ok(device) => device,
        Err(e) => {
            error!("Failed to create capture device: {}", e);
            return voice_error_response(e);
        }
    };
    let capture = MediaCapture::new(device, state.template.constraints.clone());

    let mut config = state.template.config.clone();
    config.user_id = req.user_id;
    config.mode = req.mode;
    if let Some(name) = req.user_name.clone() {
        config.user_name = name;
    }
    let time_limit = config.time_limit;

    let mut session = ConversationSession::new(
        config,
        match_record,
        capture,
        state.services.clone(),
    );
    if let Some(topic) = topic_change {
        session.change_topic(topic, Vec::new()).await;
    }
    if let Err(e) = session.begin().await {
        error!("Failed to begin session: {}", e);
        return voice_error_response(e);
    }

    let response = CreateSessionResponse {
        session_id: session.id(),
        match_id: session.match_id(),
        mode: session.mode(),
        topic: session.topic().to_string(),
        state: session.state(),
    };

    state
        .sessions
        .write()
        .await
        .insert(response.session_id, SessionEntry::new(session));
    if let Some(limit) = time_limit {
        SessionEntry::watch_time_limit(state.sessions.clone(), response.session_id, limit);
    }

    info!(
        "Session {} created for match {}",
        response.session_id, response.match_id
    );

    (StatusCode::CREATED, Json(response)).into_response()
}

/// POST /sessions/:session_id/listen/start
pub async fn start_listening(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> impl IntoResponse {
    let Some(entry) = state.session(session_id).await else {
        return session_not_found(session_id);
    };

    let mut session = entry.session.lock().await;
    match session.start_listening().await {
        Ok(started) => (
            StatusCode::OK,
            Json(ListenResponse {
                started,
                state: session.state(),
            }),
        )
            .into_response(),
        Err(e) => {
            warn!("Session {} could not start listening: {}", session_id, e);
            voice_error_response(e)
        }
    }
}

/// POST /sessions/:session_id/listen/stop
/// Finish the learner's turn; responds once the reply has been voiced
pub async fn stop_listening(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> impl IntoResponse {
    let Some(entry) = state.session(session_id).await else {
        return session_not_found(session_id);
    };

    let mut session = entry.session.lock().await;
    match session.stop_listening().await {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(e) => voice_error_response(e),
    }
}

/// POST /sessions/:session_id/cancel
/// Interrupt the in-flight reply or playback
pub async fn cancel_turn(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> impl IntoResponse {
    let Some(entry) = state.session(session_id).await else {
        return session_not_found(session_id);
    };

    let cancelled = entry.canceller.cancel();
    info!("Cancel requested for session {} (pending: {})", session_id, cancelled);

    (StatusCode::OK, Json(CancelResponse { cancelled })).into_response()
}

/// POST /sessions/:session_id/end
/// End the session and return its feedback
pub async fn end_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> impl IntoResponse {
    info!("Ending session: {}", session_id);

    // Find and remove session
    let entry = {
        let mut sessions = state.sessions.write().await;
        sessions.remove(&session_id)
    };
    let Some(entry) = entry else {
        return session_not_found(session_id);
    };

    entry.canceller.cancel();
    let summary = entry.session.lock().await.end().await;

    (StatusCode::OK, Json(summary)).into_response()
}

/// GET /sessions/:session_id/status
pub async fn get_session_status(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> impl IntoResponse {
    let Some(entry) = state.session(session_id).await else {
        return session_not_found(session_id);
    };

    let status = entry.session.lock().await.status();
    (StatusCode::OK, Json(status)).into_response()
}

/// GET /sessions/:session_id/transcript
pub async fn get_session_transcript(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> impl IntoResponse {
    let Some(entry) = state.session(session_id).await else {
        return session_not_found(session_id);
    };

    let turns = entry.session.lock().await.transcript().to_vec();
    (StatusCode::OK, Json(turns)).into_response()
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
