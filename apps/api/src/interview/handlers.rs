//! Axum route handlers for the live interview.
//!
//! Turns run on a spawned task that owns the session lock, so a client that
//! disconnects mid-turn never cancels a reply halfway through history.

use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;

use anyhow::anyhow;
use axum::{
    extract::State,
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use bytes::Bytes;
use futures::Stream;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::AppError;
use crate::interview::frame::{decode_frame, VideoFeed, WatchFeed};
use crate::interview::orchestrator::{InterviewError, InterviewStatus, TurnOutcome};
use crate::models::interview::{InterviewType, InterviewTypeSet, SessionGoal};
use crate::state::{AppState, LiveSession};

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct StartInterviewRequest {
    pub candidate_name: String,
    pub target_role: String,
    pub interview_types: Vec<InterviewType>,
}

#[derive(Debug, Serialize)]
pub struct StartInterviewResponse {
    pub session_id: uuid::Uuid,
    #[serde(flatten)]
    pub turn: TurnOutcome,
}

#[derive(Debug, Deserialize)]
pub struct UtteranceRequest {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct CaptureErrorRequest {
    #[serde(default)]
    pub reason: String,
}

/// Runs `fut` to completion on its own task, even if the request is dropped.
async fn run_detached<F, T>(fut: F) -> Result<T, AppError>
where
    F: Future<Output = Result<T, InterviewError>> + Send + 'static,
    T: Send + 'static,
{
    tokio::spawn(fut)
        .await
        .map_err(|e| AppError::Internal(anyhow!("interview task failed: {e}")))?
        .map_err(AppError::from)
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/interview/start
///
/// Starts a fresh interview, discarding any previous session, and returns the
/// opening question.
pub async fn handle_start(
    State(state): State<AppState>,
    Json(req): Json<StartInterviewRequest>,
) -> Result<Json<StartInterviewResponse>, AppError> {
    if req.candidate_name.trim().is_empty() {
        return Err(AppError::Validation("candidate_name cannot be empty".to_string()));
    }
    if req.target_role.trim().is_empty() {
        return Err(AppError::Validation("target_role cannot be empty".to_string()));
    }
    let types = InterviewTypeSet::new(req.interview_types).ok_or_else(|| {
        AppError::Validation("select at least one interview type".to_string())
    })?;
    let goal = SessionGoal::new(req.candidate_name.trim(), req.target_role.trim());
    let session_id = goal.id;

    let mut session = Arc::clone(&state.session).lock_owned().await;
    let frames = Arc::clone(&state.frames);
    let turn = run_detached(async move {
        let LiveSession { context, interview } = &mut *session;
        // Frames from a previous interview must not leak into this one.
        frames.send_replace(None);
        let feed: Box<dyn VideoFeed> = Box::new(WatchFeed::new(frames.subscribe()));
        interview.start(context, goal, types, Some(feed)).await
    })
    .await?;

    Ok(Json(StartInterviewResponse { session_id, turn }))
}

/// POST /api/v1/interview/listen/start
pub async fn handle_listen_start(
    State(state): State<AppState>,
) -> Result<Json<InterviewStatus>, AppError> {
    let mut session = state.session.lock().await;
    session.interview.begin_listening()?;
    Ok(Json(session.interview.status()))
}

/// POST /api/v1/interview/listen/cancel
pub async fn handle_listen_cancel(
    State(state): State<AppState>,
) -> Result<Json<InterviewStatus>, AppError> {
    let mut session = state.session.lock().await;
    session.interview.cancel_listening()?;
    Ok(Json(session.interview.status()))
}

/// POST /api/v1/interview/listen/error
///
/// The client's speech recognizer failed. Returns the interview to idle.
pub async fn handle_listen_error(
    State(state): State<AppState>,
    Json(req): Json<CaptureErrorRequest>,
) -> Result<Json<InterviewStatus>, AppError> {
    let mut session = state.session.lock().await;
    session.interview.capture_failed(&req.reason)?;
    Ok(Json(session.interview.status()))
}

/// POST /api/v1/interview/utterance
///
/// Submits the candidate's finalized answer and returns the interviewer's reply.
pub async fn handle_utterance(
    State(state): State<AppState>,
    Json(req): Json<UtteranceRequest>,
) -> Result<Json<TurnOutcome>, AppError> {
    let mut session = Arc::clone(&state.session).lock_owned().await;
    let turn = run_detached(async move {
        let LiveSession { context, interview } = &mut *session;
        interview.submit_utterance(context, &req.text).await
    })
    .await?;
    Ok(Json(turn))
}

/// POST /api/v1/interview/speech-complete
pub async fn handle_speech_complete(
    State(state): State<AppState>,
) -> Result<Json<InterviewStatus>, AppError> {
    let mut session = state.session.lock().await;
    session.interview.speech_finished()?;
    Ok(Json(session.interview.status()))
}

/// POST /api/v1/interview/frame
///
/// Latest camera frame as raw image bytes. Stored, not queued: only the most
/// recent frame is ever attached to an utterance.
pub async fn handle_frame(State(state): State<AppState>, body: Bytes) -> Result<StatusCode, AppError> {
    if body.is_empty() {
        return Err(AppError::Validation("frame body cannot be empty".to_string()));
    }
    let frame = decode_frame(&body).map_err(|e| AppError::Validation(e.to_string()))?;
    state.frames.send_replace(Some(Arc::new(frame)));
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/interview/end
pub async fn handle_end(State(state): State<AppState>) -> Result<Json<InterviewStatus>, AppError> {
    let mut session = state.session.lock().await;
    let LiveSession { context, interview } = &mut *session;
    interview.end(context)?;
    Ok(Json(interview.status()))
}

/// GET /api/v1/interview/status
///
/// Never waits on a turn in flight.
pub async fn handle_status(State(state): State<AppState>) -> Json<InterviewStatus> {
    let status = state.status.borrow().clone();
    Json(status)
}

/// GET /api/v1/interview/events
///
/// Server-sent events: one `status` event now and one per change after that.
pub async fn handle_events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut rx = state.status.clone();
    let stream = async_stream::stream! {
        loop {
            let snapshot = rx.borrow_and_update().clone();
            match Event::default().event("status").json_data(&snapshot) {
                Ok(event) => yield Ok(event),
                Err(e) => warn!("Failed to serialize interview status: {e}"),
            }
            if rx.changed().await.is_err() {
                break;
            }
        }
    };
    Sse::new(stream).keep_alive(KeepAlive::default())
}
