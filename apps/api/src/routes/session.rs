use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::AppError;
use crate::session::Screen;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct NavigateRequest {
    pub screen: Screen,
}

#[derive(Debug, Serialize)]
pub struct NavigateResponse {
    pub current_screen: Screen,
}

/// GET /api/v1/session
/// Snapshot of the whole session context: screen, goal, transcript and results.
pub async fn handle_get_session(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let session = state.session.lock().await;
    let snapshot = serde_json::to_value(&session.context).map_err(anyhow::Error::from)?;
    Ok(Json(snapshot))
}

/// PUT /api/v1/session/screen
pub async fn handle_navigate(
    State(state): State<AppState>,
    Json(req): Json<NavigateRequest>,
) -> Json<NavigateResponse> {
    let mut session = state.session.lock().await;
    session.context.navigate(req.screen);
    Json(NavigateResponse {
        current_screen: session.context.current_screen(),
    })
}
