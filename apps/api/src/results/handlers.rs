//! Axum route handlers for results and the learning roadmap.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;

use crate::errors::AppError;
use crate::models::results::{Evaluation, RoadmapItem};
use crate::results::pipeline::{run_results_pipeline, PipelineOutcome};
use crate::session::SessionContext;
use crate::state::{AppState, LiveSession};

#[derive(Debug, Serialize)]
pub struct ResultsResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<PipelineOutcome>,
    pub evaluation: Option<Evaluation>,
    pub roadmap: Vec<RoadmapItem>,
}

impl ResultsResponse {
    fn from_context(ctx: &SessionContext, outcome: Option<PipelineOutcome>) -> Self {
        Self {
            outcome,
            evaluation: ctx.evaluation().cloned(),
            roadmap: ctx.roadmap().to_vec(),
        }
    }
}

/// POST /api/v1/results
///
/// Generates the evaluation and roadmap for the finished interview.
/// Calling it again returns the stored results without new provider calls.
pub async fn handle_generate_results(
    State(state): State<AppState>,
) -> Result<Json<ResultsResponse>, AppError> {
    let mut guard = state.session.lock().await;
    let LiveSession { context, interview } = &mut *guard;
    if context.evaluation().is_none() && interview.in_progress() {
        return Err(AppError::Conflict(
            "results are available once the interview has ended".to_string(),
        ));
    }

    let result = run_results_pipeline(
        state.provider.as_ref(),
        &state.config.retry,
        context,
        |notice| interview.publish_notice(Some(notice.message.clone())),
    )
    .await;
    interview.publish_notice(None);

    let outcome = result?;
    Ok(Json(ResultsResponse::from_context(context, Some(outcome))))
}

/// GET /api/v1/results
pub async fn handle_get_results(
    State(state): State<AppState>,
) -> Result<Json<ResultsResponse>, AppError> {
    let guard = state.session.lock().await;
    Ok(Json(ResultsResponse::from_context(&guard.context, None)))
}

/// PATCH /api/v1/roadmap/:id/toggle
pub async fn handle_toggle_roadmap_item(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<RoadmapItem>, AppError> {
    let mut guard = state.session.lock().await;
    let item = guard.context.toggle_roadmap_item(&id)?.clone();
    Ok(Json(item))
}
