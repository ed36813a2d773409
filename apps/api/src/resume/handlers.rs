use anyhow::anyhow;
use axum::{
    extract::{Multipart, State},
    Json,
};
use bytes::Bytes;
use serde::Deserialize;
use tracing::info;

use crate::errors::AppError;
use crate::models::results::ResumeMatch;
use crate::provider::AiProvider;
use crate::resume::scoring::extract_pdf_text;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ScoreResumeRequest {
    pub resume_text: String,
    pub job_description: String,
}

struct ScoreJob<'x> {
    provider: &'x dyn AiProvider,
    resume_text: &'x str,
    job_description: &'x str,
}

async fn score(
    state: &AppState,
    resume_text: &str,
    job_description: &str,
) -> Result<ResumeMatch, AppError> {
    if resume_text.trim().is_empty() {
        return Err(AppError::Validation("resume text cannot be empty".to_string()));
    }
    if job_description.trim().is_empty() {
        return Err(AppError::Validation("job_description cannot be empty".to_string()));
    }

    let mut job = ScoreJob {
        provider: state.provider.as_ref(),
        resume_text,
        job_description,
    };
    let result = state
        .config
        .retry
        .run(
            &mut job,
            |job, _| {
                Box::pin(async move {
                    job.provider
                        .score_resume(job.resume_text, job.job_description)
                        .await
                })
            },
            |_| {},
        )
        .await
        .into_result()?;

    info!("Resume scored {}/100", result.score);
    Ok(result)
}

/// POST /api/v1/resume/score
pub async fn handle_score_resume(
    State(state): State<AppState>,
    Json(req): Json<ScoreResumeRequest>,
) -> Result<Json<ResumeMatch>, AppError> {
    let result = score(&state, &req.resume_text, &req.job_description).await?;
    Ok(Json(result))
}

/// POST /api/v1/resume/score/upload
///
/// Multipart form with a `resume` PDF file and a `job_description` text field.
pub async fn handle_score_resume_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<ResumeMatch>, AppError> {
    let mut pdf: Option<Bytes> = None;
    let mut job_description: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("invalid multipart body: {e}")))?
    {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("resume") => {
                pdf = Some(field.bytes().await.map_err(|e| {
                    AppError::Validation(format!("could not read resume file: {e}"))
                })?);
            }
            Some("job_description") => {
                job_description = Some(field.text().await.map_err(|e| {
                    AppError::Validation(format!("could not read job_description: {e}"))
                })?);
            }
            _ => {}
        }
    }

    let pdf = pdf.ok_or_else(|| AppError::Validation("missing 'resume' file field".to_string()))?;
    let job_description = job_description
        .ok_or_else(|| AppError::Validation("missing 'job_description' field".to_string()))?;

    // PDF parsing is CPU-bound.
    let resume_text = tokio::task::spawn_blocking(move || extract_pdf_text(&pdf))
        .await
        .map_err(|e| AppError::Internal(anyhow!("PDF extraction task failed: {e}")))?
        .map_err(|e| AppError::UnprocessableEntity(format!("could not read PDF: {e}")))?;

    let result = score(&state, &resume_text, &job_description).await?;
    Ok(Json(result))
}
