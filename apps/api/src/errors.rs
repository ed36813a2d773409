use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::interview::orchestrator::InterviewError;
use crate::provider::ProviderError;
use crate::results::pipeline::PipelineError;
use crate::session::SessionError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unprocessable entity: {0}")]
    UnprocessableEntity(String),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Results pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<InterviewError> for AppError {
    fn from(e: InterviewError) -> Self {
        match e {
            InterviewError::EmptyUtterance => AppError::Validation(e.to_string()),
            InterviewError::Provider(ProviderError::UninitializedSession) => {
                AppError::Conflict(ProviderError::UninitializedSession.to_string())
            }
            InterviewError::Provider(p) => AppError::Provider(p),
            InterviewError::NotStarted
            | InterviewError::InputDisabled(_)
            | InterviewError::InvalidTransition { .. }
            | InterviewError::TooEarlyToEnd => AppError::Conflict(e.to_string()),
        }
    }
}

impl From<SessionError> for AppError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::UnknownRoadmapItem(_) => AppError::NotFound(e.to_string()),
            SessionError::EvaluationAlreadySet => AppError::Conflict(e.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
            AppError::UnprocessableEntity(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "UNPROCESSABLE_ENTITY",
                msg.clone(),
            ),
            AppError::Provider(e) => {
                tracing::error!("Provider error: {e}");
                (
                    StatusCode::BAD_GATEWAY,
                    "PROVIDER_ERROR",
                    "The AI provider could not complete the request".to_string(),
                )
            }
            AppError::Pipeline(e) => {
                let status = match e {
                    PipelineError::MissingPrerequisite(_) => StatusCode::CONFLICT,
                    _ => {
                        tracing::error!("Results pipeline error: {e}");
                        StatusCode::BAD_GATEWAY
                    }
                };
                (status, e.code(), e.user_message().to_string())
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}
