/// Provider layer. The only place that talks to a remote language model.
///
/// Every backend implements the same two seams:
/// - `AiProvider`: stateless, shareable; opens chat sessions and runs structured calls.
/// - `ChatSession`: the provider-specific conversational memory for one interview.
///
/// Callers never see transports. A reply always arrives as a `FragmentStream`,
/// whether the backend streams natively or we parse server-sent events by hand.
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;
use tracing::info;

use crate::config::{Config, ProviderChoice};
use crate::models::interview::{InterviewTypeSet, SessionGoal, Transcript};
use crate::models::results::{Evaluation, Level, RoadmapDraft, ResumeMatch};
use crate::retry::Retryable;

pub mod gemini;
pub mod openai;
pub mod prompts;
pub mod schema;
pub mod sse;

/// Lazy, finite, non-restartable sequence of reply fragments.
pub type FragmentStream<'a> = BoxStream<'a, Result<String, ProviderError>>;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("chat session has not been started")]
    UninitializedSession,

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl From<serde_json::Error> for ProviderError {
    fn from(e: serde_json::Error) -> Self {
        ProviderError::MalformedResponse(e.to_string())
    }
}

impl Retryable for ProviderError {
    /// Sequencing errors are surfaced immediately; everything the network or
    /// the model can get wrong is worth another attempt.
    fn is_retryable(&self) -> bool {
        !matches!(self, ProviderError::UninitializedSession)
    }
}

/// Provider-specific conversational memory for one interview.
pub trait ChatSession: Send + Sync {
    /// Sends `message` as the candidate's turn and streams the interviewer's reply.
    ///
    /// The session commits the candidate message and the full reply to its
    /// history only once the stream has drained successfully. A failed or
    /// abandoned stream leaves the history untouched, so the turn can be retried.
    fn stream_next_turn<'a>(&'a mut self, message: &str) -> FragmentStream<'a>;

    /// Number of interviewer turns committed so far.
    fn interviewer_turns(&self) -> usize;
}

/// Capability set every remote backend implements.
#[async_trait]
pub trait AiProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Opens a fresh chat framed for `goal` and the selected round types.
    fn start_chat(&self, goal: &SessionGoal, types: &InterviewTypeSet) -> Box<dyn ChatSession>;

    async fn generate_evaluation(
        &self,
        transcript: &Transcript,
        goal: &SessionGoal,
    ) -> Result<Evaluation, ProviderError>;

    /// Returns items without ids or completion flags; the caller assigns those.
    async fn generate_roadmap(
        &self,
        level: Level,
        goal: &SessionGoal,
    ) -> Result<Vec<RoadmapDraft>, ProviderError>;

    async fn score_resume(
        &self,
        resume_text: &str,
        job_description: &str,
    ) -> Result<ResumeMatch, ProviderError>;
}

/// Builds the one provider this process talks to.
pub fn create_provider(config: &Config) -> Arc<dyn AiProvider> {
    let provider: Arc<dyn AiProvider> = match &config.provider {
        ProviderChoice::Gemini { api_key, model } => {
            Arc::new(gemini::GeminiProvider::new(api_key.clone(), model.clone()))
        }
        ProviderChoice::OpenAi {
            api_key,
            model,
            base_url,
        } => Arc::new(openai::OpenAiProvider::new(
            api_key.clone(),
            model.clone(),
            base_url.clone(),
        )),
    };
    info!("AI provider initialized ({})", config.provider.label());
    provider
}

/// Builds a reqwest client with the timeout used for every provider call.
pub(crate) fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(120))
        .build()
        .expect("Failed to build HTTP client")
}

/// Turns a non-success HTTP response into `ProviderError::Api`.
pub(crate) async fn check_status(
    response: reqwest::Response,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .and_then(|m| m.as_str())
                .map(String::from)
        })
        .unwrap_or(body);
    Err(ProviderError::Api {
        status: status.as_u16(),
        message,
    })
}

/// Strips ```json ... ``` or ``` ... ``` code fences from model output.
pub(crate) fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    let inner = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"));
    match inner {
        Some(stripped) => {
            let stripped = stripped.trim_start();
            stripped
                .strip_suffix("```")
                .map(|s| s.trim())
                .unwrap_or(stripped)
        }
        None => text,
    }
}
