//! Post-interview results: evaluation first, then a roadmap built from its level.
//!
//! Both calls run under the retry policy. Nothing is written to the session
//! unless both succeed, and a session that already has an evaluation is
//! left alone.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use rand::Rng;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::models::interview::{SessionGoal, Transcript};
use crate::models::results::{Level, RoadmapDraft, RoadmapItem};
use crate::provider::{AiProvider, ProviderError};
use crate::retry::{RetryNotice, RetryOutcome, RetryPolicy};
use crate::session::SessionContext;

pub const RESTART_MESSAGE: &str =
    "No interview data found. Please start a new interview to see your results.";
pub const FAILURE_MESSAGE: &str =
    "We couldn't generate your results right now. Please start a new interview and try again.";

static NEXT_ROADMAP_SEQ: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Evaluation,
    Roadmap,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Evaluation => f.write_str("evaluation"),
            Stage::Roadmap => f.write_str("roadmap"),
        }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("missing prerequisite: {0}")]
    MissingPrerequisite(&'static str),

    #[error("{stage} failed after {attempts} attempts: {source}")]
    Exhausted {
        stage: Stage,
        attempts: u32,
        #[source]
        source: ProviderError,
    },

    #[error("{stage} failed: {source}")]
    Provider {
        stage: Stage,
        #[source]
        source: ProviderError,
    },
}

impl PipelineError {
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::MissingPrerequisite(_) => "MISSING_PREREQUISITE",
            PipelineError::Exhausted { .. } | PipelineError::Provider { .. } => "RESULTS_UNAVAILABLE",
        }
    }

    /// What the results screen shows in place of the evaluation.
    pub fn user_message(&self) -> &'static str {
        match self {
            PipelineError::MissingPrerequisite(_) => RESTART_MESSAGE,
            PipelineError::Exhausted { .. } | PipelineError::Provider { .. } => FAILURE_MESSAGE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineOutcome {
    Generated,
    /// An evaluation already existed; no provider call was made.
    AlreadyComplete,
}

struct EvaluationJob<'x> {
    provider: &'x dyn AiProvider,
    transcript: &'x Transcript,
    goal: &'x SessionGoal,
}

struct RoadmapJob<'x> {
    provider: &'x dyn AiProvider,
    level: Level,
    goal: &'x SessionGoal,
}

/// Produces the evaluation and roadmap for the finished interview in `ctx`.
pub async fn run_results_pipeline<N>(
    provider: &dyn AiProvider,
    retry: &RetryPolicy,
    ctx: &mut SessionContext,
    mut notify: N,
) -> Result<PipelineOutcome, PipelineError>
where
    N: FnMut(&RetryNotice),
{
    if ctx.evaluation().is_some() {
        debug!("Evaluation already present; skipping results generation");
        return Ok(PipelineOutcome::AlreadyComplete);
    }
    let goal = ctx
        .goal()
        .cloned()
        .ok_or(PipelineError::MissingPrerequisite("session goal"))?;
    if ctx.transcript().is_empty() {
        return Err(PipelineError::MissingPrerequisite("transcript"));
    }

    info!(
        "Generating evaluation for {} ({} utterances)",
        goal.target_role,
        ctx.transcript().len()
    );
    let mut job = EvaluationJob {
        provider,
        transcript: ctx.transcript(),
        goal: &goal,
    };
    let evaluation = settle(
        Stage::Evaluation,
        retry
            .run(
                &mut job,
                |job, _| Box::pin(async move { job.provider.generate_evaluation(job.transcript, job.goal).await }),
                &mut notify,
            )
            .await,
    )?;

    info!("Generating {} roadmap", evaluation.level);
    let mut job = RoadmapJob {
        provider,
        level: evaluation.level,
        goal: &goal,
    };
    let drafts = settle(
        Stage::Roadmap,
        retry
            .run(
                &mut job,
                |job, _| Box::pin(async move { job.provider.generate_roadmap(job.level, job.goal).await }),
                &mut notify,
            )
            .await,
    )?;

    let items = assign_ids(drafts);
    info!("Results ready: {} level, {} roadmap items", evaluation.level, items.len());
    // The caller holds the session exclusively, so this cannot race another run.
    if ctx.set_evaluation(evaluation).is_err() {
        return Ok(PipelineOutcome::AlreadyComplete);
    }
    ctx.replace_roadmap(items);
    Ok(PipelineOutcome::Generated)
}

fn settle<T>(stage: Stage, outcome: RetryOutcome<T, ProviderError>) -> Result<T, PipelineError> {
    match outcome {
        RetryOutcome::Success { value, .. } => Ok(value),
        RetryOutcome::Exhausted { attempts, error } => Err(PipelineError::Exhausted {
            stage,
            attempts,
            source: error,
        }),
        RetryOutcome::Aborted(error) => Err(PipelineError::Provider {
            stage,
            source: error,
        }),
    }
}

/// Ids are unique for the process lifetime: a monotonic counter plus a random suffix.
pub fn assign_ids(drafts: Vec<RoadmapDraft>) -> Vec<RoadmapItem> {
    let mut rng = rand::thread_rng();
    drafts
        .into_iter()
        .map(|draft| {
            let seq = NEXT_ROADMAP_SEQ.fetch_add(1, Ordering::Relaxed);
            let suffix: u32 = rng.gen();
            RoadmapItem::from_draft(format!("step-{seq}-{suffix:08x}"), draft)
        })
        .collect()
}
