//! Turn-taking for one live interview.
//!
//! Phases:
//!
//! ```text
//! idle --listen--> listening --utterance--> thinking --reply--> speaking --speech done--> idle
//!                      |                        |
//!                      +--cancel/error--> idle  +--retries exhausted--> finished
//! ```
//!
//! Any phase moves to `finished` on an explicit end once a full exchange exists.
//! Input is only accepted in `idle` and `listening`.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::interview::frame::{FrameCorrelator, VideoFeed};
use crate::interview::stream::consume_turn;
use crate::models::interview::{InterviewTypeSet, SessionGoal, Speaker, Utterance};
use crate::provider::prompts::OPENING_MESSAGE;
use crate::provider::{AiProvider, ChatSession, ProviderError};
use crate::retry::{RetryOutcome, RetryPolicy};
use crate::session::{Screen, SessionContext};

/// Spoken when the provider stays unreachable after every retry.
pub const CLOSING_LINE: &str = "I'm sorry, I'm having trouble connecting right now, so let's stop here. \
Thank you for your time. Your results are ready for you.";

const CONNECTION_LOST_NOTICE: &str = "The connection to the interviewer was lost.";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    #[default]
    Idle,
    Listening,
    Thinking,
    Speaking,
    Finished,
}

impl Phase {
    pub fn accepts_input(&self) -> bool {
        matches!(self, Phase::Idle | Phase::Listening)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Idle => "idle",
            Phase::Listening => "listening",
            Phase::Thinking => "thinking",
            Phase::Speaking => "speaking",
            Phase::Finished => "finished",
        };
        f.write_str(s)
    }
}

/// What clients render while an interview runs. Published on every change.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InterviewStatus {
    pub session_id: Option<Uuid>,
    pub phase: Phase,
    pub input_enabled: bool,
    /// Reply text received so far for the turn in flight.
    pub partial_reply: String,
    /// Text handed to speech synthesis; cleared once speech completes.
    pub speaking: Option<String>,
    /// Transient message such as a retry countdown.
    pub notice: Option<String>,
    pub candidate_turns: usize,
    pub interviewer_turns: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TurnOutcome {
    /// The interviewer replied; the reply is being spoken.
    Reply { utterance: Utterance },
    /// Retries ran out. The closing line is spoken and the interview is over.
    Terminated { closing_line: String },
}

#[derive(Debug, Error)]
pub enum InterviewError {
    #[error("no interview has been started")]
    NotStarted,

    #[error("input is disabled while the interviewer is {0}")]
    InputDisabled(Phase),

    #[error("cannot {action} while {from}")]
    InvalidTransition { from: Phase, action: &'static str },

    #[error("utterance is empty")]
    EmptyUtterance,

    #[error("the interview can only end after at least one question and one answer")]
    TooEarlyToEnd,

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

struct ActiveChat {
    goal_id: Uuid,
    session: Box<dyn ChatSession>,
}

/// State lent to each retry attempt of a turn.
struct TurnAttempt<'x> {
    chat: &'x mut dyn ChatSession,
    status: &'x watch::Sender<InterviewStatus>,
    message: &'x str,
}

pub struct Interview {
    provider: Arc<dyn AiProvider>,
    retry: RetryPolicy,
    chat: Option<ActiveChat>,
    phase: Phase,
    correlator: FrameCorrelator,
    status: watch::Sender<InterviewStatus>,
}

impl Interview {
    pub fn new(provider: Arc<dyn AiProvider>, retry: RetryPolicy) -> Self {
        let (status, _) = watch::channel(InterviewStatus::default());
        Self {
            provider,
            retry,
            chat: None,
            phase: Phase::Idle,
            correlator: FrameCorrelator::default(),
            status,
        }
    }

    pub fn status(&self) -> InterviewStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<InterviewStatus> {
        self.status.subscribe()
    }

    /// True between `start` and the interview finishing.
    pub fn in_progress(&self) -> bool {
        self.chat.is_some() && self.phase != Phase::Finished
    }

    /// Shows a transient message to anyone watching, e.g. a retry countdown
    /// from the results pipeline.
    pub fn publish_notice(&self, message: Option<String>) {
        self.status.send_modify(|s| s.notice = message);
    }

    /// Resets the session, opens a fresh chat for `goal` and asks for the
    /// first question.
    pub async fn start(
        &mut self,
        ctx: &mut SessionContext,
        goal: SessionGoal,
        types: InterviewTypeSet,
        feed: Option<Box<dyn VideoFeed>>,
    ) -> Result<TurnOutcome, InterviewError> {
        info!(
            "Starting interview {} for {} ({})",
            goal.id,
            goal.target_role,
            types.describe()
        );

        let session = self.provider.start_chat(&goal, &types);
        self.chat = Some(ActiveChat {
            goal_id: goal.id,
            session,
        });
        self.correlator = FrameCorrelator::new(feed);
        debug!("Video feed attached: {}", self.correlator.is_attached());
        self.status.send_replace(InterviewStatus {
            session_id: Some(goal.id),
            ..InterviewStatus::default()
        });
        ctx.begin(goal, types);

        self.set_phase(Phase::Thinking);
        self.take_turn(ctx, OPENING_MESSAGE).await
    }

    pub fn begin_listening(&mut self) -> Result<(), InterviewError> {
        self.ensure_started()?;
        match self.phase {
            Phase::Idle => {
                self.set_phase(Phase::Listening);
                Ok(())
            }
            Phase::Listening => Ok(()),
            Phase::Thinking | Phase::Speaking => Err(InterviewError::InputDisabled(self.phase)),
            Phase::Finished => Err(self.invalid("start listening")),
        }
    }

    pub fn cancel_listening(&mut self) -> Result<(), InterviewError> {
        self.ensure_started()?;
        match self.phase {
            Phase::Listening => {
                self.set_phase(Phase::Idle);
                Ok(())
            }
            _ => Err(self.invalid("cancel listening")),
        }
    }

    /// Speech capture failed on the client. Recoverable: back to idle.
    pub fn capture_failed(&mut self, reason: &str) -> Result<(), InterviewError> {
        self.ensure_started()?;
        warn!("Speech capture failed: {reason}");
        if self.phase == Phase::Listening {
            self.set_phase(Phase::Idle);
        }
        Ok(())
    }

    /// Records a finalized candidate utterance and asks for the next question.
    pub async fn submit_utterance(
        &mut self,
        ctx: &mut SessionContext,
        text: &str,
    ) -> Result<TurnOutcome, InterviewError> {
        self.ensure_started()?;
        match self.phase {
            Phase::Listening => {}
            Phase::Thinking | Phase::Speaking => {
                return Err(InterviewError::InputDisabled(self.phase))
            }
            Phase::Idle | Phase::Finished => return Err(self.invalid("submit an utterance")),
        }
        if text.trim().is_empty() {
            self.set_phase(Phase::Idle);
            return Err(InterviewError::EmptyUtterance);
        }

        let image = self.correlator.capture_best_effort();
        let utterance =
            Utterance::candidate(text, image).ok_or(InterviewError::EmptyUtterance)?;
        debug!(
            "Candidate utterance recorded ({} chars, image: {})",
            utterance.text.len(),
            utterance.image.is_some()
        );
        let message = utterance.text.clone();
        ctx.append_utterance(utterance);

        self.set_phase(Phase::Thinking);
        self.take_turn(ctx, &message).await
    }

    /// The client finished speaking the last reply.
    pub fn speech_finished(&mut self) -> Result<(), InterviewError> {
        self.ensure_started()?;
        match self.phase {
            Phase::Speaking => {
                self.set_phase(Phase::Idle);
                Ok(())
            }
            // The closing line after a lost connection.
            Phase::Finished => {
                self.status.send_modify(|s| s.speaking = None);
                Ok(())
            }
            _ => Err(self.invalid("finish speaking")),
        }
    }

    /// Ends the interview on the candidate's request. Repeating it is a no-op.
    pub fn end(&mut self, ctx: &mut SessionContext) -> Result<(), InterviewError> {
        self.ensure_started()?;
        if self.phase == Phase::Finished {
            return Ok(());
        }
        let transcript = ctx.transcript();
        if transcript.count(Speaker::Interviewer) == 0 || transcript.count(Speaker::Candidate) == 0
        {
            return Err(InterviewError::TooEarlyToEnd);
        }
        info!("Interview ended after {} utterances", transcript.len());
        self.finish(ctx);
        Ok(())
    }

    fn ensure_started(&self) -> Result<(), InterviewError> {
        if self.chat.is_none() {
            return Err(InterviewError::NotStarted);
        }
        Ok(())
    }

    fn invalid(&self, action: &'static str) -> InterviewError {
        InterviewError::InvalidTransition {
            from: self.phase,
            action,
        }
    }

    fn set_phase(&mut self, phase: Phase) {
        debug!("Interview phase {} -> {}", self.phase, phase);
        self.phase = phase;
        self.status.send_modify(|s| {
            s.phase = phase;
            s.input_enabled = phase.accepts_input();
            if matches!(phase, Phase::Idle | Phase::Listening | Phase::Thinking) {
                s.speaking = None;
            }
        });
    }

    fn finish(&mut self, ctx: &mut SessionContext) {
        self.set_phase(Phase::Finished);
        self.correlator.release();
        ctx.navigate(Screen::Results);
    }

    fn publish_counts(&self, ctx: &SessionContext) {
        let transcript = ctx.transcript();
        self.status.send_modify(|s| {
            s.candidate_turns = transcript.count(Speaker::Candidate);
            s.interviewer_turns = transcript.count(Speaker::Interviewer);
        });
    }

    /// Sends `message` to the chat under the retry policy and records the reply.
    async fn take_turn(
        &mut self,
        ctx: &mut SessionContext,
        message: &str,
    ) -> Result<TurnOutcome, InterviewError> {
        let goal_id = ctx.goal().map(|g| g.id);
        let bound = matches!((&self.chat, goal_id), (Some(active), Some(id)) if active.goal_id == id);
        if !bound {
            self.set_phase(Phase::Idle);
            return Err(ProviderError::UninitializedSession.into());
        }
        let Some(active) = self.chat.as_mut() else {
            return Err(ProviderError::UninitializedSession.into());
        };

        let outcome = run_turn(&self.retry, active.session.as_mut(), &self.status, message).await;

        match outcome {
            RetryOutcome::Success { value, attempts } => {
                let Some(utterance) = Utterance::interviewer(&value) else {
                    self.set_phase(Phase::Idle);
                    return Err(ProviderError::MalformedResponse("empty reply".to_string()).into());
                };
                let turns = self
                    .chat
                    .as_ref()
                    .map_or(0, |active| active.session.interviewer_turns());
                debug!("Interviewer turn {turns} committed after {attempts} attempt(s)");
                ctx.append_utterance(utterance.clone());
                self.publish_counts(ctx);
                self.status.send_modify(|s| {
                    s.partial_reply.clear();
                    s.notice = None;
                    s.speaking = Some(utterance.text.clone());
                });
                self.set_phase(Phase::Speaking);
                Ok(TurnOutcome::Reply { utterance })
            }
            RetryOutcome::Exhausted { attempts, error } => {
                error!("Interview turn failed after {attempts} attempts: {error}");
                self.status.send_modify(|s| {
                    s.partial_reply.clear();
                    s.notice = Some(CONNECTION_LOST_NOTICE.to_string());
                    s.speaking = Some(CLOSING_LINE.to_string());
                });
                self.finish(ctx);
                Ok(TurnOutcome::Terminated {
                    closing_line: CLOSING_LINE.to_string(),
                })
            }
            RetryOutcome::Aborted(error) => {
                self.status.send_modify(|s| s.partial_reply.clear());
                self.set_phase(Phase::Idle);
                Err(error.into())
            }
        }
    }
}

async fn run_turn(
    retry: &RetryPolicy,
    chat: &mut dyn ChatSession,
    status: &watch::Sender<InterviewStatus>,
    message: &str,
) -> RetryOutcome<String, ProviderError> {
    let mut attempt = TurnAttempt {
        chat,
        status,
        message,
    };
    retry
        .run(
            &mut attempt,
            |turn, n| {
                Box::pin(async move {
                    debug!("Streaming interviewer turn (attempt {n})");
                    let status = turn.status;
                    status.send_modify(|s| s.partial_reply.clear());
                    let fragments = turn.chat.stream_next_turn(turn.message);
                    consume_turn(fragments, |partial| {
                        status.send_modify(|s| {
                            s.partial_reply.clear();
                            s.partial_reply.push_str(partial);
                        })
                    })
                    .await
                })
            },
            |notice| {
                debug!("Turn retry {} in {:?}", notice.retry, notice.delay);
                status.send_modify(|s| {
                    s.partial_reply.clear();
                    s.notice = Some(notice.message.clone());
                })
            },
        )
        .await
}

#[cfg(test)]
pub(crate) mod fakes {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use futures::stream;

    use super::*;
    use crate::models::interview::Transcript;
    use crate::models::results::{Evaluation, Level, ResumeMatch, RoadmapDraft};
    use crate::provider::FragmentStream;

    /// One scripted reply: fragments to stream, or an error to fail with.
    pub enum Reply {
        Fragments(Vec<&'static str>),
        Fail(fn() -> ProviderError),
        /// Streams some text, then breaks off with an error.
        FragmentsThenFail(Vec<&'static str>, fn() -> ProviderError),
    }

    #[derive(Default)]
    pub struct Script {
        pub replies: Mutex<VecDeque<Reply>>,
        pub sent: Mutex<Vec<String>>,
        pub evaluations: Mutex<VecDeque<Result<Evaluation, ProviderError>>>,
        pub roadmaps: Mutex<VecDeque<Result<Vec<RoadmapDraft>, ProviderError>>>,
        pub evaluation_calls: Mutex<u32>,
        pub roadmap_calls: Mutex<u32>,
    }

    /// Provider whose chats and structured calls follow a shared script.
    #[derive(Clone, Default)]
    pub struct ScriptedProvider {
        pub script: Arc<Script>,
    }

    impl ScriptedProvider {
        pub fn with_replies(replies: Vec<Reply>) -> Self {
            let provider = Self::default();
            provider.script.replies.lock().unwrap().extend(replies);
            provider
        }

        pub fn sent(&self) -> Vec<String> {
            self.script.sent.lock().unwrap().clone()
        }
    }

    struct ScriptedChat {
        script: Arc<Script>,
        turns: usize,
    }

    impl ChatSession for ScriptedChat {
        fn stream_next_turn<'a>(&'a mut self, message: &str) -> FragmentStream<'a> {
            self.script.sent.lock().unwrap().push(message.to_string());
            let next = self.script.replies.lock().unwrap().pop_front();
            match next {
                Some(Reply::Fragments(parts)) => {
                    self.turns += 1;
                    Box::pin(stream::iter(parts.into_iter().map(|p| Ok(p.to_string()))))
                }
                Some(Reply::Fail(make)) => Box::pin(stream::iter(vec![Err(make())])),
                Some(Reply::FragmentsThenFail(parts, make)) => {
                    let mut items: Vec<Result<String, ProviderError>> =
                        parts.into_iter().map(|p| Ok(p.to_string())).collect();
                    items.push(Err(make()));
                    Box::pin(stream::iter(items))
                }
                None => Box::pin(stream::iter(vec![Err(ProviderError::MalformedResponse(
                    "script exhausted".to_string(),
                ))])),
            }
        }

        fn interviewer_turns(&self) -> usize {
            self.turns
        }
    }

    #[async_trait]
    impl AiProvider for ScriptedProvider {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn start_chat(&self, _goal: &SessionGoal, _types: &InterviewTypeSet) -> Box<dyn ChatSession> {
            Box::new(ScriptedChat {
                script: Arc::clone(&self.script),
                turns: 0,
            })
        }

        async fn generate_evaluation(
            &self,
            _transcript: &Transcript,
            _goal: &SessionGoal,
        ) -> Result<Evaluation, ProviderError> {
            *self.script.evaluation_calls.lock().unwrap() += 1;
            self.script
                .evaluations
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ProviderError::MalformedResponse("no evaluation".into())))
        }

        async fn generate_roadmap(
            &self,
            _level: Level,
            _goal: &SessionGoal,
        ) -> Result<Vec<RoadmapDraft>, ProviderError> {
            *self.script.roadmap_calls.lock().unwrap() += 1;
            self.script
                .roadmaps
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ProviderError::MalformedResponse("no roadmap".into())))
        }

        async fn score_resume(
            &self,
            _resume_text: &str,
            _job_description: &str,
        ) -> Result<ResumeMatch, ProviderError> {
            Ok(ResumeMatch {
                score: 70,
                strengths: "Relevant projects.".to_string(),
                weaknesses: "Little production experience.".to_string(),
            })
        }
    }

    pub fn transient() -> ProviderError {
        ProviderError::Api {
            status: 503,
            message: "overloaded".to_string(),
        }
    }
}
