use std::sync::Arc;

use tokio::sync::{watch, Mutex};

use crate::config::Config;
use crate::interview::frame::Frame;
use crate::interview::orchestrator::{Interview, InterviewStatus};
use crate::provider::AiProvider;
use crate::session::SessionContext;

/// The single in-memory session: what the client sees plus the interview driving it.
pub struct LiveSession {
    pub context: SessionContext,
    pub interview: Interview,
}

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    /// Fixed at startup. Switching provider requires a restart.
    pub provider: Arc<dyn AiProvider>,
    /// Held for the whole of a turn, so operations on the session are serialized.
    pub session: Arc<Mutex<LiveSession>>,
    /// Readable without taking the session lock, even mid-turn.
    pub status: watch::Receiver<InterviewStatus>,
    /// Latest camera frame pushed by the client.
    pub frames: Arc<watch::Sender<Option<Frame>>>,
}

impl AppState {
    pub fn new(config: Config, provider: Arc<dyn AiProvider>) -> Self {
        let interview = Interview::new(Arc::clone(&provider), config.retry);
        let status = interview.subscribe();
        let (frames, _) = watch::channel(None);
        Self {
            config,
            provider,
            session: Arc::new(Mutex::new(LiveSession {
                context: SessionContext::default(),
                interview,
            })),
            status,
            frames: Arc::new(frames),
        }
    }
}
