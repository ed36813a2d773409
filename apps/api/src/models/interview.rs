use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The candidate's stated target for one interview. Immutable once the interview starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionGoal {
    /// Binds chat sessions to this goal; a chat started for one goal is never reused for another.
    pub id: Uuid,
    pub candidate_name: String,
    pub target_role: String,
}

impl SessionGoal {
    pub fn new(candidate_name: impl Into<String>, target_role: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            candidate_name: candidate_name.into(),
            target_role: target_role.into(),
        }
    }
}

/// Round categories a candidate can select before starting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterviewType {
    Behavioral,
    Technical,
    SystemDesign,
    Situational,
}

impl fmt::Display for InterviewType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            InterviewType::Behavioral => "behavioral",
            InterviewType::Technical => "technical",
            InterviewType::SystemDesign => "system design",
            InterviewType::Situational => "situational",
        };
        f.write_str(label)
    }
}

/// Non-empty, deduplicated set of round categories, fixed for the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct InterviewTypeSet(BTreeSet<InterviewType>);

impl InterviewTypeSet {
    /// Returns `None` when no type was selected.
    pub fn new(types: impl IntoIterator<Item = InterviewType>) -> Option<Self> {
        let set: BTreeSet<_> = types.into_iter().collect();
        (!set.is_empty()).then_some(Self(set))
    }

    /// Human-readable list, e.g. `"behavioral, technical"`.
    pub fn describe(&self) -> String {
        self.0
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    Candidate,
    Interviewer,
}

impl Speaker {
    pub fn label(&self) -> &'static str {
        match self {
            Speaker::Candidate => "Candidate",
            Speaker::Interviewer => "Interviewer",
        }
    }
}

/// A single encoded still image (base64 payload).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StillImage {
    pub mime_type: String,
    pub data_base64: String,
}

impl StillImage {
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data_base64)
    }
}

/// One finalized speaker turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Utterance {
    pub speaker: Speaker,
    pub text: String,
    /// Only ever present on candidate utterances.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<StillImage>,
    pub at: DateTime<Utc>,
}

impl Utterance {
    /// Trims `text`; returns `None` if nothing is left.
    pub fn candidate(text: &str, image: Option<StillImage>) -> Option<Self> {
        let text = text.trim();
        (!text.is_empty()).then(|| Self {
            speaker: Speaker::Candidate,
            text: text.to_string(),
            image,
            at: Utc::now(),
        })
    }

    pub fn interviewer(text: &str) -> Option<Self> {
        let text = text.trim();
        (!text.is_empty()).then(|| Self {
            speaker: Speaker::Interviewer,
            text: text.to_string(),
            image: None,
            at: Utc::now(),
        })
    }
}

/// Append-only ordered record of the conversation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Transcript(Vec<Utterance>);

impl Transcript {
    pub fn push(&mut self, utterance: Utterance) {
        self.0.push(utterance);
    }

    pub fn utterances(&self) -> &[Utterance] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn count(&self, speaker: Speaker) -> usize {
        self.0.iter().filter(|u| u.speaker == speaker).count()
    }

    /// `Speaker: text` lines in transcript order.
    pub fn render(&self) -> String {
        self.0
            .iter()
            .map(|u| format!("{}: {}", u.speaker.label(), u.text))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Images attached to candidate utterances, paired with the utterance's position.
    pub fn candidate_images(&self) -> impl Iterator<Item = (usize, &StillImage)> {
        self.0
            .iter()
            .enumerate()
            .filter(|(_, u)| u.speaker == Speaker::Candidate)
            .filter_map(|(i, u)| u.image.as_ref().map(|img| (i + 1, img)))
    }
}
