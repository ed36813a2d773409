use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Overall level assigned by the evaluation. Drives roadmap depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Level {
    Beginner,
    Intermediate,
    Advanced,
}

impl Level {
    pub const ALL: [&'static str; 3] = ["Beginner", "Intermediate", "Advanced"];

    /// What the roadmap should concentrate on for this level.
    pub fn focus(&self) -> &'static str {
        match self {
            Level::Beginner => {
                "fundamentals: core concepts, vocabulary and the essential tools of the role"
            }
            Level::Intermediate => {
                "practical depth: real-world patterns, trade-offs and production-grade practice"
            }
            Level::Advanced => {
                "systems and leadership: architecture at scale, mentoring and technical strategy"
            }
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Level::Beginner => "Beginner",
            Level::Intermediate => "Intermediate",
            Level::Advanced => "Advanced",
        };
        f.write_str(label)
    }
}

/// Structured evaluation of one interview. Created once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evaluation {
    pub summary: String,
    pub knowledge_assessment: String,
    pub skills_assessment: String,
    pub confidence_assessment: String,
    pub communication_assessment: String,
    pub level: Level,
}

impl Evaluation {
    /// Names of text fields that came back blank.
    pub fn blank_fields(&self) -> Vec<&'static str> {
        [
            ("summary", &self.summary),
            ("knowledgeAssessment", &self.knowledge_assessment),
            ("skillsAssessment", &self.skills_assessment),
            ("confidenceAssessment", &self.confidence_assessment),
            ("communicationAssessment", &self.communication_assessment),
        ]
        .into_iter()
        .filter(|(_, v)| v.trim().is_empty())
        .map(|(k, _)| k)
        .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Article,
    Video,
    Docs,
    Interactive,
}

impl ResourceKind {
    pub const ALL: [&'static str; 4] = ["article", "video", "docs", "interactive"];
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub title: String,
    pub url: String,
    #[serde(rename = "type")]
    pub kind: ResourceKind,
}

/// A roadmap item as returned by the provider: no id, no completion flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoadmapDraft {
    pub title: String,
    pub description: String,
    pub key_concepts: Vec<String>,
    pub project_suggestion: String,
    pub resources: Vec<Resource>,
}

/// A roadmap item owned by the session. Only `completed` changes after creation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoadmapItem {
    pub id: String,
    pub title: String,
    pub description: String,
    pub key_concepts: Vec<String>,
    pub project_suggestion: String,
    pub resources: Vec<Resource>,
    pub completed: bool,
}

impl RoadmapItem {
    pub fn from_draft(id: String, draft: RoadmapDraft) -> Self {
        Self {
            id,
            title: draft.title,
            description: draft.description,
            key_concepts: draft.key_concepts,
            project_suggestion: draft.project_suggestion,
            resources: draft.resources,
            completed: false,
        }
    }
}

/// Wire shape of a resume match; `score` may arrive as a number or a numeric-looking string.
#[derive(Debug, Clone, Deserialize)]
pub struct RawResumeMatch {
    #[serde(default)]
    pub score: Value,
    #[serde(default)]
    pub strengths: String,
    #[serde(default)]
    pub weaknesses: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResumeMatch {
    /// Always within 0..=100.
    pub score: u8,
    pub strengths: String,
    pub weaknesses: String,
}
