use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::interview::{InterviewTypeSet, SessionGoal, Transcript, Utterance};
use crate::models::results::{Evaluation, RoadmapItem};

/// Screens the client can be on. The server only records where the flow
/// should be; rendering and routing stay on the client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Screen {
    #[default]
    Setup,
    Interview,
    Results,
    Roadmap,
    ResumeAnalyzer,
}

#[derive(Debug, Error, PartialEq)]
pub enum SessionError {
    #[error("an evaluation already exists for this session")]
    EvaluationAlreadySet,

    #[error("roadmap item '{0}' not found")]
    UnknownRoadmapItem(String),
}

/// Everything the client needs to render the current session.
///
/// Passed explicitly to the orchestrator and the results pipeline; there is
/// exactly one per process and nothing in it survives a restart.
#[derive(Debug, Default, Serialize)]
pub struct SessionContext {
    current_screen: Screen,
    goal: Option<SessionGoal>,
    interview_types: Option<InterviewTypeSet>,
    transcript: Transcript,
    evaluation: Option<Evaluation>,
    roadmap: Vec<RoadmapItem>,
}

impl SessionContext {
    pub fn current_screen(&self) -> Screen {
        self.current_screen
    }

    pub fn navigate(&mut self, screen: Screen) {
        self.current_screen = screen;
    }

    pub fn goal(&self) -> Option<&SessionGoal> {
        self.goal.as_ref()
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn append_utterance(&mut self, utterance: Utterance) {
        self.transcript.push(utterance);
    }

    pub fn evaluation(&self) -> Option<&Evaluation> {
        self.evaluation.as_ref()
    }

    /// Write-once: a second evaluation for the same session is refused.
    pub fn set_evaluation(&mut self, evaluation: Evaluation) -> Result<(), SessionError> {
        if self.evaluation.is_some() {
            return Err(SessionError::EvaluationAlreadySet);
        }
        self.evaluation = Some(evaluation);
        Ok(())
    }

    pub fn roadmap(&self) -> &[RoadmapItem] {
        &self.roadmap
    }

    pub fn replace_roadmap(&mut self, items: Vec<RoadmapItem>) {
        self.roadmap = items;
    }

    /// Flips one item's completion flag and returns the updated item.
    pub fn toggle_roadmap_item(&mut self, id: &str) -> Result<&RoadmapItem, SessionError> {
        let item = self
            .roadmap
            .iter_mut()
            .find(|item| item.id == id)
            .ok_or_else(|| SessionError::UnknownRoadmapItem(id.to_string()))?;
        item.completed = !item.completed;
        Ok(item)
    }

    /// Drops everything from the previous interview.
    pub fn reset(&mut self) {
        *self = SessionContext::default();
    }

    /// Fixes goal and round types for a new interview and moves to the interview screen.
    pub fn begin(&mut self, goal: SessionGoal, types: InterviewTypeSet) {
        self.reset();
        self.goal = Some(goal);
        self.interview_types = Some(types);
        self.navigate(Screen::Interview);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::interview::InterviewType;
    use crate::models::results::Level;
    use crate::provider::schema::fixtures;

    fn evaluation() -> Evaluation {
        Evaluation {
            summary: "s".to_string(),
            knowledge_assessment: "k".to_string(),
            skills_assessment: "s".to_string(),
            confidence_assessment: "c".to_string(),
            communication_assessment: "c".to_string(),
            level: Level::Beginner,
        }
    }

    fn roadmap() -> Vec<RoadmapItem> {
        fixtures::drafts(3)
            .into_iter()
            .enumerate()
            .map(|(i, d)| RoadmapItem::from_draft(format!("id-{i}"), d))
            .collect()
    }

    #[test]
    fn test_begin_resets_previous_interview() {
        let mut ctx = SessionContext::default();
        ctx.append_utterance(Utterance::interviewer("old question").unwrap());
        ctx.set_evaluation(evaluation()).unwrap();

        let goal = SessionGoal::new("Ada", "Data Analyst");
        let types = InterviewTypeSet::new([InterviewType::Behavioral]).unwrap();
        ctx.begin(goal.clone(), types);

        assert!(ctx.transcript().is_empty());
        assert!(ctx.evaluation().is_none());
        assert_eq!(ctx.goal(), Some(&goal));
        assert_eq!(ctx.current_screen(), Screen::Interview);
    }

    #[test]
    fn test_evaluation_is_write_once() {
        let mut ctx = SessionContext::default();
        ctx.set_evaluation(evaluation()).unwrap();
        assert_eq!(
            ctx.set_evaluation(evaluation()),
            Err(SessionError::EvaluationAlreadySet)
        );
    }

    #[test]
    fn test_toggle_only_touches_one_item() {
        let mut ctx = SessionContext::default();
        ctx.replace_roadmap(roadmap());
        let before = ctx.roadmap().to_vec();

        let toggled = ctx.toggle_roadmap_item("id-1").unwrap();
        assert!(toggled.completed);

        let after = ctx.roadmap();
        assert_eq!(after[0], before[0]);
        assert_eq!(after[2], before[2]);
        assert_eq!(after[1].id, before[1].id);
        assert_eq!(after[1].title, before[1].title);
    }

    #[test]
    fn test_toggle_twice_restores_flag() {
        let mut ctx = SessionContext::default();
        ctx.replace_roadmap(roadmap());
        ctx.toggle_roadmap_item("id-0").unwrap();
        let item = ctx.toggle_roadmap_item("id-0").unwrap();
        assert!(!item.completed);
    }

    #[test]
    fn test_toggle_unknown_item() {
        let mut ctx = SessionContext::default();
        assert_eq!(
            ctx.toggle_roadmap_item("missing").unwrap_err(),
            SessionError::UnknownRoadmapItem("missing".to_string())
        );
    }
}
