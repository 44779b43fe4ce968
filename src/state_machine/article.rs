use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::state::{MAX_SCORE, WorkflowState};
use crate::error::{RevisionError, RevisionResult};

/// Verdict stored on the article. `approved` and `rejected` are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationStatus {
    Pending,
    Approved,
    Rejected,
}

impl fmt::Display for EvaluationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvaluationStatus::Pending => write!(f, "pending"),
            EvaluationStatus::Approved => write!(f, "approved"),
            EvaluationStatus::Rejected => write!(f, "rejected"),
        }
    }
}

/// An article and its full revision history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: String,
    pub topic: String,
    pub max_iteration: u32,
    pub iteration: u32,
    pub final_article: String,
    pub article_history: Vec<String>,
    pub evaluation: EvaluationStatus,
    pub score: Option<u8>,
    pub feedback: String,
    pub feedback_history: Vec<String>,
    pub needs_human_feedback: bool,
    pub human_feedback_history: Vec<String>,
    pub state: WorkflowState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Article {
    pub fn new(topic: &str, max_iteration: u32) -> RevisionResult<Self> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(RevisionError::invalid_input("topic must not be empty"));
        }
        if max_iteration < 1 {
            return Err(RevisionError::invalid_input(
                "max_iteration must be at least 1",
            ));
        }

        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            topic: topic.to_string(),
            max_iteration,
            iteration: 1,
            final_article: String::new(),
            article_history: Vec::new(),
            evaluation: EvaluationStatus::Pending,
            score: None,
            feedback: String::new(),
            feedback_history: Vec::new(),
            needs_human_feedback: false,
            human_feedback_history: Vec::new(),
            state: WorkflowState::Created,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn is_terminal(&self) -> bool {
        self.evaluation != EvaluationStatus::Pending || self.state.is_terminal()
    }

    pub fn summary(&self) -> ArticleSummary {
        ArticleSummary {
            id: self.id.clone(),
            topic: self.topic.clone(),
            iteration: self.iteration,
            max_iteration: self.max_iteration,
            evaluation: self.evaluation,
            score: self.score,
            needs_human_feedback: self.needs_human_feedback,
            state: self.state,
            created_at: self.created_at,
        }
    }

    /// Verify the structural invariants that must hold whenever the article
    /// is at rest in the store.
    pub fn check_invariants(&self) -> RevisionResult<()> {
        let violation = |msg: String| Err(RevisionError::InvariantViolation(msg));

        if self.max_iteration < 1 {
            return violation("max_iteration must be positive".into());
        }
        if self.iteration < 1 || self.iteration > self.max_iteration {
            return violation(format!(
                "iteration {} outside 1..={}",
                self.iteration, self.max_iteration
            ));
        }
        if self.article_history.len() != self.feedback_history.len() {
            return violation(format!(
                "{} article versions but {} evaluations",
                self.article_history.len(),
                self.feedback_history.len()
            ));
        }
        if let Some(last) = self.article_history.last() {
            if *last != self.final_article {
                return violation("final_article differs from the latest version".into());
            }
        }
        if let Some(score) = self.score {
            if score > MAX_SCORE {
                return violation(format!("score {score} outside 0..={MAX_SCORE}"));
            }
        }
        if self.state == WorkflowState::Generating || self.state == WorkflowState::Evaluating {
            return violation(format!("transient state {} cannot be stored", self.state));
        }
        if self.needs_human_feedback && self.state != WorkflowState::AwaitingHumanFeedback {
            return violation(format!(
                "needs_human_feedback set while {}",
                self.state
            ));
        }
        let expected = match self.evaluation {
            EvaluationStatus::Approved => Some(WorkflowState::Approved),
            EvaluationStatus::Rejected => Some(WorkflowState::Rejected),
            EvaluationStatus::Pending => None,
        };
        match expected {
            Some(state) if state != self.state => violation(format!(
                "evaluation {} does not match state {}",
                self.evaluation, self.state
            )),
            None if self.state.is_terminal() => violation(format!(
                "state {} requires a final evaluation",
                self.state
            )),
            _ => Ok(()),
        }
    }
}

/// Compact list view of an article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleSummary {
    pub id: String,
    pub topic: String,
    pub iteration: u32,
    pub max_iteration: u32,
    pub evaluation: EvaluationStatus,
    pub score: Option<u8>,
    pub needs_human_feedback: bool,
    pub state: WorkflowState,
    pub created_at: DateTime<Utc>,
}
