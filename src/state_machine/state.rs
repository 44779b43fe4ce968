use std::fmt;

use serde::{Deserialize, Serialize};

use super::article::{Article, EvaluationStatus};
use crate::error::{RevisionError, RevisionResult};
use crate::generation::Evaluation;

/// Highest score the evaluator may assign.
pub const MAX_SCORE: u8 = 10;

/// States of the article revision workflow.
///
/// An article flows CREATED → GENERATING → EVALUATING and then either ends
/// (APPROVED, REJECTED), suspends (AWAITING_HUMAN_FEEDBACK) or loops back
/// through REVISING. GENERATING and EVALUATING only exist while a cycle is in
/// flight and are never committed to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    Created,
    Generating,
    Evaluating,
    Revising,
    AwaitingHumanFeedback,
    /// Human feedback was saved without continuing the workflow.
    Paused,
    Approved,
    Rejected,
}

impl WorkflowState {
    pub fn is_terminal(self) -> bool {
        matches!(self, WorkflowState::Approved | WorkflowState::Rejected)
    }

    /// States from which the automated generate/evaluate loop may run.
    pub fn is_runnable(self) -> bool {
        matches!(self, WorkflowState::Created | WorkflowState::Revising)
    }

    /// States that accept a human feedback submission.
    pub fn accepts_feedback(self) -> bool {
        matches!(
            self,
            WorkflowState::AwaitingHumanFeedback | WorkflowState::Paused
        )
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkflowState::Created => write!(f, "CREATED"),
            WorkflowState::Generating => write!(f, "GENERATING"),
            WorkflowState::Evaluating => write!(f, "EVALUATING"),
            WorkflowState::Revising => write!(f, "REVISING"),
            WorkflowState::AwaitingHumanFeedback => write!(f, "AWAITING_HUMAN_FEEDBACK"),
            WorkflowState::Paused => write!(f, "PAUSED"),
            WorkflowState::Approved => write!(f, "APPROVED"),
            WorkflowState::Rejected => write!(f, "REJECTED"),
        }
    }
}

/// Score boundaries used by the evaluate step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    /// Scores at or above this approve the article.
    pub approval: u8,
    /// Scores strictly below this suspend the workflow for human input.
    pub human_feedback: u8,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            approval: 9,
            human_feedback: 7,
        }
    }
}

/// The outcome of an evaluate step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Approve,
    Reject,
    AwaitHumanFeedback,
    Revise,
}

impl Transition {
    pub fn next_state(self) -> WorkflowState {
        match self {
            Transition::Approve => WorkflowState::Approved,
            Transition::Reject => WorkflowState::Rejected,
            Transition::AwaitHumanFeedback => WorkflowState::AwaitingHumanFeedback,
            Transition::Revise => WorkflowState::Revising,
        }
    }

    /// Whether the automated loop should run another cycle.
    pub fn continues(self) -> bool {
        self == Transition::Revise
    }
}

/// Applies workflow transitions to an `Article`.
///
/// Every method validates the article's current state before touching it and
/// returns an error without mutating anything when the transition is illegal.
/// Callers run these inside `ArticleLease::update`, which commits or discards
/// the whole staged copy.
pub struct StateMachine;

impl StateMachine {
    /// Decide where an evaluated article goes next.
    ///
    /// Rules are checked in order: approval, exhausted budget, human review,
    /// automatic revision.
    pub fn decide(
        score: u8,
        iteration: u32,
        max_iteration: u32,
        thresholds: &Thresholds,
    ) -> Transition {
        if score >= thresholds.approval {
            Transition::Approve
        } else if iteration >= max_iteration {
            Transition::Reject
        } else if score < thresholds.human_feedback {
            Transition::AwaitHumanFeedback
        } else {
            Transition::Revise
        }
    }

    /// Record one completed generate + evaluate cycle and the decision it
    /// leads to.
    pub fn record_cycle(
        article: &mut Article,
        draft: String,
        evaluation: Evaluation,
        thresholds: &Thresholds,
    ) -> RevisionResult<Transition> {
        Self::ensure_mutable(article)?;
        if !article.state.is_runnable() {
            return Err(RevisionError::InvalidTransition {
                id: article.id.clone(),
                state: article.state,
                action: "record a revision cycle for",
            });
        }
        if evaluation.score > MAX_SCORE {
            return Err(RevisionError::Evaluation(format!(
                "score {} is outside 0..={MAX_SCORE}",
                evaluation.score
            )));
        }

        article.article_history.push(draft.clone());
        article.final_article = draft;
        article.feedback_history.push(evaluation.feedback.clone());
        article.feedback = evaluation.feedback;
        article.score = Some(evaluation.score);

        let transition = Self::decide(
            evaluation.score,
            article.iteration,
            article.max_iteration,
            thresholds,
        );

        match transition {
            Transition::Approve => {
                article.evaluation = EvaluationStatus::Approved;
                article.needs_human_feedback = false;
            }
            Transition::Reject => {
                article.evaluation = EvaluationStatus::Rejected;
                article.needs_human_feedback = false;
            }
            Transition::AwaitHumanFeedback => {
                article.needs_human_feedback = true;
            }
            Transition::Revise => {
                article.iteration += 1;
            }
        }
        article.state = transition.next_state();

        Ok(transition)
    }

    /// Record a human critique.
    ///
    /// With `continue_workflow` the iteration counter advances and the article
    /// becomes REVISING; otherwise it is parked in PAUSED with the counter
    /// unchanged.
    pub fn record_human_feedback(
        article: &mut Article,
        feedback: &str,
        continue_workflow: bool,
    ) -> RevisionResult<()> {
        Self::ensure_mutable(article)?;
        if !article.state.accepts_feedback() {
            return Err(RevisionError::InvalidTransition {
                id: article.id.clone(),
                state: article.state,
                action: "submit feedback for",
            });
        }
        let feedback = feedback.trim();
        if feedback.is_empty() {
            return Err(RevisionError::invalid_input("feedback must not be empty"));
        }
        if continue_workflow && article.iteration >= article.max_iteration {
            return Err(RevisionError::invalid_input(format!(
                "iteration budget of {} is exhausted",
                article.max_iteration
            )));
        }

        article.human_feedback_history.push(feedback.to_string());
        article.needs_human_feedback = false;
        if continue_workflow {
            article.iteration += 1;
            article.state = WorkflowState::Revising;
        } else {
            article.state = WorkflowState::Paused;
        }
        Ok(())
    }

    fn ensure_mutable(article: &Article) -> RevisionResult<()> {
        if article.is_terminal() {
            return Err(RevisionError::TerminalStateViolation {
                id: article.id.clone(),
                evaluation: article.evaluation,
            });
        }
        Ok(())
    }
}
