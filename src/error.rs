use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::state_machine::{EvaluationStatus, WorkflowState};

pub type RevisionResult<T> = Result<T, RevisionError>;

/// Every failure the revision core can report.
///
/// No variant implies a partial commit: when an operation returns an error the
/// stored article is exactly what it was before the call.
#[derive(Debug, Error)]
pub enum RevisionError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("article not found: {0}")]
    NotFound(String),

    #[error("article {id} is {evaluation} and can no longer change")]
    TerminalStateViolation {
        id: String,
        evaluation: EvaluationStatus,
    },

    #[error("cannot {action} article {id} while it is {state}")]
    InvalidTransition {
        id: String,
        state: WorkflowState,
        action: &'static str,
    },

    #[error("generation failed: {0}")]
    Generation(String),

    #[error("evaluation failed: {0}")]
    Evaluation(String),

    #[error("{step} step timed out after {}s", .after.as_secs())]
    Timeout { step: Step, after: Duration },

    #[error("concurrent modification: {0}")]
    ConcurrentModification(String),

    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("storage error: {0}")]
    Storage(String),

    /// A step failed after the article was created. The article is kept in
    /// its last committed state under `article_id`.
    #[error("{source} (article {article_id})")]
    Interrupted {
        article_id: String,
        #[source]
        source: Box<RevisionError>,
    },
}

impl RevisionError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound(id.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Attach the id of the article a failed workflow left behind.
    pub fn interrupted(self, article_id: impl Into<String>) -> Self {
        Self::Interrupted {
            article_id: article_id.into(),
            source: Box::new(self),
        }
    }

    /// The id of the article left behind by a failed workflow, if any.
    pub fn article_id(&self) -> Option<&str> {
        match self {
            Self::Interrupted { article_id, .. } => Some(article_id),
            _ => None,
        }
    }

    /// The underlying failure with any article context removed.
    pub fn root(&self) -> &RevisionError {
        match self {
            Self::Interrupted { source, .. } => source.root(),
            other => other,
        }
    }

    /// Whether the caller may retry the same request unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.root(),
            Self::Generation(_)
                | Self::Evaluation(_)
                | Self::Timeout { .. }
                | Self::ConcurrentModification(_)
                | Self::Storage(_)
        )
    }
}

/// The two calls made to the generation service during a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Generate,
    Evaluate,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Generate => write!(f, "generate"),
            Step::Evaluate => write!(f, "evaluate"),
        }
    }
}
