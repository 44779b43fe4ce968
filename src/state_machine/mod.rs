mod article;
mod state;

pub use article::{Article, ArticleSummary, EvaluationStatus};
pub use state::{MAX_SCORE, StateMachine, Thresholds, Transition, WorkflowState};
