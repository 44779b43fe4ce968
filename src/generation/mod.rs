//! The external service that writes and grades article drafts.
//!
//! The revision core only depends on [`GenerationService`]; the bundled
//! [`AnthropicGenerator`] implements it on top of the Anthropic Messages API.

mod anthropic;
mod prompts;

pub use anthropic::{AnthropicGenerator, parse_evaluation};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::RevisionResult;
use crate::state_machine::Article;

/// Score and critique produced by one evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evaluation {
    pub score: u8,
    pub feedback: String,
}

/// Guidance handed to the writer when producing a revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorFeedback {
    pub previous_article: String,
    pub score: Option<u8>,
    pub automated: String,
    pub human: Option<String>,
}

impl PriorFeedback {
    /// Guidance for the next revision of `article`, or `None` before the
    /// first draft exists.
    pub fn from_article(article: &Article) -> Option<Self> {
        if article.article_history.is_empty() {
            return None;
        }
        Some(Self {
            previous_article: article.final_article.clone(),
            score: article.score,
            automated: article.feedback.clone(),
            human: article.human_feedback_history.last().cloned(),
        })
    }

    /// Automated and human critique merged into one block of guidance.
    pub fn combined(&self) -> String {
        match &self.human {
            Some(human) => format!(
                "AUTOMATED REVIEW:\n{}\n\nHUMAN REVIEW:\n{}\n\nAddress both reviews; where they conflict, follow the human review.",
                self.automated, human
            ),
            None => self.automated.clone(),
        }
    }
}

/// Writes drafts and evaluates them. Implementations must not retry
/// internally; failures are reported to the orchestrator as-is.
#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Produce a draft for `topic`, revising the previous one when `prior` is set.
    async fn generate(&self, topic: &str, prior: Option<&PriorFeedback>) -> RevisionResult<String>;

    /// Score a draft from 0 to 10 and critique it.
    async fn evaluate(&self, text: &str) -> RevisionResult<Evaluation>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_prior_feedback_before_first_draft() {
        let article = Article::new("topic", 3).unwrap();
        assert!(PriorFeedback::from_article(&article).is_none());
    }

    #[test]
    fn prior_feedback_uses_latest_entries() {
        let mut article = Article::new("topic", 3).unwrap();
        article.article_history = vec!["v1".into(), "v2".into()];
        article.final_article = "v2".into();
        article.feedback_history = vec!["f1".into(), "f2".into()];
        article.feedback = "f2".into();
        article.score = Some(6);
        article.human_feedback_history = vec!["h1".into(), "h2".into()];

        let prior = PriorFeedback::from_article(&article).unwrap();
        assert_eq!(prior.previous_article, "v2");
        assert_eq!(prior.automated, "f2");
        assert_eq!(prior.human.as_deref(), Some("h2"));
        assert_eq!(prior.score, Some(6));
    }

    #[test]
    fn combined_without_human_is_automated_only() {
        let prior = PriorFeedback {
            previous_article: "v1".into(),
            score: Some(7),
            automated: "needs sources".into(),
            human: None,
        };
        assert_eq!(prior.combined(), "needs sources");
    }

    #[test]
    fn combined_includes_both_reviews() {
        let prior = PriorFeedback {
            previous_article: "v1".into(),
            score: Some(5),
            automated: "needs sources".into(),
            human: Some("friendlier tone".into()),
        };
        let combined = prior.combined();
        assert!(combined.contains("AUTOMATED REVIEW:\nneeds sources"));
        assert!(combined.contains("HUMAN REVIEW:\nfriendlier tone"));
    }
}
