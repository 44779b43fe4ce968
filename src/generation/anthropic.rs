use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use super::prompts;
use super::{Evaluation, GenerationService, PriorFeedback};
use crate::anthropic::{AnthropicError, MessageSender, MessagesRequest, ModelTier};
use crate::error::{RevisionError, RevisionResult};
use crate::state_machine::MAX_SCORE;

const DRAFT_MAX_TOKENS: u32 = 8192;
const EVALUATION_MAX_TOKENS: u32 = 1024;

const WRITER_TEMPERATURE: f32 = 0.7;
const EDITOR_TEMPERATURE: f32 = 0.6;
const EVALUATOR_TEMPERATURE: f32 = 0.3;

/// [`GenerationService`] backed by the Anthropic Messages API.
pub struct AnthropicGenerator<S> {
    sender: S,
    model: ModelTier,
}

impl<S: MessageSender> AnthropicGenerator<S> {
    pub fn new(sender: S, model: ModelTier) -> Self {
        Self { sender, model }
    }

    async fn complete(&self, req: MessagesRequest) -> Result<String, AnthropicError> {
        let response = self.sender.send_message(&req).await?;
        if response.stop_reason.as_deref() == Some("max_tokens") {
            warn!(id = %response.id, "response truncated at max_tokens");
        }
        Ok(response.text())
    }
}

#[async_trait]
impl<S: MessageSender> GenerationService for AnthropicGenerator<S> {
    async fn generate(&self, topic: &str, prior: Option<&PriorFeedback>) -> RevisionResult<String> {
        let req = match prior {
            None => MessagesRequest::single_turn(
                self.model,
                DRAFT_MAX_TOKENS,
                prompts::WRITER_SYSTEM,
                WRITER_TEMPERATURE,
                prompts::first_draft(topic),
            ),
            Some(prior) => MessagesRequest::single_turn(
                self.model,
                DRAFT_MAX_TOKENS,
                prompts::EDITOR_SYSTEM,
                EDITOR_TEMPERATURE,
                prompts::revision(topic, prior),
            ),
        };

        let text = self
            .complete(req)
            .await
            .map_err(|e| RevisionError::Generation(e.to_string()))?;
        let text = text.trim();
        if text.is_empty() {
            return Err(RevisionError::Generation("model returned an empty draft".into()));
        }
        debug!(chars = text.len(), revision = prior.is_some(), "draft generated");
        Ok(text.to_string())
    }

    async fn evaluate(&self, text: &str) -> RevisionResult<Evaluation> {
        let req = MessagesRequest::single_turn(
            self.model,
            EVALUATION_MAX_TOKENS,
            prompts::EVALUATOR_SYSTEM,
            EVALUATOR_TEMPERATURE,
            prompts::evaluation(text),
        );
        let reply = self
            .complete(req)
            .await
            .map_err(|e| RevisionError::Evaluation(e.to_string()))?;
        parse_evaluation(&reply)
    }
}

#[derive(Debug, Deserialize)]
struct RawEvaluation {
    score: f64,
    feedback: String,
}

/// Parse the evaluator's JSON reply.
///
/// Tolerates Markdown code fences and prose around the JSON object. Fractional
/// scores are rounded; scores outside 0..=10 are an error.
pub fn parse_evaluation(reply: &str) -> RevisionResult<Evaluation> {
    let start = reply.find('{');
    let end = reply.rfind('}');
    let json = match (start, end) {
        (Some(start), Some(end)) if start < end => &reply[start..=end],
        _ => {
            return Err(RevisionError::Evaluation(
                "evaluator reply contained no JSON object".into(),
            ));
        }
    };

    let raw: RawEvaluation = serde_json::from_str(json)
        .map_err(|e| RevisionError::Evaluation(format!("failed to parse evaluation: {e}")))?;

    if !raw.score.is_finite() || raw.score < 0.0 || raw.score > f64::from(MAX_SCORE) {
        return Err(RevisionError::Evaluation(format!(
            "score {} is outside 0..={MAX_SCORE}",
            raw.score
        )));
    }

    Ok(Evaluation {
        score: raw.score.round() as u8,
        feedback: raw.feedback.trim().to_string(),
    })
}
