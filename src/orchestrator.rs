use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{info, instrument, warn};

use crate::error::{RevisionError, RevisionResult, Step};
use crate::export;
use crate::generation::{Evaluation, GenerationService, PriorFeedback};
use crate::state_machine::{
    Article, ArticleSummary, StateMachine, Thresholds, Transition, WorkflowState,
};
use crate::store::{ArticleLease, RevisionStore};

/// Tunables for the workflow loop.
#[derive(Debug, Clone, Copy)]
pub struct WorkflowSettings {
    pub thresholds: Thresholds,
    /// Upper bound on each generate or evaluate call.
    pub step_timeout: Duration,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            thresholds: Thresholds::default(),
            step_timeout: Duration::from_secs(180),
        }
    }
}

/// Drives articles through generate → evaluate cycles.
///
/// Every transition runs under an [`ArticleLease`], and each completed cycle
/// (one draft plus its evaluation and the resulting decision) is committed as
/// a single store update. A failed or timed-out service call therefore leaves
/// the article exactly as it was after the last completed cycle.
#[derive(Clone)]
pub struct WorkflowOrchestrator {
    store: Arc<RevisionStore>,
    service: Arc<dyn GenerationService>,
    settings: WorkflowSettings,
}

impl WorkflowOrchestrator {
    pub fn new(
        store: Arc<RevisionStore>,
        service: Arc<dyn GenerationService>,
        settings: WorkflowSettings,
    ) -> Self {
        Self {
            store,
            service,
            settings,
        }
    }

    pub fn store(&self) -> &Arc<RevisionStore> {
        &self.store
    }

    /// Create an article for `topic` and run it until it is approved,
    /// rejected or suspended for human feedback.
    ///
    /// If a step fails after creation the article is kept in its last
    /// committed state and the error is [`RevisionError::Interrupted`] with
    /// its id; [`resume`](Self::resume) retries it.
    #[instrument(skip(self))]
    pub async fn create_and_run(&self, topic: &str, max_iteration: u32) -> RevisionResult<Article> {
        let article = self.store.create(topic, max_iteration).await?;
        let outcome = match self.store.lease(&article.id).await {
            Ok(lease) => self.run_cycles(&lease).await,
            Err(err) => Err(err),
        };
        outcome.map_err(|err| err.interrupted(&article.id))
    }

    /// Continue the automated loop for an article left in CREATED or
    /// REVISING, e.g. after a failed service call or a restart.
    #[instrument(skip(self))]
    pub async fn resume(&self, id: &str) -> RevisionResult<Article> {
        let lease = self.store.lease(id).await?;
        let article = lease.article().await?;
        if article.is_terminal() {
            return Err(RevisionError::TerminalStateViolation {
                id: article.id,
                evaluation: article.evaluation,
            });
        }
        if !article.state.is_runnable() {
            return Err(RevisionError::InvalidTransition {
                id: article.id,
                state: article.state,
                action: "resume",
            });
        }
        self.run_cycles(&lease).await
    }

    /// Record human feedback for a suspended article.
    ///
    /// With `continue_workflow = false` the feedback is saved and the article
    /// is parked in PAUSED. Otherwise the feedback, the iteration bump and
    /// the next cycle are committed together, and the automated loop carries
    /// on from there. If that cycle fails the feedback is not recorded.
    #[instrument(skip(self, feedback), fields(feedback_len = feedback.len()))]
    pub async fn submit_feedback(
        &self,
        id: &str,
        feedback: &str,
        continue_workflow: bool,
    ) -> RevisionResult<Article> {
        let lease = self.store.lease(id).await?;

        // Validate against a preview first so bad submissions never reach the service.
        let mut preview = lease.article().await?;
        StateMachine::record_human_feedback(&mut preview, feedback, continue_workflow)?;

        if !continue_workflow {
            lease
                .update(|a| StateMachine::record_human_feedback(a, feedback, false))
                .await?;
            info!(article_id = %id, "human feedback saved, workflow paused");
            return lease.article().await;
        }

        let prior = PriorFeedback::from_article(&preview);
        let (draft, evaluation) = self.cycle(&preview, prior.as_ref()).await?;
        let thresholds = self.settings.thresholds;
        let transition = lease
            .update(move |a| {
                StateMachine::record_human_feedback(a, feedback, true)?;
                StateMachine::record_cycle(a, draft, evaluation, &thresholds)
            })
            .await?;
        self.log_transition(&lease, transition).await;

        if transition.continues() {
            self.run_cycles(&lease).await
        } else {
            lease.article().await
        }
    }

    pub async fn get(&self, id: &str) -> RevisionResult<Article> {
        self.store.get(id).await
    }

    pub async fn list(&self) -> Vec<ArticleSummary> {
        self.store.list().await
    }

    pub async fn delete(&self, id: &str) -> RevisionResult<()> {
        self.store.delete(id).await
    }

    /// The article's current text as a Markdown document.
    pub async fn export_markdown(&self, id: &str) -> RevisionResult<String> {
        let article = self.store.get(id).await?;
        Ok(export::render_markdown(&article))
    }

    async fn run_cycles(&self, lease: &ArticleLease<'_>) -> RevisionResult<Article> {
        loop {
            let article = lease.article().await?;
            if !article.state.is_runnable() {
                return Ok(article);
            }

            let prior = PriorFeedback::from_article(&article);
            let (draft, evaluation) = self.cycle(&article, prior.as_ref()).await?;
            let thresholds = self.settings.thresholds;
            let transition = lease
                .update(move |a| StateMachine::record_cycle(a, draft, evaluation, &thresholds))
                .await?;
            self.log_transition(lease, transition).await;

            if !transition.continues() {
                return lease.article().await;
            }
        }
    }

    /// One generate + evaluate pass. Commits nothing.
    async fn cycle(
        &self,
        article: &Article,
        prior: Option<&PriorFeedback>,
    ) -> RevisionResult<(String, Evaluation)> {
        info!(
            article_id = %article.id,
            iteration = article.iteration,
            max_iteration = article.max_iteration,
            state = %WorkflowState::Generating,
            "generating draft"
        );
        let draft = self
            .bounded(Step::Generate, &article.id, self.service.generate(&article.topic, prior))
            .await?;

        info!(article_id = %article.id, state = %WorkflowState::Evaluating, "evaluating draft");
        let evaluation = self
            .bounded(Step::Evaluate, &article.id, self.service.evaluate(&draft))
            .await?;

        Ok((draft, evaluation))
    }

    async fn bounded<T>(
        &self,
        step: Step,
        article_id: &str,
        call: impl Future<Output = RevisionResult<T>>,
    ) -> RevisionResult<T> {
        let after = self.settings.step_timeout;
        match timeout(after, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => {
                warn!(article_id, %step, error = %err, "service call failed");
                Err(err)
            }
            Err(_) => {
                warn!(article_id, %step, timeout_secs = after.as_secs(), "service call timed out");
                Err(RevisionError::Timeout { step, after })
            }
        }
    }

    async fn log_transition(&self, lease: &ArticleLease<'_>, transition: Transition) {
        if let Ok(article) = lease.article().await {
            info!(
                article_id = %article.id,
                iteration = article.iteration,
                score = article.score,
                state = %transition.next_state(),
                "cycle committed"
            );
        }
    }
}
