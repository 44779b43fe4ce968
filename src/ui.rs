//! Terminal output: a spinner while the workflow runs and coloured article views.

use std::time::Duration;

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use inkloop::error::RevisionError;
use inkloop::state_machine::{Article, ArticleSummary, EvaluationStatus};

/// Spinner shown while a workflow call is in flight.
///
/// Finishes with a green check for approval, yellow for a suspended
/// workflow and red for rejection or failure.
pub struct WorkflowProgress {
    pb: ProgressBar,
    green: Style,
    red: Style,
    yellow: Style,
}

impl WorkflowProgress {
    pub fn start(message: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        // The template is a literal; fall back to the default style if it ever fails to parse.
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
            pb.set_style(style);
        }
        pb.set_message(message.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));

        Self {
            pb,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
        }
    }

    pub fn complete(&self, article: &Article) {
        self.pb.finish_and_clear();
        let score = score_text(article.score);
        match article.evaluation {
            EvaluationStatus::Approved => println!(
                "  {} Approved after {} iteration(s), score {score}",
                self.green.apply_to("✓"),
                article.iteration
            ),
            EvaluationStatus::Rejected => println!(
                "  {} Rejected after {} iteration(s), score {score}",
                self.red.apply_to("✗"),
                article.iteration
            ),
            EvaluationStatus::Pending if article.needs_human_feedback => println!(
                "  {} Waiting for human feedback (score {score}). Run `inkloop feedback {} \"...\"`",
                self.yellow.apply_to("?"),
                article.id
            ),
            EvaluationStatus::Pending => println!(
                "  {} {} at iteration {}",
                self.yellow.apply_to("…"),
                article.state,
                article.iteration
            ),
        }
    }

    pub fn fail(&self, err: &RevisionError, operation: &Operation<'_>) {
        self.pb.finish_and_clear();
        println!("  {} {}", self.red.apply_to("✗"), err.root());
        if let Some(id) = operation.article_id(err) {
            println!("  id: {id}");
        }
        if let Some(hint) = operation.retry_hint(err) {
            println!("  {} {hint}", self.yellow.apply_to("↻"));
        }
    }
}

/// The workflow call a spinner is tracking.
#[derive(Debug, Clone, Copy)]
pub enum Operation<'a> {
    Generate,
    Feedback { id: &'a str },
    Resume { id: &'a str },
}

impl Operation<'_> {
    fn article_id<'e>(&'e self, err: &'e RevisionError) -> Option<&'e str> {
        match self {
            Operation::Generate => err.article_id(),
            Operation::Feedback { id } | Operation::Resume { id } => Some(*id),
        }
    }

    /// The command that retries a failed call, when retrying can help.
    pub fn retry_hint(&self, err: &RevisionError) -> Option<String> {
        if !err.is_retryable() {
            return None;
        }
        match self {
            Operation::Generate => err
                .article_id()
                .map(|id| format!("retry with `inkloop resume {id}`")),
            Operation::Resume { id } => Some(format!("retry with `inkloop resume {id}`")),
            // A failed continued submission records nothing, so the feedback has to be sent again.
            Operation::Feedback { id } => {
                Some(format!("re-submit with `inkloop feedback {id} \"...\"`"))
            }
        }
    }
}

fn score_text(score: Option<u8>) -> String {
    score.map_or_else(|| "N/A".to_string(), |s| format!("{s}/10"))
}

fn status_style(evaluation: EvaluationStatus, needs_human_feedback: bool) -> Style {
    match evaluation {
        EvaluationStatus::Approved => Style::new().green().bold(),
        EvaluationStatus::Rejected => Style::new().red().bold(),
        EvaluationStatus::Pending if needs_human_feedback => Style::new().yellow().bold(),
        EvaluationStatus::Pending => Style::new().cyan(),
    }
}

/// Print the full article with its latest automated critique.
pub fn print_article(article: &Article) {
    let heading = Style::new().bold();
    let dim = Style::new().dim();
    let status = status_style(article.evaluation, article.needs_human_feedback);

    println!("{}", heading.apply_to(&article.topic));
    println!(
        "{} {}  {} {}  {} {}/{}  {} {}",
        dim.apply_to("id"),
        article.id,
        dim.apply_to("status"),
        status.apply_to(format!("{} ({})", article.evaluation, article.state)),
        dim.apply_to("iteration"),
        article.iteration,
        article.max_iteration,
        dim.apply_to("score"),
        score_text(article.score),
    );
    println!();
    if article.final_article.is_empty() {
        println!("{}", dim.apply_to("(no draft yet)"));
    } else {
        println!("{}", article.final_article);
    }
    if !article.feedback.is_empty() {
        println!();
        println!("{}", heading.apply_to("─── Latest evaluation ───"));
        println!("{}", article.feedback);
    }
    if !article.human_feedback_history.is_empty() {
        println!();
        println!("{}", heading.apply_to("─── Human feedback ───"));
        for (i, feedback) in article.human_feedback_history.iter().enumerate() {
            println!("{}. {feedback}", i + 1);
        }
    }
}

/// Print one line per article.
pub fn print_summaries(summaries: &[ArticleSummary]) {
    if summaries.is_empty() {
        println!("No articles yet.");
        return;
    }
    let dim = Style::new().dim();
    for s in summaries {
        let status = status_style(s.evaluation, s.needs_human_feedback);
        println!(
            "{}  {:<24} {:>5}  {}/{}  {}",
            dim.apply_to(&s.id),
            status.apply_to(s.state.to_string()),
            score_text(s.score),
            s.iteration,
            s.max_iteration,
            s.topic,
        );
    }
}
