//! Markdown export of an article's current text.

use std::fmt::Write;

use crate::state_machine::Article;

/// Render `article` as a standalone Markdown document: the text, a footer
/// describing the workflow outcome, and any human feedback received.
pub fn render_markdown(article: &Article) -> String {
    let score = article
        .score
        .map_or_else(|| "N/A".to_string(), |s| s.to_string());

    let mut out = format!(
        "# {topic}\n\n{body}\n\n---\n\
         *Generated on: {created}*\n\
         *Iterations: {iteration}/{max}*\n\
         *Status: {status}*\n\
         *Quality Score: {score}/10*\n",
        topic = article.topic,
        body = article.final_article,
        created = article.created_at.to_rfc3339(),
        iteration = article.iteration,
        max = article.max_iteration,
        status = article.evaluation,
    );

    if !article.human_feedback_history.is_empty() {
        out.push_str("\n## Human Feedback History\n\n");
        for (i, feedback) in article.human_feedback_history.iter().enumerate() {
            // Writing into a String cannot fail.
            let _ = write!(out, "### Iteration {} Human Feedback\n\n{feedback}\n\n", i + 1);
        }
    }
    out
}

/// Download name for the exported document. The result is always a valid
/// HTTP header value: control characters become `-`.
pub fn file_name(article: &Article) -> String {
    let stem: String = article
        .topic
        .chars()
        .map(|c| match c {
            ' ' => '_',
            c if c.is_control() => '-',
            '/' | '\\' | ':' | '"' | '*' | '?' | '<' | '>' | '|' => '-',
            c => c,
        })
        .collect();
    format!("{stem}.md")
}
