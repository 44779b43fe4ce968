use axum::{
    Extension, Json,
    extract::Path,
    http::header,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::{Value, json};

use super::HttpState;
use super::error::{HttpResult, IntoHttpResult};
use crate::export;
use crate::state_machine::Article;

fn default_continue() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub topic: String,
    #[serde(default)]
    pub max_iterations: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct HumanFeedbackRequest {
    pub feedback: String,
    #[serde(default = "default_continue")]
    pub continue_workflow: bool,
}

pub async fn root() -> Json<Value> {
    Json(json!({ "message": "inkloop article generation API" }))
}

pub async fn generate_article(
    Extension(state): Extension<HttpState>,
    Json(request): Json<GenerateRequest>,
) -> HttpResult<Json<Article>> {
    let max_iterations = request
        .max_iterations
        .unwrap_or(state.default_max_iterations);
    let article = state
        .orchestrator
        .create_and_run(&request.topic, max_iterations)
        .await
        .into_http()?;
    Ok(Json(article))
}

pub async fn list_articles(Extension(state): Extension<HttpState>) -> Json<Value> {
    let articles = state.orchestrator.list().await;
    Json(json!({ "articles": articles }))
}

pub async fn get_article(
    Extension(state): Extension<HttpState>,
    Path(id): Path<String>,
) -> HttpResult<Json<Article>> {
    let article = state.orchestrator.get(&id).await.into_http()?;
    Ok(Json(article))
}

pub async fn delete_article(
    Extension(state): Extension<HttpState>,
    Path(id): Path<String>,
) -> HttpResult<Json<Value>> {
    state.orchestrator.delete(&id).await.into_http()?;
    Ok(Json(json!({ "message": "Article deleted successfully" })))
}

pub async fn submit_human_feedback(
    Extension(state): Extension<HttpState>,
    Path(id): Path<String>,
    Json(request): Json<HumanFeedbackRequest>,
) -> HttpResult<Json<Article>> {
    let article = state
        .orchestrator
        .submit_feedback(&id, &request.feedback, request.continue_workflow)
        .await
        .into_http()?;
    Ok(Json(article))
}

pub async fn needs_feedback(
    Extension(state): Extension<HttpState>,
    Path(id): Path<String>,
) -> HttpResult<Json<Value>> {
    let article = state.orchestrator.get(&id).await.into_http()?;
    Ok(Json(json!({ "needs_feedback": article.needs_human_feedback })))
}

pub async fn resume_article(
    Extension(state): Extension<HttpState>,
    Path(id): Path<String>,
) -> HttpResult<Json<Article>> {
    let article = state.orchestrator.resume(&id).await.into_http()?;
    Ok(Json(article))
}

pub async fn download_markdown(
    Extension(state): Extension<HttpState>,
    Path(id): Path<String>,
) -> HttpResult<Response> {
    let article = state.orchestrator.get(&id).await.into_http()?;
    let disposition = format!("attachment; filename=\"{}\"", export::file_name(&article));
    Ok((
        [
            (header::CONTENT_TYPE, "text/markdown; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        export::render_markdown(&article),
    )
        .into_response())
}
