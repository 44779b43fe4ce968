//! HTTP API over the workflow orchestrator.

mod error;
mod routes;

pub use error::{HttpError, HttpResult, IntoHttpResult};

use std::net::SocketAddr;

use axum::{
    Extension, Router,
    http::{HeaderValue, Method, header::InvalidHeaderValue},
    routing::{get, post},
};
use tokio::{net::TcpListener, signal};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::orchestrator::WorkflowOrchestrator;

#[derive(Clone)]
pub struct HttpState {
    pub orchestrator: WorkflowOrchestrator,
    /// Iteration budget for generate requests that omit `max_iterations`.
    pub default_max_iterations: u32,
}

/// CORS policy allowing exactly `origins`.
pub fn cors_layer(origins: &[String]) -> Result<CorsLayer, InvalidHeaderValue> {
    let origins = origins
        .iter()
        .map(|o| HeaderValue::from_str(o))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(tower_http::cors::Any))
}

pub fn build_router(state: HttpState, cors: CorsLayer) -> Router {
    Router::new()
        .route("/", get(routes::root))
        .route("/generate-article", post(routes::generate_article))
        .route("/articles", get(routes::list_articles))
        .route(
            "/articles/{id}",
            get(routes::get_article).delete(routes::delete_article),
        )
        .route(
            "/articles/{id}/human-feedback",
            post(routes::submit_human_feedback),
        )
        .route("/articles/{id}/needs-feedback", get(routes::needs_feedback))
        .route("/articles/{id}/resume", post(routes::resume_article))
        .route("/articles/{id}/markdown", get(routes::download_markdown))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(Extension(state))
}

/// Serve `router` on `addr` until Ctrl+C or SIGTERM.
pub async fn serve(addr: SocketAddr, router: Router) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode, header};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;
    use crate::error::{RevisionError, RevisionResult};
    use crate::generation::{Evaluation, GenerationService, PriorFeedback};
    use crate::orchestrator::WorkflowSettings;
    use crate::store::RevisionStore;

    /// Returns scripted scores in order; `None` makes generate fail.
    struct ScoreQueue(Mutex<VecDeque<Option<u8>>>);

    impl ScoreQueue {
        fn new(scores: &[Option<u8>]) -> Self {
            Self(Mutex::new(scores.iter().copied().collect()))
        }
    }

    #[async_trait]
    impl GenerationService for ScoreQueue {
        async fn generate(&self, topic: &str, prior: Option<&PriorFeedback>) -> RevisionResult<String> {
            if self.0.lock().unwrap().front() == Some(&None) {
                self.0.lock().unwrap().pop_front();
                return Err(RevisionError::Generation("upstream unavailable".into()));
            }
            Ok(match prior {
                Some(_) => format!("revised draft about {topic}"),
                None => format!("draft about {topic}"),
            })
        }

        async fn evaluate(&self, _text: &str) -> RevisionResult<Evaluation> {
            let score = self.0.lock().unwrap().pop_front().flatten().unwrap_or(0);
            Ok(Evaluation {
                score,
                feedback: format!("scored {score}"),
            })
        }
    }

    fn app(scores: &[Option<u8>]) -> Router {
        let orchestrator = WorkflowOrchestrator::new(
            Arc::new(RevisionStore::in_memory()),
            Arc::new(ScoreQueue::new(scores)),
            WorkflowSettings::default(),
        );
        let state = HttpState {
            orchestrator,
            default_max_iterations: 3,
        };
        let cors = cors_layer(&["http://localhost:3000".to_string()]).unwrap();
        build_router(state, cors)
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let (status, bytes) = send_raw(app, method, uri, body).await;
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    async fn send_raw(
        app: &Router,
        method: &str,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Vec<u8>) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, bytes.to_vec())
    }

    #[tokio::test]
    async fn root_greets() {
        let (status, body) = send(&app(&[]), "GET", "/", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["message"].is_string());
    }

    #[tokio::test]
    async fn generate_runs_to_approval_and_lists() {
        let app = app(&[Some(9)]);
        let (status, article) = send(
            &app,
            "POST",
            "/generate-article",
            Some(json!({ "topic": "Tokio internals" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(article["evaluation"], "approved");
        assert_eq!(article["max_iteration"], 3);
        assert_eq!(article["final_article"], "draft about Tokio internals");

        let (status, list) = send(&app, "GET", "/articles", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list["articles"].as_array().unwrap().len(), 1);
        assert_eq!(list["articles"][0]["id"], article["id"]);
    }

    #[tokio::test]
    async fn empty_topic_is_bad_request() {
        let (status, body) = send(
            &app(&[]),
            "POST",
            "/generate-article",
            Some(json!({ "topic": "   ", "max_iterations": 2 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Bad Request");
        assert_eq!(body["retryable"], false);
    }

    #[tokio::test]
    async fn unknown_article_is_not_found() {
        let app = app(&[]);
        for (method, uri) in [
            ("GET", "/articles/missing"),
            ("DELETE", "/articles/missing"),
            ("GET", "/articles/missing/needs-feedback"),
            ("GET", "/articles/missing/markdown"),
        ] {
            let (status, _) = send(&app, method, uri, None).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{method} {uri}");
        }
    }

    #[tokio::test]
    async fn human_feedback_round_trip() {
        let app = app(&[Some(4), Some(9)]);
        let (_, article) = send(
            &app,
            "POST",
            "/generate-article",
            Some(json!({ "topic": "Lifetimes", "max_iterations": 3 })),
        )
        .await;
        let id = article["id"].as_str().unwrap().to_string();
        assert_eq!(article["state"], "awaiting_human_feedback");

        let (status, body) = send(&app, "GET", &format!("/articles/{id}/needs-feedback"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["needs_feedback"], true);

        let (status, article) = send(
            &app,
            "POST",
            &format!("/articles/{id}/human-feedback"),
            Some(json!({ "feedback": "add diagrams" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(article["evaluation"], "approved");
        assert_eq!(article["iteration"], 2);
        assert_eq!(article["human_feedback_history"], json!(["add diagrams"]));

        // Approved articles are frozen.
        let (status, body) = send(
            &app,
            "POST",
            &format!("/articles/{id}/human-feedback"),
            Some(json!({ "feedback": "one more pass" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["retryable"], false);
    }

    #[tokio::test]
    async fn upstream_failure_is_bad_gateway_then_resumable() {
        let app = app(&[None, Some(10)]);
        let (status, body) = send(
            &app,
            "POST",
            "/generate-article",
            Some(json!({ "topic": "Pinning" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["retryable"], true);
        let id = body["article_id"].as_str().unwrap().to_string();

        let (_, stored) = send(&app, "GET", &format!("/articles/{id}"), None).await;
        assert_eq!(stored["state"], "created");

        let (status, article) = send(&app, "POST", &format!("/articles/{id}/resume"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(article["evaluation"], "approved");
    }

    #[tokio::test]
    async fn markdown_download_and_delete() {
        let app = app(&[Some(9)]);
        let (_, article) = send(
            &app,
            "POST",
            "/generate-article",
            Some(json!({ "topic": "Error handling" })),
        )
        .await;
        let id = article["id"].as_str().unwrap().to_string();

        let request = Request::builder()
            .uri(format!("/articles/{id}/markdown"))
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"Error_handling.md\""
        );
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.starts_with("# Error handling\n\ndraft about Error handling"));

        let (status, body) = send(&app, "DELETE", &format!("/articles/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Article deleted successfully");
        let (status, _) = send(&app, "GET", &format!("/articles/{id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn markdown_download_for_multi_line_topic() {
        let app = app(&[Some(9)]);
        let (status, article) = send(
            &app,
            "POST",
            "/generate-article",
            Some(json!({ "topic": "Rust\nin production" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let id = article["id"].as_str().unwrap().to_string();

        let request = Request::builder()
            .uri(format!("/articles/{id}/markdown"))
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"Rust-in_production.md\""
        );
    }

    #[tokio::test]
    async fn client_errors_carry_no_article_id() {
        let (status, body) = send(&app(&[]), "GET", "/articles/missing", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body.get("article_id").is_none());
    }

    #[test]
    fn cors_rejects_malformed_origin() {
        assert!(cors_layer(&["http://ok.example".to_string()]).is_ok());
        assert!(cors_layer(&["bad\norigin".to_string()]).is_err());
    }
}
