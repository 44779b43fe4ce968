use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::error::{RevisionError, RevisionResult};

#[derive(Debug)]
pub struct HttpError {
    status: StatusCode,
    message: String,
    retryable: bool,
    article_id: Option<String>,
}

fn status_for(err: &RevisionError) -> StatusCode {
    match err {
        RevisionError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        RevisionError::NotFound(_) => StatusCode::NOT_FOUND,
        RevisionError::TerminalStateViolation { .. }
        | RevisionError::InvalidTransition { .. }
        | RevisionError::ConcurrentModification(_) => StatusCode::CONFLICT,
        RevisionError::Generation(_) | RevisionError::Evaluation(_) => StatusCode::BAD_GATEWAY,
        RevisionError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        RevisionError::InvariantViolation(_) | RevisionError::Storage(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        RevisionError::Interrupted { source, .. } => status_for(source),
    }
}

impl HttpError {
    pub fn from_error(err: RevisionError) -> Self {
        let status = status_for(&err);
        if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), error = %err, "request failed");
        }
        Self {
            status,
            retryable: err.is_retryable(),
            article_id: err.article_id().map(str::to_string),
            message: err.to_string(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let payload = ErrorBody {
            error: self
                .status
                .canonical_reason()
                .unwrap_or("error")
                .to_string(),
            message: self.message,
            retryable: self.retryable,
            article_id: self.article_id,
        };
        (self.status, Json(payload)).into_response()
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    message: String,
    retryable: bool,
    /// Set when a failed request left an article behind that can be resumed.
    #[serde(skip_serializing_if = "Option::is_none")]
    article_id: Option<String>,
}

pub type HttpResult<T> = Result<T, HttpError>;

pub trait IntoHttpResult<T> {
    fn into_http(self) -> HttpResult<T>;
}

impl<T> IntoHttpResult<T> for RevisionResult<T> {
    fn into_http(self) -> HttpResult<T> {
        self.map_err(HttpError::from_error)
    }
}
