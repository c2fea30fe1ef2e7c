//! Gateway error types

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use mp3_gateway_lib::PipelineError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ApiError>;

/// Errors surfaced to HTTP clients. Every variant maps to a status code
/// and a JSON body of the form `{"detail": "..."}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Transcode exceeded its deadline")]
    DeadlineExceeded,

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ApiError {
    /// HTTP status code for this error
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            // Problems with the uploaded media are the client's to fix;
            // everything else in the pipeline is ours.
            ApiError::Pipeline(PipelineError::Open(_))
            | ApiError::Pipeline(PipelineError::NoAudioStream) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ApiError::Pipeline(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = %status, error = %self, "Request failed");
        } else {
            tracing::debug!(status = %status, error = %self, "Request rejected");
        }

        let body = Json(serde_json::json!({ "detail": self.to_string() }));
        (status, body).into_response()
    }
}
