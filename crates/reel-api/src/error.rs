//! API error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use reel_pipeline::{ErrorKind, PipelineError};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Rate limit exceeded. Please try again later.")]
    RateLimited,

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Pipeline(e) => match e.kind() {
                ErrorKind::Validation => StatusCode::BAD_REQUEST,
                ErrorKind::Fetch | ErrorKind::Upload => StatusCode::BAD_GATEWAY,
                ErrorKind::ToolUnavailable => StatusCode::SERVICE_UNAVAILABLE,
                ErrorKind::Probe | ErrorKind::Transcode | ErrorKind::Cancelled | ErrorKind::Internal => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }

    fn is_internal(&self) -> bool {
        match self {
            ApiError::Internal(_) => true,
            ApiError::Pipeline(e) => e.kind() == ErrorKind::Internal,
            _ => false,
        }
    }
}

/// Error envelope.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub status: &'static str,
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            error!(status = %status, error = %self, "Request failed");
        }

        // Don't expose internal error details in production
        let message = if self.is_internal() && std::env::var("ENVIRONMENT").unwrap_or_default() == "production" {
            "An internal error occurred".to_string()
        } else {
            self.to_string()
        };

        let body = ErrorResponse {
            status: "error",
            message,
        };

        let mut response = (status, Json(body)).into_response();
        if matches!(self, ApiError::RateLimited) {
            response
                .headers_mut()
                .insert("retry-after", axum::http::HeaderValue::from_static("1"));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reel_media::MediaError;
    use reel_storage::StorageError;

    fn status_of(err: impl Into<PipelineError>) -> StatusCode {
        ApiError::from(err.into()).status_code()
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_of(PipelineError::validation("x")), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(MediaError::fetch_failed("u", "HTTP 404")), StatusCode::BAD_GATEWAY);
        assert_eq!(status_of(StorageError::upload_failed("x")), StatusCode::BAD_GATEWAY);
        assert_eq!(
            status_of(MediaError::tool_unavailable("ffmpeg", "missing")),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_of(MediaError::transcode_failed("render", Some(1), "")),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(ApiError::RateLimited.status_code(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_envelope_shape() {
        let response = ApiError::bad_request("No video source provided").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["message"], "No video source provided");
    }
}
