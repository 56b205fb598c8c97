//! Server error types with HTTP status code mapping

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;
use tilelog_engine::EngineError;

/// Result type alias for server operations
pub type Result<T> = std::result::Result<T, ServerError>;

/// Seconds suggested to clients turned away by an overloaded queue.
const RETRY_AFTER_SECS: &str = "1";

/// Server error type wrapping engine errors and request-level failures
#[derive(Error, Debug)]
pub enum ServerError {
    /// Engine-level error
    #[error("{0}")]
    Engine(#[from] EngineError),

    /// Malformed request
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Resource absent (404)
    #[error("{0}")]
    NotFound(String),
}

impl ServerError {
    /// Create a bad request error
    pub fn bad_request(msg: impl Into<String>) -> Self {
        ServerError::BadRequest(msg.into())
    }

    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        ServerError::NotFound(msg.into())
    }

    /// Map error to HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 - client errors are never retried
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::Engine(EngineError::InvalidEntry(_)) => StatusCode::BAD_REQUEST,

            // 404
            ServerError::NotFound(_) => StatusCode::NOT_FOUND,
            ServerError::Engine(EngineError::NotFound(_)) => StatusCode::NOT_FOUND,

            // 503 - back off and resubmit
            ServerError::Engine(EngineError::Overloaded) => StatusCode::SERVICE_UNAVAILABLE,

            // 500 - everything else
            ServerError::Engine(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// JSON error response body
#[derive(Serialize)]
pub struct ErrorResponse {
    /// Error message
    pub error: String,
    /// HTTP status code
    pub status: u16,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: self.to_string(),
            status: status.as_u16(),
        };
        let json = serde_json::to_string(&body)
            .unwrap_or_else(|_| format!(r#"{{"error":"{self}","status":{}}}"#, status.as_u16()));

        let mut response = (
            status,
            [(header::CONTENT_TYPE, "application/json")],
            json,
        )
            .into_response();
        if status == StatusCode::SERVICE_UNAVAILABLE {
            response.headers_mut().insert(
                header::RETRY_AFTER,
                RETRY_AFTER_SECS.parse().expect("static header value"),
            );
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ServerError::bad_request("nope").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServerError::from(EngineError::Overloaded).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ServerError::from(EngineError::not_found("tile")).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServerError::from(EngineError::storage("boom")).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_overload_response_carries_retry_after() {
        let response = ServerError::from(EngineError::Overloaded).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "1");
    }
}
