//! Errors surfaced to HTTP clients of the host.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use shellcache_core::Error;

#[derive(Debug, thiserror::Error)]
pub enum HostError {
    /// The incoming request could not be turned into a worker request.
    #[error("INVALID_REQUEST: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Worker(#[from] Error),
}

impl HostError {
    pub fn status(&self) -> StatusCode {
        match self {
            HostError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            HostError::Worker(e) if e.is_fetch_failure() => StatusCode::BAD_GATEWAY,
            HostError::Worker(Error::InvalidMessage(_) | Error::InvalidUrl(_)) => StatusCode::BAD_REQUEST,
            HostError::Worker(Error::InvalidState(_)) => StatusCode::CONFLICT,
            HostError::Worker(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for HostError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!("request failed: {}", self);
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}
