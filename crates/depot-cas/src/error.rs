use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::{error, warn};

/// Handler-level errors, mapped onto HTTP statuses.
///
/// Messages never reach the client; bodies carry only the canonical reason
/// phrase. The detail is for the log.
#[derive(Debug, Error)]
pub enum CasError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("not found")]
    NotFound,

    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for CasError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        match &self {
            Self::BadRequest(msg) => warn!(reason = %msg, "rejecting request"),
            Self::NotFound => {}
            Self::Internal(msg) => error!(reason = %msg, "request failed"),
        }

        let reason = status.canonical_reason().unwrap_or("Error");
        (status, reason).into_response()
    }
}
