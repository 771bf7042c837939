//! Error taxonomy for the ledger and its HTTP mapping.
//!
//! Chain tampering is deliberately absent here: it is only ever observed by
//! validation and surfaced as a [`crate::ledger::ChainReport`].

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Errors produced by the ledger core.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Unknown block index or record id.
    #[error("not found: {0}")]
    NotFound(String),

    /// Difficulty outside the range the nonce space can satisfy.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The chain tip moved between drain and append.
    #[error("stale tip: candidate built on {expected}, chain tip is {actual}")]
    StaleTip {
        /// Digest the candidate references.
        expected: String,
        /// Digest of the current tip.
        actual: String,
    },

    /// A background mining task failed to complete.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Errors returned by HTTP handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed or incomplete request body.
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Ledger(LedgerError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Ledger(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = serde_json::json!({
            "error": {
                "code": status.as_u16(),
                "message": self.to_string(),
            }
        });
        (status, axum::Json(body)).into_response()
    }
}
