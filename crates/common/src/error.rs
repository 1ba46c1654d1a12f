//! Common error types shared across crates.

use thiserror::Error;

/// Top-level service error type.
///
/// Variants map to HTTP status codes returned to callers:
/// - [`ServiceError::BadRequest`] → 400
/// - [`ServiceError::TypeMismatch`] → 400
/// - [`ServiceError::Forbidden`] → 403
/// - [`ServiceError::NotFound`] → 404
/// - [`ServiceError::Timeout`] → 408
/// - [`ServiceError::RateLimited`] → 429
/// - [`ServiceError::Store`] → 500
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The request was malformed: invalid JSON, bad identity, empty batch.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// A partial-update value cannot be converted to the target attribute's type.
    #[error("type mismatch for `{key}`: expected {expected}")]
    TypeMismatch {
        /// Payload key that failed conversion.
        key: String,
        /// Human-readable name of the expected value kind.
        expected: &'static str,
    },

    /// The request's origin is not on the allow-list.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// No record matched, or a required-match delete affected zero rows.
    #[error("not found: {0}")]
    NotFound(String),

    /// The request did not complete before its deadline.
    #[error("timed out: {0}")]
    Timeout(String),

    /// The client exceeded its request ceiling for the current window.
    #[error("rate limited")]
    RateLimited,

    /// Connection, statement, or transaction failure. The detail is for logs only.
    #[error("store error: {0}")]
    Store(String),
}

impl ServiceError {
    /// Returns the HTTP status code that should be sent for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            ServiceError::BadRequest(_) | ServiceError::TypeMismatch { .. } => 400,
            ServiceError::Forbidden(_) => 403,
            ServiceError::NotFound(_) => 404,
            ServiceError::Timeout(_) => 408,
            ServiceError::RateLimited => 429,
            ServiceError::Store(_) => 500,
        }
    }

    /// Short machine-readable code used in [`crate::protocol::ErrorResponse`].
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::BadRequest(_) => "bad_request",
            ServiceError::TypeMismatch { .. } => "type_mismatch",
            ServiceError::Forbidden(_) => "forbidden",
            ServiceError::NotFound(_) => "not_found",
            ServiceError::Timeout(_) => "timeout",
            ServiceError::RateLimited => "rate_limited",
            ServiceError::Store(_) => "internal_error",
        }
    }

    /// Message that is safe to send to the caller.
    ///
    /// Store failures are replaced with a generic message; everything else is
    /// already phrased for clients.
    pub fn public_message(&self) -> String {
        match self {
            ServiceError::Store(_) => "internal storage error".to_owned(),
            other => other.to_string(),
        }
    }
}
