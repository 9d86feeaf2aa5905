//! Error types for the webhook ingress.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Errors that reject an inbound webhook delivery.
///
/// Each maps to one HTTP status code; none of them touch queue state.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// The X-Hub-Signature-256 header is missing.
    #[error("missing signature header")]
    MissingSignature,

    /// The signature header has an invalid format.
    #[error("invalid signature format: {0}")]
    InvalidSignatureFormat(String),

    /// The signature is invalid (HMAC verification failed).
    #[error("invalid signature")]
    InvalidSignature,

    /// The request payload could not be parsed or targets another repository.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// The commenter may not issue queue commands.
    #[error("user {0} is not authorized")]
    Unauthorized(String),

    /// The queue is at capacity.
    #[error("merge queue is full (capacity {0})")]
    QueueFull(usize),

    /// The queue no longer admits requests (shutting down).
    #[error("merge queue is closed")]
    QueueClosed,

    /// Internal error (should not occur in normal operation).
    #[error("internal error: {0}")]
    Internal(String),
}

impl WebhookError {
    /// Returns the HTTP status code for this error.
    ///
    /// - Missing/Invalid signature: 401 Unauthorized
    /// - Invalid payload: 400 Bad Request
    /// - Unauthorized commenter: 403 Forbidden
    /// - Queue full or closed: 503 Service Unavailable
    /// - Internal: 500 Internal Server Error
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingSignature | Self::InvalidSignature | Self::InvalidSignatureFormat(_) => {
                StatusCode::UNAUTHORIZED
            }
            Self::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::FORBIDDEN,
            Self::QueueFull(_) | Self::QueueClosed => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable name used in response bodies.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::MissingSignature | Self::InvalidSignatureFormat(_) | Self::InvalidSignature => {
                "invalid_signature"
            }
            Self::InvalidPayload(_) => "malformed",
            Self::Unauthorized(_) => "unauthorized",
            Self::QueueFull(_) => "queue_full",
            Self::QueueClosed => "queue_closed",
            Self::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        // Bodies carry only the error kind; details stay in the logs.
        let body = serde_json::json!({ "outcome": self.kind() });
        (self.status_code(), axum::Json(body)).into_response()
    }
}
