//! Webhook Error Types

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::whatsapp::SendError;

/// Errors surfaced to the platform as HTTP responses.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// Signature header missing or wrong while a secret is configured.
    #[error("Invalid or missing signature")]
    InvalidSignature,

    /// Body is not valid JSON.
    #[error("Malformed payload: {0}")]
    MalformedPayload(#[from] serde_json::Error),

    /// POST without a JSON content type.
    #[error("Content-Type must be application/json")]
    UnsupportedMediaType,
}

/// Error response body for JSON responses.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Machine-readable error code.
    pub error: String,
    /// Human-readable error message.
    pub message: String,
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            Self::InvalidSignature => (StatusCode::UNAUTHORIZED, "INVALID_SIGNATURE"),
            Self::MalformedPayload(_) => (StatusCode::BAD_REQUEST, "INVALID_JSON"),
            Self::UnsupportedMediaType => (StatusCode::BAD_REQUEST, "INVALID_CONTENT_TYPE"),
        };

        let body = Json(ErrorResponse {
            error: code.to_string(),
            message: self.to_string(),
        });

        (status, body).into_response()
    }
}

/// Failure while processing a single message record. Logged, never returned
/// to the platform.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("Send failed: {0}")]
    Send(#[from] SendError),

    #[error("Record task panicked: {0}")]
    Panicked(String),
}
