//! WhatsApp Cloud API Outbound Messaging
//!
//! Delivers reply text to a recipient through the Graph API `/messages`
//! endpoint. Failures are reported to the caller and never retried here.

mod graph;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

use crate::config::Config;
use crate::util::mask_id;

pub use graph::GraphSender;

/// Outbound send errors.
#[derive(Debug, Error)]
pub enum SendError {
    /// Access token or phone number id missing.
    #[error("Outbound messaging is not configured")]
    NotConfigured,

    /// Transport-level failure (connect, timeout, TLS).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The platform answered with a non-2xx status.
    #[error("WhatsApp error {status}: {body}")]
    Platform { status: u16, body: String },
}

/// Accepted outbound message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SendReceipt {
    /// Platform id of the sent message, when returned
    pub message_id: Option<String>,
}

/// Sends a text reply to a recipient.
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send_text(&self, to: &str, body: &str) -> Result<SendReceipt, SendError>;
}

/// Sender used when no credentials are configured: logs and fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnconfiguredSender;

#[async_trait]
impl MessageSender for UnconfiguredSender {
    async fn send_text(&self, to: &str, _body: &str) -> Result<SendReceipt, SendError> {
        warn!(
            to = %mask_id(to),
            "Reply not sent: WHATSAPP_TOKEN / PHONE_NUMBER_ID not configured"
        );
        Err(SendError::NotConfigured)
    }
}

/// Build the sender for the given configuration.
pub fn sender_from_config(config: &Config) -> Result<Arc<dyn MessageSender>, SendError> {
    match (&config.whatsapp_token, &config.phone_number_id) {
        (Some(token), Some(phone_number_id)) => Ok(Arc::new(GraphSender::new(
            &config.graph_base_url,
            &config.api_version,
            phone_number_id,
            token,
            Duration::from_secs(config.send_timeout_secs),
        )?)),
        _ => Ok(Arc::new(UnconfiguredSender)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unconfigured_sender_fails() {
        let result = UnconfiguredSender.send_text("5511987654321", "hi").await;
        assert!(matches!(result, Err(SendError::NotConfigured)));
    }

    #[test]
    fn test_platform_error_message() {
        let err = SendError::Platform {
            status: 401,
            body: r#"{"error":{"code":190}}"#.into(),
        };
        assert_eq!(err.to_string(), r#"WhatsApp error 401: {"error":{"code":190}}"#);
    }

    #[test]
    fn test_sender_from_config() {
        let mut config = Config::default_for_test();
        assert!(sender_from_config(&config).is_ok());

        config.whatsapp_token = Some("token".into());
        config.phone_number_id = Some("123".into());
        assert!(sender_from_config(&config).is_ok());
    }
}
