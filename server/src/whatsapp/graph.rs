//! Graph API sender.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{MessageSender, SendError, SendReceipt};
use crate::util::mask_id;

/// Body of a text message send request.
#[derive(Debug, Serialize)]
struct TextMessageRequest<'a> {
    messaging_product: &'static str,
    recipient_type: &'static str,
    to: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    text: TextBody<'a>,
}

#[derive(Debug, Serialize)]
struct TextBody<'a> {
    preview_url: bool,
    body: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct SendResponse {
    #[serde(default)]
    messages: Vec<SentMessage>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    id: String,
}

/// Sends replies through `POST {base}/{version}/{phone_number_id}/messages`.
#[derive(Clone)]
pub struct GraphSender {
    client: reqwest::Client,
    url: String,
    token: String,
}

impl GraphSender {
    pub fn new(
        base_url: &str,
        api_version: &str,
        phone_number_id: &str,
        token: &str,
        timeout: Duration,
    ) -> Result<Self, SendError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: format!(
                "{}/{api_version}/{phone_number_id}/messages",
                base_url.trim_end_matches('/')
            ),
            token: token.to_string(),
        })
    }

    /// Endpoint messages are posted to.
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl std::fmt::Debug for GraphSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphSender").field("url", &self.url).finish()
    }
}

#[async_trait]
impl MessageSender for GraphSender {
    async fn send_text(&self, to: &str, body: &str) -> Result<SendReceipt, SendError> {
        let request = TextMessageRequest {
            messaging_product: "whatsapp",
            recipient_type: "individual",
            to,
            kind: "text",
            text: TextBody {
                preview_url: false,
                body,
            },
        };

        let resp = self
            .client
            .post(&self.url)
            .bearer_auth(&self.token)
            .json(&request)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            warn!(
                to = %mask_id(to),
                status = status.as_u16(),
                "WhatsApp rejected outbound message"
            );
            return Err(SendError::Platform {
                status: status.as_u16(),
                body: detail,
            });
        }

        // A 2xx with an unexpected body still counts as sent
        let parsed: SendResponse = resp.json().await.unwrap_or_default();
        let message_id = parsed.messages.into_iter().next().map(|m| m.id);
        debug!(to = %mask_id(to), message_id = ?message_id, "Reply sent");

        Ok(SendReceipt { message_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sender(server: &MockServer) -> GraphSender {
        GraphSender::new(
            &format!("{}/", server.uri()),
            "v21.0",
            "123456",
            "test-token",
            Duration::from_secs(2),
        )
        .unwrap()
    }

    #[test]
    fn test_url_building() {
        let sender = GraphSender::new(
            "https://graph.facebook.com/",
            "v20.0",
            "999",
            "t",
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(sender.url(), "https://graph.facebook.com/v20.0/999/messages");
        assert!(!format!("{sender:?}").contains("\"t\""));
    }

    #[tokio::test]
    async fn test_send_text_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v21.0/123456/messages"))
            .and(header("authorization", "Bearer test-token"))
            .and(body_json(json!({
                "messaging_product": "whatsapp",
                "recipient_type": "individual",
                "to": "5511987654321",
                "type": "text",
                "text": { "preview_url": false, "body": "Olá!" }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "messaging_product": "whatsapp",
                "contacts": [{ "input": "5511987654321", "wa_id": "5511987654321" }],
                "messages": [{ "id": "wamid.OUT1" }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let receipt = sender(&server)
            .send_text("5511987654321", "Olá!")
            .await
            .unwrap();
        assert_eq!(receipt.message_id.as_deref(), Some("wamid.OUT1"));
    }

    #[tokio::test]
    async fn test_send_text_platform_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_string(r#"{"error":{"message":"Invalid parameter","code":100}}"#),
            )
            .mount(&server)
            .await;

        let err = sender(&server).send_text("555", "hi").await.unwrap_err();
        match err {
            SendError::Platform { status, body } => {
                assert_eq!(status, 400);
                assert!(body.contains("Invalid parameter"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_send_text_unexpected_success_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let receipt = sender(&server).send_text("555", "hi").await.unwrap();
        assert_eq!(receipt, SendReceipt::default());
    }

    #[tokio::test]
    async fn test_send_text_transport_error() {
        // Nothing listens on the discard port
        let sender = GraphSender::new(
            "http://127.0.0.1:9",
            "v21.0",
            "1",
            "t",
            Duration::from_secs(1),
        )
        .unwrap();
        let err = sender.send_text("555", "hi").await.unwrap_err();
        assert!(matches!(err, SendError::Http(_)));
    }
}
