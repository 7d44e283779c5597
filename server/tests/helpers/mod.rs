//! Reusable test helpers for HTTP integration tests.
//!
//! Provides `TestApp` for sending requests through the full axum router with
//! a recording sender in place of the Graph API, plus signing and payload
//! builders.
//!
//! ## Background work
//!
//! Deliveries are acknowledged before their messages are processed. Call
//! [`TestApp::settle`] before asserting on sent replies.
//!
//! ## Test Servers
//!
//! Use [`spawn_test_server()`] when you need stateful middleware testing
//! (rate limiting) instead of `tower::ServiceExt::oneshot`.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use aurora_server::api::{create_router, AppState};
use aurora_server::config::Config;
use aurora_server::ratelimit::RateLimiter;
use aurora_server::reply::{MenuRouter, ReplyRouter};
use aurora_server::webhook::signing::{sign_payload, SIGNATURE_HEADER};
use aurora_server::webhook::{Dispatcher, ReplayGuard, SignatureVerifier};
use aurora_server::whatsapp::{MessageSender, SendError, SendReceipt};
use axum::body::Body;
use axum::http::{self, header, Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tower::ServiceExt;

/// Sender that records every reply instead of calling the Graph API.
#[derive(Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingSender {
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageSender for RecordingSender {
    async fn send_text(&self, to: &str, body: &str) -> Result<SendReceipt, SendError> {
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), body.to_string()));
        Ok(SendReceipt {
            message_id: Some(format!("wamid.test.{to}")),
        })
    }
}

/// Test application wrapping the full router.
pub struct TestApp {
    pub router: Router,
    pub config: Arc<Config>,
    pub dispatcher: Arc<Dispatcher>,
    pub sender: Arc<RecordingSender>,
}

impl TestApp {
    /// App with the test config and the menu router.
    pub fn new() -> Self {
        Self::build(Config::default_for_test(), Arc::new(MenuRouter), None)
    }

    /// App with a custom reply router.
    pub fn with_router(router: Arc<dyn ReplyRouter>) -> Self {
        Self::build(Config::default_for_test(), router, None)
    }

    /// App with a custom config.
    pub fn with_config(config: Config) -> Self {
        Self::build(config, Arc::new(MenuRouter), None)
    }

    pub fn build(
        config: Config,
        router: Arc<dyn ReplyRouter>,
        rate_limiter: Option<RateLimiter>,
    ) -> Self {
        let sender = Arc::new(RecordingSender::default());
        let dispatcher = Dispatcher::new(
            SignatureVerifier::new(config.app_secret.clone()),
            ReplayGuard::in_memory(config.dedup_capacity, config.replay_threshold_secs),
            router,
            Arc::clone(&sender) as Arc<dyn MessageSender>,
        );

        let state = AppState::new(config, dispatcher, rate_limiter);
        let config = Arc::clone(&state.config);
        let dispatcher = Arc::clone(&state.dispatcher);

        Self {
            router: create_router(state),
            config,
            dispatcher,
            sender,
        }
    }

    /// Build a request with the given method and URI.
    pub fn request(method: Method, uri: &str) -> http::request::Builder {
        Request::builder().method(method).uri(uri)
    }

    /// Send a request through the router.
    pub async fn oneshot(&self, request: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to execute request")
    }

    /// POST `body` to `/webhook`, signed with the configured secret.
    pub async fn deliver(&self, body: &Value) -> Response<Body> {
        let secret = self.config.app_secret.clone().unwrap_or_default();
        self.oneshot(signed_post("/webhook", &secret, &body.to_string()))
            .await
    }

    /// Wait for all background dispatch to finish.
    pub async fn settle(&self) {
        self.dispatcher.drain().await;
    }

    /// Replies sent so far.
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sender.sent()
    }
}

/// Signed JSON POST request.
pub fn signed_post(uri: &str, secret: &str, body: &str) -> Request<Body> {
    TestApp::request(Method::POST, uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header(SIGNATURE_HEADER, sign_payload(secret, body.as_bytes()))
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Current Unix time as the platform sends it.
pub fn now_ts() -> String {
    chrono::Utc::now().timestamp().to_string()
}

/// Text message object.
pub fn text_message(id: &str, from: &str, body: &str) -> Value {
    json!({
        "id": id,
        "from": from,
        "timestamp": now_ts(),
        "type": "text",
        "text": { "body": body }
    })
}

/// Notification with one entry and one `messages` change.
pub fn notification(messages: Vec<Value>) -> Value {
    json!({
        "object": "whatsapp_business_account",
        "entry": [{
            "id": "102290129340398",
            "changes": [{
                "field": "messages",
                "value": {
                    "messaging_product": "whatsapp",
                    "metadata": { "phone_number_id": "106540352242922" },
                    "messages": messages
                }
            }]
        }]
    })
}

/// Collect a response body as a string.
pub async fn body_string(response: Response<Body>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Collect a response body as JSON.
pub async fn body_json(response: Response<Body>) -> Value {
    serde_json::from_str(&body_string(response).await).unwrap()
}

// ============================================================================
// Test Server
// ============================================================================

/// A running HTTP server for stateful middleware tests.
pub struct TestServer {
    /// Server address (127.0.0.1:PORT).
    pub addr: SocketAddr,
    /// Base URL for HTTP requests (e.g., `http://127.0.0.1:12345`).
    pub url: String,
    /// Handle to the server task for cleanup.
    _handle: JoinHandle<()>,
}

/// Spawn a real HTTP server on a random port.
///
/// Use this instead of `oneshot` when testing stateful middleware behavior
/// (rate limiting) since the client address only exists on a real socket.
pub async fn spawn_test_server(router: Router) -> TestServer {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test server");
    let addr = listener.local_addr().expect("Failed to get local addr");
    let url = format!("http://{addr}");

    let handle = tokio::spawn(async move {
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .expect("Test server failed");
    });

    TestServer {
        addr,
        url,
        _handle: handle,
    }
}
