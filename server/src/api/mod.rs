//! API Router and Application State
//!
//! Central routing configuration and shared state.

use std::sync::Arc;

use axum::{extract::DefaultBodyLimit, extract::State, routing::get, Json, Router};
use serde::Serialize;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::{config::Config, ratelimit::RateLimiter, webhook, webhook::Dispatcher};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration
    pub config: Arc<Config>,
    /// Webhook pipeline
    pub dispatcher: Arc<Dispatcher>,
    /// Rate limiter (optional)
    pub rate_limiter: Option<RateLimiter>,
}

impl AppState {
    /// Create new application state.
    #[must_use]
    pub fn new(config: Config, dispatcher: Dispatcher, rate_limiter: Option<RateLimiter>) -> Self {
        Self {
            config: Arc::new(config),
            dispatcher: Arc::new(dispatcher),
            rate_limiter,
        }
    }
}

/// Create the main application router.
pub fn create_router(state: AppState) -> Router {
    let max_body_size = state.config.max_body_size;

    Router::new()
        // Health check
        .route("/health", get(health_check))
        // Webhook, under both paths the platform may be pointed at
        .nest("/webhook", webhook::router(state.clone()))
        .nest("/api/webhook", webhook::router(state.clone()))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(DefaultBodyLimit::max(max_body_size))
        // State
        .with_state(state)
}

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    /// Service status
    status: &'static str,
    /// Whether `X-Hub-Signature-256` is checked
    signature_enforced: bool,
    /// Whether rate limiting is enabled
    rate_limiting: bool,
    /// Whether outbound replies can be sent
    sender_configured: bool,
}

/// Health check endpoint.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        signature_enforced: state.dispatcher.verifier().is_enforced(),
        rate_limiting: state
            .rate_limiter
            .as_ref()
            .is_some_and(|limiter| limiter.config().enabled),
        sender_configured: state.config.has_send_credentials(),
    })
}
