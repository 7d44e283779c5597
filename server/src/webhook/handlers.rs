//! Webhook HTTP Handlers
//!
//! `GET` answers the subscription handshake, `POST` receives event
//! deliveries.

use bytes::Bytes;
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::dispatch::Acceptance;
use super::error::WebhookError;
use super::signing::{verify_token_matches, SIGNATURE_HEADER};
use crate::api::AppState;
use crate::ratelimit::rate_limit_by_ip;

/// Acknowledgement body for accepted deliveries.
pub const ACK_BODY: &str = "EVENT_RECEIVED";

/// Handshake query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct HandshakeQuery {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

/// Webhook routes, mounted by the API router. Deliveries are rate limited
/// per client IP; the handshake is not.
pub fn router(state: AppState) -> Router<AppState> {
    let deliveries = post(receive_event).route_layer(from_fn_with_state(state, rate_limit_by_ip));

    Router::new().route("/", get(verify_subscription).merge(deliveries))
}

/// GET /webhook
///
/// Echoes `hub.challenge` when the mode is `subscribe` and the token
/// matches the configured one; 403 otherwise.
pub async fn verify_subscription(
    State(state): State<AppState>,
    Query(query): Query<HandshakeQuery>,
) -> Response {
    let token_ok = verify_token_matches(
        state.config.verify_token.as_deref(),
        query.verify_token.as_deref(),
    );

    match (query.mode.as_deref(), query.challenge) {
        (Some("subscribe"), Some(challenge)) if token_ok => {
            info!("Webhook subscription verified");
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                challenge,
            )
                .into_response()
        }
        (mode, _) => {
            warn!(mode = ?mode, token_ok, "Webhook subscription verification failed");
            StatusCode::FORBIDDEN.into_response()
        }
    }
}

/// POST /webhook
///
/// Acknowledges as soon as the body is authenticated and decoded; message
/// processing continues in the background.
#[tracing::instrument(skip_all, fields(body_len = body.len()))]
pub async fn receive_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, &'static str), WebhookError> {
    if !is_json(&headers) {
        return Err(WebhookError::UnsupportedMediaType);
    }

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    match state.dispatcher.accept(&body, signature)? {
        Acceptance::Ignored { .. } => {}
        Acceptance::Accepted(batch) if batch.is_empty() => {
            debug!("Delivery carried no records");
        }
        Acceptance::Accepted(batch) => {
            // Detached: the platform only cares about the acknowledgement
            drop(state.dispatcher.spawn(batch));
        }
    }

    Ok((StatusCode::OK, ACK_BODY))
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.to_ascii_lowercase().contains("application/json"))
}
