//! Axum middleware for rate limiting.

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use tracing::{debug, warn};

use crate::api::AppState;
use crate::ratelimit::{extract_client_ip, normalize_ip, RateLimitError};

/// Middleware to rate limit requests by client IP address.
///
/// # Behavior
///
/// - If rate limiter is not configured (`state.rate_limiter` is `None`), requests pass through.
/// - If the backend is unavailable and `fail_open` is true, requests pass through with a warning.
/// - If the rate limit is exceeded, returns `429 Too Many Requests` with `Retry-After`.
/// - Without `ConnectInfo` (e.g. `oneshot` in tests) and no trusted proxy
///   header, the client is treated as localhost.
#[tracing::instrument(skip(state, request, next))]
pub async fn rate_limit_by_ip(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, RateLimitError> {
    let Some(ref rate_limiter) = state.rate_limiter else {
        return Ok(next.run(request).await);
    };

    let trust_proxy = rate_limiter.config().trust_proxy;
    let connect_info = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .cloned();
    let client_ip = extract_client_ip(request.headers(), connect_info.as_ref(), trust_proxy);
    let normalized_ip = normalize_ip(client_ip);

    debug!(ip = %normalized_ip, "Checking rate limit by IP");

    let result = match rate_limiter.check(&normalized_ip).await {
        Ok(result) => result,
        Err(RateLimitError::BackendUnavailable) if rate_limiter.config().fail_open => {
            warn!(
                ip = %normalized_ip,
                "Rate limiter unavailable, allowing request (fail_open=true)"
            );
            return Ok(next.run(request).await);
        }
        Err(e) => return Err(e),
    };

    if !result.allowed {
        warn!(
            ip = %normalized_ip,
            retry_after = result.retry_after,
            "Rate limit exceeded"
        );
        return Err(RateLimitError::LimitExceeded(result));
    }

    Ok(next.run(request).await)
}
