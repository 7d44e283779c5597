//! Rate limiting configuration.

use std::collections::HashSet;

/// Configuration for the rate limiting system.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Whether rate limiting is enabled
    pub enabled: bool,
    /// Prefix for Redis keys (e.g., "aurora:rl")
    pub redis_key_prefix: String,
    /// Whether to allow requests when the backend is unavailable
    pub fail_open: bool,
    /// Whether to trust X-Forwarded-For / X-Real-IP headers
    pub trust_proxy: bool,
    /// Normalized IPs that bypass rate limiting
    pub allowlist: HashSet<String>,
    /// Limit applied to webhook deliveries
    pub webhook: LimitConfig,
}

/// Sliding-window limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitConfig {
    /// Maximum requests allowed in the window
    pub requests: u32,
    /// Window duration in seconds
    pub window_secs: u64,
}

impl LimitConfig {
    pub const fn window_ms(&self) -> u64 {
        self.window_secs.saturating_mul(1000)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            redis_key_prefix: "aurora:rl".to_string(),
            fail_open: true,
            // Deployed behind a proxy; the peer address is the proxy itself
            trust_proxy: true,
            allowlist: HashSet::new(),
            webhook: LimitConfig {
                requests: 25,
                window_secs: 5,
            },
        }
    }
}

impl RateLimitConfig {
    /// Creates configuration from environment variables.
    ///
    /// Environment variables:
    /// - `RATE_LIMIT_ENABLED`: Enable/disable rate limiting (default: true)
    /// - `RATE_LIMIT_PREFIX`: Redis key prefix (default: "aurora:rl")
    /// - `RATE_LIMIT_FAIL_OPEN`: Allow requests when the backend is unavailable (default: true)
    /// - `RATE_LIMIT_TRUST_PROXY`: Trust X-Forwarded-For headers (default: true)
    /// - `RATE_LIMIT_ALLOWLIST`: Comma-separated IP allowlist
    /// - `RATE_LIMIT_WEBHOOK`: Webhook limit as "requests,window_secs" (default: "25,5")
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("RATE_LIMIT_ENABLED") {
            config.enabled = val.trim().parse().unwrap_or(true);
        }
        if let Ok(val) = std::env::var("RATE_LIMIT_PREFIX") {
            if !val.trim().is_empty() {
                config.redis_key_prefix = val.trim().to_string();
            }
        }
        if let Ok(val) = std::env::var("RATE_LIMIT_FAIL_OPEN") {
            config.fail_open = val.trim().parse().unwrap_or(true);
        }
        if let Ok(val) = std::env::var("RATE_LIMIT_TRUST_PROXY") {
            config.trust_proxy = val.trim().parse().unwrap_or(true);
        }
        if let Ok(val) = std::env::var("RATE_LIMIT_ALLOWLIST") {
            config.allowlist = val
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(limit) = std::env::var("RATE_LIMIT_WEBHOOK")
            .ok()
            .as_deref()
            .and_then(parse_limit_config)
        {
            config.webhook = limit;
        }

        config
    }
}

/// Parses a limit from "requests,window_secs". Zero values are rejected.
fn parse_limit_config(val: &str) -> Option<LimitConfig> {
    let (requests, window_secs) = val.split_once(',')?;
    let requests: u32 = requests.trim().parse().ok()?;
    let window_secs: u64 = window_secs.trim().parse().ok()?;
    (requests > 0 && window_secs > 0).then_some(LimitConfig {
        requests,
        window_secs,
    })
}
