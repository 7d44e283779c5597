//! Sliding-window rate limiter backed by Redis or process memory.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use fred::prelude::*;
use tracing::{debug, warn};

use crate::ratelimit::{
    LimitConfig, RateLimitConfig, RateLimitError, RateLimitResult, SCRIPT_ALLOWED, WEBHOOK_BUCKET,
};

/// Atomic sliding-window log over a sorted set of request timestamps.
///
/// KEYS[1] = bucket key
/// ARGV[1] = now (ms), ARGV[2] = window (ms), ARGV[3] = limit, ARGV[4] = member
///
/// Returns `{count, allowed, retry_after_ms}`.
const SLIDING_WINDOW_LUA: &str = r"
local now = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local limit = tonumber(ARGV[3])
redis.call('ZREMRANGEBYSCORE', KEYS[1], '-inf', now - window)
local count = redis.call('ZCARD', KEYS[1])
local allowed = 0
if count < limit then
    redis.call('ZADD', KEYS[1], now, ARGV[4])
    count = count + 1
    allowed = 1
end
redis.call('PEXPIRE', KEYS[1], window)
local retry = 0
if allowed == 0 then
    local oldest = redis.call('ZRANGE', KEYS[1], 0, 0, 'WITHSCORES')
    if oldest[2] then
        retry = tonumber(oldest[2]) + window - now
    end
end
return {count, allowed, retry}
";

/// In-memory windows are swept of idle clients every this many checks.
const MEMORY_SWEEP_INTERVAL: u64 = 1024;

/// Storage for request timestamps.
#[derive(Clone)]
enum Backend {
    /// Shared across instances
    Redis(Client),
    /// Per-process; bucket key -> request times (ms), oldest first
    Memory(Arc<DashMap<String, VecDeque<u64>>>),
}

/// Per-client rate limiter.
#[derive(Clone)]
pub struct RateLimiter {
    backend: Backend,
    config: Arc<RateLimitConfig>,
    seq: Arc<AtomicU64>,
}

impl RateLimiter {
    /// Limiter sharing its windows through Redis.
    pub fn redis(redis: Client, config: RateLimitConfig) -> Self {
        Self::with_backend(Backend::Redis(redis), config)
    }

    /// Limiter keeping its windows in process memory.
    pub fn in_memory(config: RateLimitConfig) -> Self {
        Self::with_backend(Backend::Memory(Arc::new(DashMap::new())), config)
    }

    fn with_backend(backend: Backend, config: RateLimitConfig) -> Self {
        Self {
            backend,
            config: Arc::new(config),
            seq: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Name of the backend, for logs and health output.
    pub fn backend_name(&self) -> &'static str {
        match self.backend {
            Backend::Redis(_) => "redis",
            Backend::Memory(_) => "memory",
        }
    }

    /// Returns the configuration for this rate limiter.
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Checks if the identifier is in the allowlist configuration.
    pub fn is_allowed_by_config(&self, identifier: &str) -> bool {
        self.config.allowlist.contains(identifier)
    }

    /// Count a webhook delivery from `identifier` against its window.
    ///
    /// # Errors
    /// Returns `RateLimitError::BackendUnavailable` if Redis is unreachable.
    #[tracing::instrument(skip(self))]
    pub async fn check(&self, identifier: &str) -> Result<RateLimitResult, RateLimitError> {
        self.check_at(identifier, now_ms()).await
    }

    /// [`RateLimiter::check`] against an explicit clock.
    pub async fn check_at(
        &self,
        identifier: &str,
        now_ms: u64,
    ) -> Result<RateLimitResult, RateLimitError> {
        if !self.config.enabled {
            return Ok(RateLimitResult::unlimited());
        }

        if self.is_allowed_by_config(identifier) {
            debug!(ip = %identifier, "IP in allowlist, bypassing rate limit");
            return Ok(RateLimitResult::unlimited());
        }

        let limit = self.config.webhook;
        let key = self.build_key(identifier);

        let (count, allowed, retry_ms) = match &self.backend {
            Backend::Redis(redis) => self.check_redis(redis, &key, limit, now_ms).await?,
            Backend::Memory(windows) => {
                if self.seq.fetch_add(1, Ordering::Relaxed) % MEMORY_SWEEP_INTERVAL == 0 {
                    sweep_memory(windows, limit, now_ms);
                }
                check_memory(windows, key, limit, now_ms)
            }
        };

        Ok(RateLimitResult {
            allowed,
            limit: limit.requests,
            remaining: if allowed {
                limit.requests.saturating_sub(count)
            } else {
                0
            },
            retry_after: if allowed { 0 } else { retry_ms.div_ceil(1000).max(1) },
        })
    }

    async fn check_redis(
        &self,
        redis: &Client,
        key: &str,
        limit: LimitConfig,
        now_ms: u64,
    ) -> Result<(u32, bool, u64), RateLimitError> {
        let member = format!(
            "{now_ms}-{}-{}",
            std::process::id(),
            self.seq.fetch_add(1, Ordering::Relaxed)
        );

        let result: Vec<i64> = redis
            .eval(
                SLIDING_WINDOW_LUA,
                vec![key],
                vec![
                    now_ms.to_string(),
                    limit.window_ms().to_string(),
                    limit.requests.to_string(),
                    member,
                ],
            )
            .await
            .map_err(|e| {
                warn!(error = %e, "Redis rate limit check failed");
                RateLimitError::BackendUnavailable
            })?;

        let [count, allowed, retry_ms] = result[..] else {
            warn!(?result, "Unexpected rate limit script result");
            return Err(RateLimitError::BackendUnavailable);
        };

        Ok((
            count.max(0) as u32,
            allowed == SCRIPT_ALLOWED,
            retry_ms.max(0) as u64,
        ))
    }

    /// Builds a bucket key with the configured prefix.
    fn build_key(&self, identifier: &str) -> String {
        format!(
            "{}:{WEBHOOK_BUCKET}:{identifier}",
            self.config.redis_key_prefix
        )
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("backend", &self.backend_name())
            .field("config", &self.config)
            .finish()
    }
}

fn now_ms() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or_default()
}

/// Drop clients whose newest request has left the window.
fn sweep_memory(windows: &DashMap<String, VecDeque<u64>>, limit: LimitConfig, now_ms: u64) {
    let cutoff = now_ms.saturating_sub(limit.window_ms());
    windows.retain(|_, log| log.back().is_some_and(|&t| t > cutoff));
}

/// In-process version of the sliding window script.
fn check_memory(
    windows: &DashMap<String, VecDeque<u64>>,
    key: String,
    limit: LimitConfig,
    now_ms: u64,
) -> (u32, bool, u64) {
    let window_ms = limit.window_ms();
    let mut log = windows.entry(key).or_default();

    let cutoff = now_ms.saturating_sub(window_ms);
    while log.front().is_some_and(|&t| t <= cutoff) {
        log.pop_front();
    }

    if log.len() < limit.requests as usize {
        log.push_back(now_ms);
        return (log.len() as u32, true, 0);
    }

    let retry_ms = log
        .front()
        .map_or(0, |&oldest| (oldest + window_ms).saturating_sub(now_ms));
    (log.len() as u32, false, retry_ms)
}
