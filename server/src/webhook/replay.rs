//! Replay Protection
//!
//! Drops redelivered messages (same platform message id) and messages whose
//! origin timestamp is older than the staleness threshold.
//!
//! Dedup is best-effort: the in-memory store is process-local and forgets
//! everything when it reaches capacity, and the Redis store only spans the
//! instances sharing that Redis. Platform retries arrive within minutes,
//! well inside both retention windows.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use fred::prelude::*;
use fred::types::{Expiration, SetOptions};
use thiserror::Error;
use tracing::{debug, warn};

/// Default ceiling for the in-memory dedup set.
pub const DEFAULT_DEDUP_CAPACITY: usize = 10_000;

/// Default staleness threshold in seconds.
pub const DEFAULT_REPLAY_THRESHOLD_SECS: i64 = 300;

/// Redis key prefix for shared dedup entries.
const REDIS_DEDUP_PREFIX: &str = "aurora:dedup:";

/// Dedup store errors.
#[derive(Debug, Error)]
pub enum DedupError {
    #[error("Redis error: {0}")]
    Redis(#[from] fred::error::Error),
}

/// Membership store for seen message ids.
///
/// The in-process set is the default; a shared store (Redis) can be swapped
/// in for multi-instance deployments without touching the dispatcher.
#[async_trait]
pub trait DedupStore: Send + Sync {
    async fn has(&self, id: &str) -> Result<bool, DedupError>;

    async fn put(&self, id: &str) -> Result<(), DedupError>;

    /// Record `id` and report whether it had already been seen.
    ///
    /// Backends should override this with an atomic operation; the default
    /// leaves a window between the check and the insert.
    async fn check_and_put(&self, id: &str) -> Result<bool, DedupError> {
        if self.has(id).await? {
            return Ok(true);
        }
        self.put(id).await?;
        Ok(false)
    }
}

/// Process-local dedup set, cleared wholesale once it reaches capacity.
pub struct MemoryDedupStore {
    seen: Mutex<HashSet<String>>,
    capacity: usize,
}

impl MemoryDedupStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            seen: Mutex::new(HashSet::new()),
            capacity: capacity.max(1),
        }
    }

    /// Number of ids currently tracked.
    pub fn len(&self) -> usize {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert(set: &mut HashSet<String>, id: &str, capacity: usize) {
        if set.len() >= capacity {
            debug!(capacity, "Dedup set reached capacity, clearing");
            set.clear();
        }
        set.insert(id.to_string());
    }
}

impl Default for MemoryDedupStore {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_CAPACITY)
    }
}

#[async_trait]
impl DedupStore for MemoryDedupStore {
    async fn has(&self, id: &str) -> Result<bool, DedupError> {
        Ok(self
            .seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(id))
    }

    async fn put(&self, id: &str) -> Result<(), DedupError> {
        let mut seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);
        if !seen.contains(id) {
            Self::insert(&mut seen, id, self.capacity);
        }
        Ok(())
    }

    async fn check_and_put(&self, id: &str) -> Result<bool, DedupError> {
        let mut seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);
        if seen.contains(id) {
            return Ok(true);
        }
        Self::insert(&mut seen, id, self.capacity);
        Ok(false)
    }
}

/// Dedup keys shared through Redis, expiring after `ttl_secs`.
pub struct RedisDedupStore {
    redis: Client,
    ttl_secs: i64,
}

impl RedisDedupStore {
    pub fn new(redis: Client, ttl_secs: u64) -> Self {
        Self {
            redis,
            ttl_secs: ttl_secs.max(1) as i64,
        }
    }

    fn key(id: &str) -> String {
        format!("{REDIS_DEDUP_PREFIX}{id}")
    }
}

#[async_trait]
impl DedupStore for RedisDedupStore {
    async fn has(&self, id: &str) -> Result<bool, DedupError> {
        let exists: i64 = self.redis.exists(Self::key(id)).await?;
        Ok(exists > 0)
    }

    async fn put(&self, id: &str) -> Result<(), DedupError> {
        self.redis
            .set::<(), _, _>(
                Self::key(id),
                1,
                Some(Expiration::EX(self.ttl_secs)),
                None,
                false,
            )
            .await?;
        Ok(())
    }

    async fn check_and_put(&self, id: &str) -> Result<bool, DedupError> {
        // SET NX replies nil when the key already exists
        let inserted: Option<String> = self
            .redis
            .set(
                Self::key(id),
                1,
                Some(Expiration::EX(self.ttl_secs)),
                Some(SetOptions::NX),
                false,
            )
            .await?;
        Ok(inserted.is_none())
    }
}

/// Outcome of a replay check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardVerdict {
    /// First sighting within the retention window and recent enough
    Fresh,
    /// Id already seen
    Duplicate,
    /// Origin timestamp older than the threshold
    Stale,
}

impl GuardVerdict {
    pub const fn is_skip(self) -> bool {
        !matches!(self, Self::Fresh)
    }
}

/// Dedup + staleness gate applied to every inbound message.
#[derive(Clone)]
pub struct ReplayGuard {
    store: Arc<dyn DedupStore>,
    threshold_secs: i64,
}

impl ReplayGuard {
    /// Guard backed by a process-local set.
    pub fn in_memory(capacity: usize, threshold_secs: i64) -> Self {
        Self::with_store(Arc::new(MemoryDedupStore::new(capacity)), threshold_secs)
    }

    /// Guard backed by any dedup store.
    pub fn with_store(store: Arc<dyn DedupStore>, threshold_secs: i64) -> Self {
        Self {
            store,
            threshold_secs,
        }
    }

    pub const fn threshold_secs(&self) -> i64 {
        self.threshold_secs
    }

    /// Returns `true` when the caller must skip this record.
    pub async fn is_duplicate_or_stale(&self, id: Option<&str>, timestamp: Option<&str>) -> bool {
        self.check(id, timestamp).await.is_skip()
    }

    /// Classify a record against the current wall clock.
    pub async fn check(&self, id: Option<&str>, timestamp: Option<&str>) -> GuardVerdict {
        self.check_at(id, timestamp, chrono::Utc::now().timestamp())
            .await
    }

    /// Classify a record against `now_secs`.
    ///
    /// The id is recorded before the staleness check, so a stale first
    /// sighting still marks the id as seen. Records without an id can only
    /// be rejected as stale. Store failures fail open.
    pub async fn check_at(
        &self,
        id: Option<&str>,
        timestamp: Option<&str>,
        now_secs: i64,
    ) -> GuardVerdict {
        if let Some(id) = id.filter(|id| !id.is_empty()) {
            match self.store.check_and_put(id).await {
                Ok(true) => return GuardVerdict::Duplicate,
                Ok(false) => {}
                Err(e) => {
                    warn!(error = %e, "Dedup store unavailable, treating message as new");
                }
            }
        }

        if let Some(ts) = timestamp.and_then(|t| t.trim().parse::<i64>().ok()) {
            // An age that overflows i64 is older than any threshold
            let stale = now_secs
                .checked_sub(ts)
                .is_none_or(|age| age > self.threshold_secs);
            if stale {
                return GuardVerdict::Stale;
            }
        }

        GuardVerdict::Fresh
    }
}

impl Default for ReplayGuard {
    fn default() -> Self {
        Self::in_memory(DEFAULT_DEDUP_CAPACITY, DEFAULT_REPLAY_THRESHOLD_SECS)
    }
}
