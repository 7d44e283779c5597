//! Server Configuration
//!
//! Loads configuration from environment variables.

use anyhow::Result;
use std::env;

/// Object discriminator carried by WhatsApp Business notifications.
pub const WHATSAPP_OBJECT: &str = "whatsapp_business_account";

/// Backend used for message-id deduplication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupStoreKind {
    /// Process-local set (no cross-instance dedup)
    Memory,
    /// Shared Redis keys (requires `REDIS_URL`)
    Redis,
}

impl DedupStoreKind {
    fn parse(val: &str) -> Option<Self> {
        match val.trim().to_ascii_lowercase().as_str() {
            "memory" => Some(Self::Memory),
            "redis" => Some(Self::Redis),
            _ => None,
        }
    }
}

/// Server configuration loaded from environment variables.
#[derive(Clone)]
pub struct Config {
    /// Server bind address (e.g., "0.0.0.0:3000")
    pub bind_address: String,

    /// Token expected in `hub.verify_token` during the subscription handshake
    pub verify_token: Option<String>,

    /// App secret used to verify `X-Hub-Signature-256`.
    ///
    /// When unset, signature enforcement is disabled. This is a permissive
    /// fallback for local development and must not be used in production.
    pub app_secret: Option<String>,

    /// Graph API access token for outbound replies
    pub whatsapp_token: Option<String>,

    /// Business phone number id used as the outbound sender
    pub phone_number_id: Option<String>,

    /// Graph API version segment (default: v21.0)
    pub api_version: String,

    /// Graph API base URL (default: <https://graph.facebook.com>)
    pub graph_base_url: String,

    /// Outbound request timeout in seconds (default: 10)
    pub send_timeout_secs: u64,

    /// `PostgreSQL` connection URL for message persistence (optional)
    pub database_url: Option<String>,

    /// Fallback JSON file used when no database is configured
    pub messages_file: String,

    /// Redis connection URL (optional)
    pub redis_url: Option<String>,

    /// Dedup backend (default: memory)
    pub dedup_store: DedupStoreKind,

    /// Maximum ids held by the in-memory dedup set before it is cleared
    pub dedup_capacity: usize,

    /// Retention of dedup keys in Redis, in seconds
    pub dedup_ttl_secs: u64,

    /// Maximum message age in seconds before it is dropped as stale
    pub replay_threshold_secs: i64,

    /// Maximum webhook body size in bytes (default: 256KB)
    pub max_body_size: usize,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Secrets and connection strings are only reported as present/absent
        let redact = |v: &Option<String>| v.as_ref().map(|_| "[REDACTED]");
        f.debug_struct("Config")
            .field("bind_address", &self.bind_address)
            .field("verify_token", &redact(&self.verify_token))
            .field("app_secret", &redact(&self.app_secret))
            .field("whatsapp_token", &redact(&self.whatsapp_token))
            .field("phone_number_id", &self.phone_number_id)
            .field("api_version", &self.api_version)
            .field("graph_base_url", &self.graph_base_url)
            .field("send_timeout_secs", &self.send_timeout_secs)
            .field("database_url", &redact(&self.database_url))
            .field("messages_file", &self.messages_file)
            .field("redis_url", &redact(&self.redis_url))
            .field("dedup_store", &self.dedup_store)
            .field("dedup_capacity", &self.dedup_capacity)
            .field("dedup_ttl_secs", &self.dedup_ttl_secs)
            .field("replay_threshold_secs", &self.replay_threshold_secs)
            .field("max_body_size", &self.max_body_size)
            .finish()
    }
}

/// Read the first set, non-empty variable among `keys`.
fn env_any(keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| env::var(k).ok())
        .map(|v| v.trim().to_string())
        .find(|v| !v.is_empty())
}

/// Read and parse a variable, falling back to `default` when unset or invalid.
fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let dedup_store = match env::var("DEDUP_STORE") {
            Ok(val) => DedupStoreKind::parse(&val).ok_or_else(|| {
                anyhow::anyhow!("DEDUP_STORE must be 'memory' or 'redis', got '{val}'")
            })?,
            Err(_) => DedupStoreKind::Memory,
        };
        let redis_url = env_any(&["REDIS_URL"]);
        if dedup_store == DedupStoreKind::Redis && redis_url.is_none() {
            anyhow::bail!("DEDUP_STORE=redis requires REDIS_URL to be set");
        }

        Ok(Self {
            bind_address: env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".into()),
            verify_token: env_any(&["VERIFY_TOKEN", "WA_VERIFY_TOKEN"]),
            app_secret: env_any(&["APP_SECRET", "META_APP_SECRET"]),
            whatsapp_token: env_any(&["WHATSAPP_TOKEN", "META_WABA_TOKEN"]),
            phone_number_id: env_any(&["PHONE_NUMBER_ID", "META_PHONE_NUMBER_ID"]),
            api_version: env_any(&["WHATSAPP_API_VERSION"]).unwrap_or_else(|| "v21.0".into()),
            graph_base_url: env_any(&["GRAPH_API_BASE_URL"])
                .unwrap_or_else(|| "https://graph.facebook.com".into()),
            send_timeout_secs: env_parse("SEND_TIMEOUT_SECS", 10),
            database_url: env_any(&["DATABASE_URL"]),
            messages_file: env_any(&["MESSAGES_FILE"]).unwrap_or_else(|| "messages.json".into()),
            redis_url,
            dedup_store,
            dedup_capacity: env_parse("DEDUP_CAPACITY", 10_000),
            dedup_ttl_secs: env_parse("DEDUP_TTL_SECS", 3600),
            replay_threshold_secs: env_parse("REPLAY_THRESHOLD_SECS", 300),
            max_body_size: env_parse("MAX_BODY_SIZE", 256 * 1024), // 256KB
        })
    }

    /// Check if webhook signatures are enforced.
    #[must_use]
    pub fn has_app_secret(&self) -> bool {
        self.app_secret.as_deref().is_some_and(|s| !s.is_empty())
    }

    /// Check if outbound replies can be sent.
    #[must_use]
    pub const fn has_send_credentials(&self) -> bool {
        self.whatsapp_token.is_some() && self.phone_number_id.is_some()
    }

    /// Create a default configuration for testing.
    #[must_use]
    pub fn default_for_test() -> Self {
        Self {
            bind_address: "127.0.0.1:3000".into(),
            verify_token: Some("test-verify-token".into()),
            app_secret: Some("test-app-secret".into()),
            whatsapp_token: None,
            phone_number_id: None,
            api_version: "v21.0".into(),
            graph_base_url: "http://127.0.0.1:9".into(),
            send_timeout_secs: 2,
            database_url: None,
            messages_file: "messages.json".into(),
            redis_url: None,
            dedup_store: DedupStoreKind::Memory,
            dedup_capacity: 10_000,
            dedup_ttl_secs: 3600,
            replay_threshold_secs: 300,
            max_body_size: 256 * 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: &[&str] = &[
        "VERIFY_TOKEN",
        "WA_VERIFY_TOKEN",
        "APP_SECRET",
        "META_APP_SECRET",
        "DEDUP_STORE",
        "REDIS_URL",
        "REPLAY_THRESHOLD_SECS",
    ];

    fn clear_env() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let mut config = Config::default_for_test();
        config.whatsapp_token = Some("EAAG-secret-token".into());
        config.database_url = Some("postgres://aurora:hunter2@db/aurora".into());

        let out = format!("{config:?}");
        assert!(!out.contains("test-app-secret"));
        assert!(!out.contains("test-verify-token"));
        assert!(!out.contains("EAAG-secret-token"));
        assert!(!out.contains("hunter2"));
        assert!(out.contains("[REDACTED]"));
        assert!(out.contains("bind_address"));
    }

    #[test]
    #[serial]
    fn test_defaults() {
        clear_env();
        let config = Config::from_env().unwrap();
        assert_eq!(config.verify_token, None);
        assert!(!config.has_app_secret());
        assert_eq!(config.dedup_store, DedupStoreKind::Memory);
        assert_eq!(config.dedup_capacity, 10_000);
        assert_eq!(config.replay_threshold_secs, 300);
        assert_eq!(config.max_body_size, 262_144);
    }

    #[test]
    #[serial]
    fn test_aliases_and_empty_values() {
        clear_env();
        env::set_var("VERIFY_TOKEN", "  ");
        env::set_var("WA_VERIFY_TOKEN", "legacy-token");
        env::set_var("META_APP_SECRET", "s3cret");
        let config = Config::from_env().unwrap();
        assert_eq!(config.verify_token.as_deref(), Some("legacy-token"));
        assert!(config.has_app_secret());
        clear_env();
    }

    #[test]
    #[serial]
    fn test_redis_dedup_requires_url() {
        clear_env();
        env::set_var("DEDUP_STORE", "redis");
        assert!(Config::from_env().is_err());

        env::set_var("REDIS_URL", "redis://localhost:6379");
        let config = Config::from_env().unwrap();
        assert_eq!(config.dedup_store, DedupStoreKind::Redis);

        env::set_var("DEDUP_STORE", "postgres");
        assert!(Config::from_env().is_err());
        clear_env();
    }

    #[test]
    #[serial]
    fn test_invalid_number_falls_back() {
        clear_env();
        env::set_var("REPLAY_THRESHOLD_SECS", "five minutes");
        let config = Config::from_env().unwrap();
        assert_eq!(config.replay_threshold_secs, 300);
        clear_env();
    }
}
