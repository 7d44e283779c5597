//! Rate limiting constants.

/// IPv6 prefix segments for rate limiting (uses /64)
pub const IPV6_PREFIX_SEGMENTS: usize = 4;

/// Key segment for webhook deliveries
pub const WEBHOOK_BUCKET: &str = "webhook";

/// Lua script return code for an allowed request
pub const SCRIPT_ALLOWED: i64 = 1;
