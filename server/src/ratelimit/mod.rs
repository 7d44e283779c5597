//! Rate limiting for the webhook endpoint.
//!
//! Sliding-window limits per client IP, kept in Redis when available so
//! that all instances share one window, or in process memory otherwise.

pub mod config;
pub mod constants;
pub mod error;
pub mod ip;
pub mod limiter;
pub mod middleware;
pub mod types;

pub use config::*;
pub use constants::*;
pub use error::*;
pub use ip::*;
pub use limiter::*;
pub use middleware::rate_limit_by_ip;
pub use types::*;
