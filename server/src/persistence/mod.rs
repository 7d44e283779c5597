//! Inbound Message Persistence
//!
//! Raw message objects are stored either in `PostgreSQL` (when
//! `DATABASE_URL` is set) or appended to a local JSON file.

mod file;
mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;
use thiserror::Error;

use crate::config::Config;

pub use file::FileMessageSink;
pub use postgres::PgMessageSink;

/// Persistence errors.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Stores raw inbound message objects.
#[async_trait]
pub trait MessageSink: Send + Sync {
    /// Persist a batch. An empty batch is a no-op.
    async fn persist(&self, messages: &[Value]) -> Result<(), PersistError>;
}

/// Pick the sink for the configuration: the database when a pool is
/// available, the JSON file otherwise.
pub fn sink_from_config(config: &Config, pool: Option<PgPool>) -> Arc<dyn MessageSink> {
    match pool {
        Some(pool) => Arc::new(PgMessageSink::new(pool)),
        None => Arc::new(FileMessageSink::new(&config.messages_file)),
    }
}
