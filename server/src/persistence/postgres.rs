//! Postgres sink writing raw messages to `whatsapp_messages`.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;
use tracing::debug;

use super::{MessageSink, PersistError};

/// Inserts messages into `whatsapp_messages` as JSONB rows.
#[derive(Debug, Clone)]
pub struct PgMessageSink {
    pool: PgPool,
}

impl PgMessageSink {
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageSink for PgMessageSink {
    async fn persist(&self, messages: &[Value]) -> Result<(), PersistError> {
        if messages.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for message in messages {
            sqlx::query("INSERT INTO whatsapp_messages (message) VALUES ($1)")
                .bind(sqlx::types::Json(message))
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        debug!(count = messages.len(), "Persisted messages to database");
        Ok(())
    }
}
