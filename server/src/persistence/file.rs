//! JSON array file sink used when no database is configured.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{MessageSink, PersistError};

/// Appends messages to a JSON array file.
///
/// Each call reads the whole array, appends and rewrites it. Writers in
/// this process are serialized; other processes writing the same file are
/// not coordinated with.
#[derive(Debug)]
pub struct FileMessageSink {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileMessageSink {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_existing(&self) -> Result<Vec<Value>, PersistError> {
        let data = match tokio::fs::read(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_slice::<Value>(&data) {
            Ok(Value::Array(existing)) => Ok(existing),
            Ok(_) => {
                warn!(path = %self.path.display(), "Messages file is not a JSON array, starting fresh");
                Ok(Vec::new())
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Messages file unreadable, starting fresh");
                Ok(Vec::new())
            }
        }
    }
}

#[async_trait]
impl MessageSink for FileMessageSink {
    async fn persist(&self, messages: &[Value]) -> Result<(), PersistError> {
        if messages.is_empty() {
            return Ok(());
        }

        let _guard = self.lock.lock().await;

        let mut all = self.read_existing().await?;
        all.extend_from_slice(messages);
        let data = serde_json::to_vec_pretty(&all)?;
        tokio::fs::write(&self.path, data).await?;

        debug!(
            count = messages.len(),
            total = all.len(),
            path = %self.path.display(),
            "Persisted messages to file"
        );
        Ok(())
    }
}
