//! Deferred-retry registry.
//!
//! A registered tag stays pending until the agent has run its handler and
//! calls [`RetryRegistry::complete`]. A crash between the two leaves the tag
//! in place, so handlers run at least once. Nothing in the sync path depends
//! on a tag ever firing: manual flushes and reconnect flushes cover the same
//! ground.

use anyhow::Result;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;
use whisperlock_core::json_file;

/// Tag under which outbox delivery is registered.
pub const SYNC_TAG: &str = "sync-whisperlock";

pub trait RetryRegistry: Send + Sync {
    /// Register `tag`. Registering a tag that is already pending is a no-op.
    fn register(&self, tag: &str) -> Result<()>;
    /// Tags waiting for their handler, oldest first.
    fn pending(&self) -> Result<Vec<String>>;
    /// Clear `tag` after its handler ran.
    fn complete(&self, tag: &str) -> Result<()>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PendingTag {
    tag: String,
    registered_at: DateTime<Utc>,
}

/// Registry persisted as a JSON list next to the local store.
pub struct FileRetryRegistry {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileRetryRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    fn load(&self) -> Result<Vec<PendingTag>> {
        json_file::read_or_default(&self.path)
    }
}

impl RetryRegistry for FileRetryRegistry {
    fn register(&self, tag: &str) -> Result<()> {
        let _guard = self.lock.lock();
        let mut tags = self.load()?;
        if tags.iter().any(|t| t.tag == tag) {
            return Ok(());
        }
        tags.push(PendingTag {
            tag: tag.to_string(),
            registered_at: Utc::now(),
        });
        json_file::write_atomic(&self.path, &tags)?;
        debug!(tag, "deferred retry registered");
        Ok(())
    }

    fn pending(&self) -> Result<Vec<String>> {
        let _guard = self.lock.lock();
        Ok(self.load()?.into_iter().map(|t| t.tag).collect())
    }

    fn complete(&self, tag: &str) -> Result<()> {
        let _guard = self.lock.lock();
        let mut tags = self.load()?;
        let before = tags.len();
        tags.retain(|t| t.tag != tag);
        if tags.len() != before {
            json_file::write_atomic(&self.path, &tags)?;
        }
        Ok(())
    }
}

/// In-process registry for tests and embedders without a data directory.
#[derive(Default)]
pub struct MemoryRetryRegistry {
    tags: Mutex<Vec<String>>,
}

impl RetryRegistry for MemoryRetryRegistry {
    fn register(&self, tag: &str) -> Result<()> {
        let mut tags = self.tags.lock();
        if !tags.iter().any(|t| t == tag) {
            tags.push(tag.to_string());
        }
        Ok(())
    }

    fn pending(&self) -> Result<Vec<String>> {
        Ok(self.tags.lock().clone())
    }

    fn complete(&self, tag: &str) -> Result<()> {
        self.tags.lock().retain(|t| t != tag);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn registration_survives_reopen_until_completed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("retry-tasks.json");

        let registry = FileRetryRegistry::new(&path);
        registry.register(SYNC_TAG).unwrap();
        registry.register(SYNC_TAG).unwrap();
        assert_eq!(registry.pending().unwrap(), vec![SYNC_TAG.to_string()]);

        let reopened = FileRetryRegistry::new(&path);
        assert_eq!(reopened.pending().unwrap(), vec![SYNC_TAG.to_string()]);
        reopened.complete(SYNC_TAG).unwrap();
        assert!(registry.pending().unwrap().is_empty());
    }

    #[test]
    fn memory_registry_dedupes() {
        let registry = MemoryRetryRegistry::default();
        registry.register("a").unwrap();
        registry.register("a").unwrap();
        registry.register("b").unwrap();
        assert_eq!(registry.pending().unwrap(), vec!["a", "b"]);
        registry.complete("a").unwrap();
        assert_eq!(registry.pending().unwrap(), vec!["b"]);
    }
}
