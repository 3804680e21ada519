//! Server-side state: two JSON collections in the data directory.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use whisperlock_core::json_file;
use whisperlock_core::protocol::Subscription;

use crate::error::ServerError;

pub const SUBSCRIPTIONS_FILE: &str = "subscriptions.json";
pub const SYNCED_FILE: &str = "synced-entries.json";
pub const KEYS_FILE: &str = "push-keys.json";

/// Server copy of an accepted entry. Text and metadata only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncedRecord {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    pub synced_at: DateTime<Utc>,
}

pub struct ServerStore {
    dir: PathBuf,
}

impl ServerStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, ServerError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn keys_path(&self) -> PathBuf {
        self.dir.join(KEYS_FILE)
    }

    pub fn subscriptions(&self) -> Result<Vec<Subscription>, ServerError> {
        Ok(json_file::read_or_default(&self.dir.join(SUBSCRIPTIONS_FILE))?)
    }

    /// Store `subscription` unless one with the same endpoint exists.
    /// Returns whether it was added.
    pub fn add_subscription(&self, subscription: Subscription) -> Result<bool, ServerError> {
        let mut subs = self.subscriptions()?;
        if subs.iter().any(|s| s.endpoint == subscription.endpoint) {
            return Ok(false);
        }
        subs.push(subscription);
        json_file::write_atomic(&self.dir.join(SUBSCRIPTIONS_FILE), &subs)?;
        Ok(true)
    }

    /// Drop every subscription whose endpoint is listed. Returns how many
    /// were removed.
    pub fn remove_subscriptions(&self, endpoints: &[String]) -> Result<usize, ServerError> {
        if endpoints.is_empty() {
            return Ok(0);
        }
        let mut subs = self.subscriptions()?;
        let before = subs.len();
        subs.retain(|s| !endpoints.contains(&s.endpoint));
        let removed = before - subs.len();
        if removed > 0 {
            json_file::write_atomic(&self.dir.join(SUBSCRIPTIONS_FILE), &subs)?;
        }
        Ok(removed)
    }

    pub fn records(&self) -> Result<Vec<SyncedRecord>, ServerError> {
        Ok(json_file::read_or_default(&self.dir.join(SYNCED_FILE))?)
    }

    pub fn append_records(&self, new: Vec<SyncedRecord>) -> Result<(), ServerError> {
        if new.is_empty() {
            return Ok(());
        }
        let mut records = self.records()?;
        records.extend(new);
        json_file::write_atomic(&self.dir.join(SYNCED_FILE), &records)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn subscriptions_dedupe_by_endpoint() {
        let dir = tempdir().unwrap();
        let store = ServerStore::open(dir.path()).unwrap();
        assert!(store.add_subscription(Subscription::new("https://a")).unwrap());
        assert!(!store.add_subscription(Subscription::new("https://a")).unwrap());
        assert!(store.add_subscription(Subscription::new("https://b")).unwrap());
        assert_eq!(store.subscriptions().unwrap().len(), 2);

        assert_eq!(store.remove_subscriptions(&["https://a".to_string()]).unwrap(), 1);
        assert_eq!(store.subscriptions().unwrap()[0].endpoint, "https://b");
        assert_eq!(store.remove_subscriptions(&["https://zz".to_string()]).unwrap(), 0);
    }
}
