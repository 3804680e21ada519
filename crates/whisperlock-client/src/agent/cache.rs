//! Named cache partitions holding stored responses.
//!
//! Each partition is one JSON file under the cache directory, keyed by request
//! path. Partitions are loaded eagerly on open and rewritten whole on every
//! put.

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::debug;
use whisperlock_core::json_file;

pub const APP_CACHE: &str = "wl-app-shell-v1";
pub const API_CACHE: &str = "wl-api-v1";

/// Shell resources fetched into [`APP_CACHE`] on install.
pub const PRECACHE: [&str; 8] = [
    "/",
    "/index.html",
    "/styles.css",
    "/app.js",
    "/sw.js",
    "/manifest.webmanifest",
    "/icons/icon-192.png",
    "/icons/icon-512.png",
];

#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, path: &str) -> Result<StoredResponse>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredResponse {
    pub status: u16,
    pub content_type: Option<String>,
    #[serde(with = "body_base64")]
    pub body: Bytes,
}

impl StoredResponse {
    pub fn new(status: u16, content_type: Option<String>, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            content_type,
            body: body.into(),
        }
    }

    pub fn json(status: u16, body: &str) -> Self {
        Self::new(
            status,
            Some("application/json".to_string()),
            Bytes::copy_from_slice(body.as_bytes()),
        )
    }

    /// Synthetic answer for an API read that has neither a cached copy nor a
    /// reachable server.
    pub fn not_ok() -> Self {
        Self::json(200, r#"{"ok":false}"#)
    }

    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

mod body_base64 {
    use base64::{engine::general_purpose, Engine as _};
    use bytes::Bytes;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(body: &Bytes, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&general_purpose::STANDARD.encode(body))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Bytes, D::Error> {
        let raw = String::deserialize(d)?;
        general_purpose::STANDARD
            .decode(raw)
            .map(Bytes::from)
            .map_err(de::Error::custom)
    }
}

type Partition = BTreeMap<String, StoredResponse>;

pub struct CacheStorage {
    root: Option<PathBuf>,
    partitions: RwLock<HashMap<String, Partition>>,
    /// Serialises writers so a partition is never rebuilt from a stale copy.
    writer: Mutex<()>,
}

impl CacheStorage {
    /// Open the cache directory, loading every partition file in it.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        let mut partitions = HashMap::new();
        for entry in std::fs::read_dir(&root)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let partition: Partition = json_file::read_or_default(&path)?;
            partitions.insert(name.to_string(), partition);
        }
        debug!(root = %root.display(), partitions = partitions.len(), "cache storage opened");
        Ok(Self {
            root: Some(root),
            partitions: RwLock::new(partitions),
            writer: Mutex::new(()),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            root: None,
            partitions: RwLock::new(HashMap::new()),
            writer: Mutex::new(()),
        }
    }

    fn partition_path(root: &Path, name: &str) -> PathBuf {
        root.join(format!("{name}.json"))
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.partitions.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn get(&self, partition: &str, key: &str) -> Option<StoredResponse> {
        self.partitions.read().get(partition)?.get(key).cloned()
    }

    pub fn put(&self, partition: &str, key: &str, response: StoredResponse) -> Result<()> {
        self.put_all(partition, vec![(key.to_string(), response)])
    }

    /// Insert several responses with a single write of the partition. The
    /// new partition reaches disk before readers can see it.
    pub fn put_all(&self, partition: &str, items: Vec<(String, StoredResponse)>) -> Result<()> {
        let _writer = self.writer.lock();
        let mut entries = self
            .partitions
            .read()
            .get(partition)
            .cloned()
            .unwrap_or_default();
        entries.extend(items);
        if let Some(root) = &self.root {
            json_file::write_atomic(&Self::partition_path(root, partition), &entries)?;
        }
        self.partitions.write().insert(partition.to_string(), entries);
        Ok(())
    }

    pub fn delete(&self, partition: &str) -> Result<bool> {
        let _writer = self.writer.lock();
        if let Some(root) = &self.root {
            let path = Self::partition_path(root, partition);
            if path.exists() {
                std::fs::remove_file(path)?;
            }
        }
        Ok(self.partitions.write().remove(partition).is_some())
    }
}
