//! Records owned by the local store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StoreError;
use crate::voice::FeatureVector;

/// The profile is a singleton keyed by this id.
pub const PROFILE_ID: &str = "main";
pub const DEFAULT_THRESHOLD: f32 = 0.92;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: String,
    #[serde(default)]
    pub pin_salt: Option<String>,
    #[serde(default)]
    pub pin_hash: Option<String>,
    #[serde(default)]
    pub voice_template: Option<FeatureVector>,
    #[serde(default = "default_threshold")]
    pub threshold: f32,
}

impl Profile {
    pub fn has_pin(&self) -> bool {
        self.pin_salt.is_some() && self.pin_hash.is_some()
    }
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            id: PROFILE_ID.to_string(),
            pin_salt: None,
            pin_hash: None,
            voice_template: None,
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

fn default_threshold() -> f32 {
    DEFAULT_THRESHOLD
}

/// A diary entry. Immutable after creation except for `synced_at`,
/// which only ever moves from `None` to `Some`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct VaultEntry {
    pub id: String,
    pub title: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synced_at: Option<DateTime<Utc>>,
}

impl VaultEntry {
    /// Build a fresh entry with a client-assigned id. Title and body are
    /// trimmed; at least one of them must be non-empty.
    pub fn new(title: &str, body: &str) -> Result<Self, StoreError> {
        let title = title.trim();
        let body = body.trim();
        if title.is_empty() && body.is_empty() {
            return Err(StoreError::InvalidEntry(
                "title and body are both empty".to_string(),
            ));
        }
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            title: title.to_string(),
            body: body.to_string(),
            created_at: Utc::now(),
            synced_at: None,
        })
    }

    pub fn is_synced(&self) -> bool {
        self.synced_at.is_some()
    }
}

/// Pending delivery. Same shape as the vault entry at enqueue time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct OutboxEntry {
    pub id: String,
    pub title: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

impl From<&VaultEntry> for OutboxEntry {
    fn from(entry: &VaultEntry) -> Self {
        Self {
            id: entry.id.clone(),
            title: entry.title.clone(),
            body: entry.body.clone(),
            created_at: entry.created_at,
        }
    }
}

/// Raw profile row; the template is stored as a JSON array.
#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct ProfileRow {
    pub id: String,
    pub pin_salt: Option<String>,
    pub pin_hash: Option<String>,
    pub voice_template: Option<String>,
    pub threshold: f64,
}

impl TryFrom<ProfileRow> for Profile {
    type Error = StoreError;

    fn try_from(row: ProfileRow) -> Result<Self, Self::Error> {
        let voice_template = row
            .voice_template
            .as_deref()
            .map(serde_json::from_str::<FeatureVector>)
            .transpose()?;
        Ok(Self {
            id: row.id,
            pin_salt: row.pin_salt,
            pin_hash: row.pin_hash,
            voice_template,
            threshold: row.threshold as f32,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_requires_some_text() {
        assert!(VaultEntry::new("  ", "\n").is_err());
        let e = VaultEntry::new(" t ", "").unwrap();
        assert_eq!(e.title, "t");
        assert!(!e.is_synced());
    }

    #[test]
    fn entries_serialize_camel_case_without_synced_at() {
        let e = VaultEntry::new("t", "b").unwrap();
        let v = serde_json::to_value(&e).unwrap();
        assert!(v.get("createdAt").is_some());
        assert!(v.get("syncedAt").is_none());
    }
}
