//! Wire types exchanged with the reconciliation server.
//!
//! Only text and metadata cross the network; templates and audio never do.
//! Optional response fields follow explicit rules:
//! - `ok` absent means success; only an explicit `false` is a failure.
//! - `syncedIds` absent is the same as an empty list.
//! - `syncedAt` absent leaves the timestamp to the client.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::models::OutboxEntry;

pub const HEALTH_PATH: &str = "/api/health";
pub const SYNC_PATH: &str = "/api/sync";
pub const SUBSCRIBE_PATH: &str = "/api/subscribe";
pub const PUBLIC_KEY_PATH: &str = "/api/vapidPublicKey";
pub const PUSH_TEST_PATH: &str = "/api/push-test";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchEntry {
    pub id: String,
    pub title: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

impl From<&OutboxEntry> for BatchEntry {
    fn from(e: &OutboxEntry) -> Self {
        Self {
            id: e.id.clone(),
            title: e.title.clone(),
            body: e.body.clone(),
            created_at: e.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRequest {
    pub entries: Vec<BatchEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    #[serde(default = "default_ok")]
    pub ok: bool,
    #[serde(default)]
    pub synced_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synced_at: Option<DateTime<Utc>>,
}

impl SyncResponse {
    pub fn empty() -> Self {
        Self {
            ok: true,
            synced_ids: vec![],
            synced_at: None,
        }
    }
}

fn default_ok() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OkResponse {
    pub ok: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKeyResponse {
    pub key: String,
}

/// Opaque push endpoint descriptor. Identity is the endpoint URL; any other
/// fields are carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub endpoint: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Subscription {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscribeRequest {
    pub subscription: Subscription,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPayload {
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default = "default_url")]
    pub url: String,
}

impl NotificationPayload {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            url: default_url(),
        }
    }

    /// Parse a delivered payload, falling back to defaults for anything
    /// missing or unreadable.
    pub fn parse_lenient(bytes: &[u8]) -> Self {
        let mut payload: Self = serde_json::from_slice(bytes).unwrap_or_default();
        if payload.title.is_empty() {
            payload.title = default_title();
        }
        if payload.url.is_empty() {
            payload.url = default_url();
        }
        payload
    }
}

impl Default for NotificationPayload {
    fn default() -> Self {
        Self {
            title: default_title(),
            body: String::new(),
            url: default_url(),
        }
    }
}

fn default_title() -> String {
    "WhisperLock".to_string()
}

fn default_url() -> String {
    "/".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sync_response_field_rules() {
        let r: SyncResponse = serde_json::from_value(json!({})).unwrap();
        assert!(r.ok);
        assert!(r.synced_ids.is_empty());
        assert!(r.synced_at.is_none());

        let r: SyncResponse = serde_json::from_value(json!({
            "ok": true,
            "syncedIds": ["a1"],
            "syncedAt": "2024-01-01T00:00:00Z"
        }))
        .unwrap();
        assert_eq!(r.synced_ids, vec!["a1".to_string()]);
        assert_eq!(r.synced_at.unwrap().to_rfc3339(), "2024-01-01T00:00:00+00:00");

        let r: SyncResponse = serde_json::from_value(json!({"ok": false})).unwrap();
        assert!(!r.ok);
    }

    #[test]
    fn subscription_keeps_unknown_fields() {
        let raw = json!({"endpoint": "https://push.example/abc", "keys": {"p256dh": "x"}});
        let sub: Subscription = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(sub.endpoint, "https://push.example/abc");
        assert_eq!(serde_json::to_value(&sub).unwrap(), raw);
    }

    #[test]
    fn notification_defaults() {
        let p = NotificationPayload::parse_lenient(b"not json");
        assert_eq!(p, NotificationPayload::default());
        let p = NotificationPayload::parse_lenient(br#"{"body":"hi","url":""}"#);
        assert_eq!(p.title, "WhisperLock");
        assert_eq!(p.body, "hi");
        assert_eq!(p.url, "/");
    }
}
