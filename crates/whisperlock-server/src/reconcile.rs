//! Batch acceptance.
//!
//! Entries arrive as loose JSON. One without a usable id is skipped and does
//! not affect the rest. An id already on record is echoed back but not stored
//! again, so the first accepted version of an entry wins.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashSet;
use tracing::warn;

use crate::store::SyncedRecord;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Every id acknowledged to the client, in submission order.
    pub synced_ids: Vec<String>,
    /// Records not seen before, to be appended.
    pub new_records: Vec<SyncedRecord>,
    pub skipped: usize,
}

fn entry_id(entry: &Value) -> Option<String> {
    match entry.get("id")? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn text_field(entry: &Value, key: &str) -> String {
    entry
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

pub fn accept_batch<'a>(
    known: impl IntoIterator<Item = &'a str>,
    entries: &[Value],
    now: DateTime<Utc>,
) -> BatchOutcome {
    let mut seen: HashSet<String> = known.into_iter().map(str::to_string).collect();
    let mut acked: HashSet<String> = HashSet::new();
    let mut outcome = BatchOutcome::default();

    for entry in entries {
        let Some(id) = entry_id(entry) else {
            outcome.skipped += 1;
            continue;
        };
        if seen.insert(id.clone()) {
            outcome.new_records.push(SyncedRecord {
                id: id.clone(),
                title: text_field(entry, "title"),
                body: text_field(entry, "body"),
                created_at: entry
                    .get("createdAt")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                synced_at: now,
            });
        }
        if acked.insert(id.clone()) {
            outcome.synced_ids.push(id);
        }
    }
    if outcome.skipped > 0 {
        warn!(skipped = outcome.skipped, "batch entries without id skipped");
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn entries_without_id_are_skipped() {
        let entries = vec![
            json!({"id": "a1", "title": "t", "body": "b", "createdAt": "2024-01-01T00:00:00Z"}),
            json!({"title": "no id"}),
            json!({"id": "", "title": "blank id"}),
            json!("not an object"),
            json!({"id": "a2"}),
        ];
        let out = accept_batch([], &entries, Utc::now());
        assert_eq!(out.synced_ids, vec!["a1", "a2"]);
        assert_eq!(out.new_records.len(), 2);
        assert_eq!(out.skipped, 3);
        assert_eq!(out.new_records[0].created_at.as_deref(), Some("2024-01-01T00:00:00Z"));
        assert_eq!(out.new_records[1].title, "");
    }

    #[test]
    fn known_ids_echo_without_new_record() {
        let entries = vec![
            json!({"id": "a1", "title": "changed"}),
            json!({"id": "a2"}),
            json!({"id": "a2", "title": "dup in batch"}),
        ];
        let out = accept_batch(["a1"], &entries, Utc::now());
        assert_eq!(out.synced_ids, vec!["a1", "a2"]);
        assert_eq!(out.new_records.len(), 1);
        assert_eq!(out.new_records[0].id, "a2");
        assert_eq!(out.new_records[0].title, "");
    }
}
