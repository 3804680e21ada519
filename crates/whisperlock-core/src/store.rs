//! Local store over SQLite via sqlx.
//!
//! One [`Store`] is opened per process and shared by clone. Each collection
//! is reached through a typed repository borrowed from it. Writes that must
//! land together (enqueue, acknowledgement) run inside a single transaction.

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use tracing::debug;

use crate::error::StoreError;
use crate::models::{OutboxEntry, Profile, ProfileRow, VaultEntry, PROFILE_ID};

/// Central store handle. Cheap to clone (the pool is reference counted).
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (or create) the database at `db_path` and run pending migrations.
    ///
    /// WAL mode and foreign keys are set on the connection options rather
    /// than in a migration, since SQLite refuses to change `journal_mode`
    /// inside the transaction sqlx wraps each migration in.
    pub async fn open(db_path: &Path) -> Result<Self, StoreError> {
        let opts = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(opts)
            .await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StoreError::Migration(e.to_string()))?;

        debug!(path = %db_path.display(), "local store opened");
        Ok(Self { pool })
    }

    pub fn profiles(&self) -> ProfileRepo<'_> {
        ProfileRepo { pool: &self.pool }
    }

    pub fn vault(&self) -> VaultRepo<'_> {
        VaultRepo { pool: &self.pool }
    }

    pub fn outbox(&self) -> OutboxRepo<'_> {
        OutboxRepo { pool: &self.pool }
    }

    /// Write a new entry to the vault and queue it for delivery.
    ///
    /// Both rows are inserted in one transaction, so the outbox can never hold
    /// an id the vault does not.
    pub async fn enqueue_entry(&self, entry: &VaultEntry) -> Result<(), StoreError> {
        let outbox = OutboxEntry::from(entry);
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO vault_entries (id, title, body, created_at, synced_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&entry.id)
        .bind(&entry.title)
        .bind(&entry.body)
        .bind(entry.created_at)
        .bind(entry.synced_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query("INSERT INTO outbox (id, title, body, created_at) VALUES (?, ?, ?, ?)")
            .bind(&outbox.id)
            .bind(&outbox.title)
            .bind(&outbox.body)
            .bind(outbox.created_at)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Apply a server acknowledgement: stamp `synced_at` on every matching
    /// vault entry that is not yet synced and drop the outbox rows.
    ///
    /// Re-applying the same ids is a no-op, which is what lets racing
    /// flushes converge without a lock.
    pub async fn apply_acknowledgement(
        &self,
        ids: &[String],
        synced_at: DateTime<Utc>,
    ) -> Result<AckOutcome, StoreError> {
        let mut outcome = AckOutcome::default();
        if ids.is_empty() {
            return Ok(outcome);
        }
        let mut tx = self.pool.begin().await?;
        for id in ids {
            let marked = sqlx::query(
                "UPDATE vault_entries SET synced_at = ? WHERE id = ? AND synced_at IS NULL",
            )
            .bind(synced_at)
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
            let dequeued = sqlx::query("DELETE FROM outbox WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?
                .rows_affected();
            outcome.marked += marked as usize;
            outcome.dequeued += dequeued as usize;
        }
        tx.commit().await?;
        Ok(outcome)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Rows actually changed by one acknowledgement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AckOutcome {
    pub marked: usize,
    pub dequeued: usize,
}

pub struct ProfileRepo<'a> {
    pool: &'a SqlitePool,
}

impl ProfileRepo<'_> {
    pub async fn get(&self) -> Result<Option<Profile>, StoreError> {
        let row: Option<ProfileRow> = sqlx::query_as(
            "SELECT id, pin_salt, pin_hash, voice_template, threshold FROM profile WHERE id = ?",
        )
        .bind(PROFILE_ID)
        .fetch_optional(self.pool)
        .await?;
        row.map(Profile::try_from).transpose()
    }

    /// Existing profile, or a fresh default one (not yet persisted).
    pub async fn get_or_default(&self) -> Result<Profile, StoreError> {
        Ok(self.get().await?.unwrap_or_default())
    }

    pub async fn save(&self, profile: &Profile) -> Result<(), StoreError> {
        let template = profile
            .voice_template
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        sqlx::query(
            "INSERT INTO profile (id, pin_salt, pin_hash, voice_template, threshold) VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                pin_salt = excluded.pin_salt,
                pin_hash = excluded.pin_hash,
                voice_template = excluded.voice_template,
                threshold = excluded.threshold",
        )
        .bind(PROFILE_ID)
        .bind(&profile.pin_salt)
        .bind(&profile.pin_hash)
        .bind(template)
        .bind(profile.threshold as f64)
        .execute(self.pool)
        .await?;
        Ok(())
    }
}

pub struct VaultRepo<'a> {
    pool: &'a SqlitePool,
}

impl VaultRepo<'_> {
    pub async fn get(&self, id: &str) -> Result<Option<VaultEntry>, StoreError> {
        let entry = sqlx::query_as::<_, VaultEntry>(
            "SELECT id, title, body, created_at, synced_at FROM vault_entries WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;
        Ok(entry)
    }

    /// Every entry, newest first.
    pub async fn all(&self) -> Result<Vec<VaultEntry>, StoreError> {
        let entries = sqlx::query_as::<_, VaultEntry>(
            "SELECT id, title, body, created_at, synced_at FROM vault_entries ORDER BY created_at DESC",
        )
        .fetch_all(self.pool)
        .await?;
        Ok(entries)
    }

    pub async fn count(&self) -> Result<i64, StoreError> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM vault_entries")
            .fetch_one(self.pool)
            .await?;
        Ok(n)
    }

    pub async fn unsynced_count(&self) -> Result<i64, StoreError> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM vault_entries WHERE synced_at IS NULL")
            .fetch_one(self.pool)
            .await?;
        Ok(n)
    }
}

pub struct OutboxRepo<'a> {
    pool: &'a SqlitePool,
}

impl OutboxRepo<'_> {
    /// Snapshot of all pending entries, oldest first.
    pub async fn all(&self) -> Result<Vec<OutboxEntry>, StoreError> {
        let entries = sqlx::query_as::<_, OutboxEntry>(
            "SELECT id, title, body, created_at FROM outbox ORDER BY created_at ASC",
        )
        .fetch_all(self.pool)
        .await?;
        Ok(entries)
    }

    pub async fn contains(&self, id: &str) -> Result<bool, StoreError> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM outbox WHERE id = ?")
            .bind(id)
            .fetch_one(self.pool)
            .await?;
        Ok(n > 0)
    }

    pub async fn count(&self) -> Result<i64, StoreError> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM outbox")
            .fetch_one(self.pool)
            .await?;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn enqueue_writes_vault_and_outbox() {
        let dir = tempdir().unwrap();
        let store = Store::open(&dir.path().join("vault.db")).await.unwrap();
        let entry = VaultEntry::new("t", "b").unwrap();
        store.enqueue_entry(&entry).await.unwrap();

        assert_eq!(store.vault().count().await.unwrap(), 1);
        assert!(store.outbox().contains(&entry.id).await.unwrap());
        let stored = store.vault().get(&entry.id).await.unwrap().unwrap();
        assert!(stored.synced_at.is_none());
    }

    #[tokio::test]
    async fn duplicate_enqueue_leaves_single_rows() {
        let dir = tempdir().unwrap();
        let store = Store::open(&dir.path().join("vault.db")).await.unwrap();
        let entry = VaultEntry::new("t", "b").unwrap();
        store.enqueue_entry(&entry).await.unwrap();
        assert!(store.enqueue_entry(&entry).await.is_err());
        assert_eq!(store.vault().count().await.unwrap(), 1);
        assert_eq!(store.outbox().count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn acknowledgement_is_idempotent_and_monotonic() {
        let dir = tempdir().unwrap();
        let store = Store::open(&dir.path().join("vault.db")).await.unwrap();
        let entry = VaultEntry::new("t", "b").unwrap();
        store.enqueue_entry(&entry).await.unwrap();

        let first = Utc::now();
        let ids = vec![entry.id.clone()];
        let out = store.apply_acknowledgement(&ids, first).await.unwrap();
        assert_eq!(out, AckOutcome { marked: 1, dequeued: 1 });

        let later = first + chrono::Duration::hours(1);
        let again = store.apply_acknowledgement(&ids, later).await.unwrap();
        assert_eq!(again, AckOutcome::default());

        let stored = store.vault().get(&entry.id).await.unwrap().unwrap();
        assert_eq!(
            stored.synced_at.map(|t| t.timestamp_millis()),
            Some(first.timestamp_millis())
        );
        assert_eq!(store.outbox().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn profile_roundtrips_template() {
        let dir = tempdir().unwrap();
        let store = Store::open(&dir.path().join("vault.db")).await.unwrap();
        assert!(store.profiles().get().await.unwrap().is_none());

        let mut profile = store.profiles().get_or_default().await.unwrap();
        profile.voice_template = Some(crate::voice::FeatureVector::normalized(vec![3.0, 4.0]));
        profile.threshold = 0.8;
        store.profiles().save(&profile).await.unwrap();

        let loaded = store.profiles().get().await.unwrap().unwrap();
        assert_eq!(loaded.voice_template, profile.voice_template);
        assert!((loaded.threshold - 0.8).abs() < 1e-6);
    }
}
