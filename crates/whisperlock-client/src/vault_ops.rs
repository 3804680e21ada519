//! Vault operations. Each one takes the caller's session state and refuses to
//! run while it is locked.

use whisperlock_core::{SessionState, StoreError, UnlockedSession, VaultEntry};

use crate::reconciler::Reconciler;

fn require_unlocked(session: &SessionState) -> Result<&UnlockedSession, StoreError> {
    session.unlocked().ok_or(StoreError::Locked)
}

/// Create an entry and queue it for delivery. Delivery itself is left to the
/// caller (an immediate flush when online, the deferred retry otherwise).
pub async fn create_entry(
    reconciler: &Reconciler,
    session: &SessionState,
    title: &str,
    body: &str,
) -> Result<VaultEntry, StoreError> {
    require_unlocked(session)?;
    let entry = VaultEntry::new(title, body)?;
    reconciler.enqueue(&entry).await?;
    Ok(entry)
}

/// All entries, newest first.
pub async fn list_entries(
    reconciler: &Reconciler,
    session: &SessionState,
) -> Result<Vec<VaultEntry>, StoreError> {
    require_unlocked(session)?;
    reconciler.store().vault().all().await
}

pub fn sync_label(entry: &VaultEntry) -> &'static str {
    if entry.is_synced() {
        "SYNCED"
    } else {
        "LOCAL"
    }
}
