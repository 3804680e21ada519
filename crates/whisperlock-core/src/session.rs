//! Lock state of the vault.
//!
//! Vault operations take an [`UnlockedSession`] by reference. The only way to
//! obtain one is through a successful PIN check or an accepted voice
//! verification, so there is no ambient "unlocked" flag to forget about.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::error::PinError;
use crate::pin::check_pin;
use crate::store::Store;
use crate::voice::Verification;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UnlockMethod {
    Pin,
    Voice,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnlockedSession {
    method: UnlockMethod,
    unlocked_at: DateTime<Utc>,
}

impl UnlockedSession {
    pub fn method(&self) -> UnlockMethod {
        self.method
    }

    pub fn unlocked_at(&self) -> DateTime<Utc> {
        self.unlocked_at
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SessionState {
    #[default]
    Locked,
    Unlocked(UnlockedSession),
}

impl SessionState {
    pub fn is_unlocked(&self) -> bool {
        matches!(self, SessionState::Unlocked(_))
    }

    pub fn unlocked(&self) -> Option<&UnlockedSession> {
        match self {
            SessionState::Unlocked(s) => Some(s),
            SessionState::Locked => None,
        }
    }

    pub fn lock(&mut self) {
        *self = SessionState::Locked;
    }

    fn grant(&mut self, method: UnlockMethod) {
        info!(?method, "vault unlocked");
        *self = SessionState::Unlocked(UnlockedSession {
            method,
            unlocked_at: Utc::now(),
        });
    }

    /// Unlock with the PIN fallback. A wrong PIN leaves the session locked.
    pub async fn unlock_with_pin(&mut self, store: &Store, pin: &str) -> Result<bool, PinError> {
        if check_pin(store, pin).await? {
            self.grant(UnlockMethod::Pin);
            Ok(true)
        } else {
            self.lock();
            Ok(false)
        }
    }

    /// Apply a voice verification. A rejected one locks the session.
    pub fn apply_verification(&mut self, verification: &Verification) -> bool {
        if verification.accepted() {
            self.grant(UnlockMethod::Voice);
            true
        } else {
            self.lock();
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pin::set_pin;
    use tempfile::tempdir;

    #[tokio::test]
    async fn pin_unlock_and_relock() {
        let dir = tempdir().unwrap();
        let store = Store::open(&dir.path().join("vault.db")).await.unwrap();
        set_pin(&store, "2468").await.unwrap();

        let mut session = SessionState::default();
        assert!(!session.is_unlocked());
        assert!(!session.unlock_with_pin(&store, "1111").await.unwrap());
        assert!(session.unlocked().is_none());

        assert!(session.unlock_with_pin(&store, "2468").await.unwrap());
        assert_eq!(session.unlocked().unwrap().method(), UnlockMethod::Pin);

        session.lock();
        assert_eq!(session, SessionState::Locked);
    }
}
