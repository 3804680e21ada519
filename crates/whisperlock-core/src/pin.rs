//! PIN fallback: salted SHA-256 digest stored on the profile.

use rand::RngCore;
use sha2::{Digest, Sha256};
use tracing::info;
use zeroize::Zeroizing;

use crate::error::PinError;
use crate::store::Store;

pub const PIN_MIN_LEN: usize = 4;
pub const PIN_MAX_LEN: usize = 8;

pub fn validate_pin(pin: &str) -> Result<(), PinError> {
    let len = pin.len();
    if !(PIN_MIN_LEN..=PIN_MAX_LEN).contains(&len) || !pin.bytes().all(|b| b.is_ascii_digit()) {
        return Err(PinError::InvalidFormat);
    }
    Ok(())
}

pub fn new_salt() -> String {
    let mut bytes = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub fn pin_digest(salt: &str, pin: &str) -> String {
    let material = Zeroizing::new(format!("{salt}:{pin}"));
    let mut hasher = Sha256::new();
    hasher.update(material.as_bytes());
    hex::encode(hasher.finalize())
}

/// Store a new PIN on the profile, creating the profile on first use.
pub async fn set_pin(store: &Store, pin: &str) -> Result<(), PinError> {
    let pin = pin.trim();
    validate_pin(pin)?;
    let mut profile = store.profiles().get_or_default().await?;
    let salt = new_salt();
    profile.pin_hash = Some(pin_digest(&salt, pin));
    profile.pin_salt = Some(salt);
    store.profiles().save(&profile).await?;
    info!("pin saved");
    Ok(())
}

pub async fn check_pin(store: &Store, pin: &str) -> Result<bool, PinError> {
    let profile = store.profiles().get().await?;
    match profile {
        Some(p) => match (p.pin_salt, p.pin_hash) {
            (Some(salt), Some(hash)) => Ok(pin_digest(&salt, pin.trim()) == hash),
            _ => Err(PinError::NotSet),
        },
        None => Err(PinError::NotSet),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn pin_format() {
        assert!(validate_pin("1234").is_ok());
        assert!(validate_pin("12345678").is_ok());
        assert!(validate_pin("123").is_err());
        assert!(validate_pin("123456789").is_err());
        assert!(validate_pin("12a4").is_err());
    }

    #[test]
    fn digest_depends_on_salt() {
        assert_ne!(pin_digest("a", "1234"), pin_digest("b", "1234"));
        assert_eq!(pin_digest("a", "1234").len(), 64);
    }

    #[tokio::test]
    async fn set_then_check() {
        let dir = tempdir().unwrap();
        let store = Store::open(&dir.path().join("vault.db")).await.unwrap();
        assert!(matches!(check_pin(&store, "1234").await, Err(PinError::NotSet)));

        set_pin(&store, "4321").await.unwrap();
        assert!(check_pin(&store, "4321").await.unwrap());
        assert!(!check_pin(&store, "1234").await.unwrap());
    }
}
