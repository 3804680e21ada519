//! Push signing key pair.
//!
//! Resolution order: both halves from the environment, then the persisted
//! `push-keys.json`, then a fresh pair that is written there for next time.
//! Keys are Ed25519, exchanged as unpadded base64url.

use base64::{engine::general_purpose, Engine as _};
use ed25519_dalek::{Signer, SigningKey};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;
use whisperlock_core::json_file;
use zeroize::Zeroizing;

use crate::error::ServerError;

pub const DEFAULT_SUBJECT: &str = "mailto:whisperlock@example.com";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KeyFile {
    public_key: String,
    private_key: String,
    subject: String,
}

pub struct PushKeys {
    signing: SigningKey,
    subject: String,
}

impl PushKeys {
    pub fn generate(subject: &str) -> Self {
        Self {
            signing: SigningKey::generate(&mut rand::rngs::OsRng),
            subject: subject.to_string(),
        }
    }

    /// Rebuild from an encoded private key. When `public` is given it must
    /// match the key derived from `private`.
    pub fn from_encoded(
        public: Option<&str>,
        private: &str,
        subject: &str,
    ) -> Result<Self, ServerError> {
        let raw = Zeroizing::new(
            general_purpose::URL_SAFE_NO_PAD
                .decode(private.trim().trim_end_matches('='))
                .map_err(|e| ServerError::Key(format!("decode private key: {e}")))?,
        );
        let bytes: [u8; 32] = raw
            .as_slice()
            .try_into()
            .map_err(|_| ServerError::Key("private key length invalid".into()))?;
        let keys = Self {
            signing: SigningKey::from_bytes(&bytes),
            subject: subject.to_string(),
        };
        if let Some(public) = public {
            if public.trim().trim_end_matches('=') != keys.public_key() {
                return Err(ServerError::Key("public key does not match private key".into()));
            }
        }
        Ok(keys)
    }

    pub fn resolve(
        env_public: Option<&str>,
        env_private: Option<&str>,
        subject: &str,
        path: &Path,
    ) -> Result<Self, ServerError> {
        if let (Some(public), Some(private)) = (env_public, env_private) {
            return Self::from_encoded(Some(public), private, subject);
        }

        if path.exists() {
            let stored: Option<KeyFile> = json_file::read_or_default(path)?;
            if let Some(stored) = stored {
                return Self::from_encoded(
                    Some(&stored.public_key),
                    &stored.private_key,
                    &stored.subject,
                );
            }
        }

        let keys = Self::generate(subject);
        keys.persist(path)?;
        info!(path = %path.display(), "push signing key generated");
        Ok(keys)
    }

    fn persist(&self, path: &Path) -> Result<(), ServerError> {
        let file = KeyFile {
            public_key: self.public_key(),
            private_key: general_purpose::URL_SAFE_NO_PAD.encode(self.signing.to_bytes()),
            subject: self.subject.clone(),
        };
        json_file::write_atomic(path, &file)?;
        Ok(())
    }

    pub fn public_key(&self) -> String {
        general_purpose::URL_SAFE_NO_PAD.encode(self.signing.verifying_key().to_bytes())
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn sign(&self, message: &[u8]) -> String {
        general_purpose::URL_SAFE_NO_PAD.encode(self.signing.sign(message).to_bytes())
    }
}
