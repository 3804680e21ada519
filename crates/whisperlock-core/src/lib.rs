//! whisperlock-core: local vault model, storage and voice signature matching.
//!
//! The crate owns everything that lives on the client device:
//! - the SQLite-backed [`Store`] with its three collections (profile, vault, outbox),
//! - the PIN digest and the [`SessionState`] capability that gates vault writes,
//! - the voice signature matcher ([`voice`]),
//! - wire types shared with the reconciliation server ([`protocol`]).

pub mod error;
pub mod json_file;
pub mod models;
pub mod paths;
pub mod pin;
pub mod protocol;
pub mod session;
pub mod settings;
pub mod store;
pub mod voice;

pub use error::{PinError, StoreError, VoiceError};
pub use models::{OutboxEntry, Profile, VaultEntry, PROFILE_ID};
pub use session::{SessionState, UnlockMethod, UnlockedSession};
pub use settings::Settings;
pub use store::Store;
