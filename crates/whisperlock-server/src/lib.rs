//! WhisperLock reconciliation server.
//!
//! Accepts outbox batches from clients, stores text and metadata only, and
//! notifies registered push endpoints after each accepted batch.

pub mod error;
pub mod keys;
pub mod push;
pub mod reconcile;
pub mod routes;
pub mod state;
pub mod store;

pub use error::{PushError, ServerError};
pub use keys::PushKeys;
pub use push::{PushSender, SignedHttpPush};
pub use routes::create_router;
pub use state::{AppState, SharedState};
pub use store::{ServerStore, SyncedRecord};
