//! whisperlock-client: outbox delivery, background cache agent and the
//! vault operations behind the `whisperlock` CLI.

pub mod agent;
pub mod connected;
pub mod reconciler;
pub mod retry;
pub mod vault_ops;

pub use agent::CacheAgent;
pub use connected::ApiClient;
pub use reconciler::{
    Connectivity, FlushReport, FlushStatus, Reconciler, StaticConnectivity, SyncTransport,
};
pub use retry::{FileRetryRegistry, MemoryRetryRegistry, RetryRegistry, SYNC_TAG};
