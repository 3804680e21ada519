//! Everything that talks to the reconciliation server.

mod api_client;
pub mod push;

pub use api_client::ApiClient;
pub use push::enable_push;
