use anyhow::{anyhow, Result};
use base64::{engine::general_purpose, Engine as _};
use serde_json::Value;
use tracing::info;
use whisperlock_core::protocol::Subscription;

use super::ApiClient;

/// Decode a base64url key, accepting it with or without padding.
pub fn decode_server_key(key: &str) -> Result<Vec<u8>> {
    general_purpose::URL_SAFE_NO_PAD
        .decode(key.trim().trim_end_matches('='))
        .map_err(|e| anyhow!("decode server key: {e}"))
}

/// Build the descriptor registered with the server for `endpoint`.
pub fn build_subscription(endpoint: &str, server_key: &[u8]) -> Result<Subscription> {
    let endpoint = endpoint.trim();
    if endpoint.is_empty() {
        return Err(anyhow!("push endpoint must not be empty"));
    }
    let mut subscription = Subscription::new(endpoint);
    subscription.extra.insert(
        "applicationServerKey".into(),
        Value::String(general_purpose::URL_SAFE_NO_PAD.encode(server_key)),
    );
    Ok(subscription)
}

/// Fetch the server's signing key, then register `endpoint` against it.
pub async fn enable_push(client: &ApiClient, endpoint: &str) -> Result<Subscription> {
    let key = client.public_key().await?;
    let key_bytes = decode_server_key(&key)?;
    if key_bytes.len() != 32 {
        return Err(anyhow!("server key has unexpected length {}", key_bytes.len()));
    }
    let subscription = build_subscription(endpoint, &key_bytes)?;
    client.subscribe(&subscription).await?;
    info!(endpoint = %subscription.endpoint, "push subscription registered");
    Ok(subscription)
}
