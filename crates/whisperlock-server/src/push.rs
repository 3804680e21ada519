//! Push delivery to registered endpoints.
//!
//! Each notification is POSTed as JSON to the subscription endpoint with an
//! Ed25519 signature over the body, so the receiver can check it came from
//! the key published at `/api/vapidPublicKey`.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use whisperlock_core::protocol::{NotificationPayload, Subscription};

use crate::error::PushError;
use crate::keys::PushKeys;

pub const SIGNATURE_HEADER: &str = "x-whisperlock-signature";
pub const KEY_HEADER: &str = "x-whisperlock-key";
pub const SUBJECT_HEADER: &str = "x-whisperlock-subject";

#[async_trait]
pub trait PushSender: Send + Sync {
    async fn send(
        &self,
        subscription: &Subscription,
        payload: &NotificationPayload,
    ) -> Result<(), PushError>;
}

pub struct SignedHttpPush {
    client: reqwest::Client,
    keys: Arc<PushKeys>,
}

impl SignedHttpPush {
    pub fn new(keys: Arc<PushKeys>) -> Result<Self, PushError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| PushError::Client(e.to_string()))?;
        Ok(Self { client, keys })
    }
}

#[async_trait]
impl PushSender for SignedHttpPush {
    async fn send(
        &self,
        subscription: &Subscription,
        payload: &NotificationPayload,
    ) -> Result<(), PushError> {
        let invalid = |reason: String| PushError::InvalidSubscription {
            endpoint: subscription.endpoint.clone(),
            reason,
        };
        let body = serde_json::to_vec(payload).map_err(|e| invalid(e.to_string()))?;
        let res = self
            .client
            .post(&subscription.endpoint)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(SIGNATURE_HEADER, self.keys.sign(&body))
            .header(KEY_HEADER, self.keys.public_key())
            .header(SUBJECT_HEADER, self.keys.subject())
            .body(body)
            .send()
            .await
            .map_err(|e| invalid(e.to_string()))?;
        if !res.status().is_success() {
            return Err(invalid(format!("status {}", res.status())));
        }
        Ok(())
    }
}

/// Send `payload` to every subscription and return the endpoints that
/// failed. One failure does not stop delivery to the rest.
pub async fn deliver_all(
    sender: &dyn PushSender,
    subscriptions: &[Subscription],
    payload: &NotificationPayload,
) -> Vec<String> {
    let mut failed = Vec::new();
    for sub in subscriptions {
        match sender.send(sub, payload).await {
            Ok(()) => debug!(endpoint = %sub.endpoint, "push delivered"),
            Err(err) => {
                warn!(error = %err, "push failed; subscription pruned");
                failed.push(sub.endpoint.clone());
            }
        }
    }
    failed
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl PushSender for Recorder {
        async fn send(
            &self,
            subscription: &Subscription,
            _payload: &NotificationPayload,
        ) -> Result<(), PushError> {
            self.sent.lock().unwrap().push(subscription.endpoint.clone());
            if subscription.endpoint.contains("gone") {
                return Err(PushError::InvalidSubscription {
                    endpoint: subscription.endpoint.clone(),
                    reason: "status 410 Gone".into(),
                });
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn failing_endpoints_are_pruned() {
        let sender = Recorder::default();
        let subs = vec![
            Subscription::new("https://push/a"),
            Subscription::new("https://push/gone"),
            Subscription::new("https://push/b"),
        ];
        let failed = deliver_all(&sender, &subs, &NotificationPayload::new("t", "b")).await;
        assert_eq!(failed, vec!["https://push/gone".to_string()]);
        assert_eq!(sender.sent.lock().unwrap().len(), 3);
    }
}
