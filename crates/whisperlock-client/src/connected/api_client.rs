use anyhow::{anyhow, Result};
use async_trait::async_trait;
use whisperlock_core::protocol::{
    BatchEntry, OkResponse, PublicKeyResponse, SubscribeRequest, Subscription, SyncRequest,
    SyncResponse, HEALTH_PATH, PUBLIC_KEY_PATH, PUSH_TEST_PATH, SUBSCRIBE_PATH, SYNC_PATH,
};

use crate::agent::{Fetcher, StoredResponse};
use crate::reconciler::{Connectivity, SyncTransport};

#[derive(Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("whisperlock/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| anyhow!("http client: {e}"))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn health(&self) -> Result<()> {
        let res = self.client.get(self.url(HEALTH_PATH)).send().await?;
        if res.status().is_success() {
            return Ok(());
        }
        Err(anyhow!("health check failed with status {}", res.status()))
    }

    pub async fn sync_batch(&self, entries: &[BatchEntry]) -> Result<SyncResponse> {
        let res = self
            .client
            .post(self.url(SYNC_PATH))
            .json(&SyncRequest {
                entries: entries.to_vec(),
            })
            .send()
            .await?;
        if !res.status().is_success() {
            return Err(anyhow!("sync failed: {}", res.status()));
        }
        Ok(res.json().await?)
    }

    pub async fn public_key(&self) -> Result<String> {
        let res = self.client.get(self.url(PUBLIC_KEY_PATH)).send().await?;
        if !res.status().is_success() {
            return Err(anyhow!("public key fetch failed: {}", res.status()));
        }
        let body: PublicKeyResponse = res.json().await?;
        Ok(body.key)
    }

    pub async fn subscribe(&self, subscription: &Subscription) -> Result<()> {
        let res = self
            .client
            .post(self.url(SUBSCRIBE_PATH))
            .json(&SubscribeRequest {
                subscription: subscription.clone(),
            })
            .send()
            .await?;
        let status = res.status();
        let body: OkResponse = res.json().await.unwrap_or(OkResponse { ok: false });
        if status.is_success() && body.ok {
            return Ok(());
        }
        Err(anyhow!("subscribe rejected: {status}"))
    }

    pub async fn push_test(&self) -> Result<()> {
        let res = self.client.post(self.url(PUSH_TEST_PATH)).send().await?;
        if res.status().is_success() {
            return Ok(());
        }
        Err(anyhow!("push test failed: {}", res.status()))
    }
}

#[async_trait]
impl SyncTransport for ApiClient {
    async fn submit(&self, entries: &[BatchEntry]) -> Result<SyncResponse> {
        self.sync_batch(entries).await
    }
}

#[async_trait]
impl Connectivity for ApiClient {
    async fn is_online(&self) -> bool {
        self.health().await.is_ok()
    }
}

#[async_trait]
impl Fetcher for ApiClient {
    async fn fetch(&self, path: &str) -> Result<StoredResponse> {
        let res = self.client.get(self.url(path)).send().await?;
        let status = res.status().as_u16();
        let content_type = res
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = res.bytes().await?;
        Ok(StoredResponse::new(status, content_type, body))
    }
}
