//! Background cache agent.
//!
//! Sits between the client and the network: it answers reads from cache
//! partitions according to the request class, runs registered deferred
//! retries against the reconciler, and turns push payloads into
//! notifications. It runs without any open client view.

pub mod cache;
pub mod notify;

pub use cache::{CacheStorage, Fetcher, StoredResponse, API_CACHE, APP_CACHE, PRECACHE};
pub use notify::{
    route_click, ClickOutcome, ClientWindows, LogNotifier, MemoryWindows, Notification, Notifier,
    WindowId,
};

use anyhow::{anyhow, Result};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};
use whisperlock_core::protocol::NotificationPayload;

use crate::reconciler::{FlushReport, Reconciler};
use crate::retry::{RetryRegistry, SYNC_TAG};

/// Shell document served for every navigation.
pub const SHELL_PATH: &str = "/index.html";
const API_PREFIX: &str = "/api/";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentRequest {
    pub method: String,
    pub path: String,
    /// Top-level navigation rather than a subresource or API call.
    pub navigate: bool,
}

impl AgentRequest {
    pub fn get(path: &str) -> Self {
        Self {
            method: "GET".into(),
            path: path.into(),
            navigate: false,
        }
    }

    pub fn navigate(path: &str) -> Self {
        Self {
            navigate: true,
            ..Self::get(path)
        }
    }

    pub fn post(path: &str) -> Self {
        Self {
            method: "POST".into(),
            ..Self::get(path)
        }
    }

    fn is_get(&self) -> bool {
        self.method.eq_ignore_ascii_case("GET")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Cache-first on the shell document, whatever was navigated to.
    Shell,
    StaleWhileRevalidate,
    CacheFirst,
    /// Not intercepted.
    Passthrough,
}

pub fn select_strategy(req: &AgentRequest) -> Strategy {
    if req.navigate {
        Strategy::Shell
    } else if !req.is_get() {
        Strategy::Passthrough
    } else if req.path.starts_with(API_PREFIX) {
        Strategy::StaleWhileRevalidate
    } else {
        Strategy::CacheFirst
    }
}

pub struct CacheAgent {
    cache: Arc<CacheStorage>,
    fetcher: Arc<dyn Fetcher>,
    reconciler: Reconciler,
    retry: Arc<dyn RetryRegistry>,
    notifier: Arc<dyn Notifier>,
    windows: Arc<dyn ClientWindows>,
}

impl CacheAgent {
    pub fn new(
        cache: Arc<CacheStorage>,
        fetcher: Arc<dyn Fetcher>,
        reconciler: Reconciler,
        retry: Arc<dyn RetryRegistry>,
        notifier: Arc<dyn Notifier>,
        windows: Arc<dyn ClientWindows>,
    ) -> Self {
        Self {
            cache,
            fetcher,
            reconciler,
            retry,
            notifier,
            windows,
        }
    }

    pub fn cache(&self) -> &CacheStorage {
        &self.cache
    }

    /// Fetch the shell manifest into [`APP_CACHE`]. Nothing is stored unless
    /// every resource arrived with a success status.
    pub async fn install(&self) -> Result<()> {
        let mut items = Vec::with_capacity(PRECACHE.len());
        for path in PRECACHE {
            let response = self.fetcher.fetch(path).await?;
            if !response.is_ok() {
                return Err(anyhow!("precache {path} failed with status {}", response.status));
            }
            items.push((path.to_string(), response));
        }
        self.cache.put_all(APP_CACHE, items)?;
        info!(resources = PRECACHE.len(), "shell precached");
        Ok(())
    }

    /// Precache the shell unless the current generation already holds it.
    /// Returns whether an install ran.
    pub async fn ensure_installed(&self) -> Result<bool> {
        if self.cache.names().iter().any(|n| n == APP_CACHE) {
            return Ok(false);
        }
        self.install().await?;
        Ok(true)
    }

    /// Drop every partition that is not part of the current generation.
    pub fn activate(&self) -> Result<Vec<String>> {
        let mut deleted = Vec::new();
        for name in self.cache.names() {
            if name != APP_CACHE && name != API_CACHE {
                self.cache.delete(&name)?;
                deleted.push(name);
            }
        }
        if !deleted.is_empty() {
            info!(?deleted, "stale cache partitions removed");
        }
        Ok(deleted)
    }

    /// Answer an intercepted request. `Ok(None)` means the agent does not
    /// handle this request and the caller should go to the network itself.
    pub async fn handle_request(&self, req: &AgentRequest) -> Result<Option<StoredResponse>> {
        match select_strategy(req) {
            Strategy::Shell => self.cache_first(SHELL_PATH).await.map(Some),
            Strategy::StaleWhileRevalidate => Ok(Some(self.stale_while_revalidate(&req.path).await)),
            Strategy::CacheFirst => self.cache_first(&req.path).await.map(Some),
            Strategy::Passthrough => Ok(None),
        }
    }

    async fn cache_first(&self, path: &str) -> Result<StoredResponse> {
        if let Some(hit) = self.cache.get(APP_CACHE, path) {
            debug!(path, "cache hit");
            return Ok(hit);
        }
        debug!(path, "cache miss");
        let response = self.fetcher.fetch(path).await?;
        if response.is_ok() {
            self.cache.put(APP_CACHE, path, response.clone())?;
        }
        Ok(response)
    }

    async fn stale_while_revalidate(&self, path: &str) -> StoredResponse {
        if let Some(hit) = self.cache.get(API_CACHE, path) {
            let cache = self.cache.clone();
            let fetcher = self.fetcher.clone();
            let path = path.to_string();
            tokio::spawn(async move {
                revalidate(&cache, fetcher.as_ref(), &path).await;
            });
            return hit;
        }
        revalidate(&self.cache, self.fetcher.as_ref(), path)
            .await
            .unwrap_or_else(StoredResponse::not_ok)
    }

    /// Run the handler for a deferred retry. The tag is cleared only once the
    /// flush has drained the outbox; otherwise it stays pending.
    pub async fn handle_retry(&self, tag: &str) -> Result<Option<FlushReport>> {
        if tag != SYNC_TAG {
            debug!(tag, "unknown retry tag ignored");
            self.retry.complete(tag)?;
            return Ok(None);
        }
        let report = self.reconciler.flush().await?;
        if report.settled() {
            self.retry.complete(tag)?;
        }
        Ok(Some(report))
    }

    pub async fn run_pending_retries(&self) -> Result<Vec<FlushReport>> {
        let mut reports = Vec::new();
        for tag in self.retry.pending()? {
            if let Some(report) = self.handle_retry(&tag).await? {
                reports.push(report);
            }
        }
        Ok(reports)
    }

    pub fn handle_push(&self, data: Option<&[u8]>) -> Result<Notification> {
        let payload = data
            .map(NotificationPayload::parse_lenient)
            .unwrap_or_default();
        let notification = Notification::from(payload);
        self.notifier.show(&notification)?;
        Ok(notification)
    }

    pub fn handle_notification_click(&self, notification: &Notification) -> Result<ClickOutcome> {
        route_click(self.windows.as_ref(), &notification.url)
    }

    /// Agent loop. Every tick runs pending retries, and a transition from
    /// offline to online triggers an immediate flush. Returns when `shutdown`
    /// resolves.
    pub async fn run(&self, tick: Duration, shutdown: impl Future<Output = ()>) {
        tokio::pin!(shutdown);
        let mut ticker = time::interval(tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut was_online = false;
        info!(tick_secs = tick.as_secs(), "cache agent running");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let online = self.reconciler.is_online().await;
                    if online && !was_online {
                        info!("connectivity restored");
                        if let Err(err) = self.reconciler.flush().await {
                            warn!(error = %err, "reconnect flush failed");
                        }
                    }
                    was_online = online;
                    if let Err(err) = self.run_pending_retries().await {
                        warn!(error = %err, "deferred retry failed");
                    }
                }
                _ = &mut shutdown => {
                    info!("cache agent stopping");
                    break;
                }
            }
        }
    }
}

/// Fetch `path` and store it in [`API_CACHE`] when the answer is a success.
/// Transport failures yield `None`.
async fn revalidate(cache: &CacheStorage, fetcher: &dyn Fetcher, path: &str) -> Option<StoredResponse> {
    match fetcher.fetch(path).await {
        Ok(response) => {
            if response.is_ok() {
                if let Err(err) = cache.put(API_CACHE, path, response.clone()) {
                    warn!(path, error = %err, "api cache write failed");
                }
            }
            Some(response)
        }
        Err(err) => {
            debug!(path, error = %err, "api fetch failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_by_request_class() {
        assert_eq!(select_strategy(&AgentRequest::navigate("/vault")), Strategy::Shell);
        assert_eq!(
            select_strategy(&AgentRequest::get("/api/vapidPublicKey")),
            Strategy::StaleWhileRevalidate
        );
        assert_eq!(select_strategy(&AgentRequest::get("/styles.css")), Strategy::CacheFirst);
        assert_eq!(select_strategy(&AgentRequest::post("/api/sync")), Strategy::Passthrough);
        assert_eq!(select_strategy(&AgentRequest::post("/styles.css")), Strategy::Passthrough);
    }
}
