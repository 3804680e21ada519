//! Outbox delivery and reconciliation.
//!
//! `flush` reads the whole outbox, submits it as one batch and applies the
//! acknowledged ids in a single transaction. Flushes may overlap (manual,
//! reconnect and deferred triggers); they converge because the server accepts
//! resubmitted ids harmlessly and an outbox row is only removed after its id
//! came back in a response.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};
use whisperlock_core::protocol::{BatchEntry, SyncResponse};
use whisperlock_core::store::AckOutcome;
use whisperlock_core::{Store, StoreError, VaultEntry};

use crate::retry::{RetryRegistry, SYNC_TAG};

#[async_trait]
pub trait SyncTransport: Send + Sync {
    async fn submit(&self, entries: &[BatchEntry]) -> Result<SyncResponse>;
}

#[async_trait]
pub trait Connectivity: Send + Sync {
    async fn is_online(&self) -> bool;
}

/// Connectivity flag set by hand; used when the host reports network state
/// itself, and in tests.
#[derive(Debug)]
pub struct StaticConnectivity(AtomicBool);

impl StaticConnectivity {
    pub fn new(online: bool) -> Self {
        Self(AtomicBool::new(online))
    }

    pub fn set_online(&self, online: bool) {
        self.0.store(online, Ordering::SeqCst);
    }
}

#[async_trait]
impl Connectivity for StaticConnectivity {
    async fn is_online(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushStatus {
    /// Network judged unavailable; nothing was read or sent.
    Offline,
    /// Outbox was empty.
    Empty,
    Delivered,
    /// Transport error or non-success response. The outbox is untouched.
    DeliveryFailed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushReport {
    pub status: FlushStatus,
    pub submitted: usize,
    pub accepted_ids: Vec<String>,
    pub synced_at: Option<DateTime<Utc>>,
    pub applied: AckOutcome,
    /// Outbox size after the acknowledgement was applied.
    pub remaining: i64,
}

impl FlushReport {
    fn with_status(status: FlushStatus, submitted: usize) -> Self {
        Self {
            status,
            submitted,
            accepted_ids: vec![],
            synced_at: None,
            applied: AckOutcome::default(),
            remaining: 0,
        }
    }

    pub fn delivered(&self) -> bool {
        self.status == FlushStatus::Delivered
    }

    /// True when nothing is left to deliver, so a deferred retry is done.
    pub fn settled(&self) -> bool {
        match self.status {
            FlushStatus::Empty => true,
            FlushStatus::Delivered => self.remaining == 0,
            _ => false,
        }
    }
}

#[derive(Clone)]
pub struct Reconciler {
    store: Store,
    transport: Arc<dyn SyncTransport>,
    connectivity: Arc<dyn Connectivity>,
    retry: Arc<dyn RetryRegistry>,
}

impl Reconciler {
    pub fn new(
        store: Store,
        transport: Arc<dyn SyncTransport>,
        connectivity: Arc<dyn Connectivity>,
        retry: Arc<dyn RetryRegistry>,
    ) -> Self {
        Self {
            store,
            transport,
            connectivity,
            retry,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub async fn is_online(&self) -> bool {
        self.connectivity.is_online().await
    }

    /// Write `entry` to the vault and the outbox, then register a deferred
    /// retry. A failed registration is logged and does not undo the write.
    pub async fn enqueue(&self, entry: &VaultEntry) -> Result<(), StoreError> {
        self.store.enqueue_entry(entry).await?;
        debug!(id = %entry.id, "entry queued for delivery");
        self.schedule_retry();
        Ok(())
    }

    fn schedule_retry(&self) {
        if let Err(err) = self.retry.register(SYNC_TAG) {
            warn!(error = %err, "failed to register deferred retry");
        }
    }

    pub async fn flush(&self) -> Result<FlushReport, StoreError> {
        if !self.connectivity.is_online().await {
            debug!("offline; flush deferred");
            self.schedule_retry();
            return Ok(FlushReport::with_status(FlushStatus::Offline, 0));
        }

        let pending = self.store.outbox().all().await?;
        if pending.is_empty() {
            return Ok(FlushReport::with_status(FlushStatus::Empty, 0));
        }
        let batch: Vec<BatchEntry> = pending.iter().map(BatchEntry::from).collect();
        let submitted = batch.len();

        let response = match self.transport.submit(&batch).await {
            Ok(response) if response.ok => response,
            Ok(_) => return Ok(self.failed(submitted, "server reported failure".into())),
            Err(err) => return Ok(self.failed(submitted, err.to_string())),
        };

        let mut report = FlushReport::with_status(FlushStatus::Delivered, submitted);
        if !response.synced_ids.is_empty() {
            let synced_at = response.synced_at.unwrap_or_else(Utc::now);
            report.applied = self
                .store
                .apply_acknowledgement(&response.synced_ids, synced_at)
                .await?;
            report.synced_at = Some(synced_at);
        }
        report.accepted_ids = response.synced_ids;

        report.remaining = self.store.outbox().count().await?;
        if report.remaining > 0 {
            self.schedule_retry();
        }
        info!(
            submitted,
            accepted = report.accepted_ids.len(),
            marked = report.applied.marked,
            remaining = report.remaining,
            "outbox flushed"
        );
        Ok(report)
    }

    fn failed(&self, submitted: usize, reason: String) -> FlushReport {
        warn!(submitted, reason = %reason, "delivery failed; outbox kept");
        self.schedule_retry();
        FlushReport::with_status(FlushStatus::DeliveryFailed { reason }, submitted)
    }
}
