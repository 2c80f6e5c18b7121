//! # Location-Event Reporter
//!
//! The synchronization subscriber that uploads recorded region events.
//! Events queue up between runs (the regions monitor records them as
//! crossings arrive); each run drains the queue in one batch. The first
//! pass re-queues whatever the ledger still holds, so events recorded
//! before a process restart are uploaded too.
//!
//! ## Upload Pass
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  perform_synchronization                                                │
//! │                                                                         │
//! │  queue empty            → NoData                                        │
//! │  queue > sanity bound   → drop batch, ledger entries removed, NoData    │
//! │                           (absorbed locally, never escalated to the     │
//! │                            run's aggregate)                             │
//! │  upload ok              → ledger entries removed, latency logged,       │
//! │                           NoData (uploads are outbound, not new data)   │
//! │  upload failed          → ledger re-stamped UploadError, batch          │
//! │                           re-queued for the next run, error reported    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use tether_core::{RegionEvent, SyncSource};

use crate::error::{SyncError, SyncResult};
use crate::ledger::LocationEventStore;
use crate::subscriber::{SubscriberReport, SyncSubscriber};

// =============================================================================
// Uploader Seam
// =============================================================================

/// Backend transport for region events; host- or backend-client-provided.
#[async_trait]
pub trait RegionEventUploader: Send + Sync {
    /// Uploads one batch. All-or-nothing: a failure leaves the whole
    /// batch unconfirmed.
    async fn upload(&self, events: &[RegionEvent]) -> SyncResult<()>;
}

// =============================================================================
// Reporter
// =============================================================================

/// Queues region events and uploads them on each synchronization run.
pub struct LocationEventReporter {
    store: Arc<LocationEventStore>,
    uploader: Arc<dyn RegionEventUploader>,
    queue: Mutex<Vec<RegionEvent>>,
    restored: AtomicBool,
    sanity_threshold: usize,
}

impl LocationEventReporter {
    pub fn new(
        store: Arc<LocationEventStore>,
        uploader: Arc<dyn RegionEventUploader>,
        sanity_threshold: usize,
    ) -> Self {
        LocationEventReporter {
            store,
            uploader,
            queue: Mutex::new(Vec::new()),
            restored: AtomicBool::new(false),
            sanity_threshold,
        }
    }

    /// Re-queues the ledger entries a previous process recorded but never
    /// uploaded. Runs once, ahead of the first upload pass.
    async fn restore_persisted(&self) {
        let persisted = self.store.pending_events().await;
        if persisted.is_empty() {
            return;
        }
        let mut queue = self.queue.lock().await;
        let queued: HashSet<Uuid> = queue.iter().map(|e| e.record_id).collect();
        let mut restored: Vec<RegionEvent> = persisted
            .into_iter()
            .filter(|e| !queued.contains(&e.record_id))
            .collect();
        if restored.is_empty() {
            return;
        }
        info!(count = restored.len(), "Restoring recorded region events");
        // Persisted events predate anything recorded in this process.
        restored.extend(queue.drain(..));
        *queue = restored;
    }

    /// Records one region crossing: ledger first, then the upload queue.
    pub async fn record(&self, event: RegionEvent) {
        self.store.record_region_event(&event, Utc::now()).await;
        self.queue.lock().await.push(event);
    }

    /// Events waiting for the next upload pass.
    pub async fn pending_count(&self) -> usize {
        self.queue.lock().await.len()
    }

    /// The ledger behind this reporter.
    pub fn store(&self) -> &LocationEventStore {
        &self.store
    }
}

#[async_trait]
impl SyncSubscriber for LocationEventReporter {
    fn name(&self) -> &str {
        "location_events"
    }

    fn should_participate(&self, _source: SyncSource) -> bool {
        // Any run is a chance to flush the queue.
        true
    }

    async fn perform_synchronization(&self, _source: SyncSource) -> SubscriberReport {
        if !self.restored.swap(true, Ordering::SeqCst) {
            self.restore_persisted().await;
        }
        let events: Vec<RegionEvent> = {
            let mut queue = self.queue.lock().await;
            queue.drain(..).collect()
        };
        if events.is_empty() {
            return SubscriberReport::no_data();
        }

        let now = Utc::now();
        if events.len() > self.sanity_threshold {
            // Something upstream is stuck; bound the ledger instead of
            // retrying an ever-growing batch.
            let error = SyncError::SanityThresholdExceeded {
                count: events.len(),
                threshold: self.sanity_threshold,
            };
            self.store.events_error_upload(&events, now, &error).await;
            return SubscriberReport::no_data();
        }

        debug!(count = events.len(), "Uploading region events");
        self.store.events_start_upload(&events, now).await;

        match self.uploader.upload(&events).await {
            Ok(()) => {
                self.store.events_successful_upload(&events, Utc::now()).await;
                // Outbound only; nothing new was fetched.
                SubscriberReport::no_data()
            }
            Err(error) => {
                warn!(count = events.len(), %error, "Region event upload failed");
                self.store
                    .events_error_upload(&events, Utc::now(), &error)
                    .await;
                // Re-queue so the next run retries the batch.
                self.queue.lock().await.extend(events);
                SubscriberReport::failed(error)
            }
        }
    }

    async fn reset(&self) {
        self.queue.lock().await.clear();
        self.store.clear().await;
    }
}
