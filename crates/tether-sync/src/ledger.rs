//! # Location-Event Ledger
//!
//! Durable, at-least-once-safe tracking of geofence entry/exit events from
//! "recorded" through "uploaded". Survives process restarts (persisted
//! through the host's key-value store) and computes upload-latency
//! metrics.
//!
//! ## Ledger Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Location-Event Ledger                                │
//! │                                                                         │
//! │  key: tether.location_event.<record id>                                 │
//! │  value: { event, entry: { state, timestamp } }                          │
//! │                                                                         │
//! │  record_region_event        → Recorded      (+ Reported notification)   │
//! │  events_start_upload        → UploadStart                               │
//! │  events_successful_upload   → entry removed (terminal; latency logged)  │
//! │  events_error_upload:                                                   │
//! │    network class            → UploadError   (a future pass retries)     │
//! │    sanity threshold class   → entry dropped (bounded growth wins        │
//! │                               over retrying indefinitely)               │
//! │                                                                         │
//! │  delay(record_id, against)  → against − stored timestamp, seconds;      │
//! │                               −1 when the event is untracked            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Single-writer: the ledger is only ever touched from the reporter's
//! serialized context (and the regions monitor's recording path); it does
//! no locking of its own beyond what the key-value store provides.
//! Concurrent external access is not supported.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use tether_core::{LedgerEntry, RegionEvent, RegionEventState};

use crate::error::SyncError;
use crate::publisher::EventPublisher;
use crate::registry::KeyValueStore;

/// Key prefix for ledger entries in the host's key-value store.
const LEDGER_KEY_PREFIX: &str = "tether.location_event.";

/// Delay value for events the ledger does not track: "unknown/never
/// recorded", not zero.
pub const DELAY_UNTRACKED: i64 = -1;

// =============================================================================
// Notifications
// =============================================================================

/// Published by the store as events move through it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerNotification {
    /// A region event was recorded.
    Reported { record_id: Uuid },
}

// =============================================================================
// Location Event Store
// =============================================================================

/// Persisted ledger value. Carries the full event so the upload queue can
/// be rebuilt after a process restart, not just the upload progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredEvent {
    event: RegionEvent,
    entry: LedgerEntry,
}

/// The persisted ledger of region events and their upload status.
pub struct LocationEventStore {
    store: Arc<dyn KeyValueStore>,
    notifications: EventPublisher<LedgerNotification>,
}

impl LocationEventStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        LocationEventStore {
            store,
            notifications: EventPublisher::new(),
        }
    }

    /// The publisher ledger notifications go out on.
    pub fn notifications(&self) -> EventPublisher<LedgerNotification> {
        self.notifications.clone()
    }

    fn key(record_id: Uuid) -> String {
        format!("{LEDGER_KEY_PREFIX}{record_id}")
    }

    async fn read(&self, record_id: Uuid) -> Option<LedgerEntry> {
        let value = self.store.get(&Self::key(record_id)).await?;
        let stored: StoredEvent = serde_json::from_value(value).ok()?;
        Some(stored.entry)
    }

    async fn write(&self, event: &RegionEvent, entry: LedgerEntry) {
        let stored = StoredEvent {
            event: event.clone(),
            entry,
        };
        match serde_json::to_value(stored) {
            Ok(value) => self.store.set(&Self::key(event.record_id), value).await,
            Err(error) => {
                warn!(record_id = %event.record_id, %error, "Failed to serialize ledger entry")
            }
        }
    }

    /// Writes a `Recorded` entry for the event and emits a notification.
    pub async fn record_region_event(&self, event: &RegionEvent, at: DateTime<Utc>) {
        debug!(record_id = %event.record_id, kind = %event.kind, "Recording region event");
        self.write(event, LedgerEntry::recorded(at)).await;
        self.notifications.on_next(LedgerNotification::Reported {
            record_id: event.record_id,
        });
    }

    /// Stamps the given events as having an upload in flight.
    pub async fn events_start_upload(&self, events: &[RegionEvent], at: DateTime<Utc>) {
        for event in events {
            let entry = self
                .read(event.record_id)
                .await
                .unwrap_or_else(|| LedgerEntry::recorded(at));
            self.write(event, entry.transitioned(RegionEventState::UploadStart, at))
                .await;
        }
    }

    /// Terminal: removes the entries and logs the end-to-end latency.
    pub async fn events_successful_upload(&self, events: &[RegionEvent], at: DateTime<Utc>) {
        for event in events {
            let delay_secs = self.delay_seconds(event.record_id, at).await;
            info!(
                record_id = %event.record_id,
                delay_secs,
                "Region event uploaded"
            );
            self.store.remove(&Self::key(event.record_id)).await;
        }
    }

    /// Failure transition. A network-class error re-stamps the entry as
    /// `UploadError` so a future pass can retry it and compute an accurate
    /// delay; the sanity-threshold class drops the entry outright.
    pub async fn events_error_upload(
        &self,
        events: &[RegionEvent],
        at: DateTime<Utc>,
        error: &SyncError,
    ) {
        if error.is_sanity_threshold() {
            warn!(count = events.len(), %error, "Dropping region events");
            for event in events {
                self.store.remove(&Self::key(event.record_id)).await;
            }
            return;
        }

        for event in events {
            let entry = self
                .read(event.record_id)
                .await
                .unwrap_or_else(|| LedgerEntry::recorded(at));
            self.write(event, entry.transitioned(RegionEventState::UploadError, at))
                .await;
        }
    }

    /// Seconds between the stored timestamp and `against`, or
    /// [`DELAY_UNTRACKED`] when the event is not in the ledger.
    pub async fn delay_seconds(&self, record_id: Uuid, against: DateTime<Utc>) -> i64 {
        match self.read(record_id).await {
            Some(entry) => (against - entry.timestamp).num_seconds(),
            None => DELAY_UNTRACKED,
        }
    }

    /// Number of entries currently tracked.
    pub async fn tracked_count(&self) -> usize {
        self.store.keys_with_prefix(LEDGER_KEY_PREFIX).await.len()
    }

    /// Every event still tracked, oldest first. After a process restart
    /// this is the upload queue the previous process never flushed.
    pub async fn pending_events(&self) -> Vec<RegionEvent> {
        let mut pending = Vec::new();
        for key in self.store.keys_with_prefix(LEDGER_KEY_PREFIX).await {
            let Some(value) = self.store.get(&key).await else {
                continue;
            };
            match serde_json::from_value::<StoredEvent>(value) {
                Ok(stored) => pending.push(stored),
                Err(error) => warn!(key, %error, "Skipping unreadable ledger entry"),
            }
        }
        pending.sort_by_key(|stored| stored.event.occurred_at);
        pending.into_iter().map(|stored| stored.event).collect()
    }

    /// Clears the ledger (sign-out path).
    pub async fn clear(&self) {
        for key in self.store.keys_with_prefix(LEDGER_KEY_PREFIX).await {
            self.store.remove(&key).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::InMemoryKeyValueStore;
    use tether_core::RegionEventKind;

    fn event() -> RegionEvent {
        RegionEvent::new(RegionEventKind::Entry, Utc::now(), "t-1")
    }

    fn store() -> LocationEventStore {
        LocationEventStore::new(Arc::new(InMemoryKeyValueStore::new()))
    }

    #[tokio::test]
    async fn test_recorded_event_has_computable_delay() {
        let ledger = store();
        let e = event();
        let t0 = Utc::now();

        ledger.record_region_event(&e, t0).await;
        let delay = ledger
            .delay_seconds(e.record_id, t0 + chrono::Duration::seconds(12))
            .await;
        assert_eq!(delay, 12);
    }

    #[tokio::test]
    async fn test_untracked_event_delay_is_minus_one() {
        let ledger = store();
        assert_eq!(
            ledger.delay_seconds(Uuid::new_v4(), Utc::now()).await,
            DELAY_UNTRACKED
        );
    }

    #[tokio::test]
    async fn test_sanity_threshold_drops_the_entry() {
        let ledger = store();
        let e = event();
        let now = Utc::now();

        ledger.record_region_event(&e, now).await;
        ledger
            .events_error_upload(
                std::slice::from_ref(&e),
                now,
                &SyncError::SanityThresholdExceeded {
                    count: 120,
                    threshold: 100,
                },
            )
            .await;

        assert_eq!(ledger.delay_seconds(e.record_id, now).await, DELAY_UNTRACKED);
        assert_eq!(ledger.tracked_count().await, 0);
    }

    #[tokio::test]
    async fn test_network_error_keeps_the_entry_tracked() {
        let ledger = store();
        let e = event();
        let t0 = Utc::now();
        let t1 = t0 + chrono::Duration::seconds(3);

        ledger.record_region_event(&e, t0).await;
        ledger
            .events_error_upload(
                std::slice::from_ref(&e),
                t1,
                &SyncError::Network("timeout".into()),
            )
            .await;

        let delay = ledger
            .delay_seconds(e.record_id, t1 + chrono::Duration::seconds(4))
            .await;
        assert_eq!(delay, 4);
        assert_eq!(ledger.tracked_count().await, 1);
    }

    #[tokio::test]
    async fn test_successful_upload_is_terminal() {
        let ledger = store();
        let e = event();
        let now = Utc::now();

        ledger.record_region_event(&e, now).await;
        ledger.events_start_upload(std::slice::from_ref(&e), now).await;
        ledger
            .events_successful_upload(std::slice::from_ref(&e), now)
            .await;

        assert_eq!(ledger.delay_seconds(e.record_id, now).await, DELAY_UNTRACKED);
    }

    #[tokio::test]
    async fn test_record_emits_reported_notification() {
        let ledger = store();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        ledger.notifications().add_subscriber(move |n| {
            let _ = tx.send(n);
        });

        let e = event();
        ledger.record_region_event(&e, Utc::now()).await;

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(
            rx.try_recv().unwrap(),
            LedgerNotification::Reported {
                record_id: e.record_id
            }
        );
    }

    #[tokio::test]
    async fn test_pending_events_survive_and_drain() {
        let ledger = store();
        let t0 = Utc::now();
        let older = RegionEvent::new(RegionEventKind::Entry, t0, "t-1");
        let newer =
            RegionEvent::new(RegionEventKind::Exit, t0 + chrono::Duration::seconds(9), "t-1");

        // Record out of order; pending comes back oldest first.
        ledger.record_region_event(&newer, t0).await;
        ledger.record_region_event(&older, t0).await;
        let pending = ledger.pending_events().await;
        assert_eq!(
            pending.iter().map(|e| e.record_id).collect::<Vec<_>>(),
            vec![older.record_id, newer.record_id]
        );

        ledger
            .events_successful_upload(std::slice::from_ref(&older), t0)
            .await;
        let pending = ledger.pending_events().await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0], newer);
    }

    #[tokio::test]
    async fn test_clear_removes_everything() {
        let ledger = store();
        let now = Utc::now();
        for _ in 0..3 {
            ledger.record_region_event(&event(), now).await;
        }
        assert_eq!(ledger.tracked_count().await, 3);
        ledger.clear().await;
        assert_eq!(ledger.tracked_count().await, 0);
    }
}
