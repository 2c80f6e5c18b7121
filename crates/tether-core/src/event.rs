//! # Region Events and the Ledger State Machine
//!
//! Every geofence entry/exit becomes a [`RegionEvent`], immutable once
//! created, and is tracked through upload by a persisted ledger entry.
//!
//! ## Ledger States
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Location-Event Ledger                                │
//! │                                                                         │
//! │   record ──► Recorded ──► UploadStart ──┬──► UploadSuccess (removed)   │
//! │                  ▲                      │                               │
//! │                  │                      ├──► UploadError (network)      │
//! │                  │                      │        │  retried on a        │
//! │                  └──────────────────────┘        │  future pass         │
//! │                                                  │                      │
//! │                                         sanity threshold exceeded       │
//! │                                                  │                      │
//! │                                                  ▼                      │
//! │                                         entry dropped (bounded growth)  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Region Event
// =============================================================================

/// Entry or exit crossing of a monitored region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionEventKind {
    /// The device entered the region.
    Entry,

    /// The device exited the region.
    Exit,
}

impl std::fmt::Display for RegionEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegionEventKind::Entry => write!(f, "entry"),
            RegionEventKind::Exit => write!(f, "exit"),
        }
    }
}

/// One geofence crossing, as reported by the platform. Immutable once
/// created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionEvent {
    /// Unique record id; the ledger key.
    pub record_id: Uuid,

    /// Entry or exit.
    pub kind: RegionEventKind,

    /// When the crossing occurred.
    pub occurred_at: DateTime<Utc>,

    /// The trigger subscription whose region was crossed.
    pub trigger_subscription_id: String,
}

impl RegionEvent {
    /// Creates a new event with a fresh record id.
    pub fn new(
        kind: RegionEventKind,
        occurred_at: DateTime<Utc>,
        trigger_subscription_id: &str,
    ) -> Self {
        RegionEvent {
            record_id: Uuid::new_v4(),
            kind,
            occurred_at,
            trigger_subscription_id: trigger_subscription_id.to_string(),
        }
    }
}

// =============================================================================
// Ledger Entry
// =============================================================================

/// Upload progress of one recorded region event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionEventState {
    /// Written to the ledger; not yet sent.
    Recorded,

    /// An upload attempt is in flight.
    UploadStart,

    /// Uploaded; terminal (the entry is removed on this transition).
    UploadSuccess,

    /// The last upload attempt failed with a retryable error.
    UploadError,
}

impl std::fmt::Display for RegionEventState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegionEventState::Recorded => write!(f, "recorded"),
            RegionEventState::UploadStart => write!(f, "upload_start"),
            RegionEventState::UploadSuccess => write!(f, "upload_success"),
            RegionEventState::UploadError => write!(f, "upload_error"),
        }
    }
}

/// Persisted ledger value, keyed by [`RegionEvent::record_id`]. Used to
/// compute elapsed-time metrics and to decide whether an event is still
/// worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Current upload state.
    pub state: RegionEventState,

    /// When the entry last transitioned.
    pub timestamp: DateTime<Utc>,
}

impl LedgerEntry {
    /// Creates a fresh `Recorded` entry.
    pub fn recorded(at: DateTime<Utc>) -> Self {
        LedgerEntry {
            state: RegionEventState::Recorded,
            timestamp: at,
        }
    }

    /// Returns a copy stamped into a new state at the given time.
    pub fn transitioned(self, state: RegionEventState, at: DateTime<Utc>) -> Self {
        LedgerEntry {
            state,
            timestamp: at,
        }
    }
}
