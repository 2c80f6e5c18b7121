//! # Sync Error Types
//!
//! Error taxonomy for synchronization runs.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Pre-emptive    │  │   Terminal      │  │   Recorded              │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  Unreachable    │  │  Authentication │  │  Network                │ │
//! │  │  (no work is    │  │  Failure (run   │  │  (downgrades outcome,   │ │
//! │  │  attempted)     │  │  short-circuits,│  │  siblings keep running) │ │
//! │  │                 │  │  pending run    │  │  GrantExpired           │ │
//! │  │                 │  │  discarded)     │  │  Cancelled              │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  Absorbed (never escalated)                                     │   │
//! │  │                                                                 │   │
//! │  │  PermissionDenied       → subscriber reports no-new-data        │   │
//! │  │  SanityThresholdExceeded→ ledger entry dropped, logged          │   │
//! │  │  SchedulingRejected     → periodic sync degrades to             │   │
//! │  │                           lifecycle-driven sync                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Subscriber-local errors never cross the aggregation boundary as `Err`;
//! they ride inside the per-subscriber report and fold into one terminal
//! outcome. Only the authentication class may truncate a run early.

use thiserror::Error;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Sync error type covering all failure classes of a synchronization run.
///
/// ## Design Principles
/// - Variants are categorized by how the manager reacts to them
/// - Errors are `Clone` because they travel inside subscriber reports
/// - All errors are `Send + Sync` for async compatibility
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SyncError {
    // =========================================================================
    // Pre-emptive
    // =========================================================================
    /// No network reachability; the run fails before any subscriber work.
    #[error("Network unreachable")]
    Unreachable,

    // =========================================================================
    // Terminal
    // =========================================================================
    /// The backend rejected the credentials (401 class). Short-circuits the
    /// current run and discards any queued next-run; further attempts are
    /// pointless until credentials are refreshed externally.
    #[error("Authentication failed; credentials must be refreshed")]
    AuthenticationFailure,

    // =========================================================================
    // Recorded (downgrade the outcome, do not abort siblings)
    // =========================================================================
    /// Generic network failure from one subscriber.
    #[error("Network error: {0}")]
    Network(String),

    /// The OS execution grant expired before the run finished.
    #[error("OS execution grant expired")]
    GrantExpired,

    /// The run was cancelled explicitly.
    #[error("Synchronization cancelled")]
    Cancelled,

    // =========================================================================
    // Absorbed
    // =========================================================================
    /// A permission prompt was denied. Reported as no-new-data, not failure.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Too many pending location events accumulated; the affected ledger
    /// entries are dropped to bound growth.
    #[error("Pending location events crossed the sanity threshold ({count} > {threshold})")]
    SanityThresholdExceeded { count: usize, threshold: usize },

    /// The OS rejected a background-processing request (e.g., too many
    /// requests queued). Logged, not escalated.
    #[error("Background scheduling rejected: {0}")]
    SchedulingRejected(String),

    // =========================================================================
    // Internal
    // =========================================================================
    /// The host-injected key-value store failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// An engine channel closed unexpectedly.
    #[error("Engine channel closed")]
    ChannelClosed,

    /// The client was used before `setup()` was called.
    #[error("Client not started; call setup() first")]
    NotStarted,

    /// The client builder was missing a required seam.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

// =============================================================================
// Error Categorization
// =============================================================================

impl SyncError {
    /// Returns true for the authentication class, the only error allowed to
    /// truncate a run early.
    pub fn is_authentication_failure(&self) -> bool {
        matches!(self, SyncError::AuthenticationFailure)
    }

    /// Returns true if a future trigger may succeed without external
    /// intervention.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::Unreachable
                | SyncError::Network(_)
                | SyncError::GrantExpired
                | SyncError::Cancelled
                | SyncError::SchedulingRejected(_)
        )
    }

    /// Returns true for the sanity-threshold class, which drops ledger
    /// entries instead of retrying them.
    pub fn is_sanity_threshold(&self) -> bool {
        matches!(self, SyncError::SanityThresholdExceeded { .. })
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Storage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authentication_classification() {
        assert!(SyncError::AuthenticationFailure.is_authentication_failure());
        assert!(!SyncError::Network("timeout".into()).is_authentication_failure());
    }

    #[test]
    fn test_retryable_errors() {
        assert!(SyncError::Unreachable.is_retryable());
        assert!(SyncError::Network("reset".into()).is_retryable());
        assert!(SyncError::GrantExpired.is_retryable());

        assert!(!SyncError::AuthenticationFailure.is_retryable());
        assert!(!SyncError::SanityThresholdExceeded {
            count: 120,
            threshold: 100
        }
        .is_retryable());
    }

    #[test]
    fn test_sanity_threshold_display() {
        let err = SyncError::SanityThresholdExceeded {
            count: 120,
            threshold: 100,
        };
        assert!(err.to_string().contains("120"));
        assert!(err.is_sanity_threshold());
    }
}
