//! # Synchronization Subscribers
//!
//! A subscriber wraps one external capability (connections fetch,
//! permission prompts, region reconciliation, event upload) behind a
//! uniform "should I run / run and report" contract. Subscribers are
//! registered once at startup and are stateless from the manager's point
//! of view.

use async_trait::async_trait;

use tether_core::SyncSource;

use crate::error::SyncError;

// =============================================================================
// Subscriber Report
// =============================================================================

/// What one subscriber contributed to a run.
#[derive(Debug, Clone, Default)]
pub struct SubscriberReport {
    /// True if the subscriber pulled down new data.
    pub new_data: bool,

    /// Error the subscriber hit, if any. Never thrown across the
    /// aggregation boundary; folded into the run outcome instead.
    pub error: Option<SyncError>,
}

impl SubscriberReport {
    /// A clean report with new data.
    pub fn new_data() -> Self {
        SubscriberReport {
            new_data: true,
            error: None,
        }
    }

    /// A clean report with nothing changed.
    pub fn no_data() -> Self {
        SubscriberReport {
            new_data: false,
            error: None,
        }
    }

    /// A failed report.
    pub fn failed(error: SyncError) -> Self {
        SubscriberReport {
            new_data: false,
            error: Some(error),
        }
    }
}

// =============================================================================
// Subscriber Contract
// =============================================================================

/// A pluggable participant in a synchronization run.
#[async_trait]
pub trait SyncSubscriber: Send + Sync {
    /// Stable capability name, used as the key in the run's report map and
    /// in log lines.
    fn name(&self) -> &str;

    /// Eligibility predicate over the trigger source. Called once per run,
    /// before any work starts.
    fn should_participate(&self, source: SyncSource) -> bool;

    /// Performs this capability's work for one run and reports. May run on
    /// any thread; the manager funnels the report back onto its own
    /// serialized context.
    async fn perform_synchronization(&self, source: SyncSource) -> SubscriberReport;

    /// Clears any capability-local state (sign-out/deactivation path).
    async fn reset(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_constructors() {
        assert!(SubscriberReport::new_data().new_data);
        assert!(!SubscriberReport::no_data().new_data);

        let failed = SubscriberReport::failed(SyncError::Unreachable);
        assert!(!failed.new_data);
        assert_eq!(failed.error, Some(SyncError::Unreachable));
    }
}
