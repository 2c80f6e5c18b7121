//! # OS Background Execution Seams
//!
//! Two distinct OS facilities hide behind these traits:
//!
//! - **Execution grants**: a time-boxed allowance to keep running after the
//!   app leaves the foreground. The manager wraps every run in one (unless
//!   the run already executes inside an OS-granted window).
//! - **Background scheduling**: a recurring "wake me up later" request the
//!   scheduler registers so synchronization keeps happening without the
//!   app being opened.
//!
//! Hosts without either facility plug in the no-op implementations.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::SyncResult;

// =============================================================================
// Execution Grants
// =============================================================================

/// A live, time-boxed execution allowance. Ended exactly once.
pub trait BackgroundGrant: Send {
    /// Releases the grant back to the OS.
    fn end(self: Box<Self>);
}

/// Hands out execution grants and reports their expiration.
pub trait BackgroundGrantProvider: Send + Sync {
    /// Begins a grant. `on_expire` is invoked if the OS revokes the budget
    /// before [`BackgroundGrant::end`] is called. Returns `None` when the
    /// host platform has no grant facility; the run proceeds ungranted.
    fn begin(&self, reason: &str, on_expire: Box<dyn FnOnce() + Send>)
        -> Option<Box<dyn BackgroundGrant>>;
}

/// Grant provider for hosts without background budgets (and for tests).
#[derive(Debug, Default)]
pub struct NoOpGrantProvider;

impl BackgroundGrantProvider for NoOpGrantProvider {
    fn begin(
        &self,
        _reason: &str,
        _on_expire: Box<dyn FnOnce() + Send>,
    ) -> Option<Box<dyn BackgroundGrant>> {
        None
    }
}

// =============================================================================
// Background Scheduling
// =============================================================================

/// A recurring background-processing request.
#[derive(Debug, Clone)]
pub struct BackgroundRequest {
    /// The task identifier the host declared in its manifest.
    pub identifier: String,

    /// The work needs network connectivity.
    pub requires_network: bool,

    /// The work needs external power. Always false for sync runs.
    pub requires_external_power: bool,

    /// Minimum spacing before the OS may begin the work.
    pub earliest_begin_in: Duration,
}

/// OS background work scheduler.
#[async_trait]
pub trait BackgroundScheduler: Send + Sync {
    /// Submits a recurring request. The OS may reject it (e.g., too many
    /// requests queued); callers log and move on.
    async fn submit(&self, request: BackgroundRequest) -> SyncResult<()>;

    /// Cancels a previously submitted request by identifier.
    async fn cancel(&self, identifier: &str);
}

/// Scheduler for hosts without a background-processing facility.
#[derive(Debug, Default)]
pub struct NoOpBackgroundScheduler;

#[async_trait]
impl BackgroundScheduler for NoOpBackgroundScheduler {
    async fn submit(&self, _request: BackgroundRequest) -> SyncResult<()> {
        Ok(())
    }

    async fn cancel(&self, _identifier: &str) {}
}

// =============================================================================
// Host Capabilities
// =============================================================================

/// What the host app's manifest declares. Background scheduling is a
/// deliberate fail-soft: if the host hasn't declared both, the SDK
/// silently does not schedule rather than crashing.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostCapabilities {
    /// The background-processing capability is declared.
    pub background_processing_declared: bool,

    /// The SDK's specific task identifier is declared.
    pub task_identifier_declared: bool,
}

impl HostCapabilities {
    /// Capabilities of a fully configured host.
    pub fn full() -> Self {
        HostCapabilities {
            background_processing_declared: true,
            task_identifier_declared: true,
        }
    }

    /// True when background requests may be registered.
    pub fn can_schedule(&self) -> bool {
        self.background_processing_declared && self.task_identifier_declared
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capabilities_require_both_declarations() {
        assert!(HostCapabilities::full().can_schedule());
        assert!(!HostCapabilities::default().can_schedule());
        assert!(!HostCapabilities {
            background_processing_declared: true,
            task_identifier_declared: false,
        }
        .can_schedule());
    }

    #[test]
    fn test_noop_provider_hands_out_nothing() {
        let provider = NoOpGrantProvider;
        assert!(provider.begin("run", Box::new(|| {})).is_none());
    }
}
