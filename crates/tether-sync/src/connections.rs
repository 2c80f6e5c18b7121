//! # Connections Monitor
//!
//! The synchronization subscriber that refreshes the connections
//! registry from the backend. Participates in every run except
//! location-event flushes, which carry no registry information.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use tether_core::{ConnectionSummary, SyncSource};

use crate::error::SyncResult;
use crate::registry::ConnectionsRegistry;
use crate::subscriber::{SubscriberReport, SyncSubscriber};

// =============================================================================
// Fetcher Seam
// =============================================================================

/// Backend lookup for the user's connections.
#[async_trait]
pub trait ConnectionsFetcher: Send + Sync {
    /// Fetches the authoritative connection list. An invalid token must
    /// surface as [`SyncError::AuthenticationFailure`].
    ///
    /// [`SyncError::AuthenticationFailure`]: crate::error::SyncError::AuthenticationFailure
    async fn fetch_connections(&self) -> SyncResult<Vec<ConnectionSummary>>;
}

// =============================================================================
// Monitor
// =============================================================================

/// Keeps the local connections registry in step with the backend.
pub struct ConnectionsMonitor {
    fetcher: Arc<dyn ConnectionsFetcher>,
    registry: Arc<dyn ConnectionsRegistry>,
}

impl ConnectionsMonitor {
    pub fn new(fetcher: Arc<dyn ConnectionsFetcher>, registry: Arc<dyn ConnectionsRegistry>) -> Self {
        ConnectionsMonitor { fetcher, registry }
    }
}

#[async_trait]
impl SyncSubscriber for ConnectionsMonitor {
    fn name(&self) -> &str {
        "connections"
    }

    fn should_participate(&self, source: SyncSource) -> bool {
        // Region-crossing flushes carry no registry information.
        !matches!(source, SyncSource::LocationEvent)
    }

    async fn perform_synchronization(&self, _source: SyncSource) -> SubscriberReport {
        let fetched = match self.fetcher.fetch_connections().await {
            Ok(fetched) => fetched,
            Err(error) => {
                warn!(%error, "Connections fetch failed");
                return SubscriberReport::failed(error);
            }
        };

        let fetched: HashSet<ConnectionSummary> = fetched.into_iter().collect();
        let stored = self.registry.get_connections().await;
        if fetched == stored {
            return SubscriberReport::no_data();
        }

        debug!(
            fetched = fetched.len(),
            stored = stored.len(),
            "Connections changed"
        );
        // The registry raises its own change notifications on real
        // writes; the run outcome already says data changed.
        for connection in fetched.difference(&stored) {
            self.registry.update(connection.clone(), false).await;
        }
        let fetched_ids: HashSet<&str> = fetched.iter().map(|c| c.id.as_str()).collect();
        for connection in &stored {
            if !fetched_ids.contains(connection.id.as_str()) {
                self.registry.remove(&connection.id, false).await;
            }
        }
        SubscriberReport::new_data()
    }

    async fn reset(&self) {
        self.registry.remove_all().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use crate::registry::InMemoryConnectionsRegistry;
    use std::collections::VecDeque;
    use tokio::sync::Mutex;

    struct FakeFetcher {
        results: Mutex<VecDeque<SyncResult<Vec<ConnectionSummary>>>>,
    }

    impl FakeFetcher {
        fn new(results: Vec<SyncResult<Vec<ConnectionSummary>>>) -> Self {
            FakeFetcher {
                results: Mutex::new(results.into()),
            }
        }
    }

    #[async_trait]
    impl ConnectionsFetcher for FakeFetcher {
        async fn fetch_connections(&self) -> SyncResult<Vec<ConnectionSummary>> {
            self.results
                .lock()
                .await
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    fn monitor(
        results: Vec<SyncResult<Vec<ConnectionSummary>>>,
    ) -> (ConnectionsMonitor, Arc<InMemoryConnectionsRegistry>) {
        let registry = Arc::new(InMemoryConnectionsRegistry::new());
        (
            ConnectionsMonitor::new(
                Arc::new(FakeFetcher::new(results)),
                Arc::clone(&registry) as _,
            ),
            registry,
        )
    }

    #[tokio::test]
    async fn test_new_connection_reports_new_data_and_updates_registry() {
        let (monitor, registry) =
            monitor(vec![Ok(vec![ConnectionSummary::enabled("c-1")])]);

        let report = monitor.perform_synchronization(SyncSource::Forced).await;
        assert!(report.new_data);
        assert!(registry
            .get_connections()
            .await
            .contains(&ConnectionSummary::enabled("c-1")));
    }

    #[tokio::test]
    async fn test_unchanged_connections_report_no_data() {
        let (monitor, registry) =
            monitor(vec![Ok(vec![ConnectionSummary::enabled("c-1")])]);
        registry.add_connections(&["c-1".to_string()]).await;

        let report = monitor.perform_synchronization(SyncSource::Forced).await;
        assert!(!report.new_data);
        assert!(report.error.is_none());
    }

    #[tokio::test]
    async fn test_backend_deleted_connections_are_dropped() {
        let (monitor, registry) = monitor(vec![Ok(vec![]), Ok(vec![])]);
        registry.add_connections(&["c-1".to_string()]).await;

        // First run converges the registry on the empty backend list.
        let report = monitor.perform_synchronization(SyncSource::Forced).await;
        assert!(report.new_data);
        assert!(registry.get_connections().await.is_empty());

        // Converged: the next run has nothing to report.
        let report = monitor.perform_synchronization(SyncSource::Forced).await;
        assert!(!report.new_data);
        assert!(report.error.is_none());
    }

    #[tokio::test]
    async fn test_fetch_failure_is_reported() {
        let (monitor, _registry) = monitor(vec![Err(SyncError::AuthenticationFailure)]);

        let report = monitor.perform_synchronization(SyncSource::Forced).await;
        assert_eq!(report.error, Some(SyncError::AuthenticationFailure));
    }

    #[tokio::test]
    async fn test_skips_location_event_runs() {
        let (monitor, _registry) = monitor(vec![]);
        assert!(!monitor.should_participate(SyncSource::LocationEvent));
        assert!(monitor.should_participate(SyncSource::SilentPush));
    }

    #[tokio::test]
    async fn test_reset_clears_registry() {
        let (monitor, registry) = monitor(vec![]);
        registry.add_connections(&["c-1".to_string()]).await;
        monitor.reset().await;
        assert!(registry.get_connections().await.is_empty());
    }
}
