//! # Tether Client
//!
//! The host-facing facade. One authoritative instance owns the whole
//! engine; the builder is consumed exactly once.
//!
//! ## Wiring
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          TetherClient                                   │
//! │                                                                         │
//! │  setup(credentials, options)                                            │
//! │    │  spawns  SyncManager  ◄── subscribers:                             │
//! │    │            ▲                connections, permissions,              │
//! │    │            │                location events, regions monitor       │
//! │    │  spawns  RegionsMonitor                                            │
//! │    │  starts  SyncScheduler ◄── trigger / lifecycle / registry          │
//! │    ▼                            publishers                              │
//! │  host hooks                                                             │
//! │    synchronize / did_receive_silent_push / start_background_process     │
//! │      → trigger publisher → scheduler → manager                          │
//! │    application_did_become_active / _enter_background                    │
//! │      → lifecycle publisher                                              │
//! │    activate(ids) → registry (its change notification triggers a sync)   │
//! │    deactivate()  → stop scheduler, cancel run, reset subscribers        │
//! │                                                                         │
//! │  Hooks before setup() resolve Failed instead of panicking.              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, warn};

use tether_core::{MonitoredRegion, RunState, SyncOutcome, SyncSource};

use crate::background::{
    BackgroundGrantProvider, BackgroundScheduler, HostCapabilities, NoOpBackgroundScheduler,
    NoOpGrantProvider,
};
use crate::config::{Credentials, LifecycleSyncOptions, SyncConfig};
use crate::connections::{ConnectionsFetcher, ConnectionsMonitor};
use crate::error::{SyncError, SyncResult};
use crate::ledger::LocationEventStore;
use crate::manager::{SyncManager, SyncManagerHandle};
use crate::permissions::{DenyAllPrompter, Permission, PermissionPrompter, PermissionsRequestor};
use crate::publisher::EventPublisher;
use crate::reachability::{AlwaysReachable, Reachability};
use crate::regions::{GeofenceProvider, RegionsMonitor, RegionsMonitorHandle};
use crate::registry::{
    ConnectionsRegistry, InMemoryConnectionsRegistry, InMemoryKeyValueStore, KeyValueStore,
    RegistryChange,
};
use crate::reporter::{LocationEventReporter, RegionEventUploader};
use crate::scheduler::{LifecycleEvent, SyncScheduler};
use crate::subscriber::SyncSubscriber;
use crate::trigger::SyncTriggerEvent;

// =============================================================================
// Builder
// =============================================================================

/// Assembles a [`TetherClient`]. Backend seams (fetcher, uploader,
/// geofencing) are required; everything else has a sensible default.
pub struct TetherClientBuilder {
    fetcher: Option<Arc<dyn ConnectionsFetcher>>,
    uploader: Option<Arc<dyn RegionEventUploader>>,
    geofences: Option<Arc<dyn GeofenceProvider>>,
    registry: Option<Arc<dyn ConnectionsRegistry>>,
    store: Option<Arc<dyn KeyValueStore>>,
    prompter: Arc<dyn PermissionPrompter>,
    reachability: Arc<dyn Reachability>,
    grants: Arc<dyn BackgroundGrantProvider>,
    background: Arc<dyn BackgroundScheduler>,
    capabilities: HostCapabilities,
    config: SyncConfig,
}

impl Default for TetherClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TetherClientBuilder {
    pub fn new() -> Self {
        TetherClientBuilder {
            fetcher: None,
            uploader: None,
            geofences: None,
            registry: None,
            store: None,
            prompter: Arc::new(DenyAllPrompter),
            reachability: Arc::new(AlwaysReachable),
            grants: Arc::new(NoOpGrantProvider),
            background: Arc::new(NoOpBackgroundScheduler),
            capabilities: HostCapabilities::default(),
            config: SyncConfig::default(),
        }
    }

    pub fn fetcher(mut self, fetcher: Arc<dyn ConnectionsFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn uploader(mut self, uploader: Arc<dyn RegionEventUploader>) -> Self {
        self.uploader = Some(uploader);
        self
    }

    pub fn geofence_provider(mut self, geofences: Arc<dyn GeofenceProvider>) -> Self {
        self.geofences = Some(geofences);
        self
    }

    pub fn connections_registry(mut self, registry: Arc<dyn ConnectionsRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn key_value_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn permission_prompter(mut self, prompter: Arc<dyn PermissionPrompter>) -> Self {
        self.prompter = prompter;
        self
    }

    pub fn reachability(mut self, reachability: Arc<dyn Reachability>) -> Self {
        self.reachability = reachability;
        self
    }

    pub fn grant_provider(mut self, grants: Arc<dyn BackgroundGrantProvider>) -> Self {
        self.grants = grants;
        self
    }

    pub fn background_scheduler(mut self, background: Arc<dyn BackgroundScheduler>) -> Self {
        self.background = background;
        self
    }

    pub fn host_capabilities(mut self, capabilities: HostCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    /// Builds the client. Fails when a required backend seam is missing.
    pub fn build(self) -> SyncResult<TetherClient> {
        let fetcher = self
            .fetcher
            .ok_or_else(|| SyncError::InvalidConfiguration("connections fetcher".into()))?;
        let uploader = self
            .uploader
            .ok_or_else(|| SyncError::InvalidConfiguration("region event uploader".into()))?;
        let geofences = self
            .geofences
            .ok_or_else(|| SyncError::InvalidConfiguration("geofence provider".into()))?;

        let registry_changes = EventPublisher::new();
        let registry = self.registry.unwrap_or_else(|| {
            Arc::new(InMemoryConnectionsRegistry::with_publisher(
                registry_changes.clone(),
            ))
        });
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryKeyValueStore::new()));

        Ok(TetherClient {
            triggers: EventPublisher::new(),
            lifecycle: EventPublisher::new(),
            registry_changes,
            registry,
            store,
            fetcher,
            uploader,
            geofences,
            prompter: self.prompter,
            reachability: self.reachability,
            grants: self.grants,
            background: self.background,
            capabilities: self.capabilities,
            config: self.config,
            state: Mutex::new(ClientState::default()),
        })
    }
}

// =============================================================================
// Client
// =============================================================================

#[derive(Default)]
struct ClientState {
    credentials: Option<Credentials>,
    manager: Option<SyncManagerHandle>,
    regions: Option<RegionsMonitorHandle>,
    permissions: Option<Arc<PermissionsRequestor>>,
    scheduler: Option<SyncScheduler>,
}

/// The single authoritative SDK entry point.
pub struct TetherClient {
    triggers: EventPublisher<SyncTriggerEvent>,
    lifecycle: EventPublisher<LifecycleEvent>,
    registry_changes: EventPublisher<RegistryChange>,
    registry: Arc<dyn ConnectionsRegistry>,
    store: Arc<dyn KeyValueStore>,
    fetcher: Arc<dyn ConnectionsFetcher>,
    uploader: Arc<dyn RegionEventUploader>,
    geofences: Arc<dyn GeofenceProvider>,
    prompter: Arc<dyn PermissionPrompter>,
    reachability: Arc<dyn Reachability>,
    grants: Arc<dyn BackgroundGrantProvider>,
    background: Arc<dyn BackgroundScheduler>,
    capabilities: HostCapabilities,
    config: SyncConfig,
    state: Mutex<ClientState>,
}

impl TetherClient {
    /// Starts the engine: spawns the sync manager and regions monitor,
    /// starts the scheduler, and registers the background request.
    /// Calling it again is a logged no-op.
    pub async fn setup(&self, credentials: Credentials, options: LifecycleSyncOptions) {
        let mut state = self.state.lock().await;
        if state.manager.is_some() {
            warn!("setup() called twice; ignoring");
            return;
        }
        info!("Setting up Tether client");
        state.credentials = Some(credentials);

        let ledger = Arc::new(LocationEventStore::new(Arc::clone(&self.store)));
        let reporter = Arc::new(LocationEventReporter::new(
            ledger,
            Arc::clone(&self.uploader),
            self.config.sanity_threshold,
        ));
        let connections = Arc::new(ConnectionsMonitor::new(
            Arc::clone(&self.fetcher),
            Arc::clone(&self.registry),
        ));
        let permissions = Arc::new(PermissionsRequestor::new(Arc::clone(&self.prompter)));

        let (regions_handle, regions_channel) = RegionsMonitorHandle::channel();
        let subscribers: Vec<Arc<dyn SyncSubscriber>> = vec![
            connections,
            Arc::clone(&permissions) as _,
            Arc::clone(&reporter) as _,
            Arc::new(regions_handle.clone()),
        ];

        let (manager, manager_handle) =
            SyncManager::new(subscribers, Arc::clone(&self.reachability), Arc::clone(&self.grants));
        tokio::spawn(manager.run());

        let monitor = RegionsMonitor::new(
            regions_channel,
            Arc::clone(&self.geofences),
            reporter,
            manager_handle.clone(),
            Arc::clone(&self.store),
        );
        tokio::spawn(monitor.run());

        let mut scheduler = SyncScheduler::new(
            manager_handle.clone(),
            self.triggers.clone(),
            self.lifecycle.clone(),
            self.registry_changes.clone(),
            Arc::clone(&self.background),
            self.capabilities,
            options,
            self.config.clone(),
        );
        scheduler.start();
        scheduler.setup_background_process();

        state.manager = Some(manager_handle);
        state.regions = Some(regions_handle);
        state.permissions = Some(permissions);
        state.scheduler = Some(scheduler);
    }

    /// Starts tracking connections. The registry's change notification
    /// triggers the resulting synchronization.
    pub async fn activate(&self, connection_ids: &[String]) {
        self.registry.add_connections(connection_ids).await;
    }

    /// Tears the engine down: stops observing, cancels the in-flight run,
    /// resets every subscriber's state, and clears credentials.
    pub async fn deactivate(&self) {
        let mut state = self.state.lock().await;
        info!("Deactivating Tether client");

        if let Some(scheduler) = state.scheduler.as_mut() {
            scheduler.stop();
        }
        if let Some(manager) = &state.manager {
            manager.cancel_current();
            manager.reset();
            manager.shutdown();
        }
        if let Some(regions) = &state.regions {
            // Clear the desired set before the actor stops so the platform
            // is left with no SDK geofences installed.
            regions.update_regions(Vec::new());
            regions.shutdown();
        }

        *state = ClientState::default();
    }

    /// Runs a user-requested synchronization.
    pub async fn synchronize(&self, completion: impl FnOnce(SyncOutcome) + Send + 'static) {
        self.trigger(SyncSource::Forced, completion).await;
    }

    /// Host hook for an OS background-fetch window.
    pub async fn perform_fetch(&self, completion: impl FnOnce(SyncOutcome) + Send + 'static) {
        self.trigger(SyncSource::BackgroundProcess, completion).await;
    }

    /// Host hook for the declared background-processing task.
    pub async fn start_background_process(
        &self,
        completion: impl FnOnce(SyncOutcome) + Send + 'static,
    ) {
        self.trigger(SyncSource::BackgroundProcess, completion).await;
    }

    /// Host hook for a silent push notification.
    pub async fn did_receive_silent_push(
        &self,
        completion: impl FnOnce(SyncOutcome) + Send + 'static,
    ) {
        self.trigger(SyncSource::SilentPush, completion).await;
    }

    async fn trigger(&self, source: SyncSource, completion: impl FnOnce(SyncOutcome) + Send + 'static) {
        if self.state.lock().await.manager.is_none() {
            warn!(%source, "Trigger before setup(); reporting failure");
            completion(SyncOutcome::Failed);
            return;
        }
        self.triggers
            .on_next(SyncTriggerEvent::with_completion(source, completion));
    }

    /// Cancels the in-flight run, if any. A queued follow-up still runs.
    pub async fn stop_current_synchronization(&self) {
        if let Some(manager) = &self.state.lock().await.manager {
            manager.cancel_current();
        }
    }

    /// Whether the engine is up and accepting triggers.
    pub async fn run_state(&self) -> RunState {
        match &self.state.lock().await.manager {
            Some(manager) => manager.run_state().await,
            None => RunState::Stopped,
        }
    }

    /// Host hook: the app moved to the foreground.
    pub fn application_did_become_active(&self) {
        self.lifecycle.on_next(LifecycleEvent::AppForegrounded);
    }

    /// Host hook: the app moved to the background.
    pub fn application_did_enter_background(&self) {
        self.lifecycle.on_next(LifecycleEvent::AppBackgrounded);
    }

    /// Replaces the desired geofence set.
    pub async fn update_regions(&self, desired: Vec<MonitoredRegion>) {
        if let Some(regions) = &self.state.lock().await.regions {
            regions.update_regions(desired);
        }
    }

    /// The regions handle, for the host's platform location adapter to
    /// forward geofence callbacks into.
    pub async fn regions(&self) -> Option<RegionsMonitorHandle> {
        self.state.lock().await.regions.clone()
    }

    /// Queues an OS permission prompt for the next user-present run.
    pub async fn request_permission(&self, permission: Permission) {
        if let Some(permissions) = &self.state.lock().await.permissions {
            permissions.enqueue(permission).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::HashSet;
    use std::sync::Mutex as StdMutex;
    use tether_core::{ConnectionSummary, Coordinate, RegionEvent};

    struct FakeFetcher {
        connections: Vec<ConnectionSummary>,
    }

    #[async_trait]
    impl ConnectionsFetcher for FakeFetcher {
        async fn fetch_connections(&self) -> SyncResult<Vec<ConnectionSummary>> {
            Ok(self.connections.clone())
        }
    }

    struct RecordingUploader {
        uploaded: StdMutex<Vec<RegionEvent>>,
    }

    #[async_trait]
    impl RegionEventUploader for RecordingUploader {
        async fn upload(&self, events: &[RegionEvent]) -> SyncResult<()> {
            self.uploaded.lock().unwrap().extend_from_slice(events);
            Ok(())
        }
    }

    struct FakeGeofences {
        monitored: StdMutex<HashSet<String>>,
    }

    #[async_trait]
    impl GeofenceProvider for FakeGeofences {
        async fn currently_monitored(&self) -> HashSet<String> {
            self.monitored.lock().unwrap().clone()
        }

        async fn start_monitoring(&self, region: &MonitoredRegion) {
            self.monitored
                .lock()
                .unwrap()
                .insert(region.identifier.clone());
        }

        async fn stop_monitoring(&self, identifier: &str) {
            self.monitored.lock().unwrap().remove(identifier);
        }

        async fn set_visits_monitoring(&self, _enabled: bool) {}

        async fn is_authorized(&self) -> bool {
            true
        }
    }

    fn client() -> (TetherClient, Arc<RecordingUploader>, Arc<FakeGeofences>) {
        let uploader = Arc::new(RecordingUploader {
            uploaded: StdMutex::new(Vec::new()),
        });
        let geofences = Arc::new(FakeGeofences {
            monitored: StdMutex::new(HashSet::new()),
        });
        let client = TetherClientBuilder::new()
            .fetcher(Arc::new(FakeFetcher {
                connections: vec![ConnectionSummary::enabled("c-1")],
            }))
            .uploader(Arc::clone(&uploader) as _)
            .geofence_provider(Arc::clone(&geofences) as _)
            .build()
            .unwrap();
        (client, uploader, geofences)
    }

    async fn settle() {
        tokio::time::sleep(std::time::Duration::from_millis(80)).await;
    }

    #[test]
    fn test_builder_requires_backend_seams() {
        let result = TetherClientBuilder::new().build();
        assert!(matches!(
            result.err(),
            Some(SyncError::InvalidConfiguration(_))
        ));
    }

    #[tokio::test]
    async fn test_trigger_before_setup_fails_softly() {
        let (client, _uploader, _geofences) = client();
        let (tx, rx) = tokio::sync::oneshot::channel();
        client
            .did_receive_silent_push(move |outcome| {
                let _ = tx.send(outcome);
            })
            .await;
        assert_eq!(rx.await.unwrap(), SyncOutcome::Failed);
        assert_eq!(client.run_state().await, RunState::Stopped);
    }

    #[tokio::test]
    async fn test_full_lifecycle_smoke() {
        let (client, uploader, geofences) = client();
        client
            .setup(Credentials::new("token"), LifecycleSyncOptions::default())
            .await;

        // Activation publishes a registry change, which runs a sync that
        // pulls the backend connection list in.
        client.activate(&["c-1".to_string()]).await;
        settle().await;

        // A forced sync with nothing new resolves NoData.
        let (tx, rx) = tokio::sync::oneshot::channel();
        client
            .synchronize(move |outcome| {
                let _ = tx.send(outcome);
            })
            .await;
        assert_eq!(rx.await.unwrap(), SyncOutcome::NoData);

        // Region wiring: install a geofence, cross it, and the event is
        // recorded and uploaded by the triggered run.
        let region = MonitoredRegion::new(
            "trigger-1",
            Coordinate::new(37.0, -122.0).unwrap(),
            100.0,
        )
        .unwrap();
        client.update_regions(vec![region]).await;
        settle().await;
        assert!(geofences
            .monitored
            .lock()
            .unwrap()
            .contains("tether/trigger-1"));

        let regions = client.regions().await.unwrap();
        regions.platform_event(crate::regions::GeofenceEvent::Entered {
            identifier: "tether/trigger-1".to_string(),
            at: Utc::now(),
        });
        settle().await;
        assert_eq!(uploader.uploaded.lock().unwrap().len(), 1);

        client.deactivate().await;
        assert_eq!(client.run_state().await, RunState::Stopped);
    }

    #[tokio::test]
    async fn test_setup_twice_is_ignored() {
        let (client, _uploader, _geofences) = client();
        client
            .setup(Credentials::new("token"), LifecycleSyncOptions::default())
            .await;
        client
            .setup(Credentials::new("other"), LifecycleSyncOptions::default())
            .await;

        let state = client.state.lock().await;
        assert_eq!(
            state.credentials.as_ref().map(|c| c.user_token.as_str()),
            Some("token")
        );
    }
}
