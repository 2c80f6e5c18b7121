//! # Regions Monitor
//!
//! Multiplexes an unbounded set of desired geofences onto the platform's
//! hard concurrent-region cap, and turns platform crossings into recorded
//! location events plus synchronization runs.
//!
//! ## Shape
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Regions Monitor                                  │
//! │                                                                         │
//! │  RegionsMonitorHandle ──commands──► actor loop ◄──events── platform     │
//! │                                        │                                │
//! │  update_regions(desired):              │                                │
//! │    fits under cap  → diff against the platform's current set,           │
//! │                      start/stop the difference                          │
//! │    exceeds cap     → stop all SDK regions, enable visit monitoring;     │
//! │                      each visit installs the closest-cap subset         │
//! │                      (a dynamic window that follows the user)           │
//! │                                                                         │
//! │  Entered/Exited    → record ledger event, trigger a sync run            │
//! │  AuthorizationChanged → reconcile (revoked access stops everything)     │
//! │                                                                         │
//! │  The desired set persists through the key-value store and is restored   │
//! │  on startup, so a process restart reconciles to the same state.         │
//! │                                                                         │
//! │  The handle doubles as a sync subscriber: every run re-reconciles,      │
//! │  healing drift the platform introduced while the app was suspended.     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use tether_core::region::{is_sdk_region, REGION_ID_PREFIX};
use tether_core::{
    closest_regions, diff_regions, needs_visit_fallback, Coordinate, MonitoredRegion,
    RegionEvent, RegionEventKind, SyncSource, MAX_MONITORED_REGIONS,
};

use crate::manager::SyncManagerHandle;
use crate::registry::KeyValueStore;
use crate::reporter::LocationEventReporter;
use crate::subscriber::{SubscriberReport, SyncSubscriber};

/// Key-value store key for the persisted desired set.
const DESIRED_REGIONS_KEY: &str = "tether.regions.desired";

// =============================================================================
// Platform Seam
// =============================================================================

/// Platform callback forwarded into the monitor by the host's location
/// adapter.
#[derive(Debug, Clone, PartialEq)]
pub enum GeofenceEvent {
    /// The device crossed into a monitored region.
    Entered {
        identifier: String,
        at: DateTime<Utc>,
    },

    /// The device crossed out of a monitored region.
    Exited {
        identifier: String,
        at: DateTime<Utc>,
    },

    /// Coarse visit fix; only meaningful in visit-fallback mode.
    Visit {
        coordinate: Coordinate,
        at: DateTime<Utc>,
    },

    /// Location authorization changed.
    AuthorizationChanged { authorized: bool },
}

/// The platform geofencing service, host-injected.
#[async_trait]
pub trait GeofenceProvider: Send + Sync {
    /// The platform's authoritative set of monitored identifiers,
    /// including regions the host app monitors on its own.
    async fn currently_monitored(&self) -> HashSet<String>;

    /// Starts monitoring one region.
    async fn start_monitoring(&self, region: &MonitoredRegion);

    /// Stops monitoring one region.
    async fn stop_monitoring(&self, identifier: &str);

    /// Enables or disables coarse visit monitoring.
    async fn set_visits_monitoring(&self, enabled: bool);

    /// Whether the user has authorized location access.
    async fn is_authorized(&self) -> bool;

    /// The platform's concurrent-region cap.
    fn max_concurrent_regions(&self) -> usize {
        MAX_MONITORED_REGIONS
    }
}

// =============================================================================
// Commands and Handle
// =============================================================================

enum RegionsCommand {
    UpdateRegions(Vec<MonitoredRegion>),
    Refresh { reply: oneshot::Sender<()> },
    Shutdown,
}

/// Cheap, cloneable handle to the monitor. The handle also participates
/// in synchronization runs, re-reconciling the platform on each one.
#[derive(Clone)]
pub struct RegionsMonitorHandle {
    cmd_tx: mpsc::UnboundedSender<RegionsCommand>,
    event_tx: mpsc::UnboundedSender<GeofenceEvent>,
}

/// The receiving halves handed to [`RegionsMonitor::new`]. Split from the
/// handle so the handle can be registered as a sync subscriber before the
/// actor itself is constructed.
pub struct RegionsMonitorChannel {
    cmd_rx: mpsc::UnboundedReceiver<RegionsCommand>,
    event_rx: mpsc::UnboundedReceiver<GeofenceEvent>,
}

impl RegionsMonitorHandle {
    /// Creates a handle and the channel ends the actor will consume.
    pub fn channel() -> (Self, RegionsMonitorChannel) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        (
            RegionsMonitorHandle { cmd_tx, event_tx },
            RegionsMonitorChannel { cmd_rx, event_rx },
        )
    }

    /// Replaces the desired geofence set.
    pub fn update_regions(&self, desired: Vec<MonitoredRegion>) {
        let _ = self.cmd_tx.send(RegionsCommand::UpdateRegions(desired));
    }

    /// Forwards one platform callback into the monitor.
    pub fn platform_event(&self, event: GeofenceEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Stops the actor.
    pub fn shutdown(&self) {
        let _ = self.cmd_tx.send(RegionsCommand::Shutdown);
    }
}

#[async_trait]
impl SyncSubscriber for RegionsMonitorHandle {
    fn name(&self) -> &str {
        "regions_monitor"
    }

    fn should_participate(&self, _source: SyncSource) -> bool {
        true
    }

    async fn perform_synchronization(&self, _source: SyncSource) -> SubscriberReport {
        let (tx, rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(RegionsCommand::Refresh { reply: tx })
            .is_err()
        {
            return SubscriberReport::no_data();
        }
        let _ = rx.await;
        // Reconciliation is maintenance, never new data.
        SubscriberReport::no_data()
    }

    async fn reset(&self) {
        let _ = self
            .cmd_tx
            .send(RegionsCommand::UpdateRegions(Vec::new()));
    }
}

// =============================================================================
// Actor
// =============================================================================

/// Owns the desired set and all platform reconciliation.
pub struct RegionsMonitor {
    channel: RegionsMonitorChannel,
    provider: Arc<dyn GeofenceProvider>,
    reporter: Arc<LocationEventReporter>,
    manager: SyncManagerHandle,
    store: Arc<dyn KeyValueStore>,
    desired: Vec<MonitoredRegion>,
    visits_mode: bool,
}

impl RegionsMonitor {
    pub fn new(
        channel: RegionsMonitorChannel,
        provider: Arc<dyn GeofenceProvider>,
        reporter: Arc<LocationEventReporter>,
        manager: SyncManagerHandle,
        store: Arc<dyn KeyValueStore>,
    ) -> Self {
        RegionsMonitor {
            channel,
            provider,
            reporter,
            manager,
            store,
            desired: Vec::new(),
            visits_mode: false,
        }
    }

    /// Runs the actor until shutdown. Restores the persisted desired set
    /// first so a restarted process reconciles back to where it was.
    pub async fn run(mut self) {
        self.restore_desired().await;
        if !self.desired.is_empty() {
            info!(desired = self.desired.len(), "Restored desired region set");
            self.reconcile().await;
        }

        loop {
            tokio::select! {
                cmd = self.channel.cmd_rx.recv() => match cmd {
                    Some(RegionsCommand::UpdateRegions(desired)) => {
                        self.apply_update(desired).await;
                    }
                    Some(RegionsCommand::Refresh { reply }) => {
                        self.reconcile().await;
                        let _ = reply.send(());
                    }
                    Some(RegionsCommand::Shutdown) | None => break,
                },
                event = self.channel.event_rx.recv() => match event {
                    Some(event) => self.handle_event(event).await,
                    None => break,
                },
            }
        }
        debug!("Regions monitor stopped");
    }

    async fn restore_desired(&mut self) {
        if let Some(value) = self.store.get(DESIRED_REGIONS_KEY).await {
            match serde_json::from_value(value) {
                Ok(desired) => self.desired = desired,
                Err(error) => warn!(%error, "Discarding unreadable persisted region set"),
            }
        }
    }

    async fn persist_desired(&self) {
        match serde_json::to_value(&self.desired) {
            Ok(value) => self.store.set(DESIRED_REGIONS_KEY, value).await,
            Err(error) => warn!(%error, "Failed to persist desired region set"),
        }
    }

    async fn apply_update(&mut self, desired: Vec<MonitoredRegion>) {
        info!(desired = desired.len(), "Updating desired regions");
        self.desired = desired;
        self.persist_desired().await;
        // A changed desired set invalidates any visit-installed window;
        // the fallback decision is made fresh.
        self.visits_mode = false;
        self.reconcile().await;
    }

    /// Brings the platform in line with the desired set, against the
    /// platform's authoritative current set rather than local bookkeeping.
    async fn reconcile(&mut self) {
        if !self.provider.is_authorized().await {
            info!("Location not authorized; stopping all region monitoring");
            self.stop_all_sdk_regions().await;
            self.provider.set_visits_monitoring(false).await;
            self.visits_mode = false;
            return;
        }

        let current = self.provider.currently_monitored().await;
        let cap = self.provider.max_concurrent_regions();

        if needs_visit_fallback(&current, &self.desired, cap) {
            if self.visits_mode {
                // An installed visit window is a valid subset by
                // construction; tearing it down here would leave nothing
                // monitored until the next coarse visit. Only a new visit
                // re-ranks it.
                return;
            }
            info!(
                desired = self.desired.len(),
                cap, "Desired regions exceed the platform cap; using visit fallback"
            );
            self.stop_all_sdk_regions().await;
            self.provider.set_visits_monitoring(true).await;
            self.visits_mode = true;
            return;
        }

        self.provider.set_visits_monitoring(false).await;
        self.visits_mode = false;
        self.install_diff(&current, &self.desired).await;
    }

    async fn stop_all_sdk_regions(&self) {
        for identifier in self.provider.currently_monitored().await {
            if is_sdk_region(&identifier) {
                self.provider.stop_monitoring(&identifier).await;
            }
        }
    }

    async fn install_diff(&self, current: &HashSet<String>, subset: &[MonitoredRegion]) {
        let diff = diff_regions(current, subset);
        if diff.is_empty() {
            return;
        }
        debug!(
            start = diff.to_start.len(),
            stop = diff.to_stop.len(),
            "Reconciling monitored regions"
        );
        for identifier in &diff.to_stop {
            self.provider.stop_monitoring(identifier).await;
        }
        for region in &diff.to_start {
            self.provider.start_monitoring(region).await;
        }
    }

    async fn handle_event(&mut self, event: GeofenceEvent) {
        match event {
            GeofenceEvent::Entered { identifier, at } => {
                self.handle_crossing(identifier, RegionEventKind::Entry, at)
                    .await;
            }
            GeofenceEvent::Exited { identifier, at } => {
                self.handle_crossing(identifier, RegionEventKind::Exit, at)
                    .await;
            }
            GeofenceEvent::Visit { coordinate, at: _ } => {
                if !self.visits_mode {
                    debug!("Visit outside fallback mode; ignoring");
                    return;
                }
                let cap = self.provider.max_concurrent_regions();
                let subset = closest_regions(&self.desired, coordinate, cap);
                let current = self.provider.currently_monitored().await;
                info!(installed = subset.len(), "Visit re-ranked the region window");
                self.install_diff(&current, &subset).await;
            }
            GeofenceEvent::AuthorizationChanged { authorized } => {
                info!(authorized, "Location authorization changed");
                self.reconcile().await;
            }
        }
    }

    async fn handle_crossing(
        &self,
        identifier: String,
        kind: RegionEventKind,
        at: DateTime<Utc>,
    ) {
        if !is_sdk_region(&identifier) {
            debug!(%identifier, "Crossing for a host-app region; ignoring");
            return;
        }
        let trigger_id = identifier
            .strip_prefix(REGION_ID_PREFIX)
            .unwrap_or(&identifier);

        info!(region = %identifier, %kind, "Region crossing");
        self.reporter
            .record(RegionEvent::new(kind, at, trigger_id))
            .await;
        self.manager.sync(SyncSource::LocationEvent, None);
    }
}
