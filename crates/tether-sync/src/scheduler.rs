//! # Sync Scheduler
//!
//! The policy layer between trigger sources and the sync manager. The
//! manager coalesces and runs; the scheduler decides which signals become
//! runs at all.
//!
//! ## Signal Routing
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Sync Scheduler                                  │
//! │                                                                         │
//! │  trigger publisher ──► foreground gate ──► manager.sync                 │
//! │    (push, OS background, forced, …)                                     │
//! │    foreground-only triggers arriving while backgrounded are dropped     │
//! │    and their completion resolves NoData                                 │
//! │                                                                         │
//! │  lifecycle publisher ──► foreground flag + per-option syncs             │
//! │    AppBackgrounded additionally refreshes the OS background request     │
//! │                                                                         │
//! │  registry publisher ──► always a sync (connection set changed)          │
//! │                                                                         │
//! │  Background registration is fail-soft: a host that has not declared     │
//! │  the capability gets lifecycle-driven sync only, no crash, no error.    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use tether_core::SyncOutcome;

use crate::background::{BackgroundRequest, BackgroundScheduler, HostCapabilities};
use crate::config::{LifecycleSyncOptions, SyncConfig};
use crate::manager::SyncManagerHandle;
use crate::publisher::{EventPublisher, SubscriberToken};
use crate::registry::RegistryChange;
use crate::trigger::SyncTriggerEvent;

// =============================================================================
// Lifecycle Events
// =============================================================================

/// App lifecycle transition, forwarded by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    AppForegrounded,
    AppBackgrounded,
}

// =============================================================================
// Scheduler
// =============================================================================

/// Subscribes to the trigger, lifecycle, and registry publishers and
/// turns their signals into synchronization requests.
pub struct SyncScheduler {
    manager: SyncManagerHandle,
    triggers: EventPublisher<SyncTriggerEvent>,
    lifecycle: EventPublisher<LifecycleEvent>,
    registry_changes: EventPublisher<RegistryChange>,
    background: Arc<dyn BackgroundScheduler>,
    capabilities: HostCapabilities,
    options: LifecycleSyncOptions,
    config: SyncConfig,
    foreground: Arc<AtomicBool>,
    trigger_token: Option<SubscriberToken>,
    lifecycle_token: Option<SubscriberToken>,
    registry_token: Option<SubscriberToken>,
}

impl SyncScheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        manager: SyncManagerHandle,
        triggers: EventPublisher<SyncTriggerEvent>,
        lifecycle: EventPublisher<LifecycleEvent>,
        registry_changes: EventPublisher<RegistryChange>,
        background: Arc<dyn BackgroundScheduler>,
        capabilities: HostCapabilities,
        options: LifecycleSyncOptions,
        config: SyncConfig,
    ) -> Self {
        SyncScheduler {
            manager,
            triggers,
            lifecycle,
            registry_changes,
            background,
            capabilities,
            options,
            config,
            foreground: Arc::new(AtomicBool::new(true)),
            trigger_token: None,
            lifecycle_token: None,
            registry_token: None,
        }
    }

    /// True while the scheduler is observing its publishers.
    pub fn is_started(&self) -> bool {
        self.trigger_token.is_some()
    }

    /// Begins observing. Idempotent.
    pub fn start(&mut self) {
        if self.is_started() {
            debug!("Scheduler already started");
            return;
        }
        info!("Scheduler starting");

        let manager = self.manager.clone();
        let foreground = Arc::clone(&self.foreground);
        self.trigger_token = Some(self.triggers.add_subscriber(move |event: SyncTriggerEvent| {
            let completion = event.take_completion();
            if event.source.requires_foreground() && !foreground.load(Ordering::SeqCst) {
                debug!(source = %event.source, "Dropping foreground-only trigger while backgrounded");
                if let Some(complete) = completion {
                    complete(SyncOutcome::NoData);
                }
                return;
            }
            manager.sync(event.source, completion);
        }));

        let manager = self.manager.clone();
        let foreground = Arc::clone(&self.foreground);
        let options = self.options;
        let background = Arc::clone(&self.background);
        let capabilities = self.capabilities;
        let config = self.config.clone();
        self.lifecycle_token = Some(self.lifecycle.add_subscriber(move |event: LifecycleEvent| {
            match event {
                LifecycleEvent::AppForegrounded => {
                    foreground.store(true, Ordering::SeqCst);
                    if options.sync_on_app_foregrounded {
                        manager.sync(tether_core::SyncSource::AppForegrounded, None);
                    }
                }
                LifecycleEvent::AppBackgrounded => {
                    foreground.store(false, Ordering::SeqCst);
                    if options.sync_on_app_backgrounded {
                        manager.sync(tether_core::SyncSource::AppBackgrounded, None);
                    }
                    // Entering the background is the moment to refresh the
                    // OS background-processing request.
                    schedule_background_request(&background, capabilities, &config);
                }
            }
        }));

        let manager = self.manager.clone();
        self.registry_token = Some(self.registry_changes.add_subscriber(
            move |change: RegistryChange| {
                manager.sync(change.as_source(), None);
            },
        ));
    }

    /// Stops observing and cancels the pending OS request. Idempotent.
    pub fn stop(&mut self) {
        let Some(trigger_token) = self.trigger_token.take() else {
            return;
        };
        self.triggers.remove_subscriber(trigger_token);
        if let Some(token) = self.lifecycle_token.take() {
            self.lifecycle.remove_subscriber(token);
        }
        if let Some(token) = self.registry_token.take() {
            self.registry_changes.remove_subscriber(token);
        }

        let background = Arc::clone(&self.background);
        let identifier = self.config.background_task_identifier.clone();
        tokio::spawn(async move {
            background.cancel(&identifier).await;
        });
        info!("Scheduler stopped");
    }

    /// Registers the recurring OS background request, if the host can.
    pub fn setup_background_process(&self) {
        schedule_background_request(&self.background, self.capabilities, &self.config);
    }

    /// Cancels the in-flight run, if any.
    pub fn stop_current_synchronization(&self) {
        self.manager.cancel_current();
    }
}

/// Fail-soft registration: hosts that did not declare the capability get
/// lifecycle-driven sync only, and an OS rejection is logged, not raised.
fn schedule_background_request(
    background: &Arc<dyn BackgroundScheduler>,
    capabilities: HostCapabilities,
    config: &SyncConfig,
) {
    if !capabilities.can_schedule() {
        debug!("Host has not declared background processing; not scheduling");
        return;
    }

    let request = BackgroundRequest {
        identifier: config.background_task_identifier.clone(),
        requires_network: true,
        requires_external_power: false,
        earliest_begin_in: config.min_background_interval(),
    };
    let background = Arc::clone(background);
    tokio::spawn(async move {
        match background.submit(request).await {
            Ok(()) => debug!("Background-processing request submitted"),
            Err(error) => warn!(%error, "OS rejected the background-processing request"),
        }
    });
}
