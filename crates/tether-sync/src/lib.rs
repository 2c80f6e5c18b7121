//! # tether-sync: Background Synchronization Engine for the Tether SDK
//!
//! This crate provides the event-driven synchronization engine and the
//! region-monitoring subsystem of the Tether SDK, embedded in a host
//! mobile/desktop application.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Tether Sync Architecture                           │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                 TetherClient (Host Facade)                       │  │
//! │  │                                                                  │  │
//! │  │  setup / activate / deactivate / host hooks                      │  │
//! │  │  Built once; spawns the actors below as Tokio tasks              │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │         ┌─────────────────────┼─────────────────────┐                  │
//! │         ▼                     ▼                     ▼                   │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │ SyncScheduler  │  │  SyncManager   │  │   RegionsMonitor       │    │
//! │  │                │  │                │  │                        │    │
//! │  │ Routes trigger/│  │ Coalesces      │  │ Multiplexes unbounded  │    │
//! │  │ lifecycle/     │  │ triggers into  │  │ geofences onto the     │    │
//! │  │ registry       │  │ one bounded    │  │ platform's 20-region   │    │
//! │  │ signals        │  │ cancellable run│  │ cap; visit fallback    │    │
//! │  └────────────────┘  └────────────────┘  └────────────────────────┘    │
//! │                                                                         │
//! │  SYNC SUBSCRIBERS (run in parallel inside each run):                   │
//! │  ─────────────────                                                     │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │ Connections    │  │ Permissions    │  │ LocationEventReporter  │    │
//! │  │ Monitor        │  │ Requestor      │  │                        │    │
//! │  │                │  │                │  │ Drains the region-     │    │
//! │  │ Refreshes the  │  │ Surfaces queued│  │ event queue through    │    │
//! │  │ registry from  │  │ OS prompts one │  │ the uploader; ledger   │    │
//! │  │ the backend    │  │ at a time      │  │ tracks every event     │    │
//! │  └────────────────┘  └────────────────┘  └────────────────────────┘    │
//! │                                                                         │
//! │  HOST SEAMS (all injected, all replaceable in tests):                  │
//! │  • ConnectionsFetcher / RegionEventUploader  - backend transport       │
//! │  • GeofenceProvider                          - platform geofencing     │
//! │  • KeyValueStore / ConnectionsRegistry       - persistence             │
//! │  • Reachability / BackgroundGrantProvider /                            │
//! │    BackgroundScheduler / PermissionPrompter  - OS facilities           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! ### Engine Core
//! - [`client`] - `TetherClient` facade and builder
//! - [`manager`] - The single-run coalescing sync manager actor
//! - [`scheduler`] - Signal routing, foreground gating, OS registration
//! - [`task`] - One run's lifecycle and outcome aggregation
//! - [`subscriber`] - The `SyncSubscriber` seam and per-run reports
//!
//! ### Regions and the Ledger
//! - [`regions`] - Geofence multiplexing actor and platform seam
//! - [`ledger`] - Durable location-event ledger with latency metrics
//! - [`reporter`] - The subscriber that uploads recorded region events
//!
//! ### Plumbing
//! - [`publisher`] - Registration-ordered broadcast publisher
//! - [`trigger`] - Trigger events with consume-once completions
//! - [`connections`] - Backend connections refresh subscriber
//! - [`permissions`] - Queued OS permission prompts
//! - [`registry`] - Connections registry and key-value store seams
//! - [`background`] - OS grants, background scheduling, capabilities
//! - [`reachability`] - Network reachability seam
//! - [`config`] - Host-injected configuration
//! - [`error`] - Sync error taxonomy
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tether_sync::{Credentials, LifecycleSyncOptions, TetherClientBuilder};
//!
//! let client = TetherClientBuilder::new()
//!     .fetcher(backend.clone())
//!     .uploader(backend)
//!     .geofence_provider(platform_geofences)
//!     .build()?;
//!
//! client.setup(Credentials::new(token), LifecycleSyncOptions::default()).await;
//! client.activate(&connection_ids).await;
//!
//! client.synchronize(|outcome| println!("sync finished: {outcome}")).await;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

// Engine core
pub mod client;
pub mod manager;
pub mod scheduler;
pub mod subscriber;
pub mod task;

// Regions and the ledger
pub mod ledger;
pub mod regions;
pub mod reporter;

// Plumbing
pub mod background;
pub mod config;
pub mod connections;
pub mod error;
pub mod permissions;
pub mod publisher;
pub mod reachability;
pub mod registry;
pub mod trigger;

// =============================================================================
// Re-exports
// =============================================================================

// Host-facing surface
pub use client::{TetherClient, TetherClientBuilder};
pub use config::{Credentials, LifecycleSyncOptions, SyncConfig};
pub use error::{SyncError, SyncResult};
pub use scheduler::{LifecycleEvent, SyncScheduler};

// Engine types
pub use manager::{SyncManager, SyncManagerHandle};
pub use publisher::{EventPublisher, SubscriberToken};
pub use subscriber::{SubscriberReport, SyncSubscriber};
pub use trigger::{CompletionHandler, SyncTriggerEvent};

// Regions and the ledger
pub use ledger::{LedgerNotification, LocationEventStore};
pub use regions::{GeofenceEvent, GeofenceProvider, RegionsMonitor, RegionsMonitorHandle};
pub use reporter::{LocationEventReporter, RegionEventUploader};

// Host seams
pub use background::{
    BackgroundGrant, BackgroundGrantProvider, BackgroundRequest, BackgroundScheduler,
    HostCapabilities,
};
pub use connections::ConnectionsFetcher;
pub use permissions::{Permission, PermissionOutcome, PermissionPrompter};
pub use reachability::Reachability;
pub use registry::{ConnectionsRegistry, KeyValueStore, RegistryChange};
