//! # tether-core: Pure Domain Logic for the Tether SDK
//!
//! This crate is the **heart** of the Tether SDK. It contains the domain
//! logic of background synchronization and geofence multiplexing as pure
//! functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Tether SDK Architecture                          │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    Host Application                             │   │
//! │  │   lifecycle hooks ──► silent push ──► background windows        │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    tether-sync (engine)                         │   │
//! │  │    scheduler, manager, subscribers, regions monitor, ledger     │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ tether-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌─────────────┐  ┌──────────┐  │   │
//! │  │   │  source   │  │    geo    │  │ region_plan │  │  event   │  │   │
//! │  │   │ SyncSource│  │ Coordinate│  │ visit rules │  │RegionEvnt│  │   │
//! │  │   │SyncOutcome│  │ haversine │  │ region diff │  │  ledger  │  │   │
//! │  │   └───────────┘  └───────────┘  └─────────────┘  └──────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO LOCATION SERVICES • NO NETWORK • PURE FUNCTIONS  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`source`] - Trigger sources, run outcomes and run state
//! - [`geo`] - Coordinates and great-circle distance
//! - [`region`] - Monitored-region descriptors and identifier namespacing
//! - [`region_plan`] - The 20-region multiplexing decision rules
//! - [`event`] - Region entry/exit events and the ledger state machine
//! - [`connection`] - Connection summaries consumed by the sync engine
//! - [`error`] - Domain error types
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: Every function is deterministic - same input = same output
//! 2. **No I/O**: Location services, network, storage access is FORBIDDEN here
//! 3. **Explicit Errors**: All errors are typed, never strings or panics

// =============================================================================
// Module Declarations
// =============================================================================

pub mod connection;
pub mod error;
pub mod event;
pub mod geo;
pub mod region;
pub mod region_plan;
pub mod source;

// =============================================================================
// Re-exports
// =============================================================================

pub use connection::{ConnectionStatus, ConnectionSummary};
pub use error::CoreError;
pub use event::{LedgerEntry, RegionEvent, RegionEventKind, RegionEventState};
pub use geo::Coordinate;
pub use region::{MonitoredRegion, MAX_MONITORED_REGIONS, MAX_REGION_RADIUS_METERS};
pub use region_plan::{closest_regions, diff_regions, needs_visit_fallback, RegionDiff};
pub use source::{RunState, SyncOutcome, SyncSource};
