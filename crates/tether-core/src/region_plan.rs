//! # Region Multiplexing Rules
//!
//! An account can have far more geofence triggers than the platform can
//! monitor at once. These pure rules decide how to map an unbounded
//! desired set onto the hard platform cap.
//!
//! ## Decision Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Region Multiplexing                                │
//! │                                                                         │
//! │  update_regions(desired)                                                │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  needs_visit_fallback(current, desired, cap)?                           │
//! │        │                                                                │
//! │   no ──┼── yes                                                          │
//! │   │         │                                                           │
//! │   ▼         ▼                                                           │
//! │  diff_regions()          stop all SDK regions, enable visit monitoring  │
//! │  start/stop the          wait for next coarse visit at coordinate V     │
//! │  difference                     │                                       │
//! │                                 ▼                                       │
//! │                          closest_regions(desired, V, cap)               │
//! │                          install exactly that subset                    │
//! │                                                                         │
//! │  The visit-fallback set is a dynamic window: every new visit re-ranks   │
//! │  and re-installs the closest regions.                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The diff always runs against the platform's authoritative current set,
//! never local bookkeeping, to tolerate external mutation and process
//! restarts.

use std::collections::HashSet;

use crate::geo::Coordinate;
use crate::region::{is_sdk_region, MonitoredRegion};

// =============================================================================
// Visit Fallback Decision
// =============================================================================

/// Decides whether the desired set can be installed directly or whether
/// coarse visit monitoring must take over.
///
/// Let C = currently monitored identifiers, D = desired set, I = C ∩ D.
/// Direct installation needs `|C| + (|D| − |I|)` slots before the stale
/// entries are evicted; if that exceeds `cap`, fall back to visits.
///
/// Strict inequality: a projected set of exactly `cap` installs directly.
pub fn needs_visit_fallback(
    current_ids: &HashSet<String>,
    desired: &[MonitoredRegion],
    cap: usize,
) -> bool {
    let desired_ids: HashSet<&str> = desired.iter().map(|r| r.identifier.as_str()).collect();
    let intersection = current_ids
        .iter()
        .filter(|id| desired_ids.contains(id.as_str()))
        .count();

    current_ids.len() + (desired.len() - intersection) > cap
}

// =============================================================================
// Direct Reconciliation
// =============================================================================

/// Difference between the platform's current region set and the desired one.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RegionDiff {
    /// Desired regions the platform is not yet monitoring.
    pub to_start: Vec<MonitoredRegion>,

    /// Identifiers of SDK-owned regions the platform monitors but that are
    /// no longer desired. Host-app regions are never included.
    pub to_stop: Vec<String>,
}

impl RegionDiff {
    /// True when the platform set already matches the desired set.
    pub fn is_empty(&self) -> bool {
        self.to_start.is_empty() && self.to_stop.is_empty()
    }
}

/// Computes the start/stop sets to reconcile the platform with `desired`.
pub fn diff_regions(current_ids: &HashSet<String>, desired: &[MonitoredRegion]) -> RegionDiff {
    let desired_ids: HashSet<&str> = desired.iter().map(|r| r.identifier.as_str()).collect();

    let to_start = desired
        .iter()
        .filter(|r| !current_ids.contains(&r.identifier))
        .cloned()
        .collect();

    let to_stop = current_ids
        .iter()
        .filter(|id| is_sdk_region(id) && !desired_ids.contains(id.as_str()))
        .cloned()
        .collect();

    RegionDiff { to_start, to_stop }
}

// =============================================================================
// Visit-Driven Ranking
// =============================================================================

/// Ranks the desired regions by great-circle distance to a visit coordinate,
/// ascending, and returns the closest `cap` of them.
pub fn closest_regions(
    desired: &[MonitoredRegion],
    visit: Coordinate,
    cap: usize,
) -> Vec<MonitoredRegion> {
    let mut ranked: Vec<&MonitoredRegion> = desired.iter().collect();
    ranked.sort_by(|a, b| {
        let da = a.center.distance_meters(&visit);
        let db = b.center.distance_meters(&visit);
        da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
    });

    ranked.into_iter().take(cap).cloned().collect()
}
