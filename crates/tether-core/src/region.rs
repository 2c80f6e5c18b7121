//! # Monitored Regions
//!
//! A [`MonitoredRegion`] describes one circular geofence the SDK wants the
//! platform to watch. Two platform realities shape this type:
//!
//! - The platform refuses radii above a maximum monitorable distance, so
//!   radii are clamped at construction.
//! - The host app may monitor regions of its own through the same platform
//!   service. SDK-owned identifiers carry a fixed namespace prefix so
//!   reconciliation never starts or stops a region the SDK did not create.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::geo::Coordinate;

// =============================================================================
// Platform Limits
// =============================================================================

/// Hard platform cap on concurrently monitored regions.
pub const MAX_MONITORED_REGIONS: usize = 20;

/// Maximum radius the platform will monitor, in meters.
pub const MAX_REGION_RADIUS_METERS: f64 = 100_000.0;

/// Namespace prefix for SDK-owned region identifiers.
pub const REGION_ID_PREFIX: &str = "tether/";

// =============================================================================
// Monitored Region
// =============================================================================

/// One circular geofence, namespaced to the SDK and clamped to the
/// platform's maximum radius.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoredRegion {
    /// Namespaced identifier (`tether/<trigger id>`).
    pub identifier: String,

    /// Center of the circle.
    pub center: Coordinate,

    /// Radius in meters, clamped to [`MAX_REGION_RADIUS_METERS`].
    pub radius_meters: f64,

    /// Identifier of the trigger subscription that wants this region.
    pub trigger_id: String,
}

impl MonitoredRegion {
    /// Creates a region owned by the SDK. The identifier is derived from
    /// the trigger id and namespaced; the radius is clamped.
    pub fn new(trigger_id: &str, center: Coordinate, radius_meters: f64) -> CoreResult<Self> {
        if trigger_id.is_empty() {
            return Err(CoreError::InvalidRegionIdentifier(trigger_id.to_string()));
        }
        if radius_meters <= 0.0 {
            return Err(CoreError::InvalidRadius(radius_meters));
        }

        Ok(MonitoredRegion {
            identifier: namespaced_id(trigger_id),
            center,
            radius_meters: radius_meters.min(MAX_REGION_RADIUS_METERS),
            trigger_id: trigger_id.to_string(),
        })
    }
}

/// Prepends the SDK namespace to a trigger id.
pub fn namespaced_id(trigger_id: &str) -> String {
    format!("{REGION_ID_PREFIX}{trigger_id}")
}

/// Returns true if the identifier was created by this SDK. Regions the host
/// app monitors on its own never match.
pub fn is_sdk_region(identifier: &str) -> bool {
    identifier.starts_with(REGION_ID_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coord() -> Coordinate {
        Coordinate::new(37.0, -122.0).unwrap()
    }

    #[test]
    fn test_identifier_is_namespaced() {
        let region = MonitoredRegion::new("trigger-1", coord(), 150.0).unwrap();
        assert_eq!(region.identifier, "tether/trigger-1");
        assert!(is_sdk_region(&region.identifier));
        assert!(!is_sdk_region("host-app-region"));
    }

    #[test]
    fn test_radius_clamped_to_platform_maximum() {
        let region = MonitoredRegion::new("t", coord(), 500_000.0).unwrap();
        assert_eq!(region.radius_meters, MAX_REGION_RADIUS_METERS);

        let region = MonitoredRegion::new("t", coord(), 150.0).unwrap();
        assert_eq!(region.radius_meters, 150.0);
    }

    #[test]
    fn test_invalid_inputs_rejected() {
        assert!(MonitoredRegion::new("", coord(), 100.0).is_err());
        assert!(MonitoredRegion::new("t", coord(), 0.0).is_err());
        assert!(MonitoredRegion::new("t", coord(), -10.0).is_err());
    }

    #[test]
    fn test_region_round_trips_through_json() {
        let region = MonitoredRegion::new("t-9", coord(), 250.0).unwrap();
        let json = serde_json::to_string(&region).unwrap();
        let back: MonitoredRegion = serde_json::from_str(&json).unwrap();
        assert_eq!(region, back);
    }
}
