//! # Coordinates and Great-Circle Distance
//!
//! Navigation math for ranking geofence regions by distance to a visit.
//! Uses a spherical-earth approximation, which is accurate to well under
//! one percent at geofence scales (hundreds of meters to tens of
//! kilometers).
//!
//! # Coordinate System
//!
//! - Latitude: degrees north (-90 to 90)
//! - Longitude: degrees east (-180 to 180)
//! - Distance: meters

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Earth's mean radius in meters.
const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Degrees to radians conversion factor.
const DEG_TO_RAD: f64 = PI / 180.0;

// =============================================================================
// Coordinate
// =============================================================================

/// A WGS-84 latitude/longitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    /// Degrees north, -90 to 90.
    pub latitude: f64,

    /// Degrees east, -180 to 180.
    pub longitude: f64,
}

impl Coordinate {
    /// Creates a coordinate, validating the ranges.
    pub fn new(latitude: f64, longitude: f64) -> CoreResult<Self> {
        if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
            return Err(CoreError::InvalidCoordinate {
                latitude,
                longitude,
            });
        }
        Ok(Coordinate {
            latitude,
            longitude,
        })
    }

    /// Great-circle distance to another coordinate, in meters.
    ///
    /// Haversine formula over the spherical earth. Symmetric and
    /// non-negative; zero for identical coordinates.
    pub fn distance_meters(&self, other: &Coordinate) -> f64 {
        let lat1 = self.latitude * DEG_TO_RAD;
        let lat2 = other.latitude * DEG_TO_RAD;
        let dlat = (other.latitude - self.latitude) * DEG_TO_RAD;
        let dlon = (other.longitude - self.longitude) * DEG_TO_RAD;

        let a = (dlat / 2.0).sin().powi(2)
            + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

        EARTH_RADIUS_METERS * c
    }
}
