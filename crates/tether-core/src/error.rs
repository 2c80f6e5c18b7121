//! # Domain Error Types
//!
//! Errors produced by pure domain validation. Engine-level failures
//! (network, storage, scheduling) live in `tether-sync`.

use thiserror::Error;

/// Result type alias for domain operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Domain validation errors.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CoreError {
    /// Latitude outside [-90, 90] or longitude outside [-180, 180].
    #[error("Invalid coordinate: latitude {latitude}, longitude {longitude}")]
    InvalidCoordinate { latitude: f64, longitude: f64 },

    /// Region radius must be strictly positive.
    #[error("Invalid region radius: {0} meters")]
    InvalidRadius(f64),

    /// Region identifier is empty or contains the reserved namespace separator.
    #[error("Invalid region identifier: '{0}'")]
    InvalidRegionIdentifier(String),
}
