//! # SDK Configuration
//!
//! Configuration is injected by the host through `TetherClient::setup`,
//! never loaded from disk by the SDK itself.

use std::time::Duration;

use serde::{Deserialize, Serialize};

// =============================================================================
// Credentials
// =============================================================================

/// Host-supplied credentials for the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    /// Opaque user token; refreshed externally when authentication fails.
    pub user_token: String,
}

impl Credentials {
    pub fn new(user_token: &str) -> Self {
        Credentials {
            user_token: user_token.to_string(),
        }
    }
}

// =============================================================================
// Lifecycle Options
// =============================================================================

/// Which app-lifecycle signals trigger a synchronization. Each is
/// independently toggle-able.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LifecycleSyncOptions {
    /// Sync when the app moves to the foreground.
    #[serde(default = "default_true")]
    pub sync_on_app_foregrounded: bool,

    /// Sync when the app moves to the background.
    #[serde(default = "default_true")]
    pub sync_on_app_backgrounded: bool,
}

fn default_true() -> bool {
    true
}

impl Default for LifecycleSyncOptions {
    fn default() -> Self {
        LifecycleSyncOptions {
            sync_on_app_foregrounded: true,
            sync_on_app_backgrounded: true,
        }
    }
}

// =============================================================================
// Sync Configuration
// =============================================================================

/// Default background task identifier the host must declare.
pub const DEFAULT_BACKGROUND_TASK_IDENTIFIER: &str = "com.tether.sdk.synchronization";

/// Default minimum spacing between OS-driven background runs.
const DEFAULT_BACKGROUND_INTERVAL_SECS: u64 = 3600;

/// Default bound on pending location events before the ledger starts
/// dropping instead of retrying.
const DEFAULT_SANITY_THRESHOLD: usize = 100;

/// Engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// OS background task identifier.
    #[serde(default = "default_task_identifier")]
    pub background_task_identifier: String,

    /// Minimum spacing between OS background runs, in seconds.
    #[serde(default = "default_background_interval_secs")]
    pub min_background_interval_secs: u64,

    /// Pending location-event cap; above it, events are dropped rather
    /// than retried forever.
    #[serde(default = "default_sanity_threshold")]
    pub sanity_threshold: usize,
}

fn default_task_identifier() -> String {
    DEFAULT_BACKGROUND_TASK_IDENTIFIER.to_string()
}

fn default_background_interval_secs() -> u64 {
    DEFAULT_BACKGROUND_INTERVAL_SECS
}

fn default_sanity_threshold() -> usize {
    DEFAULT_SANITY_THRESHOLD
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            background_task_identifier: default_task_identifier(),
            min_background_interval_secs: default_background_interval_secs(),
            sanity_threshold: default_sanity_threshold(),
        }
    }
}

impl SyncConfig {
    /// Minimum spacing between OS background runs.
    pub fn min_background_interval(&self) -> Duration {
        Duration::from_secs(self.min_background_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SyncConfig::default();
        assert_eq!(
            config.background_task_identifier,
            DEFAULT_BACKGROUND_TASK_IDENTIFIER
        );
        assert_eq!(config.min_background_interval(), Duration::from_secs(3600));
        assert_eq!(config.sanity_threshold, 100);

        let options = LifecycleSyncOptions::default();
        assert!(options.sync_on_app_foregrounded);
        assert!(options.sync_on_app_backgrounded);
    }

    #[test]
    fn test_config_deserializes_with_missing_fields() {
        let config: SyncConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.sanity_threshold, 100);

        let options: LifecycleSyncOptions =
            serde_json::from_str(r#"{"sync_on_app_backgrounded": false}"#).unwrap();
        assert!(options.sync_on_app_foregrounded);
        assert!(!options.sync_on_app_backgrounded);
    }
}
