//! # Trigger Sources and Run Outcomes
//!
//! Every synchronization run is started by exactly one trigger source, and
//! finishes with exactly one outcome. Sources are carried with the trigger
//! event from its origin (a lifecycle hook, a silent push, an OS background
//! window, a geofence crossing) all the way into the run's log lines.
//!
//! ## Source → Behavior Matrix
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Source               │ Gated on foreground │ Obtains OS grant          │
//! │  ─────────────────────┼─────────────────────┼────────────────────────── │
//! │  AppForegrounded      │        yes          │          yes              │
//! │  AppBackgrounded      │        no           │          yes              │
//! │  SilentPush           │        no           │          yes              │
//! │  BackgroundProcess    │        no           │  no (already OS-granted)  │
//! │  Forced               │        no           │          yes              │
//! │  ConnectionAdded      │        no           │          yes              │
//! │  ConnectionRemoved    │        no           │          yes              │
//! │  ConnectionUpdated    │        no           │          yes              │
//! │  LocationEvent        │        no           │          yes              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};

// =============================================================================
// Sync Source
// =============================================================================

/// The origin of a synchronization trigger. Closed set; immutable once the
/// trigger event is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncSource {
    /// The host app moved to the foreground.
    AppForegrounded,

    /// The host app moved to the background.
    AppBackgrounded,

    /// A silent push notification arrived.
    SilentPush,

    /// The OS opened a background-processing window it granted earlier.
    BackgroundProcess,

    /// Explicit, host-initiated synchronization.
    Forced,

    /// A connection was activated by the user.
    ConnectionAdded,

    /// A connection was removed/deactivated.
    ConnectionRemoved,

    /// A connection's enablement state changed.
    ConnectionUpdated,

    /// A geofence entry/exit was reported by the platform.
    LocationEvent,
}

impl SyncSource {
    /// Returns true when the run already executes inside an OS-granted
    /// background window, so obtaining a second execution grant would
    /// double-account the budget.
    pub fn is_os_granted(&self) -> bool {
        matches!(self, SyncSource::BackgroundProcess)
    }

    /// Returns true for sources that are only meaningful while the app is
    /// in the foreground. Background-transition-driven runs are explicitly
    /// allowed to run while backgrounded; foreground-driven ones are not.
    pub fn requires_foreground(&self) -> bool {
        matches!(self, SyncSource::AppForegrounded)
    }

    /// Returns true for sources that originate from the connections
    /// registry rather than from the host/OS.
    pub fn is_registry_change(&self) -> bool {
        matches!(
            self,
            SyncSource::ConnectionAdded
                | SyncSource::ConnectionRemoved
                | SyncSource::ConnectionUpdated
        )
    }
}

impl std::fmt::Display for SyncSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncSource::AppForegrounded => write!(f, "app_foregrounded"),
            SyncSource::AppBackgrounded => write!(f, "app_backgrounded"),
            SyncSource::SilentPush => write!(f, "silent_push"),
            SyncSource::BackgroundProcess => write!(f, "background_process"),
            SyncSource::Forced => write!(f, "forced"),
            SyncSource::ConnectionAdded => write!(f, "connection_added"),
            SyncSource::ConnectionRemoved => write!(f, "connection_removed"),
            SyncSource::ConnectionUpdated => write!(f, "connection_updated"),
            SyncSource::LocationEvent => write!(f, "location_event"),
        }
    }
}

// =============================================================================
// Sync Outcome
// =============================================================================

/// Aggregate outcome of one synchronization run.
///
/// ## Aggregation Rules
/// - `NewData` if any subscriber reported new data and no error was recorded
/// - `Failed` if an authentication failure occurred (short-circuits the run),
///   if the device was offline, or if any subscriber recorded an error
/// - `NoData` otherwise
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    /// At least one subscriber pulled down new data.
    NewData,

    /// Everything ran; nothing changed.
    NoData,

    /// The run failed (offline, authentication, or subscriber error).
    Failed,
}

impl SyncOutcome {
    /// Folds a subscriber-level result into an aggregate outcome.
    /// `NewData` dominates `NoData`; `Failed` dominates both.
    pub fn merge(self, other: SyncOutcome) -> SyncOutcome {
        match (self, other) {
            (SyncOutcome::Failed, _) | (_, SyncOutcome::Failed) => SyncOutcome::Failed,
            (SyncOutcome::NewData, _) | (_, SyncOutcome::NewData) => SyncOutcome::NewData,
            _ => SyncOutcome::NoData,
        }
    }
}

impl std::fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncOutcome::NewData => write!(f, "new_data"),
            SyncOutcome::NoData => write!(f, "no_data"),
            SyncOutcome::Failed => write!(f, "failed"),
        }
    }
}

// =============================================================================
// Run State
// =============================================================================

/// Whether the scheduler/manager pair is currently accepting work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Not started, or stopped; triggers are ignored.
    Stopped,

    /// Started; triggers are accepted.
    Running,

    /// State cannot be determined (e.g., the engine task is gone).
    #[default]
    Unknown,
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunState::Stopped => write!(f, "stopped"),
            RunState::Running => write!(f, "running"),
            RunState::Unknown => write!(f, "unknown"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_os_granted_sources() {
        assert!(SyncSource::BackgroundProcess.is_os_granted());
        assert!(!SyncSource::SilentPush.is_os_granted());
        assert!(!SyncSource::Forced.is_os_granted());
    }

    #[test]
    fn test_foreground_gating() {
        assert!(SyncSource::AppForegrounded.requires_foreground());
        assert!(!SyncSource::AppBackgrounded.requires_foreground());
        assert!(!SyncSource::LocationEvent.requires_foreground());
    }

    #[test]
    fn test_registry_change_sources() {
        assert!(SyncSource::ConnectionAdded.is_registry_change());
        assert!(SyncSource::ConnectionUpdated.is_registry_change());
        assert!(!SyncSource::SilentPush.is_registry_change());
    }

    #[test]
    fn test_outcome_merge_precedence() {
        assert_eq!(
            SyncOutcome::NoData.merge(SyncOutcome::NewData),
            SyncOutcome::NewData
        );
        assert_eq!(
            SyncOutcome::NewData.merge(SyncOutcome::Failed),
            SyncOutcome::Failed
        );
        assert_eq!(
            SyncOutcome::NoData.merge(SyncOutcome::NoData),
            SyncOutcome::NoData
        );
    }

    #[test]
    fn test_source_display() {
        assert_eq!(SyncSource::SilentPush.to_string(), "silent_push");
        assert_eq!(SyncSource::LocationEvent.to_string(), "location_event");
    }
}
