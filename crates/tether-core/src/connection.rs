//! # Connection Summaries
//!
//! The minimal shape of a user-activated connection that the sync engine
//! needs: identity plus enablement status. Full connection/service models
//! and the JSON that produces them live with the host integration, outside
//! this workspace.

use serde::{Deserialize, Serialize};

// =============================================================================
// Connection Status
// =============================================================================

/// Enablement state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// Active for this user.
    Enabled,

    /// Present but switched off.
    Disabled,

    /// The backend reported a state this SDK version does not know.
    Unknown,
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionStatus::Enabled => write!(f, "enabled"),
            ConnectionStatus::Disabled => write!(f, "disabled"),
            ConnectionStatus::Unknown => write!(f, "unknown"),
        }
    }
}

// =============================================================================
// Connection Summary
// =============================================================================

/// Identity and status of one connection, as held by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionSummary {
    /// Backend connection id.
    pub id: String,

    /// Current enablement state.
    pub status: ConnectionStatus,
}

impl ConnectionSummary {
    /// Creates an enabled summary, the state a freshly activated
    /// connection starts in.
    pub fn enabled(id: &str) -> Self {
        ConnectionSummary {
            id: id.to_string(),
            status: ConnectionStatus::Enabled,
        }
    }
}
