//! # Permissions Requestor
//!
//! The synchronization subscriber that surfaces queued OS permission
//! prompts. Prompts are user-visible, so only one is ever in flight and
//! they only run on sources where the user is plausibly looking at the
//! app. A denial is a normal outcome, not an error.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info};

use tether_core::SyncSource;

use crate::subscriber::{SubscriberReport, SyncSubscriber};

// =============================================================================
// Prompter Seam
// =============================================================================

/// OS permissions the SDK may need.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    /// Location access, required for region monitoring.
    Location,

    /// Push notifications, required for silent-push triggers.
    Notifications,
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Permission::Location => write!(f, "location"),
            Permission::Notifications => write!(f, "notifications"),
        }
    }
}

/// The user's answer to a prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionOutcome {
    Granted,
    Denied,
}

/// Host-side bridge to the platform permission dialog.
#[async_trait]
pub trait PermissionPrompter: Send + Sync {
    /// Shows the system prompt and resolves with the user's answer.
    async fn request(&self, permission: Permission) -> PermissionOutcome;
}

/// Prompter for hosts without a UI; denies everything.
pub struct DenyAllPrompter;

#[async_trait]
impl PermissionPrompter for DenyAllPrompter {
    async fn request(&self, _permission: Permission) -> PermissionOutcome {
        PermissionOutcome::Denied
    }
}

// =============================================================================
// Requestor
// =============================================================================

/// Queues permission requests and drains them one at a time during
/// foreground-ish synchronization runs.
pub struct PermissionsRequestor {
    prompter: Arc<dyn PermissionPrompter>,
    queue: Mutex<VecDeque<Permission>>,
    // Serializes prompts; the OS shows one dialog at a time.
    prompt_gate: Mutex<()>,
}

impl PermissionsRequestor {
    pub fn new(prompter: Arc<dyn PermissionPrompter>) -> Self {
        PermissionsRequestor {
            prompter,
            queue: Mutex::new(VecDeque::new()),
            prompt_gate: Mutex::new(()),
        }
    }

    /// Queues a prompt for the next eligible run. Duplicates collapse.
    pub async fn enqueue(&self, permission: Permission) {
        let mut queue = self.queue.lock().await;
        if !queue.contains(&permission) {
            queue.push_back(permission);
        }
    }

    /// Prompts waiting for the next eligible run.
    pub async fn queued_count(&self) -> usize {
        self.queue.lock().await.len()
    }
}

#[async_trait]
impl SyncSubscriber for PermissionsRequestor {
    fn name(&self) -> &str {
        "permissions"
    }

    fn should_participate(&self, source: SyncSource) -> bool {
        // Only prompt when the user is plausibly present.
        matches!(
            source,
            SyncSource::AppForegrounded | SyncSource::Forced | SyncSource::ConnectionAdded
        )
    }

    async fn perform_synchronization(&self, _source: SyncSource) -> SubscriberReport {
        loop {
            let next = self.queue.lock().await.pop_front();
            let Some(permission) = next else { break };

            let _gate = self.prompt_gate.lock().await;
            match self.prompter.request(permission).await {
                PermissionOutcome::Granted => info!(%permission, "Permission granted"),
                PermissionOutcome::Denied => {
                    // Not an error: the user said no and the SDK runs
                    // degraded without the capability.
                    debug!(%permission, "Permission denied")
                }
            }
        }
        SubscriberReport::no_data()
    }

    async fn reset(&self) {
        self.queue.lock().await.clear();
    }
}
