//! # Persisted Registries
//!
//! Two storage seams, both host-injected:
//!
//! - [`ConnectionsRegistry`]: the set of connections this user has
//!   activated, single-writer from the engine's point of view.
//! - [`KeyValueStore`]: the abstract store behind the location-event
//!   ledger and the persisted region descriptors. String keys, JSON
//!   values, reconstructable across process restarts.
//!
//! In-memory implementations back tests and hosts without persistence.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use tether_core::{ConnectionStatus, ConnectionSummary, SyncSource};

use crate::publisher::EventPublisher;

// =============================================================================
// Registry Change Events
// =============================================================================

/// Change notification published by the registry; the scheduler always
/// observes these and turns each into a synchronization trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryChange {
    /// A connection was activated.
    Added,

    /// A connection was removed.
    Removed,

    /// A connection's enablement state changed.
    Updated,
}

impl RegistryChange {
    /// The trigger source this change maps to.
    pub fn as_source(&self) -> SyncSource {
        match self {
            RegistryChange::Added => SyncSource::ConnectionAdded,
            RegistryChange::Removed => SyncSource::ConnectionRemoved,
            RegistryChange::Updated => SyncSource::ConnectionUpdated,
        }
    }
}

// =============================================================================
// Connections Registry
// =============================================================================

/// The set of currently-tracked connections.
#[async_trait]
pub trait ConnectionsRegistry: Send + Sync {
    /// Returns every tracked connection.
    async fn get_connections(&self) -> HashSet<ConnectionSummary>;

    /// Starts tracking the given connection ids (as enabled).
    async fn add_connections(&self, ids: &[String]);

    /// Replaces the stored summary for one connection. When
    /// `should_notify` is true and the stored state actually changed, an
    /// update notification is published.
    async fn update(&self, connection: ConnectionSummary, should_notify: bool);

    /// Stops tracking one connection. When `should_notify` is true and
    /// the connection was actually tracked, a removal notification is
    /// published.
    async fn remove(&self, id: &str, should_notify: bool);

    /// Clears the registry (sign-out path).
    async fn remove_all(&self);
}

/// In-memory registry keyed by connection id.
pub struct InMemoryConnectionsRegistry {
    connections: RwLock<HashMap<String, ConnectionStatus>>,
    changes: Option<EventPublisher<RegistryChange>>,
}

impl InMemoryConnectionsRegistry {
    /// Registry that never notifies.
    pub fn new() -> Self {
        InMemoryConnectionsRegistry {
            connections: RwLock::new(HashMap::new()),
            changes: None,
        }
    }

    /// Registry that publishes change notifications.
    pub fn with_publisher(changes: EventPublisher<RegistryChange>) -> Self {
        InMemoryConnectionsRegistry {
            connections: RwLock::new(HashMap::new()),
            changes: Some(changes),
        }
    }

    fn notify(&self, change: RegistryChange) {
        if let Some(publisher) = &self.changes {
            publisher.on_next(change);
        }
    }
}

impl Default for InMemoryConnectionsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConnectionsRegistry for InMemoryConnectionsRegistry {
    async fn get_connections(&self) -> HashSet<ConnectionSummary> {
        self.connections
            .read()
            .await
            .iter()
            .map(|(id, status)| ConnectionSummary {
                id: id.clone(),
                status: *status,
            })
            .collect()
    }

    async fn add_connections(&self, ids: &[String]) {
        let mut added = false;
        {
            let mut connections = self.connections.write().await;
            for id in ids {
                if connections
                    .insert(id.clone(), ConnectionStatus::Enabled)
                    .is_none()
                {
                    added = true;
                }
            }
        }
        if added {
            self.notify(RegistryChange::Added);
        }
    }

    async fn update(&self, connection: ConnectionSummary, should_notify: bool) {
        let changed = {
            let mut connections = self.connections.write().await;
            connections.insert(connection.id.clone(), connection.status)
                != Some(connection.status)
        };
        if changed && should_notify {
            self.notify(RegistryChange::Updated);
        }
    }

    async fn remove(&self, id: &str, should_notify: bool) {
        let removed = self.connections.write().await.remove(id).is_some();
        if removed && should_notify {
            self.notify(RegistryChange::Removed);
        }
    }

    async fn remove_all(&self) {
        let had_any = {
            let mut connections = self.connections.write().await;
            let had_any = !connections.is_empty();
            connections.clear();
            had_any
        };
        if had_any {
            self.notify(RegistryChange::Removed);
        }
    }
}

// =============================================================================
// Key-Value Store
// =============================================================================

/// Abstract persisted key-value store; string keys, JSON values.
/// Single-writer: the engine never assumes multi-process concurrent
/// writers.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Reads one value.
    async fn get(&self, key: &str) -> Option<Value>;

    /// Writes one value.
    async fn set(&self, key: &str, value: Value);

    /// Deletes one key.
    async fn remove(&self, key: &str);

    /// Lists the keys starting with `prefix`.
    async fn keys_with_prefix(&self, prefix: &str) -> Vec<String>;
}

/// In-memory store backing tests and hosts without persistence.
#[derive(Default)]
pub struct InMemoryKeyValueStore {
    values: RwLock<HashMap<String, Value>>,
}

impl InMemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for InMemoryKeyValueStore {
    async fn get(&self, key: &str) -> Option<Value> {
        self.values.read().await.get(key).cloned()
    }

    async fn set(&self, key: &str, value: Value) {
        self.values.write().await.insert(key.to_string(), value);
    }

    async fn remove(&self, key: &str) {
        self.values.write().await.remove(key);
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.values
            .read()
            .await
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect()
    }
}
