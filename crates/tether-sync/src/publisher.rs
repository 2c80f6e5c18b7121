//! # Typed Event Publisher
//!
//! Thread-safe multi-subscriber broadcast primitive; the leaf component
//! everything above it is wired through.
//!
//! ## Delivery Model
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        EventPublisher<T>                                │
//! │                                                                         │
//! │  add_subscriber(closure) ──► token (monotonic registration sequence)    │
//! │                                                                         │
//! │  on_next(event):                                                        │
//! │    1. snapshot subscribers under the registration lock                  │
//! │    2. release the lock                                                  │
//! │    3. dispatch to each closure on its own spawned task, enumerating     │
//! │       the snapshot in ascending registration order                      │
//! │                                                                         │
//! │  • registration-map mutation never blocks in-flight delivery            │
//! │  • no subscriber can block another                                      │
//! │  • concurrent on_next calls each see a consistent snapshot; no          │
//! │    ordering is promised across them                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! This primitive cannot fail. A subscriber closure that panics is a
//! programmer error; the panic is contained to its spawned task.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

// =============================================================================
// Subscriber Token
// =============================================================================

/// Opaque handle returned by [`EventPublisher::add_subscriber`]; pass it to
/// [`EventPublisher::remove_subscriber`] to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberToken(u64);

type Callback<T> = Arc<dyn Fn(T) + Send + Sync + 'static>;

struct Registrations<T> {
    /// Next registration sequence number.
    next_seq: u64,

    /// Subscribers keyed by registration sequence. BTreeMap iteration
    /// yields ascending registration order.
    subscribers: BTreeMap<u64, Callback<T>>,
}

// =============================================================================
// Event Publisher
// =============================================================================

/// Thread-safe, typed broadcast to any number of subscriber closures.
///
/// Cloning the publisher clones a handle to the same subscriber set.
pub struct EventPublisher<T> {
    registrations: Arc<Mutex<Registrations<T>>>,
}

impl<T> Clone for EventPublisher<T> {
    fn clone(&self) -> Self {
        EventPublisher {
            registrations: Arc::clone(&self.registrations),
        }
    }
}

impl<T> Default for EventPublisher<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> EventPublisher<T> {
    /// Creates a publisher with no subscribers.
    pub fn new() -> Self {
        EventPublisher {
            registrations: Arc::new(Mutex::new(Registrations {
                next_seq: 0,
                subscribers: BTreeMap::new(),
            })),
        }
    }

    /// Registers a subscriber closure and returns its token.
    pub fn add_subscriber<F>(&self, closure: F) -> SubscriberToken
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        let mut reg = self
            .registrations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let seq = reg.next_seq;
        reg.next_seq += 1;
        reg.subscribers.insert(seq, Arc::new(closure));
        SubscriberToken(seq)
    }

    /// Removes a subscriber. Removing an already-removed token is a no-op.
    pub fn remove_subscriber(&self, token: SubscriberToken) {
        let mut reg = self
            .registrations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        reg.subscribers.remove(&token.0);
    }

    /// Number of currently registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.registrations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .subscribers
            .len()
    }
}

impl<T: Clone + Send + 'static> EventPublisher<T> {
    /// Delivers `event` to every currently registered subscriber.
    ///
    /// Each closure is dispatched on its own task, enumerated in ascending
    /// registration order. Must be called from within a tokio runtime.
    pub fn on_next(&self, event: T) {
        let snapshot: Vec<Callback<T>> = {
            let reg = self
                .registrations
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            reg.subscribers.values().cloned().collect()
        };

        for callback in snapshot {
            let event = event.clone();
            tokio::spawn(async move {
                callback(event);
            });
        }
    }
}
