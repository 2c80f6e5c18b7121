//! # Synchronization Trigger Events
//!
//! A [`SyncTriggerEvent`] is created at a trigger's origin (a host hook, a
//! lifecycle observer, a geofence crossing) and consumed exactly once by
//! the manager. The optional completion callback must eventually be invoked
//! with the run's outcome, whoever ends up answering it.

use std::sync::{Arc, Mutex};

use tether_core::{SyncOutcome, SyncSource};

/// Callback invoked exactly once with the aggregate outcome of the run the
/// trigger produced (or with the outcome of the decision not to run).
pub type CompletionHandler = Box<dyn FnOnce(SyncOutcome) + Send + 'static>;

// =============================================================================
// Trigger Event
// =============================================================================

/// One trigger, carrying its origin and an optional completion.
///
/// The event is `Clone` so it can fan out through the publisher, but the
/// completion is consumed exactly once: the first consumer to call
/// [`take_completion`](SyncTriggerEvent::take_completion) gets it.
pub struct SyncTriggerEvent {
    /// Where the trigger came from. Immutable.
    pub source: SyncSource,

    completion: Arc<Mutex<Option<CompletionHandler>>>,
}

impl Clone for SyncTriggerEvent {
    fn clone(&self) -> Self {
        SyncTriggerEvent {
            source: self.source,
            completion: Arc::clone(&self.completion),
        }
    }
}

impl std::fmt::Debug for SyncTriggerEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncTriggerEvent")
            .field("source", &self.source)
            .finish()
    }
}

impl SyncTriggerEvent {
    /// Creates a trigger with no completion.
    pub fn new(source: SyncSource) -> Self {
        SyncTriggerEvent {
            source,
            completion: Arc::new(Mutex::new(None)),
        }
    }

    /// Creates a trigger whose completion must eventually fire.
    pub fn with_completion<F>(source: SyncSource, completion: F) -> Self
    where
        F: FnOnce(SyncOutcome) + Send + 'static,
    {
        SyncTriggerEvent {
            source,
            completion: Arc::new(Mutex::new(Some(Box::new(completion)))),
        }
    }

    /// Takes the completion out of the event. Returns `None` if the event
    /// never carried one or it was already taken.
    pub fn take_completion(&self) -> Option<CompletionHandler> {
        self.completion
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_completion_is_consumed_exactly_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_in = Arc::clone(&calls);

        let event = SyncTriggerEvent::with_completion(SyncSource::Forced, move |_| {
            calls_in.fetch_add(1, Ordering::SeqCst);
        });
        let copy = event.clone();

        let first = event.take_completion();
        let second = copy.take_completion();
        assert!(first.is_some());
        assert!(second.is_none());

        first.unwrap()(SyncOutcome::NoData);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_event_without_completion() {
        let event = SyncTriggerEvent::new(SyncSource::SilentPush);
        assert!(event.take_completion().is_none());
        assert_eq!(event.source, SyncSource::SilentPush);
    }
}
