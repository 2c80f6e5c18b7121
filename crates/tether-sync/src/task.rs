//! # Synchronization Task
//!
//! One in-flight synchronization run. Created when no run is active,
//! terminal once finished, never reused.
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │        Created ──► Running ──► Collecting ──► Finished                  │
//! │                                                                         │
//! │  Created:    eligible subscribers decided, grant obtained               │
//! │  Running:    subscriber work dispatched in parallel                     │
//! │  Collecting: at least one report has arrived                            │
//! │  Finished:   aggregate computed, grant released                         │
//! │                                                                         │
//! │  AGGREGATION                                                            │
//! │  ───────────                                                            │
//! │  auth failure anywhere   → Failed (short-circuits; slower subscribers   │
//! │                            are not awaited)                             │
//! │  any other error         → Failed, but all siblings still awaited;      │
//! │                            the earliest error is kept                   │
//! │  any new data, no errors → NewData                                      │
//! │  otherwise               → NoData                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use tether_core::{SyncOutcome, SyncSource};

use crate::background::BackgroundGrant;
use crate::error::SyncError;
use crate::subscriber::SubscriberReport;

// =============================================================================
// Task State
// =============================================================================

/// Where the task is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Created,
    Running,
    Collecting,
    Finished,
}

/// What recording one report did to the task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskProgress {
    /// More reports are still expected.
    Pending,

    /// Every expected report has arrived.
    Complete,

    /// An authentication failure arrived; finish immediately without
    /// waiting for slower subscribers.
    AuthFailure,
}

// =============================================================================
// Sync Task
// =============================================================================

/// One bounded synchronization run.
pub struct SyncTask {
    /// The trigger that started this run.
    pub source: SyncSource,

    /// When the run was created.
    pub created_at: DateTime<Utc>,

    state: TaskState,
    expected: Vec<String>,
    reports: HashMap<String, SubscriberReport>,
    first_error: Option<SyncError>,
    grant: Option<Box<dyn BackgroundGrant>>,
}

impl std::fmt::Debug for SyncTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncTask")
            .field("source", &self.source)
            .field("state", &self.state)
            .field("expected", &self.expected)
            .field("reported", &self.reports.len())
            .finish()
    }
}

impl SyncTask {
    /// Creates a task for the given eligible subscribers.
    pub fn new(
        source: SyncSource,
        expected: Vec<String>,
        grant: Option<Box<dyn BackgroundGrant>>,
    ) -> Self {
        SyncTask {
            source,
            created_at: Utc::now(),
            state: TaskState::Created,
            expected,
            reports: HashMap::new(),
            first_error: None,
            grant,
        }
    }

    /// Marks subscriber work as dispatched.
    pub fn start(&mut self) {
        self.state = TaskState::Running;
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TaskState {
        self.state
    }

    /// Names of the subscribers this run is waiting on.
    pub fn expected(&self) -> &[String] {
        &self.expected
    }

    /// Folds one subscriber's report in and says what to do next.
    ///
    /// The earliest non-auth error is kept; it downgrades the outcome but
    /// does not abort sibling subscribers.
    pub fn record_report(&mut self, name: &str, report: SubscriberReport) -> TaskProgress {
        if self.state == TaskState::Finished {
            return TaskProgress::Complete;
        }
        self.state = TaskState::Collecting;

        let auth_failure = report
            .error
            .as_ref()
            .is_some_and(|e| e.is_authentication_failure());
        if let Some(error) = &report.error {
            if self.first_error.is_none() {
                self.first_error = Some(error.clone());
            }
        }
        self.reports.insert(name.to_string(), report);

        if auth_failure {
            TaskProgress::AuthFailure
        } else if self.reports.len() >= self.expected.len() {
            TaskProgress::Complete
        } else {
            TaskProgress::Pending
        }
    }

    /// Aggregate outcome over the reports received so far. Valid both for
    /// complete runs and for forced finishes with partial results.
    pub fn aggregate(&self) -> SyncOutcome {
        let auth_failure = self
            .reports
            .values()
            .filter_map(|r| r.error.as_ref())
            .any(|e| e.is_authentication_failure());

        if auth_failure || self.first_error.is_some() {
            return SyncOutcome::Failed;
        }
        if self.reports.values().any(|r| r.new_data) {
            SyncOutcome::NewData
        } else {
            SyncOutcome::NoData
        }
    }

    /// The earliest error any subscriber recorded.
    pub fn first_error(&self) -> Option<&SyncError> {
        self.first_error.as_ref()
    }

    /// True once the run finished with an authentication failure.
    pub fn failed_authentication(&self) -> bool {
        self.reports
            .values()
            .filter_map(|r| r.error.as_ref())
            .any(|e| e.is_authentication_failure())
    }

    /// Finishes the run: releases the execution grant and returns the
    /// aggregate. Terminal; recording further reports is a no-op.
    pub fn finish(&mut self) -> SyncOutcome {
        self.state = TaskState::Finished;
        if let Some(grant) = self.grant.take() {
            grant.end();
        }
        self.aggregate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    struct TestGrant {
        ended: Arc<AtomicBool>,
    }

    impl BackgroundGrant for TestGrant {
        fn end(self: Box<Self>) {
            self.ended.store(true, Ordering::SeqCst);
        }
    }

    fn task(expected: &[&str]) -> SyncTask {
        SyncTask::new(
            SyncSource::Forced,
            expected.iter().map(|s| s.to_string()).collect(),
            None,
        )
    }

    #[test]
    fn test_all_no_data_aggregates_no_data() {
        let mut t = task(&["a", "b"]);
        t.start();
        assert_eq!(
            t.record_report("a", SubscriberReport::no_data()),
            TaskProgress::Pending
        );
        assert_eq!(
            t.record_report("b", SubscriberReport::no_data()),
            TaskProgress::Complete
        );
        assert_eq!(t.finish(), SyncOutcome::NoData);
    }

    #[test]
    fn test_any_new_data_wins_over_no_data() {
        let mut t = task(&["a", "b"]);
        t.start();
        t.record_report("a", SubscriberReport::no_data());
        t.record_report("b", SubscriberReport::new_data());
        assert_eq!(t.finish(), SyncOutcome::NewData);
    }

    #[test]
    fn test_network_error_downgrades_but_does_not_short_circuit() {
        let mut t = task(&["a", "b"]);
        t.start();
        let progress =
            t.record_report("a", SubscriberReport::failed(SyncError::Network("reset".into())));
        // Siblings are still awaited.
        assert_eq!(progress, TaskProgress::Pending);

        t.record_report("b", SubscriberReport::new_data());
        assert_eq!(t.finish(), SyncOutcome::Failed);
        assert_eq!(t.first_error(), Some(&SyncError::Network("reset".into())));
    }

    #[test]
    fn test_auth_failure_short_circuits() {
        let mut t = task(&["a", "b", "c"]);
        t.start();
        let progress =
            t.record_report("a", SubscriberReport::failed(SyncError::AuthenticationFailure));
        assert_eq!(progress, TaskProgress::AuthFailure);
        assert!(t.failed_authentication());
        assert_eq!(t.finish(), SyncOutcome::Failed);
    }

    #[test]
    fn test_partial_aggregate_on_forced_finish() {
        let mut t = task(&["a", "b"]);
        t.start();
        t.record_report("a", SubscriberReport::new_data());
        // Grant expired / cancelled before "b" reported: partial results
        // are accepted, not discarded.
        assert_eq!(t.finish(), SyncOutcome::NewData);
    }

    #[test]
    fn test_finish_releases_the_grant() {
        let ended = Arc::new(AtomicBool::new(false));
        let mut t = SyncTask::new(
            SyncSource::Forced,
            vec!["a".to_string()],
            Some(Box::new(TestGrant {
                ended: Arc::clone(&ended),
            })),
        );
        t.start();
        t.record_report("a", SubscriberReport::no_data());
        t.finish();
        assert!(ended.load(Ordering::SeqCst));
    }

    #[test]
    fn test_reports_after_finish_are_ignored() {
        let mut t = task(&["a"]);
        t.start();
        t.record_report("a", SubscriberReport::no_data());
        let outcome = t.finish();
        assert_eq!(outcome, SyncOutcome::NoData);

        // Stale report from a cancelled run's straggler.
        t.record_report("a", SubscriberReport::new_data());
        assert_eq!(t.aggregate(), SyncOutcome::NoData);
    }
}
