//! # Synchronization Manager
//!
//! Owns the single in-flight synchronization run; fans work out to all
//! eligible subscribers and fans results back in.
//!
//! ## Manager Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        SyncManager Flow                                 │
//! │                                                                         │
//! │  sync(source, completion)                                               │
//! │        │                                                                │
//! │        ├── run active? ──► capture as THE pending next-request          │
//! │        │                   (last-write-wins, at most one entry)         │
//! │        │                                                                │
//! │        ├── offline? ─────► complete Failed, touch no subscriber         │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  build eligible list (should_participate) ── obtain OS grant            │
//! │        │                  (skipped when the source is itself an         │
//! │        ▼                   OS-granted background window)                │
//! │  spawn every subscriber's perform in parallel                           │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  reports funnel back over the command channel (the single               │
//! │  serialization point; no lock on the task itself)                       │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  finish: release grant, invoke completion, start the pending run        │
//! │          (unless the run failed authentication, which discards it)      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Correctness relies on confinement: everything that reads or mutates the
//! current task runs inside the actor loop. Subscriber work completes on
//! arbitrary threads and re-enters through [`ManagerCommand`].

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use tether_core::{RunState, SyncOutcome, SyncSource};

use crate::background::BackgroundGrantProvider;
use crate::error::SyncError;
use crate::reachability::Reachability;
use crate::subscriber::{SubscriberReport, SyncSubscriber};
use crate::task::{SyncTask, TaskProgress};
use crate::trigger::CompletionHandler;

// =============================================================================
// Commands
// =============================================================================

/// Everything that can reach the manager's serialized context.
pub(crate) enum ManagerCommand {
    /// A new trigger.
    Sync {
        source: SyncSource,
        completion: Option<CompletionHandler>,
    },

    /// A subscriber finished its work for run `run_id`.
    SubscriberFinished {
        run_id: u64,
        name: String,
        report: SubscriberReport,
    },

    /// Force the active run to finish with its partial aggregate.
    Cancel,

    /// The OS revoked run `run_id`'s execution budget.
    GrantExpired { run_id: u64 },

    /// Clear all subscriber-local state (sign-out path).
    Reset,

    /// Query whether the manager is accepting work.
    QueryRunState { reply: oneshot::Sender<RunState> },

    /// Stop the actor.
    Shutdown,
}

// =============================================================================
// Manager
// =============================================================================

struct ActiveRun {
    id: u64,
    task: SyncTask,
    completion: Option<CompletionHandler>,
}

struct PendingRequest {
    source: SyncSource,
    completion: Option<CompletionHandler>,
}

/// The manager actor. Create with [`SyncManager::new`], then spawn
/// [`SyncManager::run`].
pub struct SyncManager {
    cmd_tx: mpsc::UnboundedSender<ManagerCommand>,
    cmd_rx: mpsc::UnboundedReceiver<ManagerCommand>,
    subscribers: Vec<Arc<dyn SyncSubscriber>>,
    reachability: Arc<dyn Reachability>,
    grants: Arc<dyn BackgroundGrantProvider>,
    current: Option<ActiveRun>,
    pending: Option<PendingRequest>,
    next_run_id: u64,
}

/// Handle for triggering and controlling a running [`SyncManager`].
#[derive(Clone)]
pub struct SyncManagerHandle {
    cmd_tx: mpsc::UnboundedSender<ManagerCommand>,
}

impl SyncManager {
    /// Creates a manager and its handle. Subscribers are registered once,
    /// here, and never change afterwards.
    pub fn new(
        subscribers: Vec<Arc<dyn SyncSubscriber>>,
        reachability: Arc<dyn Reachability>,
        grants: Arc<dyn BackgroundGrantProvider>,
    ) -> (Self, SyncManagerHandle) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let handle = SyncManagerHandle {
            cmd_tx: cmd_tx.clone(),
        };
        let manager = SyncManager {
            cmd_tx,
            cmd_rx,
            subscribers,
            reachability,
            grants,
            current: None,
            pending: None,
            next_run_id: 0,
        };
        (manager, handle)
    }

    /// Runs the manager loop. Spawn this as a background task.
    pub async fn run(mut self) {
        info!(subscribers = self.subscribers.len(), "Sync manager starting");

        while let Some(cmd) = self.cmd_rx.recv().await {
            match cmd {
                ManagerCommand::Sync { source, completion } => {
                    self.begin_run(source, completion).await;
                }
                ManagerCommand::SubscriberFinished {
                    run_id,
                    name,
                    report,
                } => {
                    self.handle_report(run_id, &name, report).await;
                }
                ManagerCommand::Cancel => {
                    self.force_finish(SyncError::Cancelled).await;
                }
                ManagerCommand::GrantExpired { run_id } => {
                    if self.current.as_ref().is_some_and(|run| run.id == run_id) {
                        self.force_finish(SyncError::GrantExpired).await;
                    }
                }
                ManagerCommand::Reset => {
                    for subscriber in &self.subscribers {
                        subscriber.reset().await;
                    }
                    debug!("Subscribers reset");
                }
                ManagerCommand::QueryRunState { reply } => {
                    let _ = reply.send(RunState::Running);
                }
                ManagerCommand::Shutdown => {
                    info!("Sync manager shutting down");
                    break;
                }
            }
        }

        // Whoever is still waiting must hear an answer.
        self.force_finish(SyncError::Cancelled).await;
        if let Some(pending) = self.pending.take() {
            if let Some(completion) = pending.completion {
                completion(SyncOutcome::Failed);
            }
        }

        info!("Sync manager stopped");
    }

    /// Starts a run, or captures the request as the pending next-request
    /// when one is already active.
    async fn begin_run(&mut self, source: SyncSource, completion: Option<CompletionHandler>) {
        if self.current.is_some() {
            debug!(%source, "Run active; capturing trigger as pending next-request");
            if let Some(previous) = self.pending.replace(PendingRequest { source, completion }) {
                // Last-write-wins: the overwritten request never runs, but
                // its completion still fires.
                if let Some(complete) = previous.completion {
                    complete(SyncOutcome::NoData);
                }
            }
            return;
        }

        if !self.reachability.is_reachable().await {
            warn!(%source, "Offline; failing synchronization without touching subscribers");
            if let Some(complete) = completion {
                complete(SyncOutcome::Failed);
            }
            return;
        }

        let eligible: Vec<Arc<dyn SyncSubscriber>> = self
            .subscribers
            .iter()
            .filter(|s| s.should_participate(source))
            .cloned()
            .collect();

        if eligible.is_empty() {
            debug!(%source, "No eligible subscribers for this source");
            if let Some(complete) = completion {
                complete(SyncOutcome::NoData);
            }
            return;
        }

        let run_id = self.next_run_id;
        self.next_run_id += 1;

        // An OS-granted background window already carries a budget;
        // obtaining a second grant would double-account it.
        let grant = if source.is_os_granted() {
            None
        } else {
            let tx = self.cmd_tx.clone();
            self.grants.begin(
                "tether.synchronization",
                Box::new(move || {
                    let _ = tx.send(ManagerCommand::GrantExpired { run_id });
                }),
            )
        };

        let expected: Vec<String> = eligible.iter().map(|s| s.name().to_string()).collect();
        let mut task = SyncTask::new(source, expected, grant);
        task.start();

        info!(
            %source,
            run_id,
            participants = task.expected().len(),
            "Starting synchronization run"
        );

        self.current = Some(ActiveRun {
            id: run_id,
            task,
            completion,
        });

        for subscriber in eligible {
            let tx = self.cmd_tx.clone();
            tokio::spawn(async move {
                let report = subscriber.perform_synchronization(source).await;
                let _ = tx.send(ManagerCommand::SubscriberFinished {
                    run_id,
                    name: subscriber.name().to_string(),
                    report,
                });
            });
        }
    }

    /// Folds one subscriber report into the active run.
    async fn handle_report(&mut self, run_id: u64, name: &str, report: SubscriberReport) {
        let Some(run) = self.current.as_mut() else {
            debug!(subscriber = name, run_id, "Stale report; no active run");
            return;
        };
        if run.id != run_id {
            debug!(subscriber = name, run_id, "Stale report from a finished run");
            return;
        }

        match &report.error {
            Some(error) => warn!(subscriber = name, %error, "Subscriber reported an error"),
            None => debug!(
                subscriber = name,
                new_data = report.new_data,
                "Subscriber finished"
            ),
        }

        match run.task.record_report(name, report) {
            TaskProgress::Pending => {}
            TaskProgress::Complete => self.finish_current().await,
            TaskProgress::AuthFailure => self.finish_current().await,
        }
    }

    /// Finishes the active run and, unless it failed authentication,
    /// starts the pending next-request.
    async fn finish_current(&mut self) {
        let Some(mut run) = self.current.take() else {
            return;
        };

        let failed_authentication = run.task.failed_authentication();
        let outcome = run.task.finish();
        info!(run_id = run.id, %outcome, "Synchronization run finished");

        if let Some(complete) = run.completion.take() {
            complete(outcome);
        }

        if failed_authentication {
            // Further attempts are pointless until credentials are
            // refreshed externally.
            if let Some(pending) = self.pending.take() {
                warn!(
                    source = %pending.source,
                    "Discarding pending synchronization after authentication failure"
                );
                if let Some(complete) = pending.completion {
                    complete(SyncOutcome::Failed);
                }
            }
            return;
        }

        if let Some(pending) = self.pending.take() {
            self.begin_run(pending.source, pending.completion).await;
        }
    }

    /// Forces the active run to finish with whatever partial aggregate is
    /// available. Cancellation does not retract issued requests; their
    /// late reports are dropped by the run-id check.
    async fn force_finish(&mut self, reason: SyncError) {
        let Some(mut run) = self.current.take() else {
            return;
        };

        warn!(run_id = run.id, %reason, "Forcing synchronization run to finish");
        let outcome = run.task.finish();
        if let Some(complete) = run.completion.take() {
            complete(outcome);
        }

        if let Some(pending) = self.pending.take() {
            self.begin_run(pending.source, pending.completion).await;
        }
    }
}

// =============================================================================
// Handle
// =============================================================================

impl SyncManagerHandle {
    /// Triggers a synchronization run. If the manager is gone, the
    /// completion fires with `Failed`.
    pub fn sync(&self, source: SyncSource, completion: Option<CompletionHandler>) {
        if let Err(rejected) = self.cmd_tx.send(ManagerCommand::Sync { source, completion }) {
            if let ManagerCommand::Sync {
                completion: Some(complete),
                ..
            } = rejected.0
            {
                complete(SyncOutcome::Failed);
            }
        }
    }

    /// Cancels the active run, reporting its partial aggregate.
    pub fn cancel_current(&self) {
        let _ = self.cmd_tx.send(ManagerCommand::Cancel);
    }

    /// Clears all subscriber-local state.
    pub fn reset(&self) {
        let _ = self.cmd_tx.send(ManagerCommand::Reset);
    }

    /// Whether the manager is accepting work.
    pub async fn run_state(&self) -> RunState {
        let (tx, rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(ManagerCommand::QueryRunState { reply: tx })
            .is_err()
        {
            return RunState::Unknown;
        }
        rx.await.unwrap_or(RunState::Unknown)
    }

    /// Stops the manager actor.
    pub fn shutdown(&self) {
        let _ = self.cmd_tx.send(ManagerCommand::Shutdown);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::Semaphore;

    use crate::background::{BackgroundGrant, NoOpGrantProvider};
    use crate::reachability::AlwaysReachable;

    // -------------------------------------------------------------------------
    // Fakes
    // -------------------------------------------------------------------------

    struct FakeSubscriber {
        name: String,
        gate: Option<Arc<Semaphore>>,
        reports: Mutex<VecDeque<SubscriberReport>>,
        calls: Arc<Mutex<Vec<SyncSource>>>,
    }

    impl FakeSubscriber {
        fn new(name: &str) -> Self {
            FakeSubscriber {
                name: name.to_string(),
                gate: None,
                reports: Mutex::new(VecDeque::new()),
                calls: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn gated(mut self, gate: Arc<Semaphore>) -> Self {
            self.gate = Some(gate);
            self
        }

        fn with_reports(self, reports: Vec<SubscriberReport>) -> Self {
            *self.reports.lock().unwrap() = reports.into();
            self
        }

        fn calls(&self) -> Arc<Mutex<Vec<SyncSource>>> {
            Arc::clone(&self.calls)
        }
    }

    #[async_trait]
    impl SyncSubscriber for FakeSubscriber {
        fn name(&self) -> &str {
            &self.name
        }

        fn should_participate(&self, _source: SyncSource) -> bool {
            true
        }

        async fn perform_synchronization(&self, source: SyncSource) -> SubscriberReport {
            self.calls.lock().unwrap().push(source);
            if let Some(gate) = &self.gate {
                gate.acquire().await.unwrap().forget();
            }
            self.reports
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(SubscriberReport::no_data)
        }

        async fn reset(&self) {
            self.calls.lock().unwrap().clear();
        }
    }

    struct FixedReachability(bool);

    #[async_trait]
    impl Reachability for FixedReachability {
        async fn is_reachable(&self) -> bool {
            self.0
        }
    }

    struct TestGrant {
        ended: Arc<AtomicBool>,
    }

    impl BackgroundGrant for TestGrant {
        fn end(self: Box<Self>) {
            self.ended.store(true, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct TestGrantProvider {
        begins: AtomicUsize,
        expirations: Mutex<Vec<Box<dyn FnOnce() + Send>>>,
        ended: Arc<AtomicBool>,
    }

    impl BackgroundGrantProvider for TestGrantProvider {
        fn begin(
            &self,
            _reason: &str,
            on_expire: Box<dyn FnOnce() + Send>,
        ) -> Option<Box<dyn BackgroundGrant>> {
            self.begins.fetch_add(1, Ordering::SeqCst);
            self.expirations.lock().unwrap().push(on_expire);
            Some(Box::new(TestGrant {
                ended: Arc::clone(&self.ended),
            }))
        }
    }

    fn completion() -> (CompletionHandler, oneshot::Receiver<SyncOutcome>) {
        let (tx, rx) = oneshot::channel();
        (
            Box::new(move |outcome| {
                let _ = tx.send(outcome);
            }),
            rx,
        )
    }

    fn spawn_manager(
        subscribers: Vec<Arc<dyn SyncSubscriber>>,
        reachability: Arc<dyn Reachability>,
        grants: Arc<dyn BackgroundGrantProvider>,
    ) -> SyncManagerHandle {
        let (manager, handle) = SyncManager::new(subscribers, reachability, grants);
        tokio::spawn(manager.run());
        handle
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(30)).await;
    }

    // -------------------------------------------------------------------------
    // Tests
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_overlapping_triggers_coalesce_last_write_wins() {
        let gate = Arc::new(Semaphore::new(0));
        let subscriber = FakeSubscriber::new("fake")
            .gated(Arc::clone(&gate))
            .with_reports(vec![SubscriberReport::no_data(), SubscriberReport::new_data()]);
        let calls = subscriber.calls();

        let handle = spawn_manager(
            vec![Arc::new(subscriber)],
            Arc::new(AlwaysReachable),
            Arc::new(NoOpGrantProvider),
        );

        let (c1, r1) = completion();
        handle.sync(SyncSource::Forced, Some(c1));
        settle().await;

        // Two triggers while the run is blocked: only the last survives.
        let (c2, r2) = completion();
        handle.sync(SyncSource::SilentPush, Some(c2));
        let (c3, r3) = completion();
        handle.sync(SyncSource::ConnectionAdded, Some(c3));

        // The overwritten request's completion still fires.
        assert_eq!(r2.await.unwrap(), SyncOutcome::NoData);

        gate.add_permits(1);
        assert_eq!(r1.await.unwrap(), SyncOutcome::NoData);

        gate.add_permits(1);
        assert_eq!(r3.await.unwrap(), SyncOutcome::NewData);

        settle().await;
        let seen = calls.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec![SyncSource::Forced, SyncSource::ConnectionAdded],
            "exactly one extra run, using the last trigger's source"
        );
    }

    #[tokio::test]
    async fn test_auth_failure_short_circuits_and_discards_pending() {
        let auth_gate = Arc::new(Semaphore::new(0));
        let slow_gate = Arc::new(Semaphore::new(0));

        let auth_subscriber = FakeSubscriber::new("auth")
            .gated(Arc::clone(&auth_gate))
            .with_reports(vec![SubscriberReport::failed(
                SyncError::AuthenticationFailure,
            )]);
        let slow_subscriber = FakeSubscriber::new("slow").gated(Arc::clone(&slow_gate));
        let slow_calls = slow_subscriber.calls();

        let handle = spawn_manager(
            vec![Arc::new(auth_subscriber), Arc::new(slow_subscriber)],
            Arc::new(AlwaysReachable),
            Arc::new(NoOpGrantProvider),
        );

        let (c1, r1) = completion();
        handle.sync(SyncSource::Forced, Some(c1));
        settle().await;

        let (c2, r2) = completion();
        handle.sync(SyncSource::SilentPush, Some(c2));

        // Release only the auth subscriber; the run must finish without
        // waiting for the slow one.
        auth_gate.add_permits(1);
        assert_eq!(r1.await.unwrap(), SyncOutcome::Failed);

        // The pending request is discarded, not run.
        assert_eq!(r2.await.unwrap(), SyncOutcome::Failed);

        // The slow subscriber's straggling report is ignored and no new
        // run starts.
        slow_gate.add_permits(1);
        settle().await;
        assert_eq!(slow_calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_offline_fails_without_touching_subscribers() {
        let subscriber = FakeSubscriber::new("fake");
        let calls = subscriber.calls();

        let handle = spawn_manager(
            vec![Arc::new(subscriber)],
            Arc::new(FixedReachability(false)),
            Arc::new(NoOpGrantProvider),
        );

        let (c, r) = completion();
        handle.sync(SyncSource::Forced, Some(c));
        assert_eq!(r.await.unwrap(), SyncOutcome::Failed);
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_network_error_awaits_siblings_and_fails() {
        let failing = FakeSubscriber::new("failing").with_reports(vec![
            SubscriberReport::failed(SyncError::Network("connection reset".into())),
        ]);
        let healthy =
            FakeSubscriber::new("healthy").with_reports(vec![SubscriberReport::new_data()]);
        let healthy_calls = healthy.calls();

        let handle = spawn_manager(
            vec![Arc::new(failing), Arc::new(healthy)],
            Arc::new(AlwaysReachable),
            Arc::new(NoOpGrantProvider),
        );

        let (c, r) = completion();
        handle.sync(SyncSource::Forced, Some(c));
        assert_eq!(r.await.unwrap(), SyncOutcome::Failed);
        assert_eq!(healthy_calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_grant_expiry_forces_finish_with_partial_results() {
        let gate = Arc::new(Semaphore::new(0));
        let subscriber = FakeSubscriber::new("slow").gated(Arc::clone(&gate));
        let provider = Arc::new(TestGrantProvider::default());

        let handle = spawn_manager(
            vec![Arc::new(subscriber)],
            Arc::new(AlwaysReachable),
            Arc::clone(&provider) as Arc<dyn BackgroundGrantProvider>,
        );

        let (c, r) = completion();
        handle.sync(SyncSource::Forced, Some(c));
        settle().await;

        // Revoke the budget: the run finishes with its partial aggregate.
        let expire = provider.expirations.lock().unwrap().pop().unwrap();
        expire();

        assert_eq!(r.await.unwrap(), SyncOutcome::NoData);
        settle().await;
        assert!(provider.ended.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_os_granted_source_does_not_obtain_a_grant() {
        let provider = Arc::new(TestGrantProvider::default());
        let subscriber = FakeSubscriber::new("fake");

        let handle = spawn_manager(
            vec![Arc::new(subscriber)],
            Arc::new(AlwaysReachable),
            Arc::clone(&provider) as Arc<dyn BackgroundGrantProvider>,
        );

        let (c, r) = completion();
        handle.sync(SyncSource::BackgroundProcess, Some(c));
        r.await.unwrap();
        assert_eq!(provider.begins.load(Ordering::SeqCst), 0);

        let (c, r) = completion();
        handle.sync(SyncSource::Forced, Some(c));
        r.await.unwrap();
        assert_eq!(provider.begins.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancel_reports_partial_aggregate_and_runs_pending() {
        let gate = Arc::new(Semaphore::new(0));
        let subscriber = FakeSubscriber::new("slow").gated(Arc::clone(&gate));

        let handle = spawn_manager(
            vec![Arc::new(subscriber)],
            Arc::new(AlwaysReachable),
            Arc::new(NoOpGrantProvider),
        );

        let (c1, r1) = completion();
        handle.sync(SyncSource::Forced, Some(c1));
        settle().await;

        let (c2, r2) = completion();
        handle.sync(SyncSource::SilentPush, Some(c2));

        handle.cancel_current();
        assert_eq!(r1.await.unwrap(), SyncOutcome::NoData);

        // Cancellation does not discard the pending request.
        gate.add_permits(2);
        assert_eq!(r2.await.unwrap(), SyncOutcome::NoData);
    }

    #[tokio::test]
    async fn test_run_state_reporting() {
        let handle = spawn_manager(
            vec![],
            Arc::new(AlwaysReachable),
            Arc::new(NoOpGrantProvider),
        );
        assert_eq!(handle.run_state().await, RunState::Running);

        handle.shutdown();
        settle().await;
        assert_eq!(handle.run_state().await, RunState::Unknown);
    }
}
