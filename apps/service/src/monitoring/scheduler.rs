use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Semaphore, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior, interval_at, timeout};
use tracing::{debug, error, info, warn};

use super::executor::MonitoringExecutor;
use super::types::CheckOutcome;
use crate::models::{MonitorId, now};
use crate::service::MonitorService;

/// Timing and concurrency knobs for the scheduler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerSettings {
    /// Period of the scan. Independent of per-monitor intervals.
    pub tick: Duration,
    /// Upper bound on probes running at the same time.
    pub max_concurrent_checks: usize,
    /// How long shutdown waits for in-flight probes before aborting them.
    pub shutdown_grace: Duration,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(30),
            max_concurrent_checks: 50,
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

/// Monitoring scheduler - decides which monitors are due and dispatches them
///
/// Each tick takes a snapshot of all monitors, keeps the due ones and spawns
/// one task per due monitor without waiting for it. Tasks take a permit from
/// a semaphore before probing, so at most `max_concurrent_checks` network
/// calls run at once. A monitor whose previous probe has not completed yet
/// is skipped, so the same id is never probed twice concurrently.
///
/// The snapshot only nominates candidates. Each one is re-read after its
/// in-flight claim is taken and again once its task holds a permit, so a
/// check completed, a pause or a delete that lands in between is honored.
pub struct MonitoringScheduler {
    service: MonitorService,
    executor: Arc<MonitoringExecutor>,
    settings: SchedulerSettings,
    permits: Arc<Semaphore>,
    in_flight: Arc<InFlight>,
}

impl MonitoringScheduler {
    pub fn new(
        service: MonitorService,
        executor: Arc<MonitoringExecutor>,
        settings: SchedulerSettings,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(settings.max_concurrent_checks.max(1)));
        Self { service, executor, settings, permits, in_flight: Arc::new(InFlight::default()) }
    }

    /// Spawn the tick loop. The returned handle is the only way to stop it.
    pub fn start(self) -> SchedulerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(());
        let task = tokio::spawn(self.run(shutdown_rx));
        SchedulerHandle { shutdown_tx, task }
    }

    /// Tick until `shutdown` fires or its sender is dropped, then give
    /// in-flight probes the grace period to finish.
    pub async fn run(self, mut shutdown_rx: watch::Receiver<()>) {
        let tick = self.settings.tick;
        let mut ticker = interval_at(Instant::now() + tick, tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut tasks = JoinSet::new();

        info!(
            tick_secs = tick.as_secs_f64(),
            max_concurrent_checks = self.settings.max_concurrent_checks,
            "Scheduler started"
        );

        loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.changed() => {
                    info!("Shutdown signal received, no further checks will be dispatched");
                    break;
                }
                _ = ticker.tick() => {
                    let dispatched = self.dispatch_due(now(), &mut tasks).await;
                    debug!(dispatched, in_flight = tasks.len(), "Tick complete");
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        if e.is_panic() {
                            error!("Check task panicked: {}", e);
                        }
                    }
                }
            }
        }

        self.drain(tasks).await;
        info!("Scheduler stopped");
    }

    /// One scan: dispatch every monitor due at `now` that is not already in
    /// flight. Returns how many checks were started.
    ///
    /// A storage failure while taking the snapshot skips this tick only.
    pub async fn dispatch_due(
        &self,
        now: DateTime<Utc>,
        tasks: &mut JoinSet<Option<CheckOutcome>>,
    ) -> usize {
        let monitors = match self.service.list().await {
            Ok(monitors) => monitors,
            Err(e) => {
                warn!("Error getting monitors, skipping tick: {}", e);
                return 0;
            }
        };

        let mut dispatched = 0;
        for monitor in monitors {
            if !monitor.is_due(now) {
                continue;
            }
            let id = monitor.id();

            let Some(claim) = self.in_flight.claim(id) else {
                debug!(monitor_id = %id, "Previous check still running, skipping");
                continue;
            };

            // the snapshot may predate a check that completed before the claim
            if !self.still_due(id, now).await {
                continue;
            }

            let executor = self.executor.clone();
            let permits = self.permits.clone();
            tasks.spawn(async move {
                let _claim = claim;
                // the semaphore is never closed
                let _permit = permits.acquire_owned().await.ok();
                executor.execute_if_due(id, now).await
            });
            dispatched += 1;
        }

        dispatched
    }

    async fn still_due(&self, id: MonitorId, now: DateTime<Utc>) -> bool {
        match self.service.get(id).await {
            Ok(monitor) => monitor.is_due(now),
            Err(e) => {
                debug!(monitor_id = %id, "Skipping check: {}", e);
                false
            }
        }
    }

    async fn drain(&self, mut tasks: JoinSet<Option<CheckOutcome>>) {
        if tasks.is_empty() {
            return;
        }

        let grace = self.settings.shutdown_grace;
        info!(in_flight = tasks.len(), "Waiting up to {:?} for in-flight checks", grace);

        let finished = timeout(grace, async { while tasks.join_next().await.is_some() {} })
            .await
            .is_ok();

        if !finished {
            warn!(remaining = tasks.len(), "Grace period elapsed, aborting in-flight checks");
            tasks.shutdown().await;
        }
    }
}

/// Running scheduler task.
pub struct SchedulerHandle {
    shutdown_tx: watch::Sender<()>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Stop dispatching and wait for the loop to drain and exit.
    pub async fn shutdown(self) {
        // Err only if the loop already exited
        let _ = self.shutdown_tx.send(());
        if let Err(e) = self.task.await {
            error!("Scheduler task failed: {}", e);
        }
    }
}

/// Ids with a probe currently running.
#[derive(Debug, Default)]
struct InFlight {
    ids: Mutex<HashSet<MonitorId>>,
}

impl InFlight {
    fn claim(self: &Arc<Self>, id: MonitorId) -> Option<InFlightClaim> {
        let mut ids = self.ids.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        ids.insert(id).then(|| InFlightClaim { in_flight: Arc::clone(self), id })
    }
}

/// Released when the check task finishes or is aborted.
struct InFlightClaim {
    in_flight: Arc<InFlight>,
    id: MonitorId,
}

impl Drop for InFlightClaim {
    fn drop(&mut self) {
        let mut ids = self.in_flight.ids.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        ids.remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use async_trait::async_trait;
    use chrono::TimeDelta;

    use super::*;
    use crate::database::{MemoryRepository, MonitorRepository, RepositoryError};
    use crate::models::Monitor;
    use crate::testing::{RecordingObserver, ScriptedChecker};

    struct Harness {
        scheduler: MonitoringScheduler,
        service: MonitorService,
        checker: Arc<ScriptedChecker>,
        observer: Arc<RecordingObserver>,
    }

    fn harness_with(
        repository: Arc<dyn MonitorRepository>,
        checker: ScriptedChecker,
        settings: SchedulerSettings,
    ) -> Harness {
        let service = MonitorService::new(repository);
        let checker = Arc::new(checker);
        let observer = Arc::new(RecordingObserver::default());
        let executor =
            Arc::new(MonitoringExecutor::new(checker.clone(), observer.clone(), service.clone()));
        let scheduler = MonitoringScheduler::new(service.clone(), executor, settings);
        Harness { scheduler, service, checker, observer }
    }

    fn harness(checker: ScriptedChecker) -> Harness {
        harness_with(Arc::new(MemoryRepository::new()), checker, SchedulerSettings::default())
    }

    async fn join_all(tasks: &mut JoinSet<Option<CheckOutcome>>) -> Vec<CheckOutcome> {
        let mut outcomes = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            outcomes.extend(joined.unwrap());
        }
        outcomes
    }

    fn five_minutes() -> Duration {
        Duration::from_secs(300)
    }

    #[tokio::test]
    async fn test_only_active_due_monitors_are_dispatched() {
        let h = harness(ScriptedChecker::status(200));
        let due = h.service.create("https://due.example.com", five_minutes()).await.unwrap();
        let paused = h.service.create("https://paused.example.com", five_minutes()).await.unwrap();
        let recent = h.service.create("https://recent.example.com", five_minutes()).await.unwrap();
        h.service.pause(paused.id()).await.unwrap();
        let t0 = now();
        h.service.record_check(recent.id(), t0).await.unwrap();

        let mut tasks = JoinSet::new();
        assert_eq!(h.scheduler.dispatch_due(t0 + TimeDelta::minutes(1), &mut tasks).await, 1);
        let outcomes = join_all(&mut tasks).await;

        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].monitor_id, due.id());
        assert_eq!(h.checker.calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.checker.targets(), vec!["https://due.example.com".to_string()]);
    }

    #[tokio::test]
    async fn test_interval_scenario() {
        let h = harness(ScriptedChecker::status(200));
        let monitor = h.service.create("https://example.com", five_minutes()).await.unwrap();
        let mut tasks = JoinSet::new();

        assert_eq!(h.scheduler.dispatch_due(now(), &mut tasks).await, 1);
        let outcome = join_all(&mut tasks).await.remove(0);

        let stored = h.service.get(monitor.id()).await.unwrap();
        let completed = stored.last_checked().expect("last_checked set after probe");
        assert_eq!(completed, outcome.checked_at);

        assert_eq!(h.scheduler.dispatch_due(completed + TimeDelta::minutes(1), &mut tasks).await, 0);
        assert_eq!(h.scheduler.dispatch_due(completed + TimeDelta::minutes(6), &mut tasks).await, 1);
        join_all(&mut tasks).await;

        assert_eq!(h.checker.calls.load(Ordering::SeqCst), 2);
        assert_eq!(h.observer.outcomes().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_probe_still_sets_last_checked() {
        let h = harness(ScriptedChecker::failing());
        let monitor = h.service.create("https://example.com", five_minutes()).await.unwrap();
        let mut tasks = JoinSet::new();

        h.scheduler.dispatch_due(now(), &mut tasks).await;
        let outcome = join_all(&mut tasks).await.remove(0);

        assert_eq!(outcome.status_code, 0);
        assert!(outcome.error.is_some());
        let stored = h.service.get(monitor.id()).await.unwrap();
        assert_eq!(stored.last_checked(), Some(outcome.checked_at));
    }

    #[tokio::test]
    async fn test_in_flight_monitor_is_not_dispatched_again() {
        let h = harness(ScriptedChecker::status(200).with_delay(Duration::from_millis(200)));
        let monitor = h.service.create("https://example.com", five_minutes()).await.unwrap();
        let mut tasks = JoinSet::new();

        let t0 = now();
        assert_eq!(h.scheduler.dispatch_due(t0, &mut tasks).await, 1);
        // still due by the predicate, but the first probe has not completed
        assert_eq!(h.scheduler.dispatch_due(t0 + TimeDelta::minutes(10), &mut tasks).await, 0);

        join_all(&mut tasks).await;
        let completed = h.service.get(monitor.id()).await.unwrap().last_checked().unwrap();
        assert_eq!(h.scheduler.dispatch_due(completed + TimeDelta::minutes(10), &mut tasks).await, 1);
        join_all(&mut tasks).await;

        assert_eq!(h.checker.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_concurrency_cap_is_honored() {
        let settings = SchedulerSettings { max_concurrent_checks: 2, ..SchedulerSettings::default() };
        let h = harness_with(
            Arc::new(MemoryRepository::new()),
            ScriptedChecker::status(200).with_delay(Duration::from_millis(30)),
            settings,
        );
        for i in 0..6 {
            h.service.create(&format!("https://example.com/{i}"), five_minutes()).await.unwrap();
        }

        let mut tasks = JoinSet::new();
        assert_eq!(h.scheduler.dispatch_due(now(), &mut tasks).await, 6);
        join_all(&mut tasks).await;

        assert_eq!(h.checker.calls.load(Ordering::SeqCst), 6);
        assert!(h.checker.max_running.load(Ordering::SeqCst) <= 2);
    }

    /// Snapshot reads that yield after reading, so completions can land
    /// between the snapshot and the dispatch decision.
    struct SlowSnapshotRepository {
        inner: MemoryRepository,
    }

    #[async_trait]
    impl MonitorRepository for SlowSnapshotRepository {
        async fn save(&self, monitor: &Monitor) -> crate::database::repository::Result<()> {
            self.inner.save(monitor).await
        }
        async fn find_by_id(&self, id: MonitorId) -> crate::database::repository::Result<Monitor> {
            self.inner.find_by_id(id).await
        }
        async fn find_all(&self) -> crate::database::repository::Result<Vec<Monitor>> {
            let snapshot = self.inner.find_all().await;
            tokio::time::sleep(Duration::from_millis(50)).await;
            snapshot
        }
        async fn update(&self, monitor: &Monitor) -> crate::database::repository::Result<()> {
            self.inner.update(monitor).await
        }
        async fn delete(&self, id: MonitorId) -> crate::database::repository::Result<bool> {
            self.inner.delete(id).await
        }
    }

    #[tokio::test]
    async fn test_stale_snapshot_does_not_redispatch_just_checked_monitor() {
        let h = harness_with(
            Arc::new(SlowSnapshotRepository { inner: MemoryRepository::new() }),
            ScriptedChecker::status(200),
            SchedulerSettings::default(),
        );
        let monitor = h.service.create("https://example.com", five_minutes()).await.unwrap();
        let mut tasks = JoinSet::new();

        let t0 = now();
        assert_eq!(h.scheduler.dispatch_due(t0, &mut tasks).await, 1);
        // the first check completes while the second tick holds its snapshot
        let second = h.scheduler.dispatch_due(t0 + TimeDelta::seconds(1), &mut tasks).await;
        join_all(&mut tasks).await;

        assert_eq!(second, 0);
        assert_eq!(h.checker.calls.load(Ordering::SeqCst), 1);
        assert!(h.service.get(monitor.id()).await.unwrap().last_checked().is_some());
    }

    #[tokio::test]
    async fn test_monitor_paused_while_waiting_for_permit_is_not_checked() {
        let settings = SchedulerSettings { max_concurrent_checks: 1, ..SchedulerSettings::default() };
        let h = harness_with(
            Arc::new(MemoryRepository::new()),
            ScriptedChecker::status(200).with_delay(Duration::from_millis(100)),
            settings,
        );
        let first = h.service.create("https://one.example.com", five_minutes()).await.unwrap();
        let second = h.service.create("https://two.example.com", five_minutes()).await.unwrap();
        let mut tasks = JoinSet::new();

        assert_eq!(h.scheduler.dispatch_due(now(), &mut tasks).await, 2);
        tokio::time::sleep(Duration::from_millis(20)).await;
        h.service.pause(first.id()).await.unwrap();
        h.service.pause(second.id()).await.unwrap();
        let outcomes = join_all(&mut tasks).await;

        assert_eq!(h.checker.calls.load(Ordering::SeqCst), 1);
        assert_eq!(outcomes.len(), 1);
        assert_eq!(h.observer.outcomes().len(), 1);

        let first = h.service.get(first.id()).await.unwrap();
        let second = h.service.get(second.id()).await.unwrap();
        assert!(!first.is_active() && !second.is_active());
        let checked: Vec<MonitorId> = [&first, &second]
            .into_iter()
            .filter(|m| m.last_checked().is_some())
            .map(Monitor::id)
            .collect();
        assert_eq!(checked, vec![outcomes[0].monitor_id]);
    }

    struct BrokenRepository;

    #[async_trait]
    impl MonitorRepository for BrokenRepository {
        async fn save(&self, _: &Monitor) -> crate::database::repository::Result<()> {
            Err(RepositoryError::Pool("down".into()))
        }
        async fn find_by_id(&self, _: MonitorId) -> crate::database::repository::Result<Monitor> {
            Err(RepositoryError::Pool("down".into()))
        }
        async fn find_all(&self) -> crate::database::repository::Result<Vec<Monitor>> {
            Err(RepositoryError::Pool("down".into()))
        }
        async fn update(&self, _: &Monitor) -> crate::database::repository::Result<()> {
            Err(RepositoryError::Pool("down".into()))
        }
        async fn delete(&self, _: MonitorId) -> crate::database::repository::Result<bool> {
            Err(RepositoryError::Pool("down".into()))
        }
    }

    #[tokio::test]
    async fn test_storage_failure_skips_tick() {
        let h = harness_with(
            Arc::new(BrokenRepository),
            ScriptedChecker::status(200),
            SchedulerSettings::default(),
        );
        let mut tasks = JoinSet::new();
        assert_eq!(h.scheduler.dispatch_due(now(), &mut tasks).await, 0);
        assert!(tasks.is_empty());
    }

    #[tokio::test]
    async fn test_run_loop_probes_once_per_interval_and_stops() {
        let settings = SchedulerSettings {
            tick: Duration::from_millis(20),
            ..SchedulerSettings::default()
        };
        let h = harness_with(Arc::new(MemoryRepository::new()), ScriptedChecker::status(200), settings);
        let monitor = h.service.create("https://example.com", five_minutes()).await.unwrap();
        let checker = h.checker.clone();
        let service = h.service.clone();

        let handle = h.scheduler.start();
        tokio::time::sleep(Duration::from_millis(200)).await;
        timeout(Duration::from_secs(2), handle.shutdown()).await.expect("prompt shutdown");

        assert_eq!(checker.calls.load(Ordering::SeqCst), 1);
        assert!(service.get(monitor.id()).await.unwrap().last_checked().is_some());
    }

    #[tokio::test]
    async fn test_shutdown_aborts_checks_after_grace() {
        let settings = SchedulerSettings {
            tick: Duration::from_millis(10),
            shutdown_grace: Duration::from_millis(50),
            ..SchedulerSettings::default()
        };
        let h = harness_with(
            Arc::new(MemoryRepository::new()),
            ScriptedChecker::status(200).with_delay(Duration::from_secs(30)),
            settings,
        );
        let monitor = h.service.create("https://example.com", five_minutes()).await.unwrap();
        let checker = h.checker.clone();
        let service = h.service.clone();

        let handle = h.scheduler.start();
        tokio::time::sleep(Duration::from_millis(100)).await;
        timeout(Duration::from_secs(2), handle.shutdown()).await.expect("grace period bounded");

        assert_eq!(checker.calls.load(Ordering::SeqCst), 1);
        assert!(service.get(monitor.id()).await.unwrap().last_checked().is_none());
    }
}
