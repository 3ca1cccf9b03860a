//! Debounce driver: turns store changes into sync passes.

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::engine::{PassOutcome, SyncEngine};
use crate::events::Origin;
use crate::models::{File, Site};
use crate::remote::{HttpRemoteApi, RemoteApi};

/// Control handle for a running driver task.
pub struct SyncHandle<SA = HttpRemoteApi, FA = HttpRemoteApi> {
    engine: Arc<SyncEngine<SA, FA>>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl<SA, FA> SyncHandle<SA, FA>
where
    SA: RemoteApi<Site> + 'static,
    FA: RemoteApi<File> + 'static,
{
    pub const fn engine(&self) -> &Arc<SyncEngine<SA, FA>> {
        &self.engine
    }

    /// Clear recorded errors and run a pass right away.
    pub fn retry(&self) {
        self.engine.retry();
    }

    /// Run a pass right away.
    pub fn trigger(&self) {
        self.engine.trigger();
    }

    /// Stop scheduling and wait for the driver to exit. A pass already in
    /// flight runs to completion first.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(error) = self.task.await {
            tracing::warn!("Sync driver ended abnormally: {error}");
        }
    }
}

/// Start the driver on the current tokio runtime.
///
/// The first pass runs one quiet period after startup. Every edit resets the
/// timer; changes a pass makes itself do not. Records other processes write
/// to the local medium are polled for once per quiet period and count as
/// edits. A clean or skipped pass re-arms the timer; a failing pass suspends
/// scheduling until the next edit or an explicit retry.
pub fn spawn<SA, FA>(engine: Arc<SyncEngine<SA, FA>>) -> SyncHandle<SA, FA>
where
    SA: RemoteApi<Site> + 'static,
    FA: RemoteApi<File> + 'static,
{
    let (shutdown, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(drive(engine.clone(), shutdown_rx));
    SyncHandle {
        engine,
        shutdown,
        task,
    }
}

async fn drive<SA, FA>(engine: Arc<SyncEngine<SA, FA>>, mut shutdown: watch::Receiver<bool>)
where
    SA: RemoteApi<Site> + 'static,
    FA: RemoteApi<File> + 'static,
{
    let quiet_period = engine.options().quiet_period;
    let mut changes = engine.feed().subscribe();
    let mut poll = tokio::time::interval(quiet_period);
    poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut deadline = Instant::now() + quiet_period;
    let mut armed = true;

    tracing::debug!("Sync driver started");
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            change = changes.recv() => match change {
                Ok(change) if change.origin == Origin::Sync => {}
                Ok(_) | Err(RecvError::Lagged(_)) => {
                    engine.clear_errors();
                    deadline = Instant::now() + quiet_period;
                    armed = true;
                }
                Err(RecvError::Closed) => break,
            },
            _ = poll.tick() => {
                if let Err(error) = engine.reload_local() {
                    tracing::warn!("Checking for outside edits failed: {error}");
                }
            }
            () = engine.wake.notified() => {
                deadline = Instant::now();
                armed = true;
            }
            () = tokio::time::sleep_until(deadline), if armed => {
                let outcome = engine.run_pass().await;
                armed = match &outcome {
                    PassOutcome::Completed(report) => report.is_clean(),
                    PassOutcome::Skipped(_) | PassOutcome::AlreadyRunning => true,
                };
                deadline = Instant::now() + quiet_period;
            }
        }
    }
    tracing::debug!("Sync driver stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthState;
    use crate::clock::ManualClock;
    use crate::events::ChangeFeed;
    use crate::local::LocalStore;
    use crate::storage::{KeyValueStore, MemoryKeyValueStore, SqliteKeyValueStore};
    use crate::sync::engine::EngineOptions;
    use crate::sync::testing::{FakeApi, Gate};
    use crate::sync::SyncPhase;
    use chrono::{TimeZone, Utc};
    use std::time::Duration;

    type TestEngine = SyncEngine<Arc<FakeApi<Site>>, Arc<FakeApi<File>>>;

    const QUIET: Duration = Duration::from_millis(500);
    const TICK: Duration = Duration::from_millis(1);

    fn clock() -> ManualClock {
        ManualClock::new(Utc.with_ymd_and_hms(2024, 7, 1, 10, 0, 0).unwrap())
    }

    fn engine(sites: Arc<FakeApi<Site>>) -> Arc<TestEngine> {
        engine_on(Arc::new(MemoryKeyValueStore::new()), sites)
    }

    fn engine_on(medium: Arc<dyn KeyValueStore>, sites: Arc<FakeApi<Site>>) -> Arc<TestEngine> {
        Arc::new(
            SyncEngine::open(
                medium,
                Arc::new(clock()),
                sites,
                Arc::new(FakeApi::new()),
                AuthState::NotRequired,
                EngineOptions::new("owner-1").with_quiet_period(QUIET),
            )
            .unwrap(),
        )
    }

    fn site(name: &str) -> Site {
        Site::new(name, name, Utc.with_ymd_and_hms(2024, 7, 1, 9, 0, 0).unwrap())
    }

    /// Let spawned tasks run without advancing the paused clock.
    async fn settle() {
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn burst_of_edits_runs_one_pass() {
        let api = Arc::new(FakeApi::new());
        let engine = engine(api.clone());
        let handle = spawn(engine.clone());
        settle().await;

        for name in ["a", "b", "c"] {
            engine.local_sites().set(site(name)).unwrap();
            tokio::time::advance(Duration::from_millis(100)).await;
        }
        settle().await;
        assert_eq!(api.fetch_calls(), 0);

        tokio::time::advance(QUIET + TICK).await;
        settle().await;
        assert_eq!(api.fetch_calls(), 1);
        assert_eq!(api.write_calls(), 3);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn clean_pass_rearms_timer() {
        let api = Arc::new(FakeApi::new());
        let handle = spawn(engine(api.clone()));
        settle().await;

        tokio::time::advance(QUIET + TICK).await;
        settle().await;
        assert_eq!(api.fetch_calls(), 1);

        tokio::time::advance(QUIET + TICK).await;
        settle().await;
        assert_eq!(api.fetch_calls(), 2);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn failing_pass_suspends_until_retry() {
        let api = Arc::new(FakeApi::new());
        let engine = engine(api.clone());
        let bad = site("bad");
        api.reject(bad.id);
        engine.local_sites().set(bad.clone()).unwrap();

        let handle = spawn(engine.clone());
        settle().await;
        tokio::time::advance(QUIET + TICK).await;
        settle().await;
        assert_eq!(api.write_calls(), 1);
        assert!(matches!(engine.phase(), SyncPhase::Cooldown(_)));

        tokio::time::advance(QUIET * 10).await;
        settle().await;
        assert_eq!(api.fetch_calls(), 1);

        api.accept(bad.id);
        handle.retry();
        settle().await;
        tokio::time::advance(TICK).await;
        settle().await;
        assert_eq!(api.write_calls(), 2);
        assert_eq!(engine.phase(), SyncPhase::Idle);
        assert_eq!(api.stored(&bad.id), Some(bad));

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn store_change_lifts_cooldown() {
        let api = Arc::new(FakeApi::new());
        let engine = engine(api.clone());
        let bad = site("bad");
        api.reject(bad.id);
        engine.local_sites().set(bad.clone()).unwrap();

        let handle = spawn(engine.clone());
        settle().await;
        tokio::time::advance(QUIET + TICK).await;
        settle().await;
        assert!(matches!(engine.phase(), SyncPhase::Cooldown(_)));

        engine.local_sites().set(site("good")).unwrap();
        settle().await;
        assert_eq!(engine.phase(), SyncPhase::Idle);

        tokio::time::advance(QUIET + TICK).await;
        settle().await;
        assert_eq!(api.fetch_calls(), 2);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn edit_during_failing_pass_resumes_scheduling() {
        let gate = Arc::new(Gate::default());
        let api = Arc::new(FakeApi::new().gated(gate.clone()));
        let engine = engine(api.clone());
        let bad = site("bad");
        let good = site("good");
        api.reject(bad.id);
        engine.local_sites().set(bad.clone()).unwrap();

        let handle = spawn(engine.clone());
        settle().await;
        tokio::time::advance(QUIET + TICK).await;
        settle().await;
        assert_eq!(api.write_calls(), 1);

        // lands while the write for `bad` is still in flight
        engine.local_sites().set(good.clone()).unwrap();
        gate.release.notify_one();
        settle().await;
        assert_eq!(engine.phase(), SyncPhase::Idle);

        tokio::time::advance(QUIET + TICK).await;
        settle().await;
        for _ in 0..2 {
            gate.release.notify_one();
            settle().await;
        }
        assert_eq!(api.fetch_calls(), 2);
        assert_eq!(api.stored(&good.id), Some(good));

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn writes_from_another_process_are_picked_up() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("tandem.db");
        let api = Arc::new(FakeApi::new());
        let engine = engine_on(Arc::new(SqliteKeyValueStore::open(&path).unwrap()), api.clone());
        let editor: LocalStore<Site> = LocalStore::open(
            Arc::new(SqliteKeyValueStore::open(&path).unwrap()),
            Arc::new(clock()),
            ChangeFeed::new(),
        )
        .unwrap();
        let bad = site("bad");
        api.reject(bad.id);
        editor.set(bad).unwrap();

        let handle = spawn(engine.clone());
        settle().await;
        tokio::time::advance(QUIET + TICK).await;
        settle().await;
        assert!(matches!(engine.phase(), SyncPhase::Cooldown(_)));

        let good = site("good");
        editor.set(good.clone()).unwrap();
        tokio::time::advance(QUIET + TICK).await;
        settle().await;
        assert_eq!(engine.phase(), SyncPhase::Idle);
        assert_eq!(engine.local_sites().by_id(&good.id), Some(good.clone()));

        tokio::time::advance(QUIET + TICK).await;
        settle().await;
        assert_eq!(api.fetch_calls(), 2);
        assert_eq!(api.stored(&good.id), Some(good));

        handle.shutdown().await;
    }
}
