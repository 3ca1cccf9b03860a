//! One reconciliation pass, start to finish.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{watch, Notify};

use super::state::{SyncPhase, SyncState};
use crate::auth::AuthState;
use crate::clock::Clock;
use crate::error::Result;
use crate::events::{ChangeFeed, Origin};
use crate::local::LocalStore;
use crate::models::{EntityKind, File, Site, Syncable};
use crate::planner::{self, ItemKey, QueuedAction, SyncAction};
use crate::remote::{HttpRemoteApi, RemoteApi, RemoteStore};
use crate::storage::KeyValueStore;

const DEFAULT_QUIET_PERIOD: Duration = Duration::from_secs(2);

/// Engine settings.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Owner whose records are fetched from the server.
    pub owner_id: String,
    /// Quiet period between the last observed change and the next pass.
    pub quiet_period: Duration,
}

impl EngineOptions {
    pub fn new(owner_id: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            quiet_period: DEFAULT_QUIET_PERIOD,
        }
    }

    #[must_use]
    pub const fn with_quiet_period(mut self, quiet_period: Duration) -> Self {
        self.quiet_period = quiet_period;
        self
    }
}

/// Why a pass did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// No credential; remote baselines cannot be fetched.
    Unauthenticated,
    /// Remote baselines have not loaded yet.
    NotLoaded,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unauthenticated => f.write_str("not signed in"),
            Self::NotLoaded => f.write_str("remote data not loaded"),
        }
    }
}

/// Result of asking for a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    Skipped(SkipReason),
    /// Another pass was in flight; nothing was done.
    AlreadyRunning,
    Completed(PassReport),
}

/// Summary of a completed pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PassReport {
    pub planned: usize,
    pub applied: usize,
    /// Actions not attempted because an earlier action on the same item
    /// failed in this pass.
    pub skipped: usize,
    pub errors: BTreeMap<ItemKey, String>,
}

impl PassReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// A planned queue that was not executed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Preview {
    pub queue: Vec<QueuedAction>,
    /// Set when planning was not possible.
    pub skipped: Option<SkipReason>,
    pub errors: BTreeMap<ItemKey, String>,
}

/// Owns both sides of both entity kinds and reconciles them.
pub struct SyncEngine<SA = HttpRemoteApi, FA = HttpRemoteApi> {
    options: EngineOptions,
    feed: ChangeFeed,
    local_sites: Arc<LocalStore<Site>>,
    local_files: Arc<LocalStore<File>>,
    remote_sites: RemoteStore<Site, SA>,
    remote_files: RemoteStore<File, FA>,
    running: AtomicBool,
    phase: watch::Sender<SyncPhase>,
    pub(super) wake: Notify,
}

/// Clears the in-progress flag even if a pass future is dropped early.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl<SA, FA> SyncEngine<SA, FA>
where
    SA: RemoteApi<Site> + 'static,
    FA: RemoteApi<File> + 'static,
{
    pub fn new(
        local_sites: Arc<LocalStore<Site>>,
        local_files: Arc<LocalStore<File>>,
        remote_sites: RemoteStore<Site, SA>,
        remote_files: RemoteStore<File, FA>,
        feed: ChangeFeed,
        options: EngineOptions,
    ) -> Self {
        let (phase, _) = watch::channel(SyncPhase::Idle);
        Self {
            options,
            feed,
            local_sites,
            local_files,
            remote_sites,
            remote_files,
            running: AtomicBool::new(false),
            phase,
            wake: Notify::new(),
        }
    }

    /// Wire all four stores onto one persistence medium and one change feed.
    pub fn open(
        medium: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        site_api: SA,
        file_api: FA,
        auth: AuthState,
        options: EngineOptions,
    ) -> Result<Self> {
        let feed = ChangeFeed::new();
        let local_sites = Arc::new(LocalStore::open(
            medium.clone(),
            clock.clone(),
            feed.clone(),
        )?);
        let local_files = Arc::new(LocalStore::open(medium, clock, feed.clone())?);
        let remote_sites = RemoteStore::new(site_api, auth.clone(), feed.clone());
        let remote_files = RemoteStore::new(file_api, auth, feed.clone());
        Ok(Self::new(
            local_sites,
            local_files,
            remote_sites,
            remote_files,
            feed,
            options,
        ))
    }

    pub const fn local_sites(&self) -> &Arc<LocalStore<Site>> {
        &self.local_sites
    }

    pub const fn local_files(&self) -> &Arc<LocalStore<File>> {
        &self.local_files
    }

    pub const fn remote_sites(&self) -> &RemoteStore<Site, SA> {
        &self.remote_sites
    }

    pub const fn remote_files(&self) -> &RemoteStore<File, FA> {
        &self.remote_files
    }

    pub const fn feed(&self) -> &ChangeFeed {
        &self.feed
    }

    pub const fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Replace the credential for both entity kinds.
    pub fn set_auth(&self, auth: AuthState) {
        self.remote_sites.set_auth(auth.clone());
        self.remote_files.set_auth(auth);
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase.borrow().clone()
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<SyncPhase> {
        self.phase.subscribe()
    }

    pub fn state(&self) -> SyncState {
        SyncState::from_phase(&self.phase.borrow(), self.is_loaded())
    }

    pub fn is_loaded(&self) -> bool {
        self.remote_sites.is_loaded() && self.remote_files.is_loaded()
    }

    /// Clear recorded errors and ask the driver for a pass now.
    pub fn retry(&self) {
        self.clear_errors();
        self.wake.notify_one();
    }

    /// Ask the driver for a pass now without clearing errors.
    pub fn trigger(&self) {
        self.wake.notify_one();
    }

    pub(super) fn clear_errors(&self) {
        self.phase.send_if_modified(|phase| {
            if matches!(phase, SyncPhase::Cooldown(_)) {
                *phase = SyncPhase::Idle;
                true
            } else {
                false
            }
        });
    }

    pub(super) fn is_cooling_down(&self) -> bool {
        matches!(*self.phase.borrow(), SyncPhase::Cooldown(_))
    }

    /// Fetch fresh remote baselines. Failures are keyed by collection.
    pub async fn refresh_remotes(&self) -> BTreeMap<ItemKey, String> {
        let owner = self.options.owner_id.as_str();
        let mut errors = BTreeMap::new();
        if let Err(error) = self.remote_sites.refresh(owner).await {
            tracing::warn!("Fetching remote sites failed: {error}");
            errors.insert(ItemKey::collection(EntityKind::Site), error.to_string());
        }
        if let Err(error) = self.remote_files.refresh(owner).await {
            tracing::warn!("Fetching remote files failed: {error}");
            errors.insert(ItemKey::collection(EntityKind::File), error.to_string());
        }
        errors
    }

    /// Plan against the current snapshots without executing anything.
    ///
    /// Returns `None` until both remote baselines have loaded.
    pub fn plan(&self) -> Option<Vec<QueuedAction>> {
        if !self.is_loaded() {
            return None;
        }
        Some(planner::plan_pass(
            &self.local_sites.snapshot(),
            &self.remote_sites.snapshot(),
            &self.local_files.snapshot(),
            &self.remote_files.snapshot(),
        ))
    }

    /// Refresh remote baselines, then plan without executing anything.
    pub async fn preview(&self) -> Preview {
        let mut errors = self.refresh_remotes().await;
        if let Err(error) = self.reload_local_as(Origin::Sync) {
            tracing::warn!("Reloading local records failed: {error}");
            errors.insert(ItemKey::collection(EntityKind::Site), error.to_string());
        }
        match self.plan() {
            Some(queue) => Preview {
                queue,
                skipped: None,
                errors,
            },
            None => Preview {
                queue: Vec::new(),
                skipped: Some(self.skip_reason()),
                errors,
            },
        }
    }

    fn skip_reason(&self) -> SkipReason {
        if self.remote_sites.auth().can_sync() && self.remote_files.auth().can_sync() {
            SkipReason::NotLoaded
        } else {
            SkipReason::Unauthenticated
        }
    }

    /// Pick up local records another process wrote to the shared medium.
    /// Returns whether either store changed.
    pub fn reload_local(&self) -> Result<bool> {
        self.reload_local_as(Origin::Edit)
    }

    fn reload_local_as(&self, origin: Origin) -> Result<bool> {
        let sites = self.local_sites.reload_as(origin)?;
        let files = self.local_files.reload_as(origin)?;
        Ok(sites || files)
    }

    /// Remove local files whose site is gone from the local store.
    pub fn prune_orphans(&self) -> Result<usize> {
        let known_sites = self.local_sites.ids();
        let pruned = self.local_files.prune_orphans(&known_sites)?;
        if pruned > 0 {
            tracing::info!("Pruned {pruned} orphaned files");
        }
        Ok(pruned)
    }

    /// Run one complete pass unless one is already in flight.
    pub async fn run_pass(&self) -> PassOutcome {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!("Sync pass already running; ignoring request");
            return PassOutcome::AlreadyRunning;
        }
        let _guard = RunningGuard(&self.running);

        self.phase.send_replace(SyncPhase::Planning);
        if let Err(error) = self.reload_local_as(Origin::Sync) {
            tracing::warn!("Reloading local records failed: {error}");
            let errors = BTreeMap::from([(
                ItemKey::collection(EntityKind::Site),
                error.to_string(),
            )]);
            self.phase.send_replace(SyncPhase::Cooldown(errors.clone()));
            return PassOutcome::Completed(PassReport {
                errors,
                ..PassReport::default()
            });
        }
        let mut errors = self.refresh_remotes().await;

        if let Err(error) = self.prune_orphans() {
            tracing::warn!("Pruning orphaned files failed: {error}");
            errors.insert(ItemKey::collection(EntityKind::File), error.to_string());
        }

        let Some(queue) = self.plan() else {
            if errors.is_empty() {
                let reason = self.skip_reason();
                tracing::debug!("Skipping sync pass: {reason}");
                self.phase.send_replace(SyncPhase::Idle);
                return PassOutcome::Skipped(reason);
            }
            self.phase.send_replace(SyncPhase::Cooldown(errors.clone()));
            return PassOutcome::Completed(PassReport {
                errors,
                ..PassReport::default()
            });
        };

        self.phase.send_replace(SyncPhase::Executing);
        let mut report = PassReport {
            planned: queue.len(),
            ..PassReport::default()
        };

        for action in &queue {
            let key = action.key();
            if is_blocked(&errors, action) {
                tracing::debug!("Skipping {action}: earlier action on this item failed");
                report.skipped += 1;
                continue;
            }

            tracing::debug!("Applying {action}");
            match self.apply(action).await {
                Ok(()) => report.applied += 1,
                Err(error) => {
                    tracing::warn!("Sync action {action} failed: {error}");
                    errors.insert(key, error.to_string());
                }
            }
        }

        report.errors = errors;
        if report.is_clean() {
            self.phase.send_replace(SyncPhase::Idle);
        } else {
            self.phase
                .send_replace(SyncPhase::Cooldown(report.errors.clone()));
        }

        tracing::info!(
            planned = report.planned,
            applied = report.applied,
            skipped = report.skipped,
            failed = report.errors.len(),
            "Sync pass finished"
        );
        PassOutcome::Completed(report)
    }

    async fn apply(&self, action: &QueuedAction) -> Result<()> {
        match action {
            QueuedAction::Site(action) => {
                apply_one(&self.local_sites, &self.remote_sites, action).await
            }
            QueuedAction::File(action) => {
                apply_one(&self.local_files, &self.remote_files, action).await
            }
        }
    }
}

/// An item is blocked once it failed earlier in the pass. Files are also
/// blocked by a failure on their site.
fn is_blocked(errors: &BTreeMap<ItemKey, String>, action: &QueuedAction) -> bool {
    if errors.contains_key(&action.key()) {
        return true;
    }
    match action {
        QueuedAction::File(action) => {
            errors.contains_key(&ItemKey::new(EntityKind::Site, action.item().site_id))
        }
        QueuedAction::Site(_) => false,
    }
}

async fn apply_one<T, A>(
    local: &LocalStore<T>,
    remote: &RemoteStore<T, A>,
    action: &SyncAction<T>,
) -> Result<()>
where
    T: Syncable,
    A: RemoteApi<T>,
{
    match action {
        SyncAction::PostRemote(item) => {
            remote.post(item).await?;
        }
        SyncAction::PutRemote(item) => {
            remote.put(item).await?;
        }
        SyncAction::DeleteRemote(item) => remote.delete(item).await?,
        SyncAction::MarkRemoteDeleted(item) => remote.mark_as_deleted(item),
        SyncAction::SetLocal(item) => local.set_as(item.clone(), Origin::Sync)?,
        SyncAction::DeleteLocal(item) => {
            local.remove_as(item.id(), Origin::Sync)?;
        }
    }
    Ok(())
}
