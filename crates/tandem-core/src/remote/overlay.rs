//! Remote overlay store
//!
//! Holds the last-fetched server baseline plus an overlay of writes this
//! client made since that fetch. Reads see `baseline ⊕ overlay`; overlay
//! tombstones hide the matching baseline entry until the next fetch confirms
//! the removal.

use std::collections::BTreeMap;

use parking_lot::{Mutex, RwLock};

use super::{RemoteApi, RemoteError, RemoteResult};
use crate::auth::AuthState;
use crate::events::{ChangeFeed, Origin, Side};
use crate::models::Syncable;

struct OverlayState<T: Syncable> {
    baseline: Option<BTreeMap<T::Id, T>>,
    overlay: BTreeMap<T::Id, T>,
}

pub struct RemoteStore<T: Syncable, A> {
    api: A,
    feed: ChangeFeed,
    auth: RwLock<AuthState>,
    state: Mutex<OverlayState<T>>,
}

impl<T: Syncable, A: RemoteApi<T>> RemoteStore<T, A> {
    pub fn new(api: A, auth: AuthState, feed: ChangeFeed) -> Self {
        Self {
            api,
            feed,
            auth: RwLock::new(auth),
            state: Mutex::new(OverlayState {
                baseline: None,
                overlay: BTreeMap::new(),
            }),
        }
    }

    pub fn auth(&self) -> AuthState {
        self.auth.read().clone()
    }

    /// Swap the credential. Signing out does not discard the baseline.
    pub fn set_auth(&self, auth: AuthState) {
        *self.auth.write() = auth;
        self.feed.notify(T::KIND, Side::Remote, Origin::Edit);
    }

    /// Whether an initial fetch has completed.
    pub fn is_loaded(&self) -> bool {
        self.state.lock().baseline.is_some()
    }

    /// Fetch a fresh baseline and drop the overlay it supersedes.
    ///
    /// Returns `Ok(false)` without calling the server when unauthenticated.
    /// On failure the previous baseline and overlay are kept.
    pub async fn refresh(&self, owner: &str) -> RemoteResult<bool> {
        let auth = self.auth();
        if !auth.can_sync() {
            tracing::debug!("Skipping {} fetch: unauthenticated", T::KIND);
            return Ok(false);
        }

        let records = self.api.fetch(owner, &auth).await?;
        let count = records.len();
        {
            let mut state = self.state.lock();
            state.baseline = Some(
                records
                    .into_iter()
                    .map(|record| (record.id().clone(), record))
                    .collect(),
            );
            state.overlay.clear();
        }
        tracing::debug!("Fetched {count} remote {} records", T::KIND);
        self.feed.notify(T::KIND, Side::Remote, Origin::Sync);
        Ok(true)
    }

    /// Create `item` on the server and make it visible immediately.
    pub async fn post(&self, item: &T) -> RemoteResult<T> {
        let auth = self.write_auth()?;
        let created = self.api.create(item, &auth).await?;
        self.overlay(item.clone());
        Ok(created)
    }

    /// Update `item` on the server and make the new version visible
    /// immediately.
    pub async fn put(&self, item: &T) -> RemoteResult<T> {
        let auth = self.write_auth()?;
        let updated = self.api.update(item, &auth).await?;
        self.overlay(item.clone());
        Ok(updated)
    }

    /// Delete `item` on the server, then tombstone it in the overlay.
    pub async fn delete(&self, item: &T) -> RemoteResult<()> {
        let auth = self.write_auth()?;
        self.api.delete(item, &auth).await?;
        self.mark_as_deleted(item);
        Ok(())
    }

    /// Tombstone `item` in the overlay without calling the server, for
    /// removals the server already performed (e.g. cascades).
    pub fn mark_as_deleted(&self, item: &T) {
        let mut tombstone = item.clone();
        tombstone.set_deleted(true);
        self.overlay(tombstone);
    }

    /// Visible, non-deleted view keyed by id.
    pub fn snapshot(&self) -> BTreeMap<T::Id, T> {
        let state = self.state.lock();
        let mut visible: BTreeMap<T::Id, T> = state
            .baseline
            .iter()
            .flatten()
            .filter(|(_, item)| !item.is_deleted())
            .map(|(id, item)| (id.clone(), item.clone()))
            .collect();

        for (id, item) in &state.overlay {
            if item.is_deleted() {
                visible.remove(id);
            } else {
                visible.insert(id.clone(), item.clone());
            }
        }
        visible
    }

    pub fn by_id(&self, id: &T::Id) -> Option<T> {
        let state = self.state.lock();
        if let Some(item) = state.overlay.get(id) {
            return (!item.is_deleted()).then(|| item.clone());
        }
        state
            .baseline
            .as_ref()
            .and_then(|baseline| baseline.get(id))
            .filter(|item| !item.is_deleted())
            .cloned()
    }

    pub fn list(&self) -> Vec<T> {
        self.snapshot().into_values().collect()
    }

    /// Number of writes not yet reconfirmed by a fetch.
    pub fn pending_len(&self) -> usize {
        self.state.lock().overlay.len()
    }

    fn write_auth(&self) -> RemoteResult<AuthState> {
        let auth = self.auth();
        if auth.can_sync() {
            Ok(auth)
        } else {
            Err(RemoteError::Unauthorized(format!(
                "no credential available for {}",
                T::KIND.collection()
            )))
        }
    }

    fn overlay(&self, item: T) {
        self.state
            .lock()
            .overlay
            .insert(item.id().clone(), item);
        self.feed.notify(T::KIND, Side::Remote, Origin::Sync);
    }
}
