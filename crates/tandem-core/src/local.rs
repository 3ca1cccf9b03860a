//! Keyed local store
//!
//! A synchronous, write-through cache of one entity kind. The in-memory map
//! always mirrors the last persisted write: every mutation is written to the
//! persistence medium before the map is touched, and a change is published on
//! the [`ChangeFeed`] before the call returns.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::events::{ChangeFeed, Origin, Side};
use crate::models::{File, SiteId, Syncable};
use crate::storage::KeyValueStore;

pub struct LocalStore<T: Syncable> {
    medium: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    feed: ChangeFeed,
    items: RwLock<BTreeMap<T::Id, T>>,
    /// Medium data version the map was last loaded at.
    loaded_version: AtomicU64,
}

impl<T: Syncable> LocalStore<T> {
    /// Open the store and rehydrate every record persisted under this kind's
    /// prefix.
    ///
    /// Unparseable records are skipped with a warning. A record stored under
    /// a key that doesn't match its own id is moved to the right key.
    pub fn open(
        medium: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        feed: ChangeFeed,
    ) -> Result<Self> {
        let version = medium.data_version()?;
        let items = load_records::<T>(medium.as_ref())?;

        tracing::debug!("Rehydrated {} {} records", items.len(), T::KIND);
        Ok(Self {
            medium,
            clock,
            feed,
            items: RwLock::new(items),
            loaded_version: AtomicU64::new(version),
        })
    }

    /// Pick up records other writers committed to the medium since the last
    /// load. Returns whether the in-memory view changed.
    pub fn reload(&self) -> Result<bool> {
        self.reload_as(Origin::Edit)
    }

    pub(crate) fn reload_as(&self, origin: Origin) -> Result<bool> {
        let version = self.medium.data_version()?;
        if version == self.loaded_version.load(Ordering::SeqCst) {
            return Ok(false);
        }

        let changed = {
            let mut items = self.items.write();
            let fresh = load_records::<T>(self.medium.as_ref())?;
            self.loaded_version.store(version, Ordering::SeqCst);
            let changed = *items != fresh;
            *items = fresh;
            changed
        };
        if changed {
            tracing::debug!("Reloaded {} records written elsewhere", T::KIND);
            self.feed.notify(T::KIND, Side::Local, origin);
        }
        Ok(changed)
    }

    /// Current time according to the store's clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Insert or replace a record as-is.
    pub fn set(&self, item: T) -> Result<()> {
        self.set_as(item, Origin::Edit)
    }

    pub(crate) fn set_as(&self, item: T, origin: Origin) -> Result<()> {
        {
            let mut items = self.items.write();
            self.persist(&item)?;
            items.insert(item.id().clone(), item);
        }
        self.feed.notify(T::KIND, Side::Local, origin);
        Ok(())
    }

    /// Apply `change` to an existing record and stamp `updated_at = now`.
    pub fn update(&self, id: &T::Id, change: impl FnOnce(&mut T)) -> Result<T> {
        let updated = {
            let mut items = self.items.write();
            let mut item = items
                .get(id)
                .cloned()
                .ok_or_else(|| Error::NotFound(format!("{} {id}", T::KIND)))?;
            change(&mut item);
            item.set_updated_at(self.clock.now());
            self.persist(&item)?;
            items.insert(id.clone(), item.clone());
            item
        };
        self.feed.notify(T::KIND, Side::Local, Origin::Edit);
        Ok(updated)
    }

    /// Tombstone a record. It stays in the store until sync has told the
    /// remote side.
    pub fn mark_deleted(&self, id: &T::Id) -> Result<T> {
        self.update(id, |item| item.set_deleted(true))
    }

    /// Physically delete a record. Returns the removed record, if any.
    pub fn remove(&self, id: &T::Id) -> Result<Option<T>> {
        self.remove_as(id, Origin::Edit)
    }

    pub(crate) fn remove_as(&self, id: &T::Id, origin: Origin) -> Result<Option<T>> {
        let removed = {
            let mut items = self.items.write();
            self.medium.delete(&record_key::<T>(id))?;
            items.remove(id)
        };
        self.feed.notify(T::KIND, Side::Local, origin);
        Ok(removed)
    }

    pub fn by_id(&self, id: &T::Id) -> Option<T> {
        self.items.read().get(id).cloned()
    }

    /// Non-deleted records, ordered by id.
    pub fn list(&self) -> Vec<T> {
        self.items
            .read()
            .values()
            .filter(|item| !item.is_deleted())
            .cloned()
            .collect()
    }

    /// Every record including tombstones.
    pub fn snapshot(&self) -> BTreeMap<T::Id, T> {
        self.items.read().clone()
    }

    pub fn ids(&self) -> BTreeSet<T::Id> {
        self.items.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }

    fn persist(&self, item: &T) -> Result<()> {
        let raw = serde_json::to_string(item)?;
        self.medium.put(&record_key::<T>(item.id()), &raw)
    }
}

impl LocalStore<File> {
    /// Remove files whose owning site is not in `known_sites`.
    ///
    /// Returns how many files were pruned.
    pub fn prune_orphans(&self, known_sites: &BTreeSet<SiteId>) -> Result<usize> {
        let orphans: Vec<_> = self
            .items
            .read()
            .values()
            .filter(|file| !known_sites.contains(&file.site_id))
            .map(|file| file.id)
            .collect();

        for id in &orphans {
            tracing::debug!("Pruning orphaned file {id}");
            self.remove_as(id, Origin::Sync)?;
        }
        Ok(orphans.len())
    }
}

fn record_key<T: Syncable>(id: &T::Id) -> String {
    format!("{}{id}", T::KIND.key_prefix())
}

fn load_records<T: Syncable>(medium: &dyn KeyValueStore) -> Result<BTreeMap<T::Id, T>> {
    let mut items = BTreeMap::new();
    for (key, raw) in medium.scan_prefix(T::KIND.key_prefix())? {
        let item = match serde_json::from_str::<T>(&raw) {
            Ok(item) => item,
            Err(error) => {
                tracing::warn!("Dropping corrupt {} record at {key}: {error}", T::KIND);
                continue;
            }
        };

        let expected_key = record_key::<T>(item.id());
        if key != expected_key {
            tracing::warn!("Re-keying {} record from {key} to {expected_key}", T::KIND);
            medium.put(&expected_key, &raw)?;
            medium.delete(&key)?;
        }
        items.insert(item.id().clone(), item);
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::models::{EntityKind, Site};
    use crate::storage::{MemoryKeyValueStore, SqliteKeyValueStore};
    use chrono::{Duration, TimeZone};
    use pretty_assertions::assert_eq;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()
    }

    fn setup() -> (Arc<MemoryKeyValueStore>, ManualClock, LocalStore<Site>) {
        let medium = Arc::new(MemoryKeyValueStore::new());
        let clock = ManualClock::new(t0());
        let store =
            LocalStore::open(medium.clone(), Arc::new(clock.clone()), ChangeFeed::new()).unwrap();
        (medium, clock, store)
    }

    #[test]
    fn set_persists_immediately() {
        let (medium, _, store) = setup();
        let site = Site::new("Blog", "blog", t0());
        store.set(site.clone()).unwrap();

        let raw = medium.get(&format!("site:{}", site.id)).unwrap();
        let persisted: Site = serde_json::from_str(&raw).unwrap();
        assert_eq!(persisted, site);
        assert_eq!(store.by_id(&site.id), Some(site));
    }

    #[test]
    fn update_merges_and_stamps_timestamp() {
        let (_, clock, store) = setup();
        let site = Site::new("Blog", "blog", t0());
        store.set(site.clone()).unwrap();

        clock.advance(Duration::seconds(30));
        let updated = store
            .update(&site.id, |site| site.name = "Journal".to_string())
            .unwrap();

        assert_eq!(updated.name, "Journal");
        assert_eq!(updated.local_name, "blog");
        assert_eq!(updated.updated_at, t0() + Duration::seconds(30));
    }

    #[test]
    fn update_missing_record_is_not_found() {
        let (_, _, store) = setup();
        let error = store.update(&crate::SiteId::new(), |_| {}).unwrap_err();
        assert!(matches!(error, Error::NotFound(_)));
    }

    #[test]
    fn tombstones_are_hidden_from_list_but_kept() {
        let (_, _, store) = setup();
        let site = Site::new("Blog", "blog", t0());
        store.set(site.clone()).unwrap();
        store.mark_deleted(&site.id).unwrap();

        assert!(store.list().is_empty());
        assert!(store.by_id(&site.id).unwrap().deleted);

        store.remove(&site.id).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn rehydration_coerces_and_repairs_records() {
        let medium = Arc::new(MemoryKeyValueStore::new());
        let good = Site::new("Good", "good", t0());
        let misplaced = Site::new("Misplaced", "misplaced", t0());

        medium
            .put(
                &format!("site:{}", good.id),
                &format!(
                    r#"{{"id":"{}","name":"Good","localName":"good","updatedAt":{}}}"#,
                    good.id,
                    t0().timestamp_millis()
                ),
            )
            .unwrap();
        medium
            .put("site:wrong-key", &serde_json::to_string(&misplaced).unwrap())
            .unwrap();
        medium.put("site:garbage", "{not json").unwrap();

        let store: LocalStore<Site> = LocalStore::open(
            medium.clone(),
            Arc::new(ManualClock::new(t0())),
            ChangeFeed::new(),
        )
        .unwrap();

        assert_eq!(store.len(), 2);
        assert_eq!(store.by_id(&good.id), Some(good));
        assert!(medium.get("site:wrong-key").is_none());
        assert!(medium.get(&format!("site:{}", misplaced.id)).is_some());
    }

    #[test]
    fn mutations_publish_changes() {
        let medium = Arc::new(MemoryKeyValueStore::new());
        let feed = ChangeFeed::new();
        let mut rx = feed.subscribe();
        let store: LocalStore<Site> =
            LocalStore::open(medium, Arc::new(ManualClock::new(t0())), feed).unwrap();

        store.set(Site::new("Blog", "blog", t0())).unwrap();
        let change = rx.try_recv().unwrap();
        assert_eq!(change.kind, EntityKind::Site);
        assert_eq!(change.side, Side::Local);
        assert_eq!(change.origin, Origin::Edit);
    }

    #[test]
    fn reload_sees_writes_from_another_connection() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("tandem.db");
        let open = || -> LocalStore<Site> {
            LocalStore::open(
                Arc::new(SqliteKeyValueStore::open(&path).unwrap()),
                Arc::new(ManualClock::new(t0())),
                ChangeFeed::new(),
            )
            .unwrap()
        };
        let ours = open();
        let theirs = open();
        let mut rx = ours.feed.subscribe();

        assert!(!ours.reload().unwrap());

        let site = Site::new("Blog", "blog", t0());
        theirs.set(site.clone()).unwrap();
        assert!(ours.by_id(&site.id).is_none());

        assert!(ours.reload().unwrap());
        assert_eq!(ours.by_id(&site.id), Some(site.clone()));
        assert_eq!(rx.try_recv().unwrap().origin, Origin::Edit);

        theirs.mark_deleted(&site.id).unwrap();
        assert!(ours.reload().unwrap());
        assert!(ours.by_id(&site.id).unwrap().deleted);
        assert!(!ours.reload().unwrap());
    }

    #[test]
    fn prune_orphans_removes_files_without_site() {
        let medium = Arc::new(MemoryKeyValueStore::new());
        let files: LocalStore<File> = LocalStore::open(
            medium,
            Arc::new(ManualClock::new(t0())),
            ChangeFeed::new(),
        )
        .unwrap();

        let kept_site = SiteId::new();
        let kept = File::new(kept_site, "index.html", "", t0());
        let orphan = File::new(SiteId::new(), "gone.html", "", t0());
        files.set(kept.clone()).unwrap();
        files.set(orphan.clone()).unwrap();

        let pruned = files
            .prune_orphans(&BTreeSet::from([kept_site]))
            .unwrap();

        assert_eq!(pruned, 1);
        assert!(files.by_id(&orphan.id).is_none());
        assert_eq!(files.by_id(&kept.id), Some(kept));
    }
}
