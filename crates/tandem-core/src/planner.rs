//! Pairing and action planning
//!
//! Pure functions from a (local, remote) pair of id-keyed snapshots to the
//! ordered list of corrective actions that brings them into agreement.
//! Re-planning an unchanged pair after its actions were applied yields an
//! empty queue.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Serialize, Serializer};

use crate::models::{EntityKind, File, FileId, Site, SiteId, Syncable};
use crate::util::floor_to_second;

/// One corrective action for one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncAction<T> {
    /// First publish of a local record.
    PostRemote(T),
    /// Local record is newer; overwrite the remote one.
    PutRemote(T),
    /// Local tombstone; remove the remote record.
    DeleteRemote(T),
    /// Parent was deleted remotely; the server removed this child with it.
    MarkRemoteDeleted(T),
    /// Remote record is newer or unknown locally; store it locally.
    SetLocal(T),
    /// Drop the local record (tombstone propagated, or cascaded).
    DeleteLocal(T),
}

impl<T: Syncable> SyncAction<T> {
    pub const fn item(&self) -> &T {
        match self {
            Self::PostRemote(item)
            | Self::PutRemote(item)
            | Self::DeleteRemote(item)
            | Self::MarkRemoteDeleted(item)
            | Self::SetLocal(item)
            | Self::DeleteLocal(item) => item,
        }
    }

    pub fn id(&self) -> &T::Id {
        self.item().id()
    }

    pub const fn name(&self) -> &'static str {
        match self {
            Self::PostRemote(_) => "POST_REMOTE",
            Self::PutRemote(_) => "PUT_REMOTE",
            Self::DeleteRemote(_) => "DELETE_REMOTE",
            Self::MarkRemoteDeleted(_) => "MARK_REMOTE_AS_DELETED",
            Self::SetLocal(_) => "SET_LOCAL",
            Self::DeleteLocal(_) => "DELETE_LOCAL",
        }
    }
}

/// Plan one entity kind.
pub fn plan<T: Syncable>(
    local: &BTreeMap<T::Id, T>,
    remote: &BTreeMap<T::Id, T>,
) -> Vec<SyncAction<T>> {
    let mut actions = Vec::new();
    for id in union_ids(local, remote) {
        resolve_pair(local.get(id), visible(remote.get(id)), &mut actions);
    }
    actions
}

/// Plan files, forcing deletes for files of sites the site plan deletes.
///
/// `known_sites` is every site id present in either site snapshot; remote
/// files pointing elsewhere are left alone rather than pulled in as orphans.
pub fn plan_files(
    local: &BTreeMap<FileId, File>,
    remote: &BTreeMap<FileId, File>,
    site_plan: &[SyncAction<Site>],
    known_sites: &BTreeSet<SiteId>,
) -> Vec<SyncAction<File>> {
    let mut deleted_locally = BTreeSet::new();
    let mut deleted_remotely = BTreeSet::new();
    for action in site_plan {
        match action {
            SyncAction::DeleteLocal(site) => {
                deleted_locally.insert(site.id);
            }
            SyncAction::DeleteRemote(site) | SyncAction::MarkRemoteDeleted(site) => {
                deleted_remotely.insert(site.id);
            }
            _ => {}
        }
    }

    let mut actions = Vec::new();
    for id in union_ids(local, remote) {
        let local_file = local.get(id);
        let remote_file = visible(remote.get(id));

        let cascades = local_file
            .into_iter()
            .chain(remote_file)
            .any(|file| {
                deleted_locally.contains(&file.site_id) || deleted_remotely.contains(&file.site_id)
            });
        if cascades {
            if let Some(file) = remote_file.filter(|file| deleted_remotely.contains(&file.site_id))
            {
                actions.push(SyncAction::MarkRemoteDeleted(file.clone()));
            }
            if let Some(file) = local_file.filter(|file| deleted_locally.contains(&file.site_id)) {
                actions.push(SyncAction::DeleteLocal(file.clone()));
            }
            continue;
        }

        if local_file.is_none() && remote_file.is_some_and(|file| !known_sites.contains(&file.site_id))
        {
            continue;
        }

        resolve_pair(local_file, remote_file, &mut actions);
    }
    actions
}

/// An action tagged with its entity kind, in execution order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueuedAction {
    Site(SyncAction<Site>),
    File(SyncAction<File>),
}

impl QueuedAction {
    pub fn key(&self) -> ItemKey {
        match self {
            Self::Site(action) => ItemKey::new(EntityKind::Site, action.id()),
            Self::File(action) => ItemKey::new(EntityKind::File, action.id()),
        }
    }

    pub const fn name(&self) -> &'static str {
        match self {
            Self::Site(action) => action.name(),
            Self::File(action) => action.name(),
        }
    }
}

impl fmt::Display for QueuedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name(), self.key())
    }
}

/// Identifies a record across kinds; used to key per-item errors.
///
/// Serializes as its `kind:id` display form so it can key JSON maps.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ItemKey {
    pub kind: EntityKind,
    pub id: String,
}

impl ItemKey {
    pub fn new(kind: EntityKind, id: impl fmt::Display) -> Self {
        Self {
            kind,
            id: id.to_string(),
        }
    }

    /// Key for a failure that concerns a whole collection, such as a fetch.
    pub fn collection(kind: EntityKind) -> Self {
        Self::new(kind, "*")
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

impl Serialize for ItemKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Plan a whole pass: sites first, then files with cascade.
pub fn plan_pass(
    local_sites: &BTreeMap<SiteId, Site>,
    remote_sites: &BTreeMap<SiteId, Site>,
    local_files: &BTreeMap<FileId, File>,
    remote_files: &BTreeMap<FileId, File>,
) -> Vec<QueuedAction> {
    let site_plan = plan(local_sites, remote_sites);
    let known_sites: BTreeSet<SiteId> = local_sites
        .keys()
        .chain(remote_sites.keys())
        .copied()
        .collect();
    let file_plan = plan_files(local_files, remote_files, &site_plan, &known_sites);

    site_plan
        .into_iter()
        .map(QueuedAction::Site)
        .chain(file_plan.into_iter().map(QueuedAction::File))
        .collect()
}

fn union_ids<'a, T: Syncable>(
    local: &'a BTreeMap<T::Id, T>,
    remote: &'a BTreeMap<T::Id, T>,
) -> BTreeSet<&'a T::Id> {
    local.keys().chain(remote.keys()).collect()
}

/// Remote tombstones count as absent.
fn visible<T: Syncable>(item: Option<&T>) -> Option<&T> {
    item.filter(|item| !item.is_deleted())
}

fn resolve_pair<T: Syncable>(local: Option<&T>, remote: Option<&T>, out: &mut Vec<SyncAction<T>>) {
    match (local, remote) {
        (Some(local), None) if local.is_deleted() => {
            out.push(SyncAction::DeleteLocal(local.clone()));
        }
        (Some(local), Some(remote)) if local.is_deleted() => {
            out.push(SyncAction::DeleteRemote(remote.clone()));
            out.push(SyncAction::DeleteLocal(local.clone()));
        }
        (Some(local), Some(remote)) => {
            let local_secs = floor_to_second(&local.updated_at());
            let remote_secs = floor_to_second(&remote.updated_at());
            if local_secs > remote_secs {
                out.push(SyncAction::PutRemote(local.clone()));
            } else if remote_secs > local_secs {
                out.push(SyncAction::SetLocal(remote.clone()));
            }
        }
        (Some(local), None) => out.push(SyncAction::PostRemote(local.clone())),
        (None, Some(remote)) => out.push(SyncAction::SetLocal(remote.clone())),
        (None, None) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, h, m, s).unwrap()
    }

    fn keyed<T: Syncable>(items: &[T]) -> BTreeMap<T::Id, T> {
        items
            .iter()
            .map(|item| (item.id().clone(), item.clone()))
            .collect()
    }

    fn site(updated_at: DateTime<Utc>) -> Site {
        Site::new("Site", "site", updated_at)
    }

    fn file(site_id: SiteId, updated_at: DateTime<Utc>) -> File {
        File::new(site_id, "index.html", "", updated_at)
    }

    fn with<T: Clone>(item: &T, change: impl FnOnce(&mut T)) -> T {
        let mut copy = item.clone();
        change(&mut copy);
        copy
    }

    #[test]
    fn local_only_record_is_posted() {
        let s1 = site(at(10, 0, 0));
        let actions = plan(&keyed(&[s1.clone()]), &BTreeMap::new());
        assert_eq!(actions, vec![SyncAction::PostRemote(s1)]);
    }

    #[test]
    fn local_tombstone_with_remote_counterpart_deletes_both() {
        let s2 = site(at(10, 0, 0));
        let tombstone = with(&s2, |site| site.deleted = true);

        let actions = plan(&keyed(&[tombstone.clone()]), &keyed(&[s2.clone()]));
        assert_eq!(
            actions,
            vec![
                SyncAction::DeleteRemote(s2),
                SyncAction::DeleteLocal(tombstone.clone())
            ]
        );

        let next = plan(&keyed(&[tombstone.clone()]), &BTreeMap::new());
        assert_eq!(next, vec![SyncAction::DeleteLocal(tombstone)]);
        assert!(plan::<Site>(&BTreeMap::new(), &BTreeMap::new()).is_empty());
    }

    #[test]
    fn newer_local_file_is_put() {
        let s3 = SiteId::new();
        let local = file(s3, at(10, 0, 0));
        let remote = with(&local, |file| file.updated_at = at(9, 59, 59));

        let actions = plan(&keyed(&[local.clone()]), &keyed(&[remote]));
        assert_eq!(actions, vec![SyncAction::PutRemote(local)]);
    }

    #[test]
    fn newer_remote_file_is_set_locally() {
        let local = file(SiteId::new(), at(9, 59, 59));
        let remote = with(&local, |file| file.updated_at = at(10, 0, 0));

        let actions = plan(&keyed(&[local]), &keyed(&[remote.clone()]));
        assert_eq!(actions, vec![SyncAction::SetLocal(remote)]);
    }

    #[test]
    fn sub_second_difference_is_a_tie() {
        let local = site(at(10, 0, 0) + Duration::milliseconds(900));
        let remote = with(&local, |site| {
            site.updated_at = at(10, 0, 0) + Duration::milliseconds(100);
            site.name = "different".to_string();
        });

        assert!(plan(&keyed(&[local]), &keyed(&[remote])).is_empty());
    }

    #[test]
    fn remote_only_record_is_pulled_then_settles() {
        let s4 = site(at(8, 0, 0));
        let remote = keyed(&[s4.clone()]);

        let actions = plan(&BTreeMap::new(), &remote);
        assert_eq!(actions, vec![SyncAction::SetLocal(s4.clone())]);

        // after SET_LOCAL both sides hold the same record
        assert!(plan(&keyed(&[s4]), &remote).is_empty());
    }

    #[test]
    fn remote_tombstones_count_as_absent() {
        let local = site(at(10, 0, 0));
        let remote = with(&local, |site| site.deleted = true);
        let actions = plan(&keyed(&[local.clone()]), &keyed(&[remote]));
        assert_eq!(actions, vec![SyncAction::PostRemote(local)]);
    }

    #[test]
    fn deleting_a_site_cascades_to_its_files() {
        let s = site(at(9, 0, 0));
        let tombstone = with(&s, |site| site.deleted = true);
        let other = site(at(9, 0, 0));

        // Newer local edits would normally win; the cascade overrides them.
        let local_child = file(s.id, at(11, 0, 0));
        let remote_child = with(&local_child, |file| file.updated_at = at(10, 0, 0));
        let unrelated = file(other.id, at(9, 0, 0));

        let queue = plan_pass(
            &keyed(&[tombstone.clone(), other.clone()]),
            &keyed(&[s.clone(), other]),
            &keyed(&[local_child.clone(), unrelated.clone()]),
            &keyed(&[remote_child.clone(), unrelated]),
        );

        assert_eq!(
            queue,
            vec![
                QueuedAction::Site(SyncAction::DeleteRemote(s)),
                QueuedAction::Site(SyncAction::DeleteLocal(tombstone)),
                QueuedAction::File(SyncAction::MarkRemoteDeleted(remote_child)),
                QueuedAction::File(SyncAction::DeleteLocal(local_child)),
            ]
        );
    }

    #[test]
    fn local_only_site_delete_cascades_locally() {
        let tombstone = with(&site(at(9, 0, 0)), |site| site.deleted = true);
        let child = file(tombstone.id, at(12, 0, 0));

        let queue = plan_pass(
            &keyed(&[tombstone.clone()]),
            &BTreeMap::new(),
            &keyed(&[child.clone()]),
            &BTreeMap::new(),
        );

        assert_eq!(
            queue,
            vec![
                QueuedAction::Site(SyncAction::DeleteLocal(tombstone)),
                QueuedAction::File(SyncAction::DeleteLocal(child)),
            ]
        );
    }

    #[test]
    fn remote_files_of_unknown_sites_are_ignored() {
        let stray = file(SiteId::new(), at(9, 0, 0));
        let queue = plan_pass(
            &BTreeMap::new(),
            &BTreeMap::new(),
            &BTreeMap::new(),
            &keyed(&[stray]),
        );
        assert!(queue.is_empty());
    }

    #[test]
    fn sites_precede_files_in_the_queue() {
        let s = site(at(9, 0, 0));
        let f = file(s.id, at(9, 0, 0));
        let queue = plan_pass(
            &keyed(&[s.clone()]),
            &BTreeMap::new(),
            &keyed(&[f.clone()]),
            &BTreeMap::new(),
        );
        assert_eq!(
            queue,
            vec![
                QueuedAction::Site(SyncAction::PostRemote(s)),
                QueuedAction::File(SyncAction::PostRemote(f)),
            ]
        );
    }

    #[test]
    fn planning_is_idempotent_once_applied() {
        let s = site(at(9, 0, 0));
        let f = file(s.id, at(9, 30, 0));
        let local_sites = keyed(&[s.clone()]);
        let local_files = keyed(&[f.clone()]);

        let first = plan_pass(&local_sites, &BTreeMap::new(), &local_files, &BTreeMap::new());
        assert_eq!(first.len(), 2);

        // POST_REMOTE mirrors the local records into the remote snapshot
        let second = plan_pass(&local_sites, &local_sites, &local_files, &local_files);
        assert!(second.is_empty());
    }

    #[test]
    fn item_key_display() {
        let s = site(at(9, 0, 0));
        let action = QueuedAction::Site(SyncAction::PostRemote(s.clone()));
        assert_eq!(action.to_string(), format!("POST_REMOTE site:{}", s.id));
    }

    #[test]
    fn item_keys_serialize_as_json_map_keys() {
        let errors = BTreeMap::from([(
            ItemKey::collection(EntityKind::File),
            "offline".to_string(),
        )]);
        assert_eq!(
            serde_json::to_string(&errors).unwrap(),
            r#"{"file:*":"offline"}"#
        );
    }
}
