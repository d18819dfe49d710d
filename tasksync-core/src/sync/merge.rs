//! Last-writer-wins merge of one record kind.
//!
//! [`plan`] pairs local and remote records by id and decides, per id, which
//! side has to change. It performs no I/O; the orchestrator applies the
//! resulting actions.
//!
//! | local | remote | outcome |
//! |---|---|---|
//! | absent | live | insert locally |
//! | absent | tombstone | nothing |
//! | present | absent | push |
//! | older | newer, live | overwrite locally |
//! | older | newer, tombstone | hard delete locally |
//! | newer | older | push |
//! | same timestamp | same timestamp | nothing |
//!
//! Pushes never happen for sentinel-owned data.

use std::collections::{BTreeMap, BTreeSet};

use uuid::Uuid;

use crate::identity::is_local_owner;
use crate::models::Syncable;

#[derive(Debug, Clone, PartialEq)]
pub enum MergeAction<T> {
    /// Remote-only live record; materialize it locally.
    InsertLocal(T),
    /// Remote copy is newer; overwrite the local row.
    UpdateLocal(T),
    /// Remote tombstone is newer; remove the local row entirely.
    DeleteLocal(Uuid),
    /// Local copy is newer or unknown remotely.
    PushRemote(T),
}

impl<T: Syncable> MergeAction<T> {
    pub fn id(&self) -> Uuid {
        match self {
            MergeAction::InsertLocal(r) | MergeAction::UpdateLocal(r) | MergeAction::PushRemote(r) => {
                r.id()
            }
            MergeAction::DeleteLocal(id) => *id,
        }
    }
}

fn may_push<T: Syncable>(record: &T, owner: &str) -> bool {
    !is_local_owner(owner) && !record.owner().is_some_and(is_local_owner)
}

fn index<T: Syncable>(records: &[T]) -> BTreeMap<Uuid, &T> {
    records.iter().map(|r| (r.id(), r)).collect()
}

/// Reconciliation actions for every id present on either side, ordered by id.
///
/// `owner` is the user the run is for; nothing is pushed when it (or the
/// record's own owner) is a local-only sentinel.
pub fn plan<T: Syncable>(local: &[T], remote: &[T], owner: &str) -> Vec<MergeAction<T>> {
    let local = index(local);
    let remote = index(remote);
    let ids: BTreeSet<Uuid> = local.keys().chain(remote.keys()).copied().collect();

    ids.into_iter()
        .filter_map(|id| match (local.get(&id), remote.get(&id)) {
            (None, Some(r)) if !r.is_deleted() => Some(MergeAction::InsertLocal((*r).clone())),
            (None, Some(_)) => None,
            (Some(l), None) => may_push(*l, owner).then(|| MergeAction::PushRemote((*l).clone())),
            (Some(l), Some(r)) if r.last_modified() > l.last_modified() => {
                if r.is_deleted() {
                    Some(MergeAction::DeleteLocal(id))
                } else {
                    Some(MergeAction::UpdateLocal((*r).clone()))
                }
            }
            (Some(l), Some(r)) if l.last_modified() > r.last_modified() => {
                may_push(*l, owner).then(|| MergeAction::PushRemote((*l).clone()))
            }
            _ => None,
        })
        .collect()
}

/// Local tombstones the remote side holds with the same timestamp.
///
/// Both sides agree the record is gone, so the local row can be removed.
pub fn confirmed_tombstones<T: Syncable>(local: &[T], remote: &[T]) -> Vec<Uuid> {
    let remote = index(remote);
    local
        .iter()
        .filter(|l| l.is_deleted())
        .filter(|l| {
            remote
                .get(&l.id())
                .is_some_and(|r| r.is_deleted() && r.last_modified() == l.last_modified())
        })
        .map(Syncable::id)
        .collect()
}
