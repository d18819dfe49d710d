//! Full reconciliation run for one owner.
//!
//! A run merges lists, then shops, then the tasks of every active list. The
//! task passes run concurrently and the run finishes only when all of them
//! have. Every failure is contained: it is logged, counted in the
//! [`SyncReport`] and left for the next run, which re-derives the whole diff.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{join_all, BoxFuture, FutureExt, Shared};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::merge::{confirmed_tombstones, plan, MergeAction};
use crate::db::{LocalStore, StoreError};
use crate::identity::is_local_owner;
use crate::models::{now_millis, Shop, Syncable, Task, TodoList};
use crate::remote::schema::{LISTS_COLLECTION, SHOPS_COLLECTION, TASKS_COLLECTION};
use crate::remote::{RemoteError, RemoteRepository};

const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    /// Remote tombstones older than this are purged once the local row is
    /// gone. `None` keeps them forever.
    pub tombstone_retention_days: Option<u32>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            tombstone_retention_days: Some(30),
        }
    }
}

/// Outcome of one record kind within a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct KindReport {
    /// Remote-only records written locally.
    pub inserted: usize,
    /// Local rows overwritten by a newer remote copy.
    pub updated: usize,
    /// Local rows removed because of a newer remote tombstone.
    pub deleted: usize,
    /// Local tombstones removed once the remote side confirmed them.
    pub purged: usize,
    /// Records written to the remote store.
    pub pushed: usize,
    /// Expired remote tombstones removed.
    pub collected: usize,
    /// Writes that failed and will be retried next run.
    pub failed: usize,
    /// Remote fetches that failed; the records behind them were left alone.
    pub unreachable: usize,
}

impl KindReport {
    fn absorb(&mut self, other: KindReport) {
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.deleted += other.deleted;
        self.purged += other.purged;
        self.pushed += other.pushed;
        self.collected += other.collected;
        self.failed += other.failed;
        self.unreachable += other.unreachable;
    }

    pub fn changes(&self) -> usize {
        self.inserted + self.updated + self.deleted + self.purged + self.pushed + self.collected
    }
}

impl fmt::Display for KindReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} in, {} updated, {} deleted, {} purged, {} pushed, {} collected, {} failed, {} unreachable",
            self.inserted,
            self.updated,
            self.deleted,
            self.purged,
            self.pushed,
            self.collected,
            self.failed,
            self.unreachable
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub owner: String,
    /// True when the owner is a local-only sentinel and nothing ran.
    pub skipped: bool,
    pub lists: KindReport,
    pub shops: KindReport,
    pub tasks: KindReport,
}

impl SyncReport {
    fn new(owner: &str) -> Self {
        Self {
            owner: owner.to_string(),
            ..Self::default()
        }
    }

    pub fn failed(&self) -> usize {
        self.lists.failed + self.shops.failed + self.tasks.failed
    }

    pub fn changes(&self) -> usize {
        self.lists.changes() + self.shops.changes() + self.tasks.changes()
    }

    /// Fetches that failed, each skipping one kind or one list's tasks.
    pub fn unreachable(&self) -> usize {
        self.lists.unreachable + self.shops.unreachable + self.tasks.unreachable
    }
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.skipped {
            return write!(f, "Sync skipped for local-only owner {}", self.owner);
        }
        writeln!(f, "Sync for {}:", self.owner)?;
        writeln!(f, "  lists: {}", self.lists)?;
        writeln!(f, "  shops: {}", self.shops)?;
        write!(f, "  tasks: {}", self.tasks)
    }
}

/// Documents rewritten by [`SyncOrchestrator::migrate_remote_schema`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    pub lists: usize,
    pub shops: usize,
    pub tasks: usize,
}

/// Per-kind storage operations the orchestrator applies merge actions with.
#[async_trait]
trait SyncKind: Syncable {
    async fn insert_local(store: &LocalStore, record: &Self) -> Result<(), StoreError>;
    async fn update_local(store: &LocalStore, record: &Self) -> Result<(), StoreError>;
    async fn delete_local(store: &LocalStore, id: Uuid) -> Result<(), StoreError>;
    async fn push(remote: &RemoteRepository, record: &Self) -> Result<(), RemoteError>;
    async fn delete_remote(remote: &RemoteRepository, id: Uuid) -> Result<(), RemoteError>;

    /// Records carrying an owner are written under the run's owner.
    fn stamp_owner(&mut self, _owner: &str) {}
}

#[async_trait]
impl SyncKind for TodoList {
    async fn insert_local(store: &LocalStore, record: &Self) -> Result<(), StoreError> {
        store.lists.insert(record).await
    }

    async fn update_local(store: &LocalStore, record: &Self) -> Result<(), StoreError> {
        store.lists.update(record).await
    }

    async fn delete_local(store: &LocalStore, id: Uuid) -> Result<(), StoreError> {
        store.lists.hard_delete(id).await
    }

    async fn push(remote: &RemoteRepository, record: &Self) -> Result<(), RemoteError> {
        remote.put_list(record).await
    }

    /// Removes the list together with whatever tasks the remote still holds.
    async fn delete_remote(remote: &RemoteRepository, id: Uuid) -> Result<(), RemoteError> {
        for task in remote.try_fetch_tasks(id).await? {
            remote.delete_task(task.id).await?;
        }
        remote.delete_list(id).await
    }

    fn stamp_owner(&mut self, owner: &str) {
        self.owner = owner.to_string();
    }
}

#[async_trait]
impl SyncKind for Shop {
    async fn insert_local(store: &LocalStore, record: &Self) -> Result<(), StoreError> {
        store.shops.insert(record).await
    }

    async fn update_local(store: &LocalStore, record: &Self) -> Result<(), StoreError> {
        store.shops.update(record).await
    }

    async fn delete_local(store: &LocalStore, id: Uuid) -> Result<(), StoreError> {
        store.shops.hard_delete(id).await
    }

    async fn push(remote: &RemoteRepository, record: &Self) -> Result<(), RemoteError> {
        remote.put_shop(record).await
    }

    async fn delete_remote(remote: &RemoteRepository, id: Uuid) -> Result<(), RemoteError> {
        remote.delete_shop(id).await
    }

    fn stamp_owner(&mut self, owner: &str) {
        self.owner = owner.to_string();
    }
}

#[async_trait]
impl SyncKind for Task {
    async fn insert_local(store: &LocalStore, record: &Self) -> Result<(), StoreError> {
        store.tasks.insert(record).await
    }

    async fn update_local(store: &LocalStore, record: &Self) -> Result<(), StoreError> {
        store.tasks.update(record).await
    }

    async fn delete_local(store: &LocalStore, id: Uuid) -> Result<(), StoreError> {
        store.tasks.hard_delete(id).await
    }

    async fn push(remote: &RemoteRepository, record: &Self) -> Result<(), RemoteError> {
        remote.put_task(record).await
    }

    async fn delete_remote(remote: &RemoteRepository, id: Uuid) -> Result<(), RemoteError> {
        remote.delete_task(id).await
    }
}

type RunFuture = Shared<BoxFuture<'static, SyncReport>>;

/// Runs reconciliation between the local store and the remote store.
///
/// Concurrent requests for the same owner join the run already in flight
/// instead of starting a second one.
pub struct SyncOrchestrator {
    local: LocalStore,
    remote: RemoteRepository,
    options: SyncOptions,
    in_flight: Mutex<HashMap<String, RunFuture>>,
}

impl fmt::Debug for SyncOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncOrchestrator")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl SyncOrchestrator {
    pub fn new(local: LocalStore, remote: RemoteRepository, options: SyncOptions) -> Arc<Self> {
        Arc::new(Self {
            local,
            remote,
            options,
            in_flight: Mutex::new(HashMap::new()),
        })
    }

    /// Reconciles everything `owner` has in both stores.
    ///
    /// Returns immediately with a skipped report for sentinel owners, without
    /// touching the remote store.
    pub async fn sync(self: &Arc<Self>, owner: &str) -> SyncReport {
        if is_local_owner(owner) {
            debug!(owner, "Not syncing local-only owner");
            return SyncReport {
                skipped: true,
                ..SyncReport::new(owner)
            };
        }

        let run = {
            let mut in_flight = self.in_flight.lock().await;
            match in_flight.get(owner) {
                Some(run) => {
                    debug!(owner, "Joining sync already in progress");
                    run.clone()
                }
                None => {
                    let this = Arc::clone(self);
                    let key = owner.to_string();
                    let run = async move {
                        let report = this.run(&key).await;
                        this.in_flight.lock().await.remove(&key);
                        report
                    }
                    .boxed()
                    .shared();
                    in_flight.insert(owner.to_string(), run.clone());
                    run
                }
            }
        };

        run.await
    }

    async fn run(&self, owner: &str) -> SyncReport {
        let mut report = SyncReport::new(owner);

        report.lists = match self.local.lists.all_by_owner(owner).await {
            Ok(local) => match self.remote.try_fetch_lists(owner).await {
                Ok(remote) => self.reconcile(owner, local, remote).await,
                Err(e) => unreachable_kind(TodoList::KIND, &e),
            },
            Err(e) => {
                warn!(owner, error = %e, "Cannot read local lists, skipping list sync");
                KindReport::default()
            }
        };

        report.shops = match self.local.shops.all_by_owner(owner).await {
            Ok(local) => match self.remote.try_fetch_shops(owner).await {
                Ok(remote) => self.reconcile(owner, local, remote).await,
                Err(e) => unreachable_kind(Shop::KIND, &e),
            },
            Err(e) => {
                warn!(owner, error = %e, "Cannot read local shops, skipping shop sync");
                KindReport::default()
            }
        };

        match self.local.lists.active_by_owner(owner).await {
            Ok(lists) => {
                let passes = lists.iter().map(|list| self.reconcile_tasks(owner, list.id));
                for pass in join_all(passes).await {
                    report.tasks.absorb(pass);
                }
            }
            Err(e) => warn!(owner, error = %e, "Cannot read active lists, skipping task sync"),
        }

        info!(
            owner,
            changes = report.changes(),
            failed = report.failed(),
            unreachable = report.unreachable(),
            "Sync finished"
        );
        report
    }

    async fn reconcile_tasks(&self, owner: &str, list_id: Uuid) -> KindReport {
        match self.local.tasks.all_for_list(list_id).await {
            Ok(local) => match self.remote.try_fetch_tasks(list_id).await {
                Ok(remote) => self.reconcile(owner, local, remote).await,
                Err(e) => unreachable_kind(Task::KIND, &e),
            },
            Err(e) => {
                warn!(%list_id, error = %e, "Cannot read local tasks, skipping list");
                KindReport::default()
            }
        }
    }

    /// Merges one kind, applies the actions and collects expired tombstones.
    async fn reconcile<T: SyncKind>(&self, owner: &str, local: Vec<T>, remote: Vec<T>) -> KindReport {
        let mut report = KindReport::default();
        let mut local_ids: HashSet<Uuid> = local.iter().map(Syncable::id).collect();

        for action in plan(&local, &remote, owner) {
            let id = action.id();
            debug!(kind = T::KIND, %id, action = action_kind(&action), "Applying merge action");
            match action {
                MergeAction::InsertLocal(record) => match T::insert_local(&self.local, &record).await {
                    Ok(()) => {
                        report.inserted += 1;
                        local_ids.insert(id);
                    }
                    Err(e) => self.local_failure::<T>(&mut report, id, &e),
                },
                MergeAction::UpdateLocal(record) => match T::update_local(&self.local, &record).await {
                    Ok(()) => report.updated += 1,
                    Err(e) => self.local_failure::<T>(&mut report, id, &e),
                },
                MergeAction::DeleteLocal(id) => match T::delete_local(&self.local, id).await {
                    Ok(()) => {
                        report.deleted += 1;
                        local_ids.remove(&id);
                    }
                    Err(e) => self.local_failure::<T>(&mut report, id, &e),
                },
                MergeAction::PushRemote(mut record) => {
                    record.stamp_owner(owner);
                    match T::push(&self.remote, &record).await {
                        Ok(()) => report.pushed += 1,
                        Err(e) => {
                            warn!(kind = T::KIND, %id, error = %e, "Remote write failed, retrying next sync");
                            report.failed += 1;
                        }
                    }
                }
            }
        }

        for id in confirmed_tombstones(&local, &remote) {
            match T::delete_local(&self.local, id).await {
                Ok(()) => {
                    report.purged += 1;
                    local_ids.remove(&id);
                }
                Err(e) => self.local_failure::<T>(&mut report, id, &e),
            }
        }

        if let Some(cutoff) = self.tombstone_cutoff() {
            let expired = remote
                .iter()
                .filter(|r| r.is_deleted() && r.last_modified() < cutoff)
                .filter(|r| !local_ids.contains(&r.id()));
            for record in expired {
                let id = record.id();
                match T::delete_remote(&self.remote, id).await {
                    Ok(()) => {
                        debug!(kind = T::KIND, %id, "Collected expired remote tombstone");
                        report.collected += 1;
                    }
                    Err(e) => {
                        warn!(kind = T::KIND, %id, error = %e, "Cannot collect remote tombstone");
                        report.failed += 1;
                    }
                }
            }
        }

        report
    }

    fn local_failure<T: Syncable>(&self, report: &mut KindReport, id: Uuid, error: &StoreError) {
        warn!(kind = T::KIND, %id, %error, "Local write failed, retrying next sync");
        report.failed += 1;
    }

    fn tombstone_cutoff(&self) -> Option<i64> {
        self.options
            .tombstone_retention_days
            .map(|days| now_millis() - i64::from(days) * MILLIS_PER_DAY)
    }

    /// Rewrites `owner`'s legacy remote documents in the current schema.
    ///
    /// Covers lists and shops owned by `owner` and the tasks of every list
    /// known on either side.
    pub async fn migrate_remote_schema(&self, owner: &str) -> Result<MigrationReport, RemoteError> {
        if is_local_owner(owner) {
            return Ok(MigrationReport::default());
        }

        let mut report = MigrationReport {
            lists: self
                .remote
                .upgrade_legacy(LISTS_COLLECTION, "owner", owner)
                .await?,
            shops: self
                .remote
                .upgrade_legacy(SHOPS_COLLECTION, "owner", owner)
                .await?,
            tasks: 0,
        };

        let mut list_ids: HashSet<Uuid> = self
            .remote
            .try_fetch_lists(owner)
            .await?
            .into_iter()
            .map(|l| l.id)
            .collect();
        match self.local.lists.all_by_owner(owner).await {
            Ok(lists) => list_ids.extend(lists.into_iter().map(|l| l.id)),
            Err(e) => warn!(owner, error = %e, "Cannot read local lists for migration"),
        }

        for list_id in list_ids {
            report.tasks += self
                .remote
                .upgrade_legacy(TASKS_COLLECTION, "listId", &list_id.to_string())
                .await?;
        }

        info!(
            owner,
            lists = report.lists,
            shops = report.shops,
            tasks = report.tasks,
            "Remote schema migration finished"
        );
        Ok(report)
    }
}

/// A failed fetch says nothing about the remote side, so the kind is not
/// merged at all this run.
fn unreachable_kind(kind: &'static str, error: &RemoteError) -> KindReport {
    warn!(kind, %error, "Remote fetch failed, skipping until next sync");
    KindReport {
        unreachable: 1,
        ..KindReport::default()
    }
}

fn action_kind<T>(action: &MergeAction<T>) -> &'static str {
    match action {
        MergeAction::InsertLocal(_) => "insert_local",
        MergeAction::UpdateLocal(_) => "update_local",
        MergeAction::DeleteLocal(_) => "delete_local",
        MergeAction::PushRemote(_) => "push_remote",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::{setup_store, TestStore};
    use crate::identity::{LOCAL_SHOPPING_OWNER, LOCAL_TODO_OWNER};
    use crate::models::ShoppingItem;
    use crate::remote::{schema, Document, MemoryRemoteStore};
    use serde_json::json;

    struct Fixture {
        ctx: TestStore,
        remote_store: MemoryRemoteStore,
        remote: RemoteRepository,
        orchestrator: Arc<SyncOrchestrator>,
    }

    impl Fixture {
        fn local(&self) -> &LocalStore {
            &self.ctx.store
        }
    }

    async fn fixture() -> Fixture {
        let ctx = setup_store().await;
        let remote_store = MemoryRemoteStore::new();
        let remote = RemoteRepository::new(Arc::new(remote_store.clone()));
        let orchestrator =
            SyncOrchestrator::new(ctx.store.clone(), remote.clone(), SyncOptions::default());
        Fixture {
            ctx,
            remote_store,
            remote,
            orchestrator,
        }
    }

    const DAY: i64 = MILLIS_PER_DAY;

    #[tokio::test]
    async fn test_sentinel_owner_never_reads_remote() {
        let f = fixture().await;
        f.local()
            .lists
            .insert(&TodoList::new("Offline", LOCAL_TODO_OWNER))
            .await
            .unwrap();

        for owner in [LOCAL_TODO_OWNER, LOCAL_SHOPPING_OWNER] {
            let report = f.orchestrator.sync(owner).await;
            assert!(report.skipped);
        }
        assert_eq!(f.remote_store.fetch_count(LISTS_COLLECTION).await, 0);
        assert_eq!(f.remote_store.fetch_count(SHOPS_COLLECTION).await, 0);
        assert_eq!(f.remote_store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_local_records_are_pushed_then_stable() {
        let f = fixture().await;
        let list = TodoList::new("Groceries", "alice");
        f.local().lists.insert(&list).await.unwrap();
        f.local()
            .tasks
            .insert(&Task::new(list.id, "Milk", 0))
            .await
            .unwrap();
        f.local()
            .shops
            .insert(&Shop::new("Market", "alice", 0).with_items(vec![ShoppingItem::new("eggs")]))
            .await
            .unwrap();

        let first = f.orchestrator.sync("alice").await;
        assert_eq!(first.lists.pushed, 1);
        assert_eq!(first.shops.pushed, 1);
        assert_eq!(first.tasks.pushed, 1);
        assert_eq!(first.failed(), 0);

        assert_eq!(f.remote.fetch_lists("alice").await, vec![list.clone()]);
        assert_eq!(f.remote.fetch_tasks(list.id).await.len(), 1);

        let second = f.orchestrator.sync("alice").await;
        assert_eq!(second.changes(), 0);
    }

    #[tokio::test]
    async fn test_remote_records_are_materialized_with_their_tasks() {
        let f = fixture().await;
        let list = TodoList::new("From phone", "alice");
        let task = Task::new(list.id, "Call mum", 0);
        f.remote.put_list(&list).await.unwrap();
        f.remote.put_task(&task).await.unwrap();
        f.remote
            .put_shop(&Shop::new("Bakery", "alice", 0))
            .await
            .unwrap();
        f.remote
            .put_list(&TodoList::new("Gone", "alice").deleted())
            .await
            .unwrap();

        let report = f.orchestrator.sync("alice").await;
        assert_eq!(report.lists.inserted, 1);
        assert_eq!(report.shops.inserted, 1);
        assert_eq!(report.tasks.inserted, 1);

        let lists = f.local().lists.all_by_owner("alice").await.unwrap();
        assert_eq!(lists, vec![list.clone()]);
        assert_eq!(
            f.local().tasks.get_by_id(task.id).await.unwrap(),
            Some(task)
        );
    }

    #[tokio::test]
    async fn test_newer_remote_tombstone_removes_list_and_tasks() {
        let f = fixture().await;
        let list = TodoList::new("Chores", "alice").with_last_modified(100);
        let task = Task::new(list.id, "Dishes", 0);
        f.local().lists.insert(&list).await.unwrap();
        f.local().tasks.insert(&task).await.unwrap();
        f.remote
            .put_list(&list.clone().with_last_modified(200).deleted())
            .await
            .unwrap();

        let report = f.orchestrator.sync("alice").await;
        assert_eq!(report.lists.deleted, 1);
        assert!(f.local().lists.get_by_id(list.id).await.unwrap().is_none());
        assert!(f.local().tasks.get_by_id(task.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_newer_remote_copy_overwrites_local() {
        let f = fixture().await;
        let shop = Shop::new("Market", "alice", 0).with_last_modified(100);
        f.local().shops.insert(&shop).await.unwrap();

        let mut newer = shop.clone().with_last_modified(500);
        newer.name = "Farmers market".to_string();
        f.remote.put_shop(&newer).await.unwrap();

        let report = f.orchestrator.sync("alice").await;
        assert_eq!(report.shops.updated, 1);
        assert_eq!(
            f.local().shops.get_by_id(shop.id).await.unwrap(),
            Some(newer)
        );
    }

    #[tokio::test]
    async fn test_newer_remote_task_overwrites_local() {
        let f = fixture().await;
        let list = TodoList::new("Chores", "alice");
        f.local().lists.insert(&list).await.unwrap();
        f.remote.put_list(&list).await.unwrap();
        let task = Task::new(list.id, "Dishes", 0).with_last_modified(100);
        f.local().tasks.insert(&task).await.unwrap();

        let mut newer = task.clone().with_last_modified(400);
        newer.title = "Dishes and pans".to_string();
        newer.is_completed = true;
        f.remote.put_task(&newer).await.unwrap();

        let report = f.orchestrator.sync("alice").await;
        assert_eq!(
            report.tasks,
            KindReport {
                updated: 1,
                ..KindReport::default()
            }
        );
        assert_eq!(report.lists.changes(), 0);
        assert_eq!(f.local().tasks.get_by_id(task.id).await.unwrap(), Some(newer));
    }

    #[tokio::test]
    async fn test_task_passes_of_several_lists_run_together() {
        let f = fixture().await;
        let home = TodoList::new("Home", "alice");
        let work = TodoList::new("Work", "alice");
        for list in [&home, &work] {
            f.local().lists.insert(list).await.unwrap();
            f.remote.put_list(list).await.unwrap();
        }

        // Home: local edit is newer, plus a task only this device has.
        let edited = Task::new(home.id, "Laundry", 0).with_last_modified(300);
        f.local().tasks.insert(&edited).await.unwrap();
        f.remote
            .put_task(&edited.clone().with_last_modified(100))
            .await
            .unwrap();
        let fresh = Task::new(home.id, "Vacuum", 1);
        f.local().tasks.insert(&fresh).await.unwrap();

        // Work: the remote side is ahead.
        let stale = Task::new(work.id, "Report", 0).with_last_modified(100);
        f.local().tasks.insert(&stale).await.unwrap();
        let mut done = stale.clone().with_last_modified(500);
        done.is_completed = true;
        f.remote.put_task(&done).await.unwrap();
        let gone = Task::new(work.id, "Standup", 1).with_last_modified(100);
        f.local().tasks.insert(&gone).await.unwrap();
        f.remote
            .put_task(&gone.clone().with_last_modified(now_millis()).deleted())
            .await
            .unwrap();
        let incoming = Task::new(work.id, "Review", 2);
        f.remote.put_task(&incoming).await.unwrap();

        let report = f.orchestrator.sync("alice").await;
        assert_eq!(
            report.tasks,
            KindReport {
                inserted: 1,
                updated: 1,
                deleted: 1,
                pushed: 2,
                ..KindReport::default()
            }
        );
        assert_eq!(report.lists.changes(), 0);
        assert_eq!(report.failed(), 0);

        let remote_home = f.remote.fetch_tasks(home.id).await;
        assert_eq!(remote_home.len(), 2);
        assert!(remote_home.contains(&edited));
        assert_eq!(f.local().tasks.get_by_id(stale.id).await.unwrap(), Some(done));
        assert!(f.local().tasks.get_by_id(gone.id).await.unwrap().is_none());
        assert_eq!(
            f.local().tasks.get_by_id(incoming.id).await.unwrap(),
            Some(incoming)
        );
    }

    #[tokio::test]
    async fn test_concurrent_runs_for_same_owner_share_one_run() {
        let f = fixture().await;
        f.local()
            .lists
            .insert(&TodoList::new("Groceries", "alice"))
            .await
            .unwrap();

        let (a, b) = tokio::join!(
            f.orchestrator.sync("alice"),
            f.orchestrator.sync("alice")
        );
        assert_eq!(a, b);
        assert_eq!(f.remote_store.fetch_count(LISTS_COLLECTION).await, 1);

        // Once finished, a new request starts a fresh run.
        f.orchestrator.sync("alice").await;
        assert_eq!(f.remote_store.fetch_count(LISTS_COLLECTION).await, 2);
    }

    #[tokio::test]
    async fn test_write_failure_is_contained() {
        let f = fixture().await;
        let failing = TodoList::new("Failing", "alice");
        let fine = TodoList::new("Fine", "alice");
        f.local().lists.insert(&failing).await.unwrap();
        f.local().lists.insert(&fine).await.unwrap();
        f.local()
            .shops
            .insert(&Shop::new("Market", "alice", 0))
            .await
            .unwrap();
        f.remote_store.fail_writes_for(&failing.id.to_string()).await;

        let report = f.orchestrator.sync("alice").await;
        assert_eq!(report.lists.pushed, 1);
        assert_eq!(report.lists.failed, 1);
        assert_eq!(report.shops.pushed, 1);

        // The next run picks the failed record up again.
        f.remote_store.clear_failures().await;
        let retry = f.orchestrator.sync("alice").await;
        assert_eq!(retry.lists.pushed, 1);
        assert_eq!(retry.failed(), 0);
    }

    #[tokio::test]
    async fn test_fetch_failure_skips_the_kind() {
        let f = fixture().await;
        let list = TodoList::new("Groceries", "alice").with_last_modified(100);
        f.local().lists.insert(&list).await.unwrap();
        f.remote
            .put_list(&list.clone().with_last_modified(300).deleted())
            .await
            .unwrap();
        f.local()
            .shops
            .insert(&Shop::new("Market", "alice", 0))
            .await
            .unwrap();
        f.remote_store.fail_fetches(LISTS_COLLECTION).await;
        let writes = f.remote_store.write_count();

        let report = f.orchestrator.sync("alice").await;
        assert_eq!(report.lists, KindReport { unreachable: 1, ..KindReport::default() });
        assert_eq!(report.shops.pushed, 1);
        assert_eq!(report.unreachable(), 1);
        assert_eq!(f.remote_store.write_count(), writes + 1);

        // The newer remote tombstone survives and wins once reachable.
        f.remote_store.clear_failures().await;
        let remote = f.remote.fetch_lists("alice").await;
        assert_eq!(remote.len(), 1);
        assert!(remote[0].is_deleted);
        assert_eq!(remote[0].last_modified, 300);

        let retry = f.orchestrator.sync("alice").await;
        assert_eq!(retry.lists.deleted, 1);
        assert_eq!(retry.lists.pushed, 0);
        assert!(f.local().lists.get_by_id(list.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_task_fetch_failure_leaves_remote_tasks_alone() {
        let f = fixture().await;
        let list = TodoList::new("Chores", "alice");
        f.local().lists.insert(&list).await.unwrap();
        f.remote.put_list(&list).await.unwrap();
        let stale = Task::new(list.id, "Dishes", 0).with_last_modified(100);
        f.local().tasks.insert(&stale).await.unwrap();
        let mut newer = stale.clone().with_last_modified(200);
        newer.is_completed = true;
        f.remote.put_task(&newer).await.unwrap();
        f.remote_store.fail_fetches(TASKS_COLLECTION).await;

        let report = f.orchestrator.sync("alice").await;
        assert_eq!(report.tasks.unreachable, 1);
        assert_eq!(report.tasks.pushed, 0);

        f.remote_store.clear_failures().await;
        assert_eq!(f.remote.fetch_tasks(list.id).await, vec![newer]);
    }

    #[tokio::test]
    async fn test_confirmed_local_tombstone_is_purged() {
        let f = fixture().await;
        let list = TodoList::new("Old", "alice").deleted();
        f.local().lists.insert(&list).await.unwrap();

        let first = f.orchestrator.sync("alice").await;
        assert_eq!(first.lists.pushed, 1);
        assert!(f.local().lists.get_by_id(list.id).await.unwrap().is_some());

        let second = f.orchestrator.sync("alice").await;
        assert_eq!(second.lists.purged, 1);
        assert!(f.local().lists.get_by_id(list.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_remote_tombstones_are_collected() {
        let f = fixture().await;
        let now = now_millis();
        let expired = TodoList::new("Expired", "alice")
            .with_last_modified(now - 40 * DAY)
            .deleted();
        let recent = TodoList::new("Recent", "alice")
            .with_last_modified(now - DAY)
            .deleted();
        let expired_shop = Shop::new("Closed", "alice", 0)
            .with_last_modified(now - 31 * DAY)
            .deleted();
        f.remote.put_list(&expired).await.unwrap();
        f.remote
            .put_task(&Task::new(expired.id, "Leftover", 0))
            .await
            .unwrap();
        f.remote.put_list(&recent).await.unwrap();
        f.remote.put_shop(&expired_shop).await.unwrap();

        let report = f.orchestrator.sync("alice").await;
        assert_eq!(report.lists.collected, 1);
        assert_eq!(report.shops.collected, 1);

        let remaining: Vec<Uuid> = f
            .remote
            .fetch_lists("alice")
            .await
            .into_iter()
            .map(|l| l.id)
            .collect();
        assert_eq!(remaining, vec![recent.id]);
        assert!(f.remote.fetch_tasks(expired.id).await.is_empty());
        assert!(f.remote.fetch_shops("alice").await.is_empty());
    }

    #[tokio::test]
    async fn test_collection_can_be_disabled() {
        let ctx = setup_store().await;
        let remote_store = MemoryRemoteStore::new();
        let remote = RemoteRepository::new(Arc::new(remote_store.clone()));
        let orchestrator = SyncOrchestrator::new(
            ctx.store.clone(),
            remote.clone(),
            SyncOptions {
                tombstone_retention_days: None,
            },
        );
        let expired = TodoList::new("Expired", "alice")
            .with_last_modified(1)
            .deleted();
        remote.put_list(&expired).await.unwrap();

        let report = orchestrator.sync("alice").await;
        assert_eq!(report.lists.collected, 0);
        assert_eq!(remote.fetch_lists("alice").await.len(), 1);
    }

    #[tokio::test]
    async fn test_migrate_remote_schema_rewrites_legacy_documents() {
        let f = fixture().await;
        let list_id = Uuid::new_v4();
        let task_id = Uuid::new_v4();
        let legacy = |value: serde_json::Value| value.as_object().cloned().unwrap();
        f.remote_store
            .seed(
                LISTS_COLLECTION,
                Document::new(
                    list_id.to_string(),
                    legacy(json!({"name": "Old", "owner": "alice", "lastModified": 10, "deleted": false})),
                ),
            )
            .await;
        f.remote_store
            .seed(
                TASKS_COLLECTION,
                Document::new(
                    task_id.to_string(),
                    legacy(json!({"listId": list_id.to_string(), "title": "t", "completed": true})),
                ),
            )
            .await;

        let report = f.orchestrator.migrate_remote_schema("alice").await.unwrap();
        assert_eq!(
            report,
            MigrationReport {
                lists: 1,
                shops: 0,
                tasks: 1
            }
        );

        let task_fields = f
            .remote_store
            .get(TASKS_COLLECTION, &task_id.to_string())
            .await
            .unwrap();
        assert!(!schema::is_legacy(&task_fields));
        assert_eq!(task_fields["isCompleted"], json!(true));

        let again = f.orchestrator.migrate_remote_schema("alice").await.unwrap();
        assert_eq!(again, MigrationReport::default());
    }
}
