//! When to sync.
//!
//! The host reports lifecycle events; each one syncs the signed-in owner.
//! Owner changes reported by the identity provider reset the selected list
//! (it may belong to the previous owner) and sync the new owner.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::orchestrator::{SyncOrchestrator, SyncReport};
use crate::identity::{is_local_owner, IdentityProvider};
use crate::mutation::ListSelection;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    Started,
    /// The host is going away; the returned future completes only once all
    /// writes of the run have finished.
    Stopped,
    Resumed,
}

#[derive(Debug, Clone)]
pub struct SyncTrigger {
    orchestrator: Arc<SyncOrchestrator>,
    identity: IdentityProvider,
    selection: Option<ListSelection>,
}

impl SyncTrigger {
    pub fn new(orchestrator: Arc<SyncOrchestrator>, identity: IdentityProvider) -> Self {
        Self {
            orchestrator,
            identity,
            selection: None,
        }
    }

    /// Selection to clear whenever the owner changes.
    pub fn with_selection(mut self, selection: ListSelection) -> Self {
        self.selection = Some(selection);
        self
    }

    /// Syncs the signed-in owner. Returns `None` when signed out.
    pub async fn on_lifecycle(&self, event: LifecycleEvent) -> Option<SyncReport> {
        let owner = self.identity.todo_owner();
        if is_local_owner(&owner) {
            debug!(?event, "Signed out, not syncing");
            return None;
        }
        info!(?event, owner, "Lifecycle sync");
        Some(self.orchestrator.sync(&owner).await)
    }

    /// Resets the selection and syncs the new owner, if any.
    pub async fn on_owner_changed(&self, user: Option<String>) -> Option<SyncReport> {
        if let Some(selection) = &self.selection {
            selection.clear();
        }
        match user {
            Some(owner) if !is_local_owner(&owner) => {
                info!(owner, "Owner changed, syncing");
                Some(self.orchestrator.sync(&owner).await)
            }
            _ => {
                debug!("Signed out, selection reset");
                None
            }
        }
    }

    /// Reacts to identity changes in the background until the handle is
    /// aborted or every identity provider is dropped.
    pub fn spawn_identity_watch(&self) -> JoinHandle<()> {
        let mut subscription = self.identity.subscribe();
        let trigger = self.clone();
        tokio::spawn(async move {
            while let Some(user) = subscription.changed().await {
                trigger.on_owner_changed(user).await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::setup_store;
    use crate::models::TodoList;
    use crate::remote::schema::LISTS_COLLECTION;
    use crate::remote::{MemoryRemoteStore, RemoteRepository};
    use crate::sync::SyncOptions;
    use std::time::Duration;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_lifecycle_syncs_only_when_signed_in() {
        let ctx = setup_store().await;
        let remote_store = MemoryRemoteStore::new();
        let remote = RemoteRepository::new(Arc::new(remote_store.clone()));
        let orchestrator = SyncOrchestrator::new(ctx.store.clone(), remote, SyncOptions::default());
        let identity = IdentityProvider::signed_out();
        let trigger = SyncTrigger::new(orchestrator, identity.clone());

        assert!(trigger.on_lifecycle(LifecycleEvent::Started).await.is_none());
        assert_eq!(remote_store.fetch_count(LISTS_COLLECTION).await, 0);

        identity.sign_in("alice").unwrap();
        ctx.store
            .lists
            .insert(&TodoList::new("Groceries", "alice"))
            .await
            .unwrap();
        let report = trigger.on_lifecycle(LifecycleEvent::Stopped).await.unwrap();
        assert_eq!(report.lists.pushed, 1);
    }

    #[tokio::test]
    async fn test_owner_change_resets_selection() {
        let ctx = setup_store().await;
        let remote_store = MemoryRemoteStore::new();
        let remote = RemoteRepository::new(Arc::new(remote_store.clone()));
        let orchestrator = SyncOrchestrator::new(ctx.store.clone(), remote, SyncOptions::default());
        let selection = ListSelection::new();
        let trigger = SyncTrigger::new(orchestrator, IdentityProvider::signed_out())
            .with_selection(selection.clone());

        selection.set(Some(Uuid::new_v4()));
        assert!(trigger.on_owner_changed(None).await.is_none());
        assert_eq!(selection.get(), None);

        selection.set(Some(Uuid::new_v4()));
        let report = trigger.on_owner_changed(Some("bob".to_string())).await;
        assert_eq!(report.map(|r| r.owner), Some("bob".to_string()));
        assert_eq!(selection.get(), None);
    }

    #[tokio::test]
    async fn test_identity_watch_syncs_new_owner() {
        let ctx = setup_store().await;
        let remote_store = MemoryRemoteStore::new();
        let remote = RemoteRepository::new(Arc::new(remote_store.clone()));
        let orchestrator = SyncOrchestrator::new(ctx.store.clone(), remote, SyncOptions::default());
        let identity = IdentityProvider::signed_out();
        let trigger = SyncTrigger::new(orchestrator, identity.clone());

        let handle = trigger.spawn_identity_watch();
        identity.sign_in("alice").unwrap();

        let synced = tokio::time::timeout(Duration::from_secs(5), async {
            while remote_store.fetch_count(LISTS_COLLECTION).await == 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        handle.abort();
        assert!(synced.is_ok());
    }
}
