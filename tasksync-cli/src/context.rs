//! Wiring of stores, identity, mutators and sync for one CLI invocation.

use std::sync::Arc;

use tracing::debug;

use tasksync_core::{
    HttpRemoteStore, IdentityProvider, LocalStore, RemoteRepository, ShoppingMutator,
    SyncOptions, SyncOrchestrator, SyncTrigger, TodoMutator,
};

use crate::commands::CommandError;
use crate::config::Config;
use crate::session::Session;

pub struct AppContext {
    pub config: Config,
    pub session: Session,
    pub store: LocalStore,
    pub identity: IdentityProvider,
    pub todo: TodoMutator,
    pub shopping: ShoppingMutator,
    /// Present only when a sync server is configured
    pub orchestrator: Option<Arc<SyncOrchestrator>>,
    pub trigger: Option<SyncTrigger>,
}

impl AppContext {
    pub async fn open(config: Config) -> Result<Self, CommandError> {
        let store = LocalStore::open(&config.database_path.value).await?;
        let session = Session::load(&config.data_dir.value)?;
        debug!(
            database = %config.database_path.value.display(),
            user = ?session.user_id,
            "Opened local store"
        );

        let identity = match &session.user_id {
            Some(user) => IdentityProvider::signed_in(user.clone())?,
            None => IdentityProvider::signed_out(),
        };

        let remote = match (&config.sync.server_url, &config.sync.api_key) {
            (Some(url), Some(key)) => Some(RemoteRepository::new(Arc::new(
                HttpRemoteStore::new(url.clone(), key.clone()),
            ))),
            _ => None,
        };

        let todo = TodoMutator::new(store.clone(), remote.clone(), identity.clone());
        todo.selection().set(session.selected_list);
        let shopping = ShoppingMutator::new(store.clone(), remote.clone(), identity.clone());

        let orchestrator = remote.map(|remote| {
            SyncOrchestrator::new(
                store.clone(),
                remote,
                SyncOptions {
                    tombstone_retention_days: config.sync.tombstone_retention_days,
                },
            )
        });
        let trigger = orchestrator.as_ref().map(|orchestrator| {
            SyncTrigger::new(Arc::clone(orchestrator), identity.clone())
                .with_selection(todo.selection())
        });

        Ok(Self {
            config,
            session,
            store,
            identity,
            todo,
            shopping,
            orchestrator,
            trigger,
        })
    }

    /// Writes the signed-in user and the current selection back to disk.
    pub fn save_session(&mut self) -> Result<(), CommandError> {
        self.session.user_id = self.identity.current_user();
        self.session.selected_list = self.todo.selection().get();
        self.session.save(&self.config.data_dir.value)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn load_config(temp_dir: &TempDir) -> Config {
        let config_path = temp_dir.path().join("config.yaml");
        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "database_path: tasks.db").unwrap();
        writeln!(file, "data_dir: state").unwrap();
        Config::load(Some(config_path)).unwrap()
    }

    #[tokio::test]
    async fn test_session_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();

        let mut ctx = AppContext::open(load_config(&temp_dir)).await.unwrap();
        assert!(ctx.orchestrator.is_none());
        ctx.identity.sign_in("alice").unwrap();
        let list = ctx.todo.add_list("Groceries").await.unwrap().unwrap();
        ctx.save_session().unwrap();

        let ctx = AppContext::open(load_config(&temp_dir)).await.unwrap();
        assert_eq!(ctx.identity.current_user(), Some("alice".to_string()));
        assert_eq!(ctx.todo.selection().get(), Some(list.id));
        assert_eq!(ctx.todo.selected_list().await.unwrap().unwrap().name, "Groceries");
    }

    #[tokio::test]
    async fn test_sync_wiring_follows_config() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = load_config(&temp_dir);
        config.sync.server_url = Some("http://127.0.0.1:9".to_string());
        config.sync.api_key = Some("key".to_string());

        let ctx = AppContext::open(config).await.unwrap();
        assert!(ctx.orchestrator.is_some());
        assert!(ctx.trigger.is_some());
    }
}
