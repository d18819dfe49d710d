//! TaskSync Core Library
//!
//! Offline-first to-do lists and shopping lists with last-writer-wins
//! synchronization between a local SQLite store and a remote document store.

pub mod db;
pub mod identity;
pub mod models;
pub mod mutation;
pub mod remote;
pub mod sync;

pub use db::{init_db, LocalStore, StoreError};
pub use identity::{
    is_local_owner, IdentityError, IdentityProvider, Subscription, LOCAL_SHOPPING_OWNER,
    LOCAL_TODO_OWNER,
};
pub use models::{Shop, ShoppingItem, SubTask, Syncable, Task, TodoList};
pub use mutation::{ListSelection, MutationError, ShoppingEvent, ShoppingMutator, TodoMutator};
pub use remote::{
    Document, HttpRemoteStore, MemoryRemoteStore, RemoteError, RemoteRepository, RemoteStore,
};
pub use sync::{
    KindReport, LifecycleEvent, MergeAction, MigrationReport, SyncOptions, SyncOrchestrator,
    SyncReport, SyncTrigger,
};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
