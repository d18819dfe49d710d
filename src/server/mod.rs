//! Server-side modules for the tasksync document server.

pub mod routes;
pub mod storage;

pub use routes::{router, ApiKeyStore, AppState, AuthUser};
pub use storage::{DocumentStore, DocumentStoreError};
