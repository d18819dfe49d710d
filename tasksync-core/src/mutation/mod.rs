//! User intents applied to the local store.
//!
//! Each intent writes the local store first; that write is what the user
//! sees. For signed-in owners the same record is then mirrored to the remote
//! store inline. Mirroring is best effort: a failure is logged and the next
//! sync run carries the change over instead.
//!
//! Invalid input (blank names, unknown ids, out-of-range positions) is
//! ignored rather than reported. Only local store failures surface as
//! [`MutationError`].

mod shopping;
mod todo;

pub use shopping::{ShoppingEvent, ShoppingMutator};
pub use todo::TodoMutator;

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::watch;
use tracing::warn;
use uuid::Uuid;

use crate::db::StoreError;
use crate::identity::is_local_owner;
use crate::remote::{RemoteError, RemoteRepository};

#[derive(Debug, Error)]
pub enum MutationError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The to-do list the user is currently working in.
///
/// Shared between the todo mutator and whoever has to reset it (the sync
/// trigger does on owner changes). Cloning shares the same selection.
#[derive(Debug, Clone)]
pub struct ListSelection {
    sender: Arc<watch::Sender<Option<Uuid>>>,
}

impl Default for ListSelection {
    fn default() -> Self {
        let (sender, _) = watch::channel(None);
        Self {
            sender: Arc::new(sender),
        }
    }
}

impl ListSelection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<Uuid> {
        *self.sender.borrow()
    }

    pub fn set(&self, list_id: Option<Uuid>) {
        self.sender.send_replace(list_id);
    }

    pub fn clear(&self) {
        self.set(None);
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Uuid>> {
        self.sender.subscribe()
    }
}

/// Remote repository to mirror writes to, unless `owner` is local-only.
fn mirror_target<'a>(remote: &'a Option<RemoteRepository>, owner: &str) -> Option<&'a RemoteRepository> {
    if is_local_owner(owner) {
        None
    } else {
        remote.as_ref()
    }
}

fn log_mirror_failure(result: Result<(), RemoteError>, kind: &'static str, id: Uuid) {
    if let Err(e) = result {
        warn!(kind, %id, error = %e, "Remote mirror failed, next sync will retry");
    }
}

fn is_blank(text: &str) -> bool {
    text.trim().is_empty()
}
