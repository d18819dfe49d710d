//! Identity provider: who owns the data being edited and synced.
//!
//! When nobody is signed in, each feature works against a fixed local-only
//! owner that is never synchronized:
//! - to-do lists and tasks use [`LOCAL_TODO_OWNER`]
//! - shopping collections use [`LOCAL_SHOPPING_OWNER`]
//!
//! Changes to the signed-in user are published through explicit
//! [`Subscription`]s; there is no ambient listener registry.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::watch;

/// Owner of to-do lists created while signed out.
pub const LOCAL_TODO_OWNER: &str = "default_user";
/// Owner of shopping collections created while signed out.
pub const LOCAL_SHOPPING_OWNER: &str = "default_shopping_user";

/// Returns true for the local-only sentinel owners.
pub fn is_local_owner(owner: &str) -> bool {
    owner == LOCAL_TODO_OWNER || owner == LOCAL_SHOPPING_OWNER
}

#[derive(Debug, Error, PartialEq)]
pub enum IdentityError {
    #[error("user id must not be blank")]
    BlankUserId,
    #[error("user id '{0}' is reserved for local-only data")]
    ReservedUserId(String),
}

/// Source of the current owner id with change notifications.
///
/// Cloning is cheap; all clones share the same state.
#[derive(Debug, Clone)]
pub struct IdentityProvider {
    sender: Arc<watch::Sender<Option<String>>>,
}

impl IdentityProvider {
    /// Creates a provider with nobody signed in.
    pub fn signed_out() -> Self {
        let (sender, _) = watch::channel(None);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Creates a provider with `user_id` already signed in.
    pub fn signed_in(user_id: impl Into<String>) -> Result<Self, IdentityError> {
        let provider = Self::signed_out();
        provider.sign_in(user_id)?;
        Ok(provider)
    }

    /// The signed-in user id, if any.
    pub fn current_user(&self) -> Option<String> {
        self.sender.borrow().clone()
    }

    /// Owner id for to-do lists and tasks.
    pub fn todo_owner(&self) -> String {
        self.current_user()
            .unwrap_or_else(|| LOCAL_TODO_OWNER.to_string())
    }

    /// Owner id for shopping collections.
    pub fn shopping_owner(&self) -> String {
        self.current_user()
            .unwrap_or_else(|| LOCAL_SHOPPING_OWNER.to_string())
    }

    pub fn sign_in(&self, user_id: impl Into<String>) -> Result<(), IdentityError> {
        let user_id = user_id.into();
        if user_id.trim().is_empty() {
            return Err(IdentityError::BlankUserId);
        }
        if is_local_owner(&user_id) {
            return Err(IdentityError::ReservedUserId(user_id));
        }
        self.publish(Some(user_id));
        Ok(())
    }

    pub fn sign_out(&self) {
        self.publish(None);
    }

    /// Starts observing owner changes. Drop the handle (or call
    /// [`Subscription::unsubscribe`]) to stop.
    pub fn subscribe(&self) -> Subscription {
        Subscription {
            receiver: self.sender.subscribe(),
        }
    }

    /// Notifies subscribers only when the value actually changes.
    fn publish(&self, user: Option<String>) {
        self.sender.send_if_modified(|current| {
            if *current == user {
                false
            } else {
                *current = user;
                true
            }
        });
    }
}

/// Handle to a stream of signed-in user changes.
#[derive(Debug)]
pub struct Subscription {
    receiver: watch::Receiver<Option<String>>,
}

impl Subscription {
    /// Waits for the next change and returns the new signed-in user.
    ///
    /// Returns `None` once every provider clone has been dropped.
    pub async fn changed(&mut self) -> Option<Option<String>> {
        self.receiver.changed().await.ok()?;
        Some(self.receiver.borrow_and_update().clone())
    }

    /// The signed-in user as last observed by this subscription.
    pub fn current(&self) -> Option<String> {
        self.receiver.borrow().clone()
    }

    pub fn unsubscribe(self) {}
}
