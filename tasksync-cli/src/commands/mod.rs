mod auth;
mod config_cmd;
mod list;
mod shop;
mod sync_cmd;
mod task;

pub use auth::AuthCommand;
pub use config_cmd::ConfigCommand;
pub use list::ListCommand;
pub use shop::ShopCommand;
pub use sync_cmd::SyncCommand;
pub use task::TaskCommand;

use clap::ValueEnum;
use tasksync_core::{IdentityError, MutationError, RemoteError, StoreError};

use crate::session::SessionError;

#[derive(Clone, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Errors from CLI commands
#[derive(Debug)]
pub enum CommandError {
    Store(StoreError),
    Mutation(MutationError),
    Remote(RemoteError),
    Identity(IdentityError),
    Session(SessionError),
    Io(std::io::Error),
    Json(serde_json::Error),
    /// A 1-based position that does not name an entry in the listing
    NoSuchEntry { kind: &'static str, position: usize },
    NoListSelected,
    SyncNotConfigured,
    NotSignedIn,
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandError::Store(e) => write!(f, "{}", e),
            CommandError::Mutation(e) => write!(f, "{}", e),
            CommandError::Remote(e) => write!(f, "{}", e),
            CommandError::Identity(e) => write!(f, "{}", e),
            CommandError::Session(e) => write!(f, "{}", e),
            CommandError::Io(e) => write!(f, "I/O error: {}", e),
            CommandError::Json(e) => write!(f, "JSON error: {}", e),
            CommandError::NoSuchEntry { kind, position } => {
                write!(f, "No {} at position {}", kind, position)
            }
            CommandError::NoListSelected => {
                write!(f, "No list selected. Run 'tasks list add <name>' first.")
            }
            CommandError::SyncNotConfigured => write!(
                f,
                "Sync server not configured. Set sync.server_url and sync.api_key in config."
            ),
            CommandError::NotSignedIn => {
                write!(f, "Not signed in. Run 'tasks auth sign-in <user>' first.")
            }
        }
    }
}

impl std::error::Error for CommandError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CommandError::Store(e) => Some(e),
            CommandError::Mutation(e) => Some(e),
            CommandError::Remote(e) => Some(e),
            CommandError::Identity(e) => Some(e),
            CommandError::Session(e) => Some(e),
            CommandError::Io(e) => Some(e),
            CommandError::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreError> for CommandError {
    fn from(e: StoreError) -> Self {
        CommandError::Store(e)
    }
}

impl From<MutationError> for CommandError {
    fn from(e: MutationError) -> Self {
        CommandError::Mutation(e)
    }
}

impl From<RemoteError> for CommandError {
    fn from(e: RemoteError) -> Self {
        CommandError::Remote(e)
    }
}

impl From<IdentityError> for CommandError {
    fn from(e: IdentityError) -> Self {
        CommandError::Identity(e)
    }
}

impl From<SessionError> for CommandError {
    fn from(e: SessionError) -> Self {
        CommandError::Session(e)
    }
}

impl From<std::io::Error> for CommandError {
    fn from(e: std::io::Error) -> Self {
        CommandError::Io(e)
    }
}

impl From<serde_json::Error> for CommandError {
    fn from(e: serde_json::Error) -> Self {
        CommandError::Json(e)
    }
}

/// Looks up a 1-based position from a listing.
fn pick<'a, T>(items: &'a [T], kind: &'static str, position: usize) -> Result<&'a T, CommandError> {
    position
        .checked_sub(1)
        .and_then(|index| items.get(index))
        .ok_or(CommandError::NoSuchEntry { kind, position })
}

/// Converts a 1-based position to an index without bounds checking.
fn index(kind: &'static str, position: usize) -> Result<usize, CommandError> {
    position
        .checked_sub(1)
        .ok_or(CommandError::NoSuchEntry { kind, position })
}

/// Prints the outcome of an intent that may be a silent no-op.
fn report(changed: bool, done: &str) {
    if changed {
        println!("{}", done);
    } else {
        println!("Nothing changed.");
    }
}
