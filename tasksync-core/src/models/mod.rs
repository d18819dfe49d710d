//! Record model shared by the local store, the remote store and the merge engine.
//!
//! Three record kinds are synchronized independently:
//! - [`TodoList`]: owns tasks through `Task::list_id`
//! - [`Task`]: carries its [`SubTask`]s inline
//! - [`Shop`]: a shopping collection carrying its [`ShoppingItem`]s inline

mod ordering;
mod shop;
mod task;
mod todo_list;

pub use ordering::{move_item, rerank, Ranked};
pub use shop::{Shop, ShoppingItem};
pub use task::{SubTask, Task};
pub use todo_list::TodoList;

use uuid::Uuid;

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Returns the timestamp a record should carry after a mutation.
///
/// The result is strictly greater than `previous`, so two mutations inside the
/// same millisecond (or across a small backwards clock step) still order.
pub fn next_timestamp(previous: i64) -> i64 {
    now_millis().max(previous.saturating_add(1))
}

/// A record that takes part in last-writer-wins reconciliation.
pub trait Syncable: Clone + Send + Sync + 'static {
    /// Record kind, used in logs and reports.
    const KIND: &'static str;

    fn id(&self) -> Uuid;

    fn last_modified(&self) -> i64;

    fn is_deleted(&self) -> bool;

    /// Owning user, when the record carries one itself.
    ///
    /// Tasks return `None`: they belong to the owner of their list.
    fn owner(&self) -> Option<&str>;
}
