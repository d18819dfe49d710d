use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::{next_timestamp, now_millis, Syncable};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TodoList {
    pub id: Uuid,
    pub name: String,
    pub owner: String,
    /// Epoch milliseconds of the last change to the list or any of its tasks.
    pub last_modified: i64,
    pub is_deleted: bool,
}

impl TodoList {
    pub fn new(name: impl Into<String>, owner: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            owner: owner.into(),
            last_modified: now_millis(),
            is_deleted: false,
        }
    }

    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }

    pub fn with_last_modified(mut self, last_modified: i64) -> Self {
        self.last_modified = last_modified;
        self
    }

    pub fn deleted(mut self) -> Self {
        self.is_deleted = true;
        self
    }

    /// Bumps `last_modified` after a change to the list or one of its tasks.
    pub fn touch(&mut self) {
        self.last_modified = next_timestamp(self.last_modified);
    }
}

impl Syncable for TodoList {
    const KIND: &'static str = "list";

    fn id(&self) -> Uuid {
        self.id
    }

    fn last_modified(&self) -> i64 {
        self.last_modified
    }

    fn is_deleted(&self) -> bool {
        self.is_deleted
    }

    fn owner(&self) -> Option<&str> {
        Some(&self.owner)
    }
}

impl fmt::Display for TodoList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if self.is_deleted {
            write!(f, " (deleted)")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_todo_list_new() {
        let list = TodoList::new("Groceries", "user1");
        assert_eq!(list.name, "Groceries");
        assert_eq!(list.owner, "user1");
        assert!(!list.is_deleted);
        assert!(list.last_modified > 0);
    }

    #[test]
    fn test_touch_bumps_timestamp() {
        let mut list = TodoList::new("Work", "user1").with_last_modified(100);
        list.touch();
        assert!(list.last_modified > 100);
    }

    #[test]
    fn test_display_marks_deleted() {
        let list = TodoList::new("Old", "user1").deleted();
        assert_eq!(format!("{}", list), "Old (deleted)");
    }
}
