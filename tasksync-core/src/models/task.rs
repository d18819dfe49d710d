use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::{next_timestamp, now_millis, Ranked, Syncable};

/// A checklist entry owned by exactly one [`Task`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubTask {
    pub id: Uuid,
    pub title: String,
    pub is_completed: bool,
}

impl SubTask {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            is_completed: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: Uuid,
    pub list_id: Uuid,
    pub title: String,
    pub subtasks: Vec<SubTask>,
    pub is_expanded: bool,
    pub is_completed: bool,
    /// Dense 0-based position among the active tasks of the list.
    pub in_list_order: u32,
    pub last_modified: i64,
    pub is_deleted: bool,
}

impl Task {
    pub fn new(list_id: Uuid, title: impl Into<String>, in_list_order: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            list_id,
            title: title.into(),
            subtasks: Vec::new(),
            is_expanded: false,
            is_completed: false,
            in_list_order,
            last_modified: now_millis(),
            is_deleted: false,
        }
    }

    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }

    pub fn with_subtasks(mut self, subtasks: Vec<SubTask>) -> Self {
        self.subtasks = subtasks;
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

    pub fn touch(&mut self) {
        self.last_modified = next_timestamp(self.last_modified);
    }

    /// Marks the task and every subtask as completed (or not).
    pub fn set_completed(&mut self, completed: bool) {
        self.is_completed = completed;
        for subtask in &mut self.subtasks {
            subtask.is_completed = completed;
        }
    }

    /// Updates one subtask and re-derives the task's completion.
    ///
    /// Returns `false` when no subtask has the given id.
    pub fn set_subtask_completed(&mut self, subtask_id: Uuid, completed: bool) -> bool {
        let Some(subtask) = self.subtasks.iter_mut().find(|s| s.id == subtask_id) else {
            return false;
        };
        subtask.is_completed = completed;
        self.recompute_completion();
        true
    }

    /// Appends a new, incomplete subtask; the task is no longer complete.
    pub fn add_subtask(&mut self, title: impl Into<String>) -> Uuid {
        let subtask = SubTask::new(title);
        let id = subtask.id;
        self.subtasks.push(subtask);
        self.is_completed = false;
        id
    }

    pub fn remove_subtask(&mut self, subtask_id: Uuid) -> bool {
        let before = self.subtasks.len();
        self.subtasks.retain(|s| s.id != subtask_id);
        if self.subtasks.len() == before {
            return false;
        }
        self.recompute_completion();
        true
    }

    pub fn rename_subtask(&mut self, subtask_id: Uuid, title: impl Into<String>) -> bool {
        match self.subtasks.iter_mut().find(|s| s.id == subtask_id) {
            Some(subtask) => {
                subtask.title = title.into();
                true
            }
            None => false,
        }
    }

    /// A task is complete iff it has subtasks and all of them are complete.
    fn recompute_completion(&mut self) {
        self.is_completed =
            !self.subtasks.is_empty() && self.subtasks.iter().all(|s| s.is_completed);
    }
}

impl Ranked for Task {
    fn rank(&self) -> u32 {
        self.in_list_order
    }

    fn set_rank(&mut self, rank: u32) {
        self.in_list_order = rank;
    }
}

impl Syncable for Task {
    const KIND: &'static str = "task";

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
        None
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let check = if self.is_completed { "[x]" } else { "[ ]" };
        write!(f, "{} {}", check, self.title)?;
        for subtask in &self.subtasks {
            let check = if subtask.is_completed { "[x]" } else { "[ ]" };
            write!(f, "\n    {} {}", check, subtask.title)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task_with_subtasks(titles: &[&str]) -> Task {
        let subtasks = titles.iter().map(|t| SubTask::new(*t)).collect();
        Task::new(Uuid::new_v4(), "Weekly shop", 0).with_subtasks(subtasks)
    }

    #[test]
    fn test_set_completed_propagates_to_subtasks() {
        let mut task = task_with_subtasks(&["milk", "eggs"]);
        task.set_completed(true);
        assert!(task.is_completed);
        assert!(task.subtasks.iter().all(|s| s.is_completed));

        task.set_completed(false);
        assert!(task.subtasks.iter().all(|s| !s.is_completed));
    }

    #[test]
    fn test_subtask_completion_derives_parent() {
        let mut task = task_with_subtasks(&["milk", "eggs"]);
        let first = task.subtasks[0].id;
        let second = task.subtasks[1].id;

        assert!(task.set_subtask_completed(first, true));
        assert!(!task.is_completed);

        assert!(task.set_subtask_completed(second, true));
        assert!(task.is_completed);

        assert!(task.set_subtask_completed(second, false));
        assert!(!task.is_completed);
    }

    #[test]
    fn test_unknown_subtask_is_ignored() {
        let mut task = task_with_subtasks(&["milk"]);
        assert!(!task.set_subtask_completed(Uuid::new_v4(), true));
        assert!(!task.remove_subtask(Uuid::new_v4()));
        assert!(!task.is_completed);
    }

    #[test]
    fn test_add_subtask_reopens_task() {
        let mut task = task_with_subtasks(&["milk"]);
        task.set_completed(true);
        task.add_subtask("bread");
        assert!(!task.is_completed);
        assert_eq!(task.subtasks.len(), 2);
    }

    #[test]
    fn test_removing_last_subtask_leaves_task_incomplete() {
        let mut task = task_with_subtasks(&["milk"]);
        task.set_completed(true);
        let id = task.subtasks[0].id;
        assert!(task.remove_subtask(id));
        assert!(task.subtasks.is_empty());
        assert!(!task.is_completed);
    }

    #[test]
    fn test_display_renders_checkboxes() {
        let mut task = task_with_subtasks(&["milk"]);
        task.set_completed(true);
        let output = format!("{}", task);
        assert!(output.starts_with("[x] Weekly shop"));
        assert!(output.contains("    [x] milk"));
    }
}
