use tracing::debug;
use uuid::Uuid;

use super::{is_blank, log_mirror_failure, mirror_target, ListSelection, MutationError};
use crate::db::LocalStore;
use crate::identity::IdentityProvider;
use crate::models::{move_item, rerank, Task, TodoList};
use crate::remote::RemoteRepository;

/// Applies to-do intents for the current owner.
///
/// Every task change also touches the task's list, so the list's timestamp
/// follows its most recently changed task.
#[derive(Debug, Clone)]
pub struct TodoMutator {
    store: LocalStore,
    remote: Option<RemoteRepository>,
    identity: IdentityProvider,
    selection: ListSelection,
}

impl TodoMutator {
    pub fn new(
        store: LocalStore,
        remote: Option<RemoteRepository>,
        identity: IdentityProvider,
    ) -> Self {
        Self {
            store,
            remote,
            identity,
            selection: ListSelection::new(),
        }
    }

    /// Handle to the selected list, for hosts that need to reset it.
    pub fn selection(&self) -> ListSelection {
        self.selection.clone()
    }

    fn owner(&self) -> String {
        self.identity.todo_owner()
    }

    fn mirror(&self) -> Option<&RemoteRepository> {
        mirror_target(&self.remote, &self.owner())
    }

    async fn save_list(&self, list: &TodoList) -> Result<(), MutationError> {
        self.store.lists.update(list).await?;
        if let Some(remote) = self.mirror() {
            log_mirror_failure(remote.put_list(list).await, "list", list.id);
        }
        Ok(())
    }

    async fn save_task(&self, task: &Task) -> Result<(), MutationError> {
        self.store.tasks.update(task).await?;
        if let Some(remote) = self.mirror() {
            log_mirror_failure(remote.put_task(task).await, "task", task.id);
        }
        self.touch_list(task.list_id).await
    }

    async fn save_tasks(&self, list_id: Uuid, tasks: &[Task]) -> Result<(), MutationError> {
        if !tasks.is_empty() {
            self.store.tasks.update_batch(tasks).await?;
            if let Some(remote) = self.mirror() {
                log_mirror_failure(remote.put_tasks(tasks).await, "task", list_id);
            }
        }
        self.touch_list(list_id).await
    }

    async fn touch_list(&self, list_id: Uuid) -> Result<(), MutationError> {
        if let Some(mut list) = self.store.lists.get_by_id(list_id).await? {
            list.touch();
            self.save_list(&list).await?;
        }
        Ok(())
    }

    /// Loads a task, applies `change` and saves it when `change` returns true.
    async fn edit_task<F>(&self, task_id: Uuid, change: F) -> Result<bool, MutationError>
    where
        F: FnOnce(&mut Task) -> bool + Send,
    {
        let Some(mut task) = self.store.tasks.get_by_id(task_id).await? else {
            return Ok(false);
        };
        if task.is_deleted || !change(&mut task) {
            return Ok(false);
        }
        task.touch();
        self.save_task(&task).await?;
        Ok(true)
    }

    pub async fn active_lists(&self) -> Result<Vec<TodoList>, MutationError> {
        Ok(self.store.lists.active_by_owner(&self.owner()).await?)
    }

    /// The selected list, falling back to the most recent active list when
    /// nothing valid is selected.
    pub async fn selected_list(&self) -> Result<Option<TodoList>, MutationError> {
        let lists = self.active_lists().await?;
        let selected = self.selection.get();
        let list = lists
            .iter()
            .find(|l| Some(l.id) == selected)
            .or_else(|| lists.first())
            .cloned();
        self.selection.set(list.as_ref().map(|l| l.id));
        Ok(list)
    }

    /// Selects an active list of the current owner.
    pub async fn select_list(&self, list_id: Uuid) -> Result<bool, MutationError> {
        let owner = self.owner();
        match self.store.lists.get_by_id(list_id).await? {
            Some(list) if !list.is_deleted && list.owner == owner => {
                self.selection.set(Some(list_id));
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Active tasks of the selected list, in order.
    pub async fn tasks(&self) -> Result<Vec<Task>, MutationError> {
        match self.selected_list().await? {
            Some(list) => Ok(self.store.tasks.active_for_list(list.id).await?),
            None => Ok(Vec::new()),
        }
    }

    /// Creates a list and selects it.
    pub async fn add_list(&self, name: &str) -> Result<Option<TodoList>, MutationError> {
        if is_blank(name) {
            return Ok(None);
        }
        let list = TodoList::new(name, self.owner());
        self.store.lists.insert(&list).await?;
        if let Some(remote) = self.mirror() {
            log_mirror_failure(remote.put_list(&list).await, "list", list.id);
        }
        self.selection.set(Some(list.id));
        debug!(id = %list.id, "Added list");
        Ok(Some(list))
    }

    pub async fn rename_list(&self, list_id: Uuid, name: &str) -> Result<bool, MutationError> {
        if is_blank(name) {
            return Ok(false);
        }
        let Some(mut list) = self.store.lists.get_by_id(list_id).await? else {
            return Ok(false);
        };
        if list.is_deleted {
            return Ok(false);
        }
        list.name = name.to_string();
        list.touch();
        self.save_list(&list).await?;
        Ok(true)
    }

    /// Soft-deletes a list. A selection on it moves to another active list.
    pub async fn delete_list(&self, list_id: Uuid) -> Result<bool, MutationError> {
        let Some(mut list) = self.store.lists.get_by_id(list_id).await? else {
            return Ok(false);
        };
        if list.is_deleted {
            return Ok(false);
        }

        if self.selection.get() == Some(list_id) {
            let next = self
                .active_lists()
                .await?
                .into_iter()
                .find(|l| l.id != list_id)
                .map(|l| l.id);
            self.selection.set(next);
        }

        list.is_deleted = true;
        list.touch();
        self.save_list(&list).await?;
        debug!(id = %list_id, "Deleted list");
        Ok(true)
    }

    /// Appends a task to the selected list.
    pub async fn add_task(&self, title: &str) -> Result<Option<Task>, MutationError> {
        if is_blank(title) {
            return Ok(None);
        }
        let Some(list) = self.selected_list().await? else {
            return Ok(None);
        };

        let order = self.store.tasks.count_active_for_list(list.id).await?;
        let task = Task::new(list.id, title, order);
        self.store.tasks.insert(&task).await?;
        if let Some(remote) = self.mirror() {
            log_mirror_failure(remote.put_task(&task).await, "task", task.id);
        }
        self.touch_list(list.id).await?;
        Ok(Some(task))
    }

    pub async fn rename_task(&self, task_id: Uuid, title: &str) -> Result<bool, MutationError> {
        if is_blank(title) {
            return Ok(false);
        }
        let title = title.to_string();
        self.edit_task(task_id, move |task| {
            task.title = title;
            true
        })
        .await
    }

    /// Soft-deletes a task and closes the gap in its list's ranking.
    pub async fn delete_task(&self, task_id: Uuid) -> Result<bool, MutationError> {
        let Some(mut task) = self.store.tasks.get_by_id(task_id).await? else {
            return Ok(false);
        };
        if task.is_deleted {
            return Ok(false);
        }
        task.is_deleted = true;
        task.touch();
        self.store.tasks.update(&task).await?;
        if let Some(remote) = self.mirror() {
            log_mirror_failure(remote.put_task(&task).await, "task", task.id);
        }

        let mut siblings = self.store.tasks.active_for_list(task.list_id).await?;
        let changed: Vec<Task> = rerank(&mut siblings)
            .into_iter()
            .map(|index| {
                let mut sibling = siblings[index].clone();
                sibling.touch();
                sibling
            })
            .collect();
        self.save_tasks(task.list_id, &changed).await?;
        Ok(true)
    }

    /// Moves a task of the selected list from one position to another.
    pub async fn move_task(&self, from: usize, to: usize) -> Result<bool, MutationError> {
        let Some(list) = self.selected_list().await? else {
            return Ok(false);
        };
        let mut tasks = self.store.tasks.active_for_list(list.id).await?;
        if from == to || !move_item(&mut tasks, from, to) {
            return Ok(false);
        }
        for task in &mut tasks {
            task.touch();
        }
        self.save_tasks(list.id, &tasks).await?;
        Ok(true)
    }

    pub async fn toggle_task_expanded(&self, task_id: Uuid) -> Result<bool, MutationError> {
        self.edit_task(task_id, |task| {
            task.is_expanded = !task.is_expanded;
            true
        })
        .await
    }

    /// Sets a task's completion together with all of its subtasks.
    pub async fn set_task_completed(
        &self,
        task_id: Uuid,
        completed: bool,
    ) -> Result<bool, MutationError> {
        self.edit_task(task_id, |task| {
            task.set_completed(completed);
            true
        })
        .await
    }

    /// Adds a subtask; the parent task becomes incomplete.
    pub async fn add_subtask(&self, task_id: Uuid, title: &str) -> Result<bool, MutationError> {
        if is_blank(title) {
            return Ok(false);
        }
        let title = title.to_string();
        self.edit_task(task_id, move |task| {
            task.add_subtask(title);
            true
        })
        .await
    }

    pub async fn rename_subtask(
        &self,
        task_id: Uuid,
        subtask_id: Uuid,
        title: &str,
    ) -> Result<bool, MutationError> {
        if is_blank(title) {
            return Ok(false);
        }
        let title = title.to_string();
        self.edit_task(task_id, move |task| task.rename_subtask(subtask_id, title))
            .await
    }

    pub async fn delete_subtask(&self, task_id: Uuid, subtask_id: Uuid) -> Result<bool, MutationError> {
        self.edit_task(task_id, |task| task.remove_subtask(subtask_id))
            .await
    }

    pub async fn set_subtask_completed(
        &self,
        task_id: Uuid,
        subtask_id: Uuid,
        completed: bool,
    ) -> Result<bool, MutationError> {
        self.edit_task(task_id, |task| {
            task.set_subtask_completed(subtask_id, completed)
        })
        .await
    }
}
