use sqlx::{SqliteExecutor, SqlitePool};
use uuid::Uuid;

use super::{parse_id, StoreError};
use crate::models::{SubTask, Task};

#[derive(Debug, Clone)]
pub struct TaskRepository {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct TaskRow {
    id: String,
    list_id: String,
    title: String,
    subtasks: String,
    is_expanded: bool,
    is_completed: bool,
    in_list_order: i64,
    last_modified: i64,
    is_deleted: bool,
}

impl TryFrom<TaskRow> for Task {
    type Error = StoreError;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        let subtasks: Vec<SubTask> =
            serde_json::from_str(&row.subtasks).map_err(|source| StoreError::CorruptColumn {
                id: row.id.clone(),
                column: "subtasks",
                source,
            })?;

        Ok(Task {
            id: parse_id(&row.id, "tasks")?,
            list_id: parse_id(&row.list_id, "tasks")?,
            title: row.title,
            subtasks,
            is_expanded: row.is_expanded,
            is_completed: row.is_completed,
            in_list_order: row.in_list_order.max(0) as u32,
            last_modified: row.last_modified,
            is_deleted: row.is_deleted,
        })
    }
}

fn hydrate(rows: Vec<TaskRow>) -> Result<Vec<Task>, StoreError> {
    rows.into_iter().map(Task::try_from).collect()
}

fn encode_subtasks(task: &Task) -> String {
    serde_json::to_string(&task.subtasks).unwrap_or_else(|_| "[]".to_string())
}

impl TaskRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<Task>, StoreError> {
        let row: Option<TaskRow> = sqlx::query_as("SELECT * FROM tasks WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Task::try_from).transpose()
    }

    /// Live tasks of a list in display order.
    pub async fn active_for_list(&self, list_id: Uuid) -> Result<Vec<Task>, StoreError> {
        let rows: Vec<TaskRow> = sqlx::query_as(
            "SELECT * FROM tasks WHERE list_id = ? AND is_deleted = 0 ORDER BY in_list_order ASC",
        )
        .bind(list_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        hydrate(rows)
    }

    /// Every task of a list, tombstones included (used by sync).
    pub async fn all_for_list(&self, list_id: Uuid) -> Result<Vec<Task>, StoreError> {
        let rows: Vec<TaskRow> = sqlx::query_as("SELECT * FROM tasks WHERE list_id = ?")
            .bind(list_id.to_string())
            .fetch_all(&self.pool)
            .await?;
        hydrate(rows)
    }

    pub async fn count_active_for_list(&self, list_id: Uuid) -> Result<u32, StoreError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM tasks WHERE list_id = ? AND is_deleted = 0")
                .bind(list_id.to_string())
                .fetch_one(&self.pool)
                .await?;
        Ok(count as u32)
    }

    /// Inserts the task, overwriting any existing row with the same id.
    pub async fn insert(&self, task: &Task) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO tasks (id, list_id, title, subtasks, is_expanded, is_completed, in_list_order, last_modified, is_deleted)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                list_id = excluded.list_id,
                title = excluded.title,
                subtasks = excluded.subtasks,
                is_expanded = excluded.is_expanded,
                is_completed = excluded.is_completed,
                in_list_order = excluded.in_list_order,
                last_modified = excluded.last_modified,
                is_deleted = excluded.is_deleted
            "#,
        )
        .bind(task.id.to_string())
        .bind(task.list_id.to_string())
        .bind(&task.title)
        .bind(encode_subtasks(task))
        .bind(task.is_expanded)
        .bind(task.is_completed)
        .bind(i64::from(task.in_list_order))
        .bind(task.last_modified)
        .bind(task.is_deleted)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn update(&self, task: &Task) -> Result<(), StoreError> {
        update_row(&self.pool, task).await
    }

    /// Updates all tasks in one transaction (used for re-ranking).
    pub async fn update_batch(&self, tasks: &[Task]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for task in tasks {
            update_row(&mut *tx, task).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn hard_delete(&self, id: Uuid) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

async fn update_row<'e, E: SqliteExecutor<'e>>(executor: E, task: &Task) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        UPDATE tasks
        SET list_id = ?, title = ?, subtasks = ?, is_expanded = ?, is_completed = ?,
            in_list_order = ?, last_modified = ?, is_deleted = ?
        WHERE id = ?
        "#,
    )
    .bind(task.list_id.to_string())
    .bind(&task.title)
    .bind(encode_subtasks(task))
    .bind(task.is_expanded)
    .bind(task.is_completed)
    .bind(i64::from(task.in_list_order))
    .bind(task.last_modified)
    .bind(task.is_deleted)
    .bind(task.id.to_string())
    .execute(executor)
    .await?;
    Ok(())
}
