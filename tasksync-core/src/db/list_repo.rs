use sqlx::{SqliteExecutor, SqlitePool};
use uuid::Uuid;

use super::{parse_id, StoreError};
use crate::models::TodoList;

#[derive(Debug, Clone)]
pub struct ListRepository {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct ListRow {
    id: String,
    name: String,
    owner: String,
    last_modified: i64,
    is_deleted: bool,
}

impl TryFrom<ListRow> for TodoList {
    type Error = StoreError;

    fn try_from(row: ListRow) -> Result<Self, Self::Error> {
        Ok(TodoList {
            id: parse_id(&row.id, "todo_lists")?,
            name: row.name,
            owner: row.owner,
            last_modified: row.last_modified,
            is_deleted: row.is_deleted,
        })
    }
}

fn hydrate(rows: Vec<ListRow>) -> Result<Vec<TodoList>, StoreError> {
    rows.into_iter().map(TodoList::try_from).collect()
}

impl ListRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Every list of `owner`, tombstones included (used by sync).
    pub async fn all_by_owner(&self, owner: &str) -> Result<Vec<TodoList>, StoreError> {
        let rows: Vec<ListRow> = sqlx::query_as("SELECT * FROM todo_lists WHERE owner = ?")
            .bind(owner)
            .fetch_all(&self.pool)
            .await?;
        hydrate(rows)
    }

    /// Live lists of `owner`, most recently changed first.
    pub async fn active_by_owner(&self, owner: &str) -> Result<Vec<TodoList>, StoreError> {
        let rows: Vec<ListRow> = sqlx::query_as(
            "SELECT * FROM todo_lists WHERE owner = ? AND is_deleted = 0 ORDER BY last_modified DESC, name",
        )
        .bind(owner)
        .fetch_all(&self.pool)
        .await?;
        hydrate(rows)
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<TodoList>, StoreError> {
        let row: Option<ListRow> = sqlx::query_as("SELECT * FROM todo_lists WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(TodoList::try_from).transpose()
    }

    /// Inserts the list, overwriting any existing row with the same id.
    ///
    /// Uses an upsert rather than `REPLACE` so existing tasks keep their parent.
    pub async fn insert(&self, list: &TodoList) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO todo_lists (id, name, owner, last_modified, is_deleted)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                owner = excluded.owner,
                last_modified = excluded.last_modified,
                is_deleted = excluded.is_deleted
            "#,
        )
        .bind(list.id.to_string())
        .bind(&list.name)
        .bind(&list.owner)
        .bind(list.last_modified)
        .bind(list.is_deleted)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Updates an existing list; missing rows are left alone.
    pub async fn update(&self, list: &TodoList) -> Result<(), StoreError> {
        update_row(&self.pool, list).await
    }

    pub async fn update_batch(&self, lists: &[TodoList]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for list in lists {
            update_row(&mut *tx, list).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Removes the row for good; its tasks go with it.
    pub async fn hard_delete(&self, id: Uuid) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM todo_lists WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

async fn update_row<'e, E: SqliteExecutor<'e>>(
    executor: E,
    list: &TodoList,
) -> Result<(), StoreError> {
    sqlx::query(
        "UPDATE todo_lists SET name = ?, owner = ?, last_modified = ?, is_deleted = ? WHERE id = ?",
    )
    .bind(&list.name)
    .bind(&list.owner)
    .bind(list.last_modified)
    .bind(list.is_deleted)
    .bind(list.id.to_string())
    .execute(executor)
    .await?;
    Ok(())
}
