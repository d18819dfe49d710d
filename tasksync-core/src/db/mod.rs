//! Local on-device store backed by SQLite.
//!
//! The local store is the source of truth for the UI. Soft-deleted rows stay
//! in place (hidden from "active" queries) until reconciliation confirms the
//! tombstone reached the remote side, at which point they are hard-deleted.

mod list_repo;
mod shop_repo;
mod task_repo;

pub use list_repo::ListRepository;
pub use shop_repo::ShopRepository;
pub use task_repo::TaskRepository;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] sqlx::Error),
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("Failed to create database directory '{}': {source}", path.display())]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid id '{0}' in table {1}")]
    InvalidId(String, &'static str),
    #[error("Corrupt {column} column for row {id}: {source}")]
    CorruptColumn {
        id: String,
        column: &'static str,
        source: serde_json::Error,
    },
}

/// Initialize the database connection pool and run migrations
pub async fn init_db(path: &Path) -> Result<SqlitePool, StoreError> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| StoreError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let db_url = format!("sqlite:{}?mode=rwc", path.display());

    let options = SqliteConnectOptions::from_str(&db_url)?
        .foreign_keys(true)
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

/// Typed access to the three record tables.
#[derive(Debug, Clone)]
pub struct LocalStore {
    pub lists: ListRepository,
    pub tasks: TaskRepository,
    pub shops: ShopRepository,
}

impl LocalStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            lists: ListRepository::new(pool.clone()),
            tasks: TaskRepository::new(pool.clone()),
            shops: ShopRepository::new(pool),
        }
    }

    /// Opens (creating if needed) the database at `path`.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        Ok(Self::new(init_db(path).await?))
    }
}

fn parse_id(raw: &str, table: &'static str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(raw).map_err(|_| StoreError::InvalidId(raw.to_string(), table))
}


#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_init_db_creates_tables() {
        let temp_dir = tempdir().unwrap();
        let db_path = temp_dir.path().join("nested").join("test.db");

        let pool = init_db(&db_path).await.unwrap();

        let tables: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' AND name NOT LIKE '_sqlx_%' ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .unwrap();

        let table_names: Vec<&str> = tables.iter().map(|t| t.0.as_str()).collect();
        assert_eq!(table_names, vec!["shops", "tasks", "todo_lists"]);
    }
}
