//! Server-side document storage.
//!
//! Documents are JSON field maps stored in a single SQLite table, keyed by
//! the group of the API key that wrote them, the collection and the document
//! id:
//!
//! ```text
//! <DATA_DIR>/
//!   documents.db
//! ```
//!
//! Groups never see each other's documents.

use chrono::Utc;
use serde_json::{Map, Value};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use tasksync_core::Document;

/// Errors that can occur during server storage operations.
#[derive(Debug)]
pub enum DocumentStoreError {
    /// Database error.
    Database(sqlx::Error),
    /// Migration failure at startup.
    Migration(sqlx::migrate::MigrateError),
    /// I/O error preparing the data directory.
    Io(std::io::Error),
    /// Collection or field name outside `[A-Za-z0-9_]`.
    InvalidName(String),
    /// Stored fields could not be parsed back into a JSON object.
    CorruptDocument(String, serde_json::Error),
}

impl std::fmt::Display for DocumentStoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DocumentStoreError::Database(e) => write!(f, "Database error: {}", e),
            DocumentStoreError::Migration(e) => write!(f, "Migration error: {}", e),
            DocumentStoreError::Io(e) => write!(f, "I/O error: {}", e),
            DocumentStoreError::InvalidName(name) => write!(f, "Invalid name: {}", name),
            DocumentStoreError::CorruptDocument(id, e) => {
                write!(f, "Corrupt document {}: {}", id, e)
            }
        }
    }
}

impl std::error::Error for DocumentStoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DocumentStoreError::Database(e) => Some(e),
            DocumentStoreError::Migration(e) => Some(e),
            DocumentStoreError::Io(e) => Some(e),
            DocumentStoreError::CorruptDocument(_, e) => Some(e),
            DocumentStoreError::InvalidName(_) => None,
        }
    }
}

impl From<sqlx::Error> for DocumentStoreError {
    fn from(e: sqlx::Error) -> Self {
        DocumentStoreError::Database(e)
    }
}

/// SQLite-backed document store shared by all request handlers.
#[derive(Debug, Clone)]
pub struct DocumentStore {
    pool: SqlitePool,
}

impl DocumentStore {
    /// Opens (or creates) `documents.db` in the data directory.
    pub async fn open(data_dir: &Path) -> Result<Self, DocumentStoreError> {
        std::fs::create_dir_all(data_dir).map_err(DocumentStoreError::Io)?;
        let db_url = format!("sqlite:{}?mode=rwc", data_dir.join("documents.db").display());
        let options = SqliteConnectOptions::from_str(&db_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(DocumentStoreError::Migration)?;

        Ok(Self { pool })
    }

    /// Validates a collection or field name. Field names are spliced into a
    /// JSON path, so only plain identifiers are accepted.
    fn validate_name(name: &str) -> Result<(), DocumentStoreError> {
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(DocumentStoreError::InvalidName(name.to_string()));
        }
        Ok(())
    }

    fn parse_fields(id: String, fields: &str) -> Result<Document, DocumentStoreError> {
        let fields: Map<String, Value> = serde_json::from_str(fields)
            .map_err(|e| DocumentStoreError::CorruptDocument(id.clone(), e))?;
        Ok(Document::new(id, fields))
    }

    /// Documents of a collection whose top-level string `field` equals `value`.
    pub async fn fetch_where_eq(
        &self,
        group_id: &str,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<Document>, DocumentStoreError> {
        Self::validate_name(collection)?;
        Self::validate_name(field)?;

        let rows: Vec<(String, String)> = sqlx::query_as(
            r#"
            SELECT id, fields FROM documents
            WHERE group_id = ? AND collection = ?
              AND json_type(fields, '$.' || ?) = 'text'
              AND json_extract(fields, '$.' || ?) = ?
            ORDER BY id
            "#,
        )
        .bind(group_id)
        .bind(collection)
        .bind(field)
        .bind(field)
        .bind(value)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(id, fields)| Self::parse_fields(id, &fields))
            .collect()
    }

    /// Fetches one document.
    pub async fn get(
        &self,
        group_id: &str,
        collection: &str,
        id: &str,
    ) -> Result<Option<Document>, DocumentStoreError> {
        Self::validate_name(collection)?;

        let row: Option<(String, String)> = sqlx::query_as(
            "SELECT id, fields FROM documents WHERE group_id = ? AND collection = ? AND id = ?",
        )
        .bind(group_id)
        .bind(collection)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|(id, fields)| Self::parse_fields(id, &fields))
            .transpose()
    }

    /// Creates or fully replaces one document.
    pub async fn upsert(
        &self,
        group_id: &str,
        collection: &str,
        document: &Document,
    ) -> Result<(), DocumentStoreError> {
        Self::validate_name(collection)?;
        upsert_row(&self.pool, group_id, collection, document).await?;
        Ok(())
    }

    /// Creates or replaces all documents in one transaction.
    pub async fn batch_upsert(
        &self,
        group_id: &str,
        collection: &str,
        documents: &[Document],
    ) -> Result<(), DocumentStoreError> {
        Self::validate_name(collection)?;

        let mut tx = self.pool.begin().await?;
        for document in documents {
            upsert_row(&mut *tx, group_id, collection, document).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Deletes one document. Deleting a missing document is not an error.
    pub async fn delete(
        &self,
        group_id: &str,
        collection: &str,
        id: &str,
    ) -> Result<bool, DocumentStoreError> {
        Self::validate_name(collection)?;

        let result =
            sqlx::query("DELETE FROM documents WHERE group_id = ? AND collection = ? AND id = ?")
                .bind(group_id)
                .bind(collection)
                .bind(id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }
}

async fn upsert_row<'e, E>(
    executor: E,
    group_id: &str,
    collection: &str,
    document: &Document,
) -> Result<(), sqlx::Error>
where
    E: sqlx::SqliteExecutor<'e>,
{
    // Map<String, Value> always serializes.
    let fields = Value::Object(document.fields.clone()).to_string();
    sqlx::query(
        r#"
        INSERT INTO documents (group_id, collection, id, fields, updated_at)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(group_id, collection, id) DO UPDATE SET
            fields = excluded.fields,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(group_id)
    .bind(collection)
    .bind(&document.id)
    .bind(fields)
    .bind(Utc::now().to_rfc3339())
    .execute(executor)
    .await?;
    Ok(())
}
