//! Remote document store.
//!
//! The remote side is a plain document store: documents live in named
//! collections, are addressed by id and can be queried by equality on one
//! top-level field. The document id of a record is always the string form of
//! the record's own id, which is what lets the merge engine pair both sides.
//!
//! [`RemoteStore`] is the untyped port, [`RemoteRepository`] maps records to
//! and from documents on top of it.

mod http;
mod memory;
mod repository;
pub mod schema;

pub use http::HttpRemoteStore;
pub use memory::MemoryRemoteStore;
pub use repository::RemoteRepository;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Field map of a document.
pub type Fields = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    #[serde(default)]
    pub fields: Fields,
}

impl Document {
    pub fn new(id: impl Into<String>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }
}

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Server returned status {status} for {url}")]
    Status { status: u16, url: String },
    #[error("Failed to encode document: {0}")]
    Schema(#[from] schema::SchemaError),
    #[error("Remote store unavailable: {0}")]
    Unavailable(String),
}

/// Untyped access to a remote document store.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// All documents of `collection` whose top-level `field` equals `value`.
    async fn fetch_where_eq(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<Document>, RemoteError>;

    /// Creates or fully replaces one document.
    async fn upsert_document(
        &self,
        collection: &str,
        id: &str,
        fields: Fields,
    ) -> Result<(), RemoteError>;

    /// Creates or replaces all documents as one atomic unit.
    async fn batch_upsert(
        &self,
        collection: &str,
        documents: Vec<Document>,
    ) -> Result<(), RemoteError>;

    /// Permanently removes one document. Missing documents are not an error.
    async fn delete_document(&self, collection: &str, id: &str) -> Result<(), RemoteError>;
}
