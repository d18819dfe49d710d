use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use super::schema::{
    self, SchemaError, LISTS_COLLECTION, SHOPS_COLLECTION, TASKS_COLLECTION,
};
use super::{Document, RemoteError, RemoteStore};
use crate::models::{Shop, Task, TodoList};

/// Typed access to records in a [`RemoteStore`].
///
/// The `fetch_*` reads never fail: a fetch error yields an empty collection
/// with a warning. The `try_fetch_*` variants report it instead, for callers
/// that must not mistake an outage for an empty store. Malformed documents
/// are dropped either way. Writes return their error so the caller can log
/// and skip the record.
#[derive(Clone)]
pub struct RemoteRepository {
    store: Arc<dyn RemoteStore>,
}

impl std::fmt::Debug for RemoteRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteRepository").finish_non_exhaustive()
    }
}

fn decode_all<T>(
    collection: &str,
    documents: Vec<Document>,
    decode: fn(&Document) -> Result<T, SchemaError>,
) -> Vec<T> {
    documents
        .iter()
        .filter_map(|doc| match decode(doc) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(collection, id = %doc.id, error = %e, "Dropping malformed remote document");
                None
            }
        })
        .collect()
}

fn or_empty<T>(collection: &str, fetched: Result<Vec<T>, RemoteError>) -> Vec<T> {
    fetched.unwrap_or_else(|e| {
        warn!(collection, error = %e, "Remote fetch failed, treating as empty");
        Vec::new()
    })
}

/// Decodes a legacy document and encodes it again in the current schema.
fn reencode(collection: &str, doc: &Document) -> Result<Document, SchemaError> {
    match collection {
        LISTS_COLLECTION => schema::encode_list(&schema::decode_list(doc)?),
        TASKS_COLLECTION => schema::encode_task(&schema::decode_task(doc)?),
        _ => schema::encode_shop(&schema::decode_shop(doc)?),
    }
}

impl RemoteRepository {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self { store }
    }

    /// All lists of `owner`, tombstones included.
    pub async fn try_fetch_lists(&self, owner: &str) -> Result<Vec<TodoList>, RemoteError> {
        let docs = self.store.fetch_where_eq(LISTS_COLLECTION, "owner", owner).await?;
        Ok(decode_all(LISTS_COLLECTION, docs, schema::decode_list))
    }

    /// All tasks of a list, tombstones included.
    pub async fn try_fetch_tasks(&self, list_id: Uuid) -> Result<Vec<Task>, RemoteError> {
        let docs = self
            .store
            .fetch_where_eq(TASKS_COLLECTION, "listId", &list_id.to_string())
            .await?;
        Ok(decode_all(TASKS_COLLECTION, docs, schema::decode_task))
    }

    /// All shops of `owner`, tombstones included.
    pub async fn try_fetch_shops(&self, owner: &str) -> Result<Vec<Shop>, RemoteError> {
        let docs = self.store.fetch_where_eq(SHOPS_COLLECTION, "owner", owner).await?;
        Ok(decode_all(SHOPS_COLLECTION, docs, schema::decode_shop))
    }

    pub async fn fetch_lists(&self, owner: &str) -> Vec<TodoList> {
        or_empty(LISTS_COLLECTION, self.try_fetch_lists(owner).await)
    }

    pub async fn fetch_tasks(&self, list_id: Uuid) -> Vec<Task> {
        or_empty(TASKS_COLLECTION, self.try_fetch_tasks(list_id).await)
    }

    pub async fn fetch_shops(&self, owner: &str) -> Vec<Shop> {
        or_empty(SHOPS_COLLECTION, self.try_fetch_shops(owner).await)
    }

    async fn put(&self, collection: &str, doc: Document) -> Result<(), RemoteError> {
        self.store
            .upsert_document(collection, &doc.id, doc.fields)
            .await
    }

    pub async fn put_list(&self, list: &TodoList) -> Result<(), RemoteError> {
        self.put(LISTS_COLLECTION, schema::encode_list(list)?).await
    }

    pub async fn put_task(&self, task: &Task) -> Result<(), RemoteError> {
        self.put(TASKS_COLLECTION, schema::encode_task(task)?).await
    }

    pub async fn put_shop(&self, shop: &Shop) -> Result<(), RemoteError> {
        self.put(SHOPS_COLLECTION, schema::encode_shop(shop)?).await
    }

    /// Writes all tasks as one atomic batch.
    pub async fn put_tasks(&self, tasks: &[Task]) -> Result<(), RemoteError> {
        let docs = tasks
            .iter()
            .map(schema::encode_task)
            .collect::<Result<Vec<_>, _>>()?;
        self.store.batch_upsert(TASKS_COLLECTION, docs).await
    }

    /// Writes all shops as one atomic batch.
    pub async fn put_shops(&self, shops: &[Shop]) -> Result<(), RemoteError> {
        let docs = shops
            .iter()
            .map(schema::encode_shop)
            .collect::<Result<Vec<_>, _>>()?;
        self.store.batch_upsert(SHOPS_COLLECTION, docs).await
    }

    pub async fn delete_list(&self, id: Uuid) -> Result<(), RemoteError> {
        self.store
            .delete_document(LISTS_COLLECTION, &id.to_string())
            .await
    }

    pub async fn delete_task(&self, id: Uuid) -> Result<(), RemoteError> {
        self.store
            .delete_document(TASKS_COLLECTION, &id.to_string())
            .await
    }

    pub async fn delete_shop(&self, id: Uuid) -> Result<(), RemoteError> {
        self.store
            .delete_document(SHOPS_COLLECTION, &id.to_string())
            .await
    }

    /// Rewrites every legacy document matching `field == value` in the
    /// current schema, as one batch. Timestamps are carried over unchanged.
    ///
    /// Returns the number of documents rewritten. Documents that cannot be
    /// decoded are left alone.
    pub async fn upgrade_legacy(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<usize, RemoteError> {
        let docs = self.store.fetch_where_eq(collection, field, value).await?;

        let upgraded: Vec<Document> = docs
            .iter()
            .filter(|doc| schema::is_legacy(&doc.fields))
            .filter_map(|doc| match reencode(collection, doc) {
                Ok(upgraded) => Some(upgraded),
                Err(e) => {
                    warn!(collection, id = %doc.id, error = %e, "Cannot migrate remote document");
                    None
                }
            })
            .collect();

        let count = upgraded.len();
        if count > 0 {
            self.store.batch_upsert(collection, upgraded).await?;
            info!(collection, count, "Migrated legacy remote documents");
        }
        Ok(count)
    }
}
