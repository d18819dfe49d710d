//! HTTP client for the `tasksync-server` document API.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use tracing::debug;

use super::{Document, Fields, RemoteError, RemoteStore};

/// Remote store reached over HTTP with a bearer API key.
#[derive(Debug, Clone)]
pub struct HttpRemoteStore {
    client: Client,
    server_url: String,
    api_key: String,
}

impl HttpRemoteStore {
    pub fn new(server_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            server_url: server_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    fn collection_url(&self, collection: &str) -> String {
        format!(
            "{}/v1/collections/{}",
            self.server_url,
            urlencoding::encode(collection)
        )
    }

    fn document_url(&self, collection: &str, id: &str) -> String {
        format!(
            "{}/documents/{}",
            self.collection_url(collection),
            urlencoding::encode(id)
        )
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request.header("Authorization", format!("Bearer {}", self.api_key))
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, RemoteError> {
        let response = self.authorized(request).send().await?;
        if !response.status().is_success() {
            return Err(RemoteError::Status {
                status: response.status().as_u16(),
                url: response.url().to_string(),
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn fetch_where_eq(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<Document>, RemoteError> {
        let url = format!("{}/documents", self.collection_url(collection));
        debug!(%url, field, value, "Fetching documents");

        let request = self
            .client
            .get(&url)
            .query(&[("field", field), ("value", value)]);
        let documents: Vec<Document> = self.send(request).await?.json().await?;
        Ok(documents)
    }

    async fn upsert_document(
        &self,
        collection: &str,
        id: &str,
        fields: Fields,
    ) -> Result<(), RemoteError> {
        let url = self.document_url(collection, id);
        self.send(self.client.put(&url).json(&fields)).await?;
        Ok(())
    }

    async fn batch_upsert(
        &self,
        collection: &str,
        documents: Vec<Document>,
    ) -> Result<(), RemoteError> {
        if documents.is_empty() {
            return Ok(());
        }
        let url = format!("{}/batch", self.collection_url(collection));
        debug!(%url, count = documents.len(), "Writing document batch");
        self.send(self.client.post(&url).json(&documents)).await?;
        Ok(())
    }

    async fn delete_document(&self, collection: &str, id: &str) -> Result<(), RemoteError> {
        let url = self.document_url(collection, id);
        self.send(self.client.delete(&url)).await?;
        Ok(())
    }
}
