//! HTTP routes of the document server.
//!
//! # Endpoints
//!
//! - `GET /health`: health check (no auth required)
//! - `GET /me`: current key's user and group
//! - `GET /v1/collections/{collection}/documents?field=&value=`: equality query
//! - `GET /v1/collections/{collection}/documents/{id}`: one document
//! - `PUT /v1/collections/{collection}/documents/{id}`: create or replace
//! - `DELETE /v1/collections/{collection}/documents/{id}`: delete
//! - `POST /v1/collections/{collection}/batch`: atomic multi-document write

use axum::{
    extract::{Path, Query, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tasksync_core::remote::Fields;
use tasksync_core::Document;
use tower_http::trace::TraceLayer;

use super::storage::{DocumentStore, DocumentStoreError};

// ============================================================================
// Authentication
// ============================================================================

/// Authenticated user info, added to request extensions after auth
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: String,
    pub group_id: String,
}

/// API key store - maps key -> AuthUser
#[derive(Debug, Clone, Default)]
pub struct ApiKeyStore {
    keys: HashMap<String, AuthUser>,
}

impl ApiKeyStore {
    pub fn new(keys: HashMap<String, AuthUser>) -> Self {
        Self { keys }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Validate an API key and return the associated user
    pub fn validate(&self, key: &str) -> Option<AuthUser> {
        self.keys.get(key).cloned()
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub api_keys: Arc<ApiKeyStore>,
    pub documents: DocumentStore,
}

/// Error response body
#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

fn error_response(status: StatusCode, error: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error,
            message: message.into(),
        }),
    )
        .into_response()
}

/// Authentication middleware
async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let api_key = match auth_header {
        Some(h) if h.starts_with("Bearer ") => &h[7..],
        Some(_) => {
            return error_response(
                StatusCode::UNAUTHORIZED,
                "invalid_auth",
                "Authorization header must use Bearer scheme",
            );
        }
        None => {
            return error_response(
                StatusCode::UNAUTHORIZED,
                "missing_auth",
                "Authorization header required",
            );
        }
    };

    match state.api_keys.validate(api_key) {
        Some(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        None => error_response(StatusCode::UNAUTHORIZED, "invalid_key", "Invalid API key"),
    }
}

impl IntoResponse for DocumentStoreError {
    fn into_response(self) -> Response {
        match self {
            DocumentStoreError::InvalidName(_) => {
                error_response(StatusCode::BAD_REQUEST, "invalid_name", self.to_string())
            }
            other => {
                tracing::error!(error = %other, "Document store failure");
                error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "storage_error",
                    "Failed to access document store",
                )
            }
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check response
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Health check endpoint (no auth required)
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Current user response
#[derive(Serialize)]
struct MeResponse {
    user_id: String,
    group_id: String,
}

async fn me(Extension(user): Extension<AuthUser>) -> Json<MeResponse> {
    Json(MeResponse {
        user_id: user.user_id,
        group_id: user.group_id,
    })
}

#[derive(Debug, Deserialize)]
struct EqualityQuery {
    field: String,
    value: String,
}

async fn query_documents(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(collection): Path<String>,
    Query(query): Query<EqualityQuery>,
) -> Result<Json<Vec<Document>>, DocumentStoreError> {
    let documents = state
        .documents
        .fetch_where_eq(&user.group_id, &collection, &query.field, &query.value)
        .await?;
    tracing::debug!(
        %collection,
        field = %query.field,
        count = documents.len(),
        "Query served"
    );
    Ok(Json(documents))
}

async fn get_document(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path((collection, id)): Path<(String, String)>,
) -> Result<Response, DocumentStoreError> {
    match state.documents.get(&user.group_id, &collection, &id).await? {
        Some(document) => Ok(Json(document).into_response()),
        None => Ok(error_response(
            StatusCode::NOT_FOUND,
            "not_found",
            format!("No document {} in {}", id, collection),
        )),
    }
}

async fn put_document(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path((collection, id)): Path<(String, String)>,
    Json(fields): Json<Fields>,
) -> Result<StatusCode, DocumentStoreError> {
    let document = Document::new(id, fields);
    state
        .documents
        .upsert(&user.group_id, &collection, &document)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_document(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path((collection, id)): Path<(String, String)>,
) -> Result<StatusCode, DocumentStoreError> {
    state
        .documents
        .delete(&user.group_id, &collection, &id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn batch_write(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(collection): Path<String>,
    Json(documents): Json<Vec<Document>>,
) -> Result<StatusCode, DocumentStoreError> {
    state
        .documents
        .batch_upsert(&user.group_id, &collection, &documents)
        .await?;
    tracing::debug!(%collection, count = documents.len(), "Batch written");
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Router
// ============================================================================

/// Builds the application router.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new().route("/health", get(health));

    let protected_routes = Router::new()
        .route("/me", get(me))
        .route(
            "/v1/collections/{collection}/documents",
            get(query_documents),
        )
        .route(
            "/v1/collections/{collection}/documents/{id}",
            get(get_document).put(put_document).delete(delete_document),
        )
        .route("/v1/collections/{collection}/batch", post(batch_write))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
