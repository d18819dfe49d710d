//! Two devices converging through a live document server.

use std::collections::HashMap;
use std::sync::Arc;

use tasksync::server::{router, ApiKeyStore, AppState, AuthUser, DocumentStore};
use tasksync_core::{
    HttpRemoteStore, LocalStore, RemoteRepository, SyncOptions, SyncOrchestrator, Task, TodoList,
};
use tempfile::TempDir;

async fn start_server(temp: &TempDir) -> String {
    let documents = DocumentStore::open(&temp.path().join("server")).await.unwrap();
    let mut keys = HashMap::new();
    keys.insert(
        "secret".to_string(),
        AuthUser {
            user_id: "alice".to_string(),
            group_id: "family1".to_string(),
        },
    );
    let app = router(AppState {
        api_keys: Arc::new(ApiKeyStore::new(keys)),
        documents,
    });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

async fn device(temp: &TempDir, name: &str, url: &str) -> (LocalStore, Arc<SyncOrchestrator>) {
    let store = LocalStore::open(&temp.path().join(format!("{}.db", name)))
        .await
        .unwrap();
    let remote = RemoteRepository::new(Arc::new(HttpRemoteStore::new(url, "secret")));
    let orchestrator = SyncOrchestrator::new(store.clone(), remote, SyncOptions::default());
    (store, orchestrator)
}

#[tokio::test]
async fn test_devices_converge_through_server() {
    let temp = TempDir::new().unwrap();
    let url = start_server(&temp).await;
    let (phone, phone_sync) = device(&temp, "phone", &url).await;
    let (laptop, laptop_sync) = device(&temp, "laptop", &url).await;

    let list = TodoList::new("Groceries", "alice");
    phone.lists.insert(&list).await.unwrap();
    phone
        .tasks
        .insert(&Task::new(list.id, "Milk", 0))
        .await
        .unwrap();

    let report = phone_sync.sync("alice").await;
    assert_eq!(report.failed(), 0);
    assert_eq!(report.lists.pushed, 1);
    assert_eq!(report.tasks.pushed, 1);

    let report = laptop_sync.sync("alice").await;
    assert_eq!(report.failed(), 0);
    assert_eq!(report.lists.inserted, 1);
    assert_eq!(report.tasks.inserted, 1);

    let tasks = laptop.tasks.active_for_list(list.id).await.unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].title, "Milk");

    // The laptop deletes the list; the phone picks up the tombstone.
    let mut deleted = laptop.lists.get_by_id(list.id).await.unwrap().unwrap();
    deleted.is_deleted = true;
    deleted.touch();
    laptop.lists.update(&deleted).await.unwrap();
    laptop_sync.sync("alice").await;

    let report = phone_sync.sync("alice").await;
    assert_eq!(report.failed(), 0);
    assert!(phone.lists.active_by_owner("alice").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_wrong_key_counts_as_failures() {
    let temp = TempDir::new().unwrap();
    let url = start_server(&temp).await;
    let store = LocalStore::open(&temp.path().join("device.db")).await.unwrap();
    store
        .lists
        .insert(&TodoList::new("Groceries", "alice"))
        .await
        .unwrap();

    let remote = RemoteRepository::new(Arc::new(HttpRemoteStore::new(&url, "wrong")));
    let orchestrator = SyncOrchestrator::new(store, remote, SyncOptions::default());
    let report = orchestrator.sync("alice").await;

    assert_eq!(report.lists.pushed, 0);
    assert_eq!(report.lists.failed, 1);
}
