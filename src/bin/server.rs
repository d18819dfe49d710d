//! tasksync Document Server
//!
//! Stores the remote copies of lists, tasks and shops so that several devices
//! of the same user can sync through it.
//!
//! # Configuration
//!
//! Environment variables:
//! - `TASKSYNC_PORT`: Port to listen on (default: 8080)
//! - `TASKSYNC_DATA_DIR`: Directory holding `documents.db` (default: ~/.local/share/tasksync-server)
//! - `TASKSYNC_CONFIG`: Path to config file (default: ~/.config/tasksync-server/config.yaml)
//!
//! # Config File Format
//!
//! ```yaml
//! api_keys:
//!   - key: "your-secret-key-here"
//!     user_id: "user1"
//!     group_id: "family1"
//! ```
//!
//! Keys sharing a `group_id` see the same documents.

use serde::Deserialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tasksync::server::{router, ApiKeyStore, AppState, AuthUser, DocumentStore};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// ============================================================================
// Configuration
// ============================================================================

/// API key entry in config
#[derive(Debug, Clone, Deserialize)]
struct ApiKeyEntry {
    key: String,
    user_id: String,
    group_id: String,
}

/// Config file structure
#[derive(Debug, Clone, Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    api_keys: Vec<ApiKeyEntry>,
}

/// Server configuration
#[derive(Debug, Clone)]
struct Config {
    port: u16,
    data_dir: PathBuf,
    config_path: PathBuf,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Self {
        let port = std::env::var("TASKSYNC_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080);

        let data_dir = std::env::var("TASKSYNC_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::data_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("tasksync-server")
            });

        let config_path = std::env::var("TASKSYNC_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::config_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("tasksync-server")
                    .join("config.yaml")
            });

        Self {
            port,
            data_dir,
            config_path,
        }
    }
}

/// Load API keys from the config file. A missing or unreadable file yields
/// an empty store, which rejects every authenticated request.
fn load_api_keys(config_path: &Path) -> ApiKeyStore {
    let contents = match std::fs::read_to_string(config_path) {
        Ok(contents) => contents,
        Err(e) => {
            tracing::warn!(
                "Failed to read config file {}: {}",
                config_path.display(),
                e
            );
            tracing::warn!("No API keys loaded - all authenticated requests will fail");
            return ApiKeyStore::default();
        }
    };

    match serde_yaml::from_str::<ConfigFile>(&contents) {
        Ok(config) => {
            let keys: HashMap<String, AuthUser> = config
                .api_keys
                .into_iter()
                .map(|entry| {
                    (
                        entry.key,
                        AuthUser {
                            user_id: entry.user_id,
                            group_id: entry.group_id,
                        },
                    )
                })
                .collect();
            tracing::info!("Loaded {} API key(s)", keys.len());
            ApiKeyStore::new(keys)
        }
        Err(e) => {
            tracing::warn!("Failed to parse config file: {}", e);
            ApiKeyStore::default()
        }
    }
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tasksync=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();

    tracing::info!("Data directory: {}", config.data_dir.display());
    tracing::info!("Config file: {}", config.config_path.display());

    let documents = match DocumentStore::open(&config.data_dir).await {
        Ok(store) => store,
        Err(e) => {
            tracing::error!("Failed to open document store: {}", e);
            std::process::exit(1);
        }
    };

    let state = AppState {
        api_keys: Arc::new(load_api_keys(&config.config_path)),
        documents,
    };
    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Starting server on {}", addr);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
