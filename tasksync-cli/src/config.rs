//! CLI settings: defaults, then `config.yaml`, then `TASKS_*` variables.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const APP_DIR: &str = "tasks";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    Default,
    File,
    Environment,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConfigSource::Default => "default",
            ConfigSource::File => "file",
            ConfigSource::Environment => "environment",
        };
        f.write_str(name)
    }
}

/// A path setting together with where it came from, for `tasks config show`.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        Self { value, source }
    }
}

fn default_retention_days() -> Option<u32> {
    Some(30)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    pub server_url: Option<String>,
    pub api_key: Option<String>,
    /// Sync on start of every data command and after every write.
    #[serde(default)]
    pub auto_sync: bool,
    /// `null` keeps remote tombstones forever.
    #[serde(default = "default_retention_days")]
    pub tombstone_retention_days: Option<u32>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            server_url: None,
            api_key: None,
            auto_sync: false,
            tombstone_retention_days: default_retention_days(),
        }
    }
}

impl SyncConfig {
    pub fn is_configured(&self) -> bool {
        self.server_url.is_some() && self.api_key.is_some()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Config {
    pub database_path: ConfigValue<PathBuf>,
    /// Holds `identity.yaml` (signed-in user and selected list).
    pub data_dir: ConfigValue<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_file: Option<PathBuf>,
    pub sync: SyncConfig,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ConfigFile {
    database_path: Option<PathBuf>,
    data_dir: Option<PathBuf>,
    sync: Option<SyncConfig>,
}

fn env_path(name: &str) -> Option<ConfigValue<PathBuf>> {
    std::env::var(name)
        .ok()
        .map(|value| ConfigValue::new(PathBuf::from(value), ConfigSource::Environment))
}

impl Config {
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let state_dir = app_dir(dirs::data_dir());
        let mut database_path = ConfigValue::new(state_dir.join("tasks.db"), ConfigSource::Default);
        let mut data_dir = ConfigValue::new(state_dir, ConfigSource::Default);
        let mut config_file = None;
        let mut sync = SyncConfig::default();

        let path = config_path.unwrap_or_else(Self::default_config_path);
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadError(path.clone(), e))?;
            let file: ConfigFile = serde_yaml::from_str(&contents)
                .map_err(|e| ConfigError::ParseError(path.clone(), e))?;

            if let Some(db) = file.database_path {
                database_path = ConfigValue::new(resolve(&path, db), ConfigSource::File);
            }
            if let Some(dir) = file.data_dir {
                data_dir = ConfigValue::new(resolve(&path, dir), ConfigSource::File);
            }
            sync = file.sync.unwrap_or(sync);
            config_file = Some(path);
        }

        database_path = env_path("TASKS_DATABASE_PATH").unwrap_or(database_path);
        data_dir = env_path("TASKS_DATA_DIR").unwrap_or(data_dir);
        if let Ok(url) = std::env::var("TASKS_SYNC_URL") {
            sync.server_url = Some(url);
        }
        if let Ok(key) = std::env::var("TASKS_SYNC_API_KEY") {
            sync.api_key = Some(key);
        }

        Ok(Self {
            database_path,
            data_dir,
            config_file,
            sync,
        })
    }

    pub fn default_config_path() -> PathBuf {
        app_dir(dirs::config_dir()).join("config.yaml")
    }
}

fn app_dir(base: Option<PathBuf>) -> PathBuf {
    base.unwrap_or_else(|| PathBuf::from(".")).join(APP_DIR)
}

/// Relative paths in the file are taken from the file's own directory.
fn resolve(config_path: &Path, path: PathBuf) -> PathBuf {
    match config_path.parent() {
        Some(parent) if path.is_relative() => parent.join(path),
        _ => path,
    }
}

#[derive(Debug)]
pub enum ConfigError {
    ReadError(PathBuf, std::io::Error),
    ParseError(PathBuf, serde_yaml::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ReadError(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
