use std::path::{Path, PathBuf};
use std::{env, fs};

use serde::Deserialize;

use lb_core::DEFAULT_KIND;

use crate::error::{Result, StoreError};
use crate::schema::DEFAULT_BUSY_TIMEOUT_MS;
use crate::store::Store;

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "LB_DATA_DIR";

const CONFIG_FILE: &str = "config.toml";

/// Default base directory for all lb storage.
pub fn default_base_dir() -> PathBuf {
    dirs_home().join(".linkblocks")
}

fn dirs_home() -> PathBuf {
    env::var("HOME")
        .or_else(|_| env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

/// Explicit override, then `LB_DATA_DIR`, then `~/.linkblocks`.
pub fn resolve_data_dir(explicit: Option<&Path>) -> PathBuf {
    if let Some(dir) = explicit {
        return dir.to_path_buf();
    }
    env::var(DATA_DIR_ENV)
        .ok()
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(default_base_dir)
}

/// Optional `<data_dir>/config.toml`. Every field has a default.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Database file name inside the data directory.
    pub database: String,
    pub busy_timeout_ms: u32,
    /// Kind tag for blocks created without one.
    pub default_kind: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: "blocks.db".to_string(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            default_kind: DEFAULT_KIND.to_string(),
        }
    }
}

impl Config {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| StoreError::InvalidData(format!("invalid {CONFIG_FILE}: {e}")))?;
        if config.database.trim().is_empty() {
            return Err(StoreError::InvalidData(format!(
                "{CONFIG_FILE}: database must not be empty"
            )));
        }
        Ok(config)
    }

    /// Load `config.toml` from `data_dir`, or defaults when absent.
    pub fn load(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(CONFIG_FILE);
        match fs::read_to_string(&path) {
            Ok(content) => Self::from_toml_str(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(StoreError::InvalidData(format!(
                "failed to read {}: {e}",
                path.display()
            ))),
        }
    }
}

/// A workspace id must be non-empty and free of control characters.
pub fn validate_workspace_id(workspace_id: &str) -> Result<()> {
    if workspace_id.trim().is_empty() {
        return Err(StoreError::InvalidInput("workspace id must not be empty".into()));
    }
    if workspace_id.chars().any(char::is_control) {
        return Err(StoreError::InvalidInput(format!(
            "workspace id {workspace_id:?} contains control characters"
        )));
    }
    Ok(())
}

/// The store plus the configuration and directory it was opened from.
///
/// Layout:
/// ```text
/// ~/.linkblocks/
/// ├── config.toml   (optional)
/// └── blocks.db
/// ```
pub struct BlockStore {
    store: Store,
    config: Config,
    data_dir: PathBuf,
}

impl BlockStore {
    /// Open the store under `data_dir` (see [`resolve_data_dir`]),
    /// creating the directory as needed.
    pub fn open(data_dir: Option<&Path>) -> Result<Self> {
        let data_dir = resolve_data_dir(data_dir);
        fs::create_dir_all(&data_dir).map_err(|e| {
            StoreError::InvalidData(format!("failed to create {}: {e}", data_dir.display()))
        })?;

        let config = Config::load(&data_dir)?;
        let db_path = data_dir.join(&config.database);
        let store = Store::open_with_timeout(&db_path, config.busy_timeout_ms)?;
        tracing::info!("opened block store at {}", db_path.display());

        Ok(Self {
            store,
            config,
            data_dir,
        })
    }

    /// In-memory store with default configuration (for testing).
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            store: Store::open_in_memory()?,
            config: Config::default(),
            data_dir: PathBuf::from(":memory:"),
        })
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}
