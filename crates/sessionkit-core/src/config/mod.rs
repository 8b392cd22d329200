use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{ConfigError, Result};
use crate::session::reaper::DEFAULT_SWEEP_INTERVAL_S;
use crate::session::{MemoryStore, Store};

/// Default TTL: 24 hours.
pub const DEFAULT_TTL_S: u64 = 24 * 3600;

/// Which backend to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Memory,
    File,
}

impl std::str::FromStr for Backend {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "memory" | "mem" => Ok(Backend::Memory),
            "file" | "fs" => Ok(Backend::File),
            other => Err(ConfigError::Invalid(format!("unknown backend '{other}'"))),
        }
    }
}

/// Store construction parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreConfig {
    pub backend: Backend,
    /// Storage directory for the file backend.
    pub path: String,
    pub default_ttl_secs: u64,
    /// 0 disables the background sweep.
    pub sweep_interval_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: Backend::File,
            path: "session".to_string(),
            default_ttl_secs: DEFAULT_TTL_S,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_S,
        }
    }
}

impl StoreConfig {
    /// Expanded storage path (`~/` is resolved against the home directory).
    pub fn storage_path(&self) -> PathBuf {
        let path = &self.path;
        if path.starts_with("~/") || path.starts_with("~\\") {
            if let Some(home) = dirs::home_dir() {
                return home.join(&path[2..]);
            }
        }
        PathBuf::from(path)
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    /// `None` when the background sweep is disabled.
    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_secs > 0).then(|| Duration::from_secs(self.sweep_interval_secs))
    }
}

/// Construct the configured backend.
pub fn open_store(config: &StoreConfig) -> Result<Arc<dyn Store>> {
    match config.backend {
        Backend::Memory => Ok(Arc::new(MemoryStore::new())),
        #[cfg(feature = "file-backend")]
        Backend::File => Ok(Arc::new(crate::session::FileStore::open(
            config.storage_path(),
        )?)),
        #[cfg(not(feature = "file-backend"))]
        Backend::File => Err(ConfigError::Invalid(
            "file backend not compiled in (enable the `file-backend` feature)".into(),
        )
        .into()),
    }
}

/// Load configuration from environment variables.
///
/// Priority:
/// 1. `SESSIONKIT_CONFIG` env var — full JSON config
/// 2. Individual env vars (merged on top of the file config)
/// 3. File fallback (`~/.sessionkit/config.json`)
pub fn load_config_from_env() -> StoreConfig {
    if let Ok(json) = std::env::var("SESSIONKIT_CONFIG") {
        match serde_json::from_str::<StoreConfig>(&json) {
            Ok(config) => return config,
            Err(e) => {
                tracing::warn!("Failed to parse SESSIONKIT_CONFIG: {}", e);
            }
        }
    }

    let mut cfg = load_config(None);
    apply_env_overrides(&mut cfg);
    cfg
}

/// Overlay `SESSIONKIT_BACKEND`, `SESSIONKIT_PATH` and `SESSIONKIT_TTL`.
pub fn apply_env_overrides(cfg: &mut StoreConfig) {
    if let Ok(v) = std::env::var("SESSIONKIT_BACKEND") {
        match v.parse() {
            Ok(backend) => cfg.backend = backend,
            Err(e) => tracing::warn!("Ignoring SESSIONKIT_BACKEND: {}", e),
        }
    }
    if let Ok(v) = std::env::var("SESSIONKIT_PATH") {
        cfg.path = v;
    }
    if let Ok(v) = std::env::var("SESSIONKIT_TTL") {
        match v.trim().parse() {
            Ok(secs) => cfg.default_ttl_secs = secs,
            Err(e) => tracing::warn!("Ignoring SESSIONKIT_TTL '{}': {}", v, e),
        }
    }
}

/// Get the default configuration file path.
pub fn get_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".sessionkit")
        .join("config.json")
}

/// Load configuration from file, or defaults if it is missing or invalid.
pub fn load_config(config_path: Option<&Path>) -> StoreConfig {
    let path = config_path
        .map(|p| p.to_path_buf())
        .unwrap_or_else(get_config_path);

    if path.exists() {
        match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<StoreConfig>(&content) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!("Failed to parse config from {}: {}", path.display(), e);
                    tracing::warn!("Using default configuration.");
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read config from {}: {}", path.display(), e);
                tracing::warn!("Using default configuration.");
            }
        }
    }

    StoreConfig::default()
}

/// Save configuration to file.
pub fn save_config(
    config: &StoreConfig,
    config_path: Option<&Path>,
) -> std::result::Result<(), ConfigError> {
    let path = config_path
        .map(|p| p.to_path_buf())
        .unwrap_or_else(get_config_path);

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::Invalid(e.to_string()))?;
    }

    let json = serde_json::to_string_pretty(config)?;
    std::fs::write(&path, json).map_err(|e| ConfigError::Invalid(e.to_string()))?;
    Ok(())
}
