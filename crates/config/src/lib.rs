use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use core_types::ProviderConfig;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub const CURRENT_SCHEMA_VERSION: u32 = 1;

pub const ENV_DATA_DIR: &str = "NOTES_DATA_DIR";
pub const ENV_BIND_ADDR: &str = "NOTES_BIND_ADDR";
pub const ENV_MODEL: &str = "NOTES_MODEL";
pub const ENV_PROVIDER_BASE_URL: &str = "NOTES_PROVIDER_BASE_URL";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:5000".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StorageConfig {
    /// Relative paths resolve against the data directory.
    pub database_file: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_file: "notes.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub schema_version: u32,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            provider: ProviderConfig::default(),
        }
    }
}

impl AppConfig {
    /// Applies `NOTES_*` overrides on top of the file values.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(addr) = lookup(ENV_BIND_ADDR) {
            self.server.bind_addr = addr;
        }
        if let Some(model) = lookup(ENV_MODEL) {
            self.provider.default_model = model;
        }
        if let Some(base_url) = lookup(ENV_PROVIDER_BASE_URL) {
            self.provider.base_url = base_url;
        }
    }

    pub fn database_path(&self, data_dir: &Path) -> PathBuf {
        let file = Path::new(&self.storage.database_file);
        if file.is_absolute() {
            file.to_path_buf()
        } else {
            data_dir.join(file)
        }
    }

    pub fn resolve_api_key(&self, lookup: impl Fn(&str) -> Option<String>) -> Result<String> {
        let env = &self.provider.api_key_env;
        match lookup(env) {
            Some(key) if !key.trim().is_empty() => Ok(key),
            _ => bail!("environment variable {env} is not set"),
        }
    }
}

pub fn default_data_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_DATA_DIR) {
        return Ok(PathBuf::from(dir));
    }
    let mut dir = dirs::data_local_dir().context("failed to resolve data_local_dir")?;
    dir.push("notes-service");
    Ok(dir)
}

pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn from_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            path: dir.into().join("config.json"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load_or_init(&self) -> Result<AppConfig> {
        if !self.path.exists() {
            info!(path = %self.path.display(), "writing default config");
            let config = AppConfig::default();
            self.save(&config)?;
            return Ok(config);
        }

        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        let mut config: AppConfig =
            serde_json::from_str(&raw).context("failed to parse app config json")?;
        if self.migrate(&mut config) {
            self.save(&config)?;
        }
        Ok(config)
    }

    pub fn save(&self, config: &AppConfig) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let text = serde_json::to_string_pretty(config).context("failed to serialize config")?;
        fs::write(&self.path, text)
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        Ok(())
    }

    fn migrate(&self, config: &mut AppConfig) -> bool {
        if config.schema_version >= CURRENT_SCHEMA_VERSION {
            return false;
        }

        warn!(
            from = config.schema_version,
            to = CURRENT_SCHEMA_VERSION,
            "migrating app config schema"
        );

        if config.provider.base_url.trim().is_empty() {
            config.provider = ProviderConfig::default();
        }
        config.schema_version = CURRENT_SCHEMA_VERSION;
        true
    }
}
