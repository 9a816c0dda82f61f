use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

pub const CURRENT_SCHEMA_VERSION: u32 = 1;
/// One year.
pub const MAX_SESSION_TTL_HOURS: i64 = 24 * 365;
pub const MAX_DEBOUNCE_MS: u64 = 60_000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StorageConfig {
    /// Database file name, resolved against the data directory when relative.
    pub database_file: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_file: PathBuf::from("minnotes.db"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionConfig {
    pub ttl_hours: i64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { ttl_hours: 24 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AutosaveConfig {
    pub debounce_ms: u64,
}

impl Default for AutosaveConfig {
    fn default() -> Self {
        Self { debounce_ms: 1000 }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppConfig {
    pub schema_version: u32,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub autosave: AutosaveConfig,
    #[serde(default = "default_folders")]
    pub folders: Vec<String>,
    #[serde(default = "default_folder")]
    pub default_folder: String,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_folders() -> Vec<String> {
    vec!["Personal".to_string(), "Work".to_string(), "Ideas".to_string()]
}

fn default_folder() -> String {
    "Personal".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            storage: StorageConfig::default(),
            session: SessionConfig::default(),
            autosave: AutosaveConfig::default(),
            folders: default_folders(),
            default_folder: default_folder(),
            logging: LoggingConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn database_path(&self, data_dir: &Path) -> PathBuf {
        if self.storage.database_file.is_absolute() {
            self.storage.database_file.clone()
        } else {
            data_dir.join(&self.storage.database_file)
        }
    }
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
            let config = AppConfig::default();
            self.save(&config)?;
            return Ok(config);
        }

        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        let mut config: AppConfig =
            serde_json::from_str(&raw).context("failed to parse app config json")?;
        self.migrate(&mut config);
        normalize(&mut config);
        self.save(&config)?;
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

    fn migrate(&self, config: &mut AppConfig) {
        if config.schema_version >= CURRENT_SCHEMA_VERSION {
            return;
        }

        warn!(
            from = config.schema_version,
            to = CURRENT_SCHEMA_VERSION,
            "migrating app config schema"
        );

        if config.folders.is_empty() {
            config.folders = default_folders();
        }
        config.schema_version = CURRENT_SCHEMA_VERSION;
    }
}

/// Pulls values the runtime cannot use back into range.
fn normalize(config: &mut AppConfig) {
    let ttl = config.session.ttl_hours;
    if ttl <= 0 {
        warn!(ttl_hours = ttl, "session ttl must be positive; using the default");
        config.session = SessionConfig::default();
    } else if ttl > MAX_SESSION_TTL_HOURS {
        warn!(ttl_hours = ttl, max = MAX_SESSION_TTL_HOURS, "session ttl capped");
        config.session.ttl_hours = MAX_SESSION_TTL_HOURS;
    }

    let debounce = config.autosave.debounce_ms;
    if debounce == 0 {
        warn!("autosave debounce must be positive; using the default");
        config.autosave = AutosaveConfig::default();
    } else if debounce > MAX_DEBOUNCE_MS {
        warn!(debounce_ms = debounce, max = MAX_DEBOUNCE_MS, "autosave debounce capped");
        config.autosave.debounce_ms = MAX_DEBOUNCE_MS;
    }
}

/// `<data_local_dir>/minnotes`, or `./minnotes` when the platform has none.
pub fn default_data_dir() -> PathBuf {
    let mut dir = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    dir.push("minnotes");
    dir
}
