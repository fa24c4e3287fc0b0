//! Persistent settings for the patchbay daemon.
//!
//! This crate provides a small JSON-backed settings store. The file is
//! written to the standard configuration directory
//! (`~/.config/patchbay/config.json` on most platforms) and is safe to
//! read and write from multiple threads thanks to the internal `Mutex`.
//! The store also owns API key management: keys are generated lazily on
//! first request and persisted alongside the other settings.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Local;
use dirs_next::config_dir;
use rand::{RngCore, rngs::OsRng};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{info, warn};

/// Environment variable allowing callers to override the config file path.
pub const CONFIG_PATH_ENV: &str = "PATCHBAY_CONFIG_PATH";

/// Default filename for the JSON payload.
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Number of hex characters in a well-formed API key.
pub const API_KEY_LEN: usize = 32;

/// Error surfaced when reading or writing settings fails.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure (for example, permissions or missing directory).
    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Serialization or deserialization failure.
    #[error("config serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Settings exposed to operators and to the `get_settings` command.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub general: GeneralSettings,
    #[serde(default)]
    pub advanced: AdvancedSettings,
}

/// Everyday operational settings.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Master switch for the HTTP API. Off by default.
    pub api_enabled: bool,
    /// Shared-secret key. Empty until generated or set by the operator.
    pub api_key: String,
    /// HTTP basic auth username. Empty disables credential checks.
    pub http_username: String,
    /// HTTP basic auth password.
    pub http_password: String,
    /// Directory holding the daemon log file.
    pub log_dir: String,
}

/// Settings most installations never touch.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvancedSettings {
    /// Allow raw SQL queries through the API.
    pub api_sql: bool,
    /// Directory receiving config and database backups.
    pub backup_dir: String,
    /// Directory holding cached image data.
    pub cache_dir: String,
    /// Path to the database file.
    pub database_path: String,
}

/// Thread-safe settings store backed by a JSON file.
#[derive(Debug, Default)]
pub struct ConfigHandle {
    path: PathBuf,
    settings: Mutex<Settings>,
    persist_to_disk: bool,
}

impl ConfigHandle {
    /// Load settings from `path`, or from the default config directory path
    /// when `path` is `None`. A missing file yields defaults; an unreadable
    /// file is reported and replaced by defaults on the next save.
    pub fn load(path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let resolved_path = path.unwrap_or_else(default_config_path);
        let settings = load_settings(&resolved_path)?;
        Ok(Self {
            path: resolved_path,
            settings: Mutex::new(settings),
            persist_to_disk: true,
        })
    }

    /// Build an in-memory store that never touches the filesystem.
    pub fn ephemeral(settings: Settings) -> Self {
        Self {
            path: PathBuf::new(),
            settings: Mutex::new(settings),
            persist_to_disk: false,
        }
    }

    /// Path to the underlying JSON file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Clone of the current settings.
    pub fn snapshot(&self) -> Settings {
        self.settings.lock().expect("config lock poisoned").clone()
    }

    pub fn api_enabled(&self) -> bool {
        self.settings.lock().expect("config lock poisoned").general.api_enabled
    }

    pub fn api_key(&self) -> String {
        self.settings.lock().expect("config lock poisoned").general.api_key.clone()
    }

    /// Configured HTTP basic auth credentials as `(username, password)`.
    pub fn http_credentials(&self) -> (String, String) {
        let settings = self.settings.lock().expect("config lock poisoned");
        (settings.general.http_username.clone(), settings.general.http_password.clone())
    }

    pub fn log_dir(&self) -> String {
        self.settings.lock().expect("config lock poisoned").general.log_dir.clone()
    }

    pub fn sql_enabled(&self) -> bool {
        self.settings.lock().expect("config lock poisoned").advanced.api_sql
    }

    pub fn cache_dir(&self) -> String {
        self.settings.lock().expect("config lock poisoned").advanced.cache_dir.clone()
    }

    pub fn database_path(&self) -> String {
        self.settings.lock().expect("config lock poisoned").advanced.database_path.clone()
    }

    /// Apply a mutation and persist the result.
    pub fn update(&self, mutate: impl FnOnce(&mut Settings)) -> Result<(), ConfigError> {
        let mut settings = self.settings.lock().expect("config lock poisoned");
        mutate(&mut settings);
        if self.persist_to_disk {
            self.save_locked(&settings)?;
        }
        Ok(())
    }

    /// Persist a replacement API key.
    pub fn set_api_key(&self, key: &str) -> Result<(), ConfigError> {
        self.update(|settings| settings.general.api_key = key.to_string())
    }

    /// Return the stored API key, generating and persisting one when none
    /// exists yet. The whole check-generate-save sequence runs under the
    /// settings lock, so concurrent callers all observe the same key.
    pub fn api_key_or_generate(&self) -> Result<String, ConfigError> {
        let mut settings = self.settings.lock().expect("config lock poisoned");
        if !settings.general.api_key.is_empty() {
            return Ok(settings.general.api_key.clone());
        }
        let key = generate_api_key();
        settings.general.api_key = key.clone();
        if self.persist_to_disk {
            self.save_locked(&settings)?;
        }
        info!("generated new API key");
        Ok(key)
    }

    /// Copy the config file into the backup directory under a timestamped
    /// name and return the backup path.
    pub fn make_backup(&self) -> Result<PathBuf, ConfigError> {
        let backup_dir = self.resolve_backup_dir();
        fs::create_dir_all(&backup_dir)?;
        let stamp = Local::now().format("%Y%m%d%H%M%S");
        let target = backup_dir.join(format!("config.backup-{stamp}.json"));
        if self.persist_to_disk && self.path.exists() {
            fs::copy(&self.path, &target)?;
        } else {
            let settings = self.settings.lock().expect("config lock poisoned");
            let data = serde_json::to_string_pretty(&*settings)?;
            fs::write(&target, data)?;
        }
        info!(path = %target.display(), "backed up configuration");
        Ok(target)
    }

    /// Backup directory from settings, falling back to a `backups` directory
    /// next to the config file.
    pub fn resolve_backup_dir(&self) -> PathBuf {
        let configured = self.settings.lock().expect("config lock poisoned").advanced.backup_dir.clone();
        if !configured.is_empty() {
            return PathBuf::from(configured);
        }
        match self.path.parent() {
            Some(parent) if !self.path.as_os_str().is_empty() => parent.join("backups"),
            _ => PathBuf::from("backups"),
        }
    }

    fn save_locked(&self, settings: &Settings) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string_pretty(settings)?;
        fs::write(&self.path, data)?;
        Ok(())
    }
}

/// Generate a fresh API key: 32 hex characters derived from OS randomness.
pub fn generate_api_key() -> String {
    let mut seed = [0u8; 32];
    OsRng.fill_bytes(&mut seed);
    let mut hasher = Sha256::new();
    hasher.update(seed);
    let digest = hasher.finalize();
    let mut key = String::with_capacity(API_KEY_LEN);
    for byte in digest.iter().take(API_KEY_LEN / 2) {
        key.push_str(&format!("{byte:02x}"));
    }
    key
}

fn default_config_path() -> PathBuf {
    if let Ok(path) = env::var(CONFIG_PATH_ENV) {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed);
        }
    }

    config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("patchbay")
        .join(CONFIG_FILE_NAME)
}

fn load_settings(path: &Path) -> Result<Settings, ConfigError> {
    match fs::read_to_string(path) {
        Ok(data) => match serde_json::from_str(&data) {
            Ok(settings) => Ok(settings),
            Err(error) => {
                warn!(
                    path = %path.display(),
                    error = %error,
                    "Failed to parse config file; using defaults"
                );
                Ok(Settings::default())
            }
        },
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(Settings::default()),
        Err(error) => Err(ConfigError::Io(error)),
    }
}
