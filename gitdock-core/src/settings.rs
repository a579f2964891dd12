//! Flat string key-value settings stored in `~/.gitdock/settings.yaml`.
//!
//! Components read individual keys through [`Settings`]; typed accessors fall
//! back to the supplied default (with a warning) when a value does not parse.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{io_err, StoreError};
use crate::store::root_at;

pub const MAIN_PATH: &str = "main_path";
pub const GIT_PATH: &str = "git_path";
pub const GIT_TIMEOUT_SECS: &str = "git_timeout_secs";
pub const DOCKER_PATH: &str = "docker_path";
pub const DOCKER_TIMEOUT_SECS: &str = "docker_timeout_secs";
pub const DOCKER_HOST: &str = "docker_host";
pub const RESTART_GRACE_SECS: &str = "restart_grace_secs";
pub const RUNTIME_LIVE: &str = "runtime_live";
pub const SYNC_ALL_PAUSE_MS: &str = "sync_all_pause_ms";
pub const AUDIT_MAX_BYTES: &str = "audit_max_bytes";
pub const AUDIT_MAX_FILES: &str = "audit_max_files";
pub const SSH_KEYGEN_PATH: &str = "ssh_keygen_path";

/// Every key the CLI accepts for `settings set`.
pub const KNOWN_KEYS: &[&str] = &[
    MAIN_PATH,
    GIT_PATH,
    GIT_TIMEOUT_SECS,
    DOCKER_PATH,
    DOCKER_TIMEOUT_SECS,
    DOCKER_HOST,
    RESTART_GRACE_SECS,
    RUNTIME_LIVE,
    SYNC_ALL_PAUSE_MS,
    AUDIT_MAX_BYTES,
    AUDIT_MAX_FILES,
    SSH_KEYGEN_PATH,
];

/// `<home>/.gitdock/settings.yaml`
pub fn settings_path_at(home: &Path) -> PathBuf {
    root_at(home).join("settings.yaml")
}

/// In-memory snapshot of the settings file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    values: BTreeMap<String, String>,
}

impl Settings {
    pub fn from_map(values: BTreeMap<String, String>) -> Self {
        Self { values }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.values.remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.values.iter()
    }

    pub fn str_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    pub fn u64_or(&self, key: &str, default: u64) -> u64 {
        match self.get(key) {
            None => default,
            Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                tracing::warn!(key, value = raw, default, "invalid numeric setting, using default");
                default
            }),
        }
    }

    pub fn bool_or(&self, key: &str, default: bool) -> bool {
        match self.get(key).map(|v| v.trim().to_ascii_lowercase()) {
            None => default,
            Some(v) if matches!(v.as_str(), "true" | "1" | "yes" | "on") => true,
            Some(v) if matches!(v.as_str(), "false" | "0" | "no" | "off") => false,
            Some(v) => {
                tracing::warn!(key, value = %v, default, "invalid boolean setting, using default");
                default
            }
        }
    }
}

/// Load settings. A missing file is an empty map.
pub fn load_settings_at(home: &Path) -> Result<Settings, StoreError> {
    let path = settings_path_at(home);
    if !path.exists() {
        return Ok(Settings::default());
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    if contents.trim().is_empty() {
        return Ok(Settings::default());
    }
    let values: BTreeMap<String, String> =
        serde_yaml::from_str(&contents).map_err(|e| StoreError::Parse {
            path: path.clone(),
            message: e.to_string(),
        })?;
    Ok(Settings::from_map(values))
}

/// Persist settings atomically.
pub fn save_settings_at(home: &Path, settings: &Settings) -> Result<(), StoreError> {
    let path = settings_path_at(home);
    let root = root_at(home);
    std::fs::create_dir_all(&root).map_err(|e| io_err(&root, e))?;
    let yaml = serde_yaml::to_string(&settings.values)?;
    let tmp = path.with_extension("yaml.tmp");
    std::fs::write(&tmp, yaml).map_err(|e| io_err(&tmp, e))?;
    if let Err(e) = std::fs::rename(&tmp, &path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(&path, e));
    }
    Ok(())
}

/// Read a single key.
pub fn get_setting_at(home: &Path, key: &str) -> Result<Option<String>, StoreError> {
    Ok(load_settings_at(home)?.get(key).map(str::to_string))
}

/// Write a single key, preserving every other key.
pub fn set_setting_at(home: &Path, key: &str, value: &str) -> Result<(), StoreError> {
    let mut settings = load_settings_at(home)?;
    settings.set(key, value);
    save_settings_at(home, &settings)
}

/// Remove a single key. Returns whether it was present.
pub fn unset_setting_at(home: &Path, key: &str) -> Result<bool, StoreError> {
    let mut settings = load_settings_at(home)?;
    let existed = settings.remove(key).is_some();
    if existed {
        save_settings_at(home, &settings)?;
    }
    Ok(existed)
}
