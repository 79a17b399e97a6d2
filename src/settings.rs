use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backup::BackupFrequency;
use crate::error::{GoblinError, Result};

pub const DB_FILE_NAME: &str = "goblin.db";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub data_dir: String,
    /// Pause between releasing the live store and overwriting it.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    #[serde(default = "default_open_retry_delay_ms")]
    pub open_retry_delay_ms: u64,
    #[serde(default)]
    pub backup: BackupSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub frequency: BackupFrequency,
    #[serde(default)]
    pub last_backup: Option<String>,
    #[serde(default = "default_keep")]
    pub keep: usize,
}

fn default_settle_delay_ms() -> u64 {
    500
}

fn default_open_retry_delay_ms() -> u64 {
    1000
}

fn default_keep() -> usize {
    10
}

impl Default for BackupSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            frequency: BackupFrequency::default(),
            last_backup: None,
            keep: default_keep(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir().to_string_lossy().to_string(),
            settle_delay_ms: default_settle_delay_ms(),
            open_retry_delay_ms: default_open_retry_delay_ms(),
            backup: BackupSettings::default(),
        }
    }
}

impl Settings {
    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(&self.data_dir)
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir().join(DB_FILE_NAME)
    }

    pub fn backups_dir(&self) -> PathBuf {
        self.data_dir().join("backups")
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn open_retry_delay(&self) -> Duration {
        Duration::from_millis(self.open_retry_delay_ms)
    }
}

fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("goblin")
}

fn settings_path() -> PathBuf {
    config_dir().join("settings.json")
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Documents")
        .join("goblin")
}

pub fn load_settings() -> Settings {
    load_settings_from(&settings_path())
}

/// Missing or unreadable files fall back to defaults.
pub fn load_settings_from(path: &Path) -> Settings {
    if !path.exists() {
        return Settings::default();
    }
    match std::fs::read_to_string(path) {
        Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
            tracing::warn!("ignoring unreadable settings at {}: {e}", path.display());
            Settings::default()
        }),
        Err(e) => {
            tracing::warn!("could not read settings at {}: {e}", path.display());
            Settings::default()
        }
    }
}

pub fn save_settings(settings: &Settings) -> Result<()> {
    save_settings_to(settings, &settings_path())
}

pub fn save_settings_to(settings: &Settings, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let json = serde_json::to_string_pretty(settings)
        .map_err(|e| GoblinError::Settings(e.to_string()))?;
    std::fs::write(path, format!("{json}\n"))?;
    Ok(())
}

pub fn settings_file_exists() -> bool {
    settings_path().exists()
}

pub fn shellexpand_path(path: &str) -> String {
    if path.starts_with('~') {
        if let Some(home) = dirs::home_dir() {
            return path.replacen('~', &home.to_string_lossy(), 1);
        }
    }
    std::fs::canonicalize(path)
        .unwrap_or_else(|_| PathBuf::from(path))
        .to_string_lossy()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let mut settings = Settings {
            data_dir: "/tmp/goblin-test".to_string(),
            ..Settings::default()
        };
        settings.backup.enabled = true;
        settings.backup.frequency = BackupFrequency::Weekly;
        save_settings_to(&settings, &path).unwrap();

        let loaded = load_settings_from(&path);
        assert_eq!(loaded.data_dir, "/tmp/goblin-test");
        assert!(loaded.backup.enabled);
        assert_eq!(loaded.backup.frequency, BackupFrequency::Weekly);
    }

    #[test]
    fn test_load_returns_defaults_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let s = load_settings_from(&dir.path().join("nope.json"));
        assert_eq!(s.settle_delay_ms, 500);
        assert_eq!(s.open_retry_delay_ms, 1000);
        assert!(!s.backup.enabled);
        assert!(!s.data_dir.is_empty());
    }

    #[test]
    fn test_load_returns_defaults_when_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();
        let s = load_settings_from(&path);
        assert_eq!(s.backup.keep, 10);
    }

    #[test]
    fn test_load_merges_with_defaults() {
        let json = r#"{"data_dir": "/tmp/test", "backup": {"enabled": true}}"#;
        let s: Settings = serde_json::from_str(json).unwrap();
        assert_eq!(s.settle_delay_ms, 500);
        assert!(s.backup.enabled);
        assert_eq!(s.backup.frequency, BackupFrequency::Manual);
        assert_eq!(s.backup.keep, 10);
    }

    #[test]
    fn test_save_creates_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deep").join("nested").join("settings.json");
        save_settings_to(&Settings::default(), &path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_paths_derive_from_data_dir() {
        let s = Settings {
            data_dir: "/data/goblin".to_string(),
            ..Settings::default()
        };
        assert_eq!(s.db_path(), PathBuf::from("/data/goblin/goblin.db"));
        assert_eq!(s.backups_dir(), PathBuf::from("/data/goblin/backups"));
    }
}
