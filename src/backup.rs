use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Local, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::archive::build_archive;
use crate::error::{GoblinError, Result};
use crate::settings::Settings;

const BACKUP_PREFIX: &str = "goblin-backup-";
const LAST_BACKUP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupFrequency {
    #[default]
    Manual,
    AppClose,
    Daily,
    Weekly,
    Monthly,
}

impl BackupFrequency {
    fn min_days(&self) -> Option<i64> {
        match self {
            Self::Daily => Some(1),
            Self::Weekly => Some(7),
            Self::Monthly => Some(30),
            Self::Manual | Self::AppClose => None,
        }
    }
}

impl fmt::Display for BackupFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Manual => "manual",
            Self::AppClose => "app_close",
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
        };
        f.write_str(s)
    }
}

impl FromStr for BackupFrequency {
    type Err = GoblinError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "manual" => Ok(Self::Manual),
            "app_close" | "app-close" => Ok(Self::AppClose),
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            "monthly" => Ok(Self::Monthly),
            other => Err(GoblinError::Settings(format!(
                "Unknown backup frequency: {other} (manual, app_close, daily, weekly, monthly)"
            ))),
        }
    }
}

/// Whether an automatic backup should run now.
pub fn is_due(enabled: bool, frequency: BackupFrequency, last: Option<NaiveDateTime>, now: NaiveDateTime) -> bool {
    if !enabled {
        return false;
    }
    match frequency {
        BackupFrequency::Manual => false,
        BackupFrequency::AppClose => true,
        periodic => match (last, periodic.min_days()) {
            (None, _) => true,
            (Some(last), Some(days)) => (now - last).num_days() >= days,
            (Some(_), None) => false,
        },
    }
}

fn parse_last_backup(raw: Option<&str>) -> Option<NaiveDateTime> {
    let raw = raw?;
    NaiveDateTime::parse_from_str(raw, LAST_BACKUP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f"))
        .ok()
}

/// Write a timestamped archive into `backups_dir` and return its path.
pub fn create_backup_in(db_path: &Path, backups_dir: &Path, now: DateTime<Local>) -> Result<PathBuf> {
    if !db_path.exists() {
        return Err(GoblinError::NotFound(format!("database at {}", db_path.display())));
    }
    std::fs::create_dir_all(backups_dir)?;
    let file_name = format!("{BACKUP_PREFIX}{}.zip", now.format("%Y%m%d_%H%M%S"));
    let work = tempfile::tempdir()?;
    let archive = build_archive(db_path, work.path(), &file_name)?;
    let dest = backups_dir.join(&file_name);
    // A second backup within the same second must not replace the first.
    let mut out = match std::fs::OpenOptions::new().write(true).create_new(true).open(&dest) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            return Err(GoblinError::Other(format!(
                "A backup named {file_name} already exists; try again in a moment"
            )));
        }
        Err(e) => return Err(e.into()),
    };
    std::io::copy(&mut std::fs::File::open(&archive)?, &mut out)?;
    tracing::info!("backup written to {}", dest.display());
    Ok(dest)
}

/// Create a backup now, record it in `settings`, and prune old archives.
/// The caller is responsible for saving `settings`.
pub fn create_backup(settings: &mut Settings) -> Result<PathBuf> {
    let now = Local::now();
    let dest = create_backup_in(&settings.db_path(), &settings.backups_dir(), now)?;
    settings.backup.last_backup = Some(now.format(LAST_BACKUP_FORMAT).to_string());
    let removed = prune_backups(&settings.backups_dir(), settings.backup.keep)?;
    if removed > 0 {
        tracing::debug!("pruned {removed} old backups");
    }
    Ok(dest)
}

/// Back up only when the configured schedule says so.
pub fn run_if_due(settings: &mut Settings) -> Result<Option<PathBuf>> {
    let last = parse_last_backup(settings.backup.last_backup.as_deref());
    let now = Local::now().naive_local();
    if !is_due(settings.backup.enabled, settings.backup.frequency, last, now) {
        tracing::debug!("backup not due (frequency {})", settings.backup.frequency);
        return Ok(None);
    }
    create_backup(settings).map(Some)
}

pub fn list_backups(backups_dir: &Path) -> Result<Vec<PathBuf>> {
    if !backups_dir.exists() {
        return Ok(Vec::new());
    }
    let mut backups: Vec<PathBuf> = std::fs::read_dir(backups_dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(BACKUP_PREFIX) && n.ends_with(".zip"))
        })
        .collect();
    // Timestamped names sort chronologically.
    backups.sort();
    Ok(backups)
}

/// Delete the oldest backups beyond `keep`. `keep == 0` keeps everything.
pub fn prune_backups(backups_dir: &Path, keep: usize) -> Result<usize> {
    if keep == 0 {
        return Ok(0);
    }
    let backups = list_backups(backups_dir)?;
    let excess = backups.len().saturating_sub(keep);
    for old in &backups[..excess] {
        std::fs::remove_file(old)?;
    }
    Ok(excess)
}
