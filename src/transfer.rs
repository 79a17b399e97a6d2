use std::fmt;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::archive::{build_archive, extract_archive, ExtractedArchive};
use crate::db::RetryPolicy;
use crate::error::Result;
use crate::merger::merge_databases;
use crate::settings::Settings;

/// What the caller sees: a success flag plus a message fit for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub success: bool,
    /// Set when nothing was attempted because the user backed out.
    pub cancelled: bool,
    pub message: String,
    /// For failures that touched the live store: whether it was put back.
    pub rolled_back: Option<bool>,
}

impl Outcome {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            cancelled: false,
            message: message.into(),
            rolled_back: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            cancelled: false,
            message: message.into(),
            rolled_back: None,
        }
    }

    pub fn failed_after_rollback(message: impl Into<String>, rolled_back: bool) -> Self {
        Self {
            rolled_back: Some(rolled_back),
            ..Self::failed(message)
        }
    }

    /// Nothing was chosen or the user declined. Not an error; nothing changed.
    pub fn cancelled(message: impl Into<String>) -> Self {
        Self {
            cancelled: true,
            ..Self::failed(message)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportMode {
    Merge,
    Replace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportStage {
    Idle,
    Validating,
    Merging,
    BackingUp,
    Replacing,
    Done,
    Failed,
}

impl fmt::Display for ImportStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Validating => "validating",
            Self::Merging => "merging",
            Self::BackingUp => "backing up",
            Self::Replacing => "replacing",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Timing knobs for import; taken from [`Settings`] in normal use.
#[derive(Debug, Clone, Copy)]
pub struct ImportOptions {
    pub settle_delay: Duration,
    pub retry: RetryPolicy,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(500),
            retry: RetryPolicy::default(),
        }
    }
}

impl From<&Settings> for ImportOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            settle_delay: settings.settle_delay(),
            retry: RetryPolicy::with_delay(settings.open_retry_delay()),
        }
    }
}

/// Why a replace-mode import failed and what happened to the live store.
#[derive(Debug)]
pub struct ReplaceFailure {
    pub error: io::Error,
    /// `Ok` when the pre-import backup was put back, `Err` when that failed too.
    pub restore: std::result::Result<(), io::Error>,
    /// `None` when there was no live store to back up.
    pub backup_path: Option<PathBuf>,
}

impl ReplaceFailure {
    pub fn rolled_back(&self) -> bool {
        self.restore.is_ok()
    }

    pub fn message(&self) -> String {
        match (&self.restore, &self.backup_path) {
            (Ok(()), _) => format!("Import failed: {}", self.error),
            (Err(restore_err), Some(backup)) => format!(
                "Import failed: {}\nAlso failed to restore backup: {restore_err}\nYour previous data is in {}",
                self.error,
                backup.display()
            ),
            (Err(cleanup_err), None) => format!(
                "Import failed: {}\nAlso failed to remove the partially copied store: {cleanup_err}",
                self.error
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// Export
// ---------------------------------------------------------------------------

/// Package the store at `db_path` into a zip archive at `destination`. The
/// archive is assembled in a private temporary directory; the destination is
/// only written once the archive is complete.
pub fn export(db_path: &Path, destination: &Path) -> Outcome {
    match try_export(db_path, destination) {
        Ok(()) => {
            tracing::info!("exported {} to {}", db_path.display(), destination.display());
            Outcome::ok(format!("Successfully exported to {}", destination.display()))
        }
        Err(e) => {
            tracing::warn!("export failed: {e}");
            Outcome::failed(format!("Export failed: {e}"))
        }
    }
}

fn try_export(db_path: &Path, destination: &Path) -> Result<()> {
    if !db_path.exists() {
        return Err(io::Error::new(ErrorKind::NotFound, format!("no database at {}", db_path.display())).into());
    }
    let work = tempfile::tempdir()?;
    let archive = build_archive(db_path, work.path(), "export.zip")?;

    if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    // Stage next to the destination so the final step is a rename.
    let staging = destination.with_extension("zip.partial");
    let placed = std::fs::copy(&archive, &staging).and_then(|_| std::fs::rename(&staging, destination));
    if let Err(e) = placed {
        let _ = std::fs::remove_file(&staging);
        return Err(e.into());
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Import
// ---------------------------------------------------------------------------

fn enter(stage: &mut ImportStage, next: ImportStage) {
    tracing::debug!("import: {stage} -> {next}");
    *stage = next;
}

/// Restore from an exported archive into the store at `db_path`, either by
/// merging its transactions or by replacing the store outright.
pub fn import(db_path: &Path, archive_path: &Path, mode: ImportMode, options: &ImportOptions) -> Outcome {
    import_with(db_path, archive_path, mode, options, copy_file)
}

/// Same as [`import`], with the replace-mode file copy supplied by the caller.
pub fn import_with<F>(
    db_path: &Path,
    archive_path: &Path,
    mode: ImportMode,
    options: &ImportOptions,
    copier: F,
) -> Outcome
where
    F: Fn(&Path, &Path) -> io::Result<()>,
{
    let mut stage = ImportStage::Idle;
    enter(&mut stage, ImportStage::Validating);
    let extracted = match extract_archive(archive_path) {
        Ok(extracted) => extracted,
        Err(e) => {
            enter(&mut stage, ImportStage::Failed);
            return Outcome::failed(e.to_string());
        }
    };

    let outcome = match mode {
        ImportMode::Merge if !db_path.exists() => Outcome::failed(format!(
            "Import failed: no database at {} to merge into. Run `goblin init` first.",
            db_path.display()
        )),
        ImportMode::Merge => {
            enter(&mut stage, ImportStage::Merging);
            match merge_databases(db_path, &extracted.db_path, &options.retry) {
                Ok(result) => Outcome::ok(format!(
                    "Successfully imported and merged {} transactions. {} duplicate transactions were skipped.",
                    result.imported, result.skipped
                )),
                // The merge runs in one transaction, so a failure leaves the store as it was.
                Err(e) => Outcome::failed_after_rollback(format!("Import failed: {e}"), true),
            }
        }
        ImportMode::Replace => replace(db_path, &extracted, options, &mut stage, copier),
    };

    enter(&mut stage, if outcome.success { ImportStage::Done } else { ImportStage::Failed });
    if outcome.success {
        tracing::info!("{}", outcome.message);
    } else {
        tracing::warn!("{}", outcome.message);
    }
    outcome
}

fn replace<F>(
    db_path: &Path,
    extracted: &ExtractedArchive,
    options: &ImportOptions,
    stage: &mut ImportStage,
    copier: F,
) -> Outcome
where
    F: Fn(&Path, &Path) -> io::Result<()>,
{
    enter(stage, ImportStage::BackingUp);
    // Only a backup taken by this call may be restored; an older `.backup`
    // left beside a missing store is not its pre-import state.
    let backup_path = if db_path.exists() {
        let path = backup_path_for(db_path);
        if let Err(e) = std::fs::copy(db_path, &path) {
            return Outcome::failed(format!("Import failed: could not back up current data: {e}"));
        }
        Some(path)
    } else {
        None
    };

    enter(stage, ImportStage::Replacing);
    std::thread::sleep(options.settle_delay);
    match replace_database(db_path, &extracted.db_path, backup_path.as_deref(), copier) {
        Ok(()) => {
            let total = extracted
                .metadata
                .transaction_count
                .map(|c| c.total.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            Outcome::ok(format!("Successfully imported {total} transactions"))
        }
        Err(failure) => {
            tracing::warn!("replace failed, rolled back: {}", failure.rolled_back());
            Outcome::failed_after_rollback(failure.message(), failure.rolled_back())
        }
    }
}

pub fn backup_path_for(db_path: &Path) -> PathBuf {
    let mut name = db_path.as_os_str().to_os_string();
    name.push(".backup");
    PathBuf::from(name)
}

/// Overwrite `live` with `incoming`. On failure the copy at `backup` is put
/// back over `live`, or with no backup the partial file is removed.
pub fn replace_database<F>(
    live: &Path,
    incoming: &Path,
    backup: Option<&Path>,
    copier: F,
) -> std::result::Result<(), ReplaceFailure>
where
    F: Fn(&Path, &Path) -> io::Result<()>,
{
    let result = remove_sidecars(live).and_then(|_| copier(incoming, live));
    let Err(error) = result else {
        return Ok(());
    };

    let restore = match backup {
        Some(backup) => std::fs::copy(backup, live).map(|_| ()),
        // There was no live store before the import; leave nothing half-written.
        None => match std::fs::remove_file(live) {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        },
    };
    Err(ReplaceFailure {
        error,
        restore,
        backup_path: backup.map(Path::to_path_buf),
    })
}

/// Journal files left by a previous connection would be replayed onto the
/// new store.
fn remove_sidecars(live: &Path) -> io::Result<()> {
    for suffix in ["-wal", "-shm", "-journal"] {
        let mut name = live.as_os_str().to_os_string();
        name.push(suffix);
        match std::fs::remove_file(PathBuf::from(name)) {
            Err(e) if e.kind() != ErrorKind::NotFound => return Err(e),
            _ => {}
        }
    }
    Ok(())
}

/// Standard copy, falling back to a manual byte stream when the platform
/// still refuses the destination with a permission error.
pub fn copy_file(from: &Path, to: &Path) -> io::Result<()> {
    copy_or_stream(from, to, |from, to| std::fs::copy(from, to).map(|_| ()))
}

fn copy_or_stream<C>(from: &Path, to: &Path, copy: C) -> io::Result<()>
where
    C: FnOnce(&Path, &Path) -> io::Result<()>,
{
    match copy(from, to) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::PermissionDenied => {
            tracing::warn!("copy to {} refused ({e}), streaming bytes instead", to.display());
            stream_copy(from, to)
        }
        Err(e) => Err(e),
    }
}

fn stream_copy(from: &Path, to: &Path) -> io::Result<()> {
    let mut src = std::fs::File::open(from)?;
    let mut dst = std::fs::OpenOptions::new().write(true).truncate(true).create(true).open(to)?;
    io::copy(&mut src, &mut dst)?;
    dst.sync_all()
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::db::{get_connection, init_db};
    use crate::models::TxnType;
    use crate::store::{add_transaction, list_transactions, TransactionFilter};

    fn fast() -> ImportOptions {
        ImportOptions {
            settle_delay: Duration::from_millis(1),
            retry: RetryPolicy::with_delay(Duration::from_millis(1)),
        }
    }

    fn store_with(path: &Path, rows: &[(TxnType, f64, &str, &str, Option<&str>)]) {
        let conn = get_connection(path).unwrap();
        init_db(&conn).unwrap();
        for (t, amount, date, cat, tag) in rows {
            add_transaction(&conn, *t, *amount, date, cat, *tag).unwrap();
        }
    }

    fn count(path: &Path) -> i64 {
        let conn = get_connection(path).unwrap();
        conn.query_row("SELECT count(*) FROM transactions", [], |r| r.get(0)).unwrap()
    }

    #[test]
    fn test_export_writes_destination() {
        let dir = tempfile::tempdir().unwrap();
        let live = dir.path().join("goblin.db");
        store_with(&live, &[(TxnType::Income, 10.0, "2024-01-01", "Gift", None)]);
        let dest = dir.path().join("nested").join("export.zip");

        let outcome = export(&live, &dest);
        assert!(outcome.success, "{}", outcome.message);
        assert!(outcome.message.contains("export.zip"));
        assert!(dest.exists());
        assert!(!dest.with_extension("zip.partial").exists());
    }

    #[test]
    fn test_export_failure_leaves_no_destination() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("export.zip");
        let outcome = export(&dir.path().join("missing.db"), &dest);
        assert!(!outcome.success);
        assert!(outcome.message.starts_with("Export failed:"));
        assert!(!dest.exists());
    }

    #[test]
    fn test_import_merge_reports_counts() {
        let dir = tempfile::tempdir().unwrap();
        let live = dir.path().join("goblin.db");
        let other = dir.path().join("other.db");
        store_with(&live, &[(TxnType::Expense, 50.0, "2024-01-05", "Dining", None)]);
        store_with(
            &other,
            &[
                (TxnType::Expense, 50.0, "2024-01-05", "Dining", Some("lunch")),
                (TxnType::Income, 20.0, "2024-02-01", "Gift", None),
            ],
        );
        let archive = dir.path().join("other.zip");
        assert!(export(&other, &archive).success);

        let outcome = import(&live, &archive, ImportMode::Merge, &fast());
        assert_eq!(
            outcome,
            Outcome::ok("Successfully imported and merged 1 transactions. 1 duplicate transactions were skipped.")
        );
        assert_eq!(count(&live), 2);
    }

    #[test]
    fn test_import_replace_overwrites_store() {
        let dir = tempfile::tempdir().unwrap();
        let live = dir.path().join("goblin.db");
        let other = dir.path().join("other.db");
        store_with(&live, &[(TxnType::Expense, 1.0, "2024-01-01", "Gas", None)]);
        store_with(
            &other,
            &[
                (TxnType::Income, 5.0, "2024-03-01", "Gift", None),
                (TxnType::Income, 6.0, "2024-03-02", "Gift", None),
            ],
        );
        let archive = dir.path().join("other.zip");
        assert!(export(&other, &archive).success);

        let outcome = import(&live, &archive, ImportMode::Replace, &fast());
        assert_eq!(outcome, Outcome::ok("Successfully imported 2 transactions"));
        let conn = get_connection(&live).unwrap();
        let rows = list_transactions(&conn, &TransactionFilter::default()).unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|t| t.category_name == "Gift"));
        assert!(backup_path_for(&live).exists());
    }

    #[test]
    fn test_replace_failure_restores_byte_identical_store() {
        let dir = tempfile::tempdir().unwrap();
        let live = dir.path().join("goblin.db");
        let other = dir.path().join("other.db");
        store_with(&live, &[(TxnType::Expense, 1.0, "2024-01-01", "Gas", Some("fill-up"))]);
        store_with(&other, &[(TxnType::Income, 5.0, "2024-03-01", "Gift", None)]);
        let archive = dir.path().join("other.zip");
        assert!(export(&other, &archive).success);
        let before = std::fs::read(&live).unwrap();

        // Write half of the incoming file, then fail.
        let half_copy = |from: &Path, to: &Path| -> io::Result<()> {
            let bytes = std::fs::read(from)?;
            let mut out = std::fs::File::create(to)?;
            out.write_all(&bytes[..bytes.len() / 2])?;
            Err(io::Error::new(ErrorKind::Other, "disk went away"))
        };
        let outcome = import_with(&live, &archive, ImportMode::Replace, &fast(), half_copy);

        assert!(!outcome.success);
        assert_eq!(outcome.message, "Import failed: disk went away");
        assert_eq!(outcome.rolled_back, Some(true));
        assert_eq!(std::fs::read(&live).unwrap(), before);
    }

    #[test]
    fn test_replace_ignores_stale_backup_when_store_missing() {
        let dir = tempfile::tempdir().unwrap();
        let live = dir.path().join("goblin.db");
        let other = dir.path().join("other.db");
        store_with(&other, &[(TxnType::Income, 5.0, "2024-03-01", "Gift", None)]);
        let archive = dir.path().join("other.zip");
        assert!(export(&other, &archive).success);
        std::fs::write(backup_path_for(&live), b"STALE OLD DATA").unwrap();

        let outcome = import_with(&live, &archive, ImportMode::Replace, &fast(), |_, _| {
            Err(io::Error::new(ErrorKind::Other, "boom"))
        });

        assert_eq!(outcome, Outcome::failed_after_rollback("Import failed: boom", true));
        assert!(!live.exists());
        assert_eq!(std::fs::read(backup_path_for(&live)).unwrap(), b"STALE OLD DATA");
    }

    #[test]
    fn test_merge_into_missing_store_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let live = dir.path().join("goblin.db");
        let other = dir.path().join("other.db");
        store_with(&other, &[(TxnType::Income, 5.0, "2024-03-01", "Gift", None)]);
        let archive = dir.path().join("other.zip");
        assert!(export(&other, &archive).success);

        let outcome = import(&live, &archive, ImportMode::Merge, &fast());
        assert!(!outcome.success);
        assert!(outcome.message.contains("goblin init"));
        assert_eq!(outcome.rolled_back, None);
        assert!(!live.exists());
    }

    #[test]
    fn test_cancelled_is_distinct_from_failed() {
        let cancelled = Outcome::cancelled("Import cancelled");
        assert!(!cancelled.success);
        assert!(cancelled.cancelled);
        assert_ne!(cancelled, Outcome::failed("Import cancelled"));
        assert!(!Outcome::failed("Import cancelled").cancelled);
    }

    #[test]
    fn test_replace_reports_failed_restore() {
        let dir = tempfile::tempdir().unwrap();
        let live = dir.path().join("goblin.db");
        let incoming = dir.path().join("incoming.db");
        std::fs::write(&live, b"live").unwrap();
        std::fs::write(&incoming, b"incoming").unwrap();
        // A directory where the backup file should be makes the restore fail.
        let backup = dir.path().join("backup-dir");
        std::fs::create_dir(&backup).unwrap();

        let failure = replace_database(&live, &incoming, Some(backup.as_path()), |_, _| {
            Err(io::Error::new(ErrorKind::Other, "copy failed"))
        })
        .unwrap_err();
        assert!(!failure.rolled_back());
        let message = failure.message();
        assert!(message.starts_with("Import failed: copy failed"));
        assert!(message.contains("Also failed to restore backup"));
    }

    #[test]
    fn test_import_rejects_malformed_archive_without_mutation() {
        let dir = tempfile::tempdir().unwrap();
        let live = dir.path().join("goblin.db");
        store_with(&live, &[(TxnType::Expense, 1.0, "2024-01-01", "Gas", None)]);
        let before = std::fs::read(&live).unwrap();

        let archive = dir.path().join("bad.zip");
        let mut zip = zip::ZipWriter::new(std::fs::File::create(&archive).unwrap());
        zip.start_file("metadata.json", zip::write::SimpleFileOptions::default()).unwrap();
        zip.write_all(b"{}").unwrap();
        zip.finish().unwrap();

        for mode in [ImportMode::Merge, ImportMode::Replace] {
            let outcome = import(&live, &archive, mode, &fast());
            assert_eq!(outcome, Outcome::failed("Invalid export file: Missing database"));
        }
        assert_eq!(std::fs::read(&live).unwrap(), before);
        assert!(!backup_path_for(&live).exists());
    }

    #[test]
    fn test_merge_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let live = dir.path().join("goblin.db");
        let other = dir.path().join("other.db");
        store_with(&live, &[]);
        store_with(&other, &[(TxnType::Income, 5.0, "2024-03-01", "Gift", None)]);
        let archive = dir.path().join("other.zip");
        assert!(export(&other, &archive).success);
        get_connection(&live)
            .unwrap()
            .execute_batch(
                "CREATE TRIGGER no_inserts BEFORE INSERT ON transactions \
                 BEGIN SELECT RAISE(ABORT, 'read only today'); END;",
            )
            .unwrap();

        let outcome = import(&live, &archive, ImportMode::Merge, &fast());
        assert!(!outcome.success);
        assert!(outcome.message.starts_with("Import failed:"));
        assert!(outcome.message.contains("read only today"));
        assert_eq!(outcome.rolled_back, Some(true));
        assert_eq!(count(&live), 0);
    }

    #[test]
    fn test_copy_file_copies_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let from = dir.path().join("a");
        let to = dir.path().join("b");
        std::fs::write(&from, b"abc").unwrap();
        std::fs::write(&to, b"something longer").unwrap();
        copy_file(&from, &to).unwrap();
        assert_eq!(std::fs::read(&to).unwrap(), b"abc");
        stream_copy(&from, &to).unwrap();
        assert_eq!(std::fs::read(&to).unwrap(), b"abc");
    }

    #[test]
    fn test_copy_falls_back_to_stream_on_permission_denied() {
        let dir = tempfile::tempdir().unwrap();
        let from = dir.path().join("a");
        let to = dir.path().join("b");
        std::fs::write(&from, b"incoming bytes").unwrap();
        std::fs::write(&to, b"old").unwrap();

        copy_or_stream(&from, &to, |_, _| Err(io::Error::new(ErrorKind::PermissionDenied, "locked"))).unwrap();
        assert_eq!(std::fs::read(&to).unwrap(), b"incoming bytes");
    }

    #[test]
    fn test_copy_does_not_stream_on_other_errors() {
        let dir = tempfile::tempdir().unwrap();
        let from = dir.path().join("a");
        let to = dir.path().join("b");
        std::fs::write(&from, b"incoming bytes").unwrap();
        std::fs::write(&to, b"old").unwrap();

        let err = copy_or_stream(&from, &to, |_, _| Err(io::Error::new(ErrorKind::Other, "disk full"))).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Other);
        assert_eq!(std::fs::read(&to).unwrap(), b"old");
    }

    #[test]
    fn test_backup_path_appends_suffix() {
        assert_eq!(
            backup_path_for(Path::new("/data/goblin.db")),
            PathBuf::from("/data/goblin.db.backup")
        );
    }
}
