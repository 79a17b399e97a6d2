use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use rusqlite::backup::Backup;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::db::get_connection;
use crate::error::{GoblinError, Result};
use crate::store::{transaction_counts, TransactionCount};

pub const DB_ENTRY: &str = "goblin.db";
pub const METADATA_ENTRY: &str = "metadata.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    pub export_date: String,
    pub app_version: String,
    #[serde(default)]
    pub transaction_count: Option<TransactionCount>,
}

impl Metadata {
    pub fn for_store(conn: &Connection) -> Result<Self> {
        Ok(Self {
            export_date: chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.6f").to_string(),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            transaction_count: Some(transaction_counts(conn)?),
        })
    }
}

/// Write a finished archive for the store at `db_path` into `work_dir` and
/// return its path. The store is snapshotted with SQLite's backup API so the
/// copy is consistent even while a connection is open.
pub fn build_archive(db_path: &Path, work_dir: &Path, file_name: &str) -> Result<PathBuf> {
    let conn = get_connection(db_path)?;
    let metadata = Metadata::for_store(&conn)?;

    let snapshot = work_dir.join(DB_ENTRY);
    {
        let mut dest = Connection::open(&snapshot)?;
        let backup = Backup::new(&conn, &mut dest)?;
        backup.run_to_completion(100, std::time::Duration::from_millis(10), None)?;
    }
    drop(conn);

    let archive_path = work_dir.join(file_name);
    let file = File::create(&archive_path)?;
    let mut zip = ZipWriter::new(BufWriter::new(file));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    zip.start_file(DB_ENTRY, options)?;
    let mut snapshot_file = BufReader::new(File::open(&snapshot)?);
    std::io::copy(&mut snapshot_file, &mut zip)?;

    zip.start_file(METADATA_ENTRY, options)?;
    let json = serde_json::to_string_pretty(&metadata)?;
    zip.write_all(json.as_bytes())?;

    let mut writer = zip.finish()?;
    writer.flush()?;
    tracing::debug!(
        "assembled archive {} ({} transactions)",
        archive_path.display(),
        metadata.transaction_count.unwrap_or_default().total
    );
    Ok(archive_path)
}

/// An archive unpacked into a private temporary directory. The directory is
/// removed when this value is dropped.
pub struct ExtractedArchive {
    _dir: tempfile::TempDir,
    pub db_path: PathBuf,
    pub metadata: Metadata,
}

/// Check that both entries are present and unpack them. Nothing outside the
/// temporary directory is touched.
pub fn extract_archive(archive_path: &Path) -> Result<ExtractedArchive> {
    let file = File::open(archive_path)?;
    let mut zip = ZipArchive::new(BufReader::new(file))
        .map_err(|e| GoblinError::InvalidArchive(format!("not a zip archive ({e})")))?;

    let has_entry = |zip: &ZipArchive<BufReader<File>>, name: &str| zip.file_names().any(|n| n == name);
    if !has_entry(&zip, DB_ENTRY) {
        return Err(GoblinError::InvalidArchive("Missing database".into()));
    }
    if !has_entry(&zip, METADATA_ENTRY) {
        return Err(GoblinError::InvalidArchive("Missing metadata".into()));
    }

    let dir = tempfile::tempdir()?;
    let db_path = dir.path().join(DB_ENTRY);
    {
        let mut entry = zip.by_name(DB_ENTRY).map_err(entry_error)?;
        let mut out = File::create(&db_path)?;
        std::io::copy(&mut entry, &mut out)?;
        out.sync_all()?;
    }

    let metadata: Metadata = {
        let entry = zip.by_name(METADATA_ENTRY).map_err(entry_error)?;
        serde_json::from_reader(entry)
            .map_err(|e| GoblinError::InvalidArchive(format!("Unreadable metadata ({e})")))?
    };

    Ok(ExtractedArchive {
        _dir: dir,
        db_path,
        metadata,
    })
}

fn entry_error(e: ZipError) -> GoblinError {
    match e {
        ZipError::FileNotFound => GoblinError::InvalidArchive("Missing entry".into()),
        other => GoblinError::Zip(other),
    }
}
