use thiserror::Error;

#[derive(Error, Debug)]
pub enum GoblinError {
    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid export file: {0}")]
    InvalidArchive(String),

    #[error("Unknown category: {0}")]
    UnknownCategory(String),

    #[error("System category cannot be changed: {0}")]
    CategoryLocked(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Merge failed while {context}: {source}")]
    Merge {
        context: String,
        #[source]
        source: Box<GoblinError>,
    },

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("{0}")]
    Other(String),
}

impl GoblinError {
    /// Wrap an error raised inside a merge with what the merge was doing.
    pub fn merge(context: impl Into<String>, source: impl Into<GoblinError>) -> Self {
        Self::Merge {
            context: context.into(),
            source: Box::new(source.into()),
        }
    }

    /// True for SQLite's transient "database is busy/locked" conditions.
    pub fn is_busy(&self) -> bool {
        match self {
            Self::Db(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, GoblinError>;
