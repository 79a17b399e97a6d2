pub mod backup;
pub mod categories;
pub mod export;
pub mod import;
pub mod init;
pub mod status;
pub mod summary;
pub mod transactions;

use clap::{Parser, Subcommand};
use rusqlite::Connection;

use crate::db::get_connection;
use crate::error::{GoblinError, Result};
use crate::models::TxnType;
use crate::settings::Settings;
use crate::store::TransactionFilter;

/// Turn `--month YYYY-MM` / `--year YYYY` into a filter. An explicit year
/// wins over the year in the month string.
pub(crate) fn build_filter(month: Option<&str>, year: Option<i32>, limit: Option<usize>) -> Result<TransactionFilter> {
    let (month_year, month_num) = match month {
        Some(m) => {
            let (y, mm) = m
                .split_once('-')
                .ok_or_else(|| GoblinError::Other(format!("Invalid month: {m} (expected YYYY-MM)")))?;
            let y: i32 = y
                .parse()
                .map_err(|_| GoblinError::Other(format!("Invalid month: {m} (expected YYYY-MM)")))?;
            let mm: u32 = mm
                .parse()
                .ok()
                .filter(|mm| (1..=12).contains(mm))
                .ok_or_else(|| GoblinError::Other(format!("Invalid month: {m} (expected YYYY-MM)")))?;
            (Some(y), Some(mm))
        }
        None => (None, None),
    };
    Ok(TransactionFilter {
        year: year.or(month_year),
        month: month_num,
        limit,
    })
}

pub(crate) fn open_store(settings: &Settings) -> Result<Connection> {
    let db_path = settings.db_path();
    if !db_path.exists() {
        return Err(GoblinError::Settings(format!(
            "No database found at {}\nRun `goblin init` to create one.",
            db_path.display()
        )));
    }
    get_connection(&db_path)
}

/// Ask a yes/no question on stdin. Anything but an explicit yes is a no.
pub(crate) fn confirm(prompt: &str) -> bool {
    println!("{prompt} [y/N]: ");
    let mut input = String::new();
    if std::io::stdin().read_line(&mut input).is_err() {
        return false;
    }
    matches!(input.trim().to_lowercase().as_str(), "y" | "yes")
}

#[derive(Parser)]
#[command(name = "goblin", about = "Track income and expenses; back up and restore your ledger.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Set up Goblin: choose a data directory and initialize the database.
    Init {
        /// Path for Goblin data (default: ~/Documents/goblin)
        #[arg(long = "data-dir")]
        data_dir: Option<String>,
    },
    /// Record a transaction.
    Add {
        /// income or expense
        #[arg(value_parser = parse_txn_type)]
        txn_type: TxnType,
        /// Amount (sign is ignored)
        #[arg(allow_hyphen_values = true)]
        amount: f64,
        /// Category name; created if it does not exist
        #[arg(long)]
        category: String,
        /// Date: YYYY-MM-DD (default: today)
        #[arg(long)]
        date: Option<String>,
        /// Optional short tag
        #[arg(long)]
        tag: Option<String>,
    },
    /// List transactions, newest first.
    List {
        /// Month filter: YYYY-MM
        #[arg(long)]
        month: Option<String>,
        /// Year filter: YYYY
        #[arg(long)]
        year: Option<i32>,
        /// Maximum rows to show
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Edit a transaction in place.
    Edit {
        /// Transaction ID (shown in `goblin list`)
        id: i64,
        #[arg(long, allow_hyphen_values = true)]
        amount: Option<f64>,
        #[arg(long)]
        date: Option<String>,
        /// Existing category of the same type
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        tag: Option<String>,
        /// Remove the tag
        #[arg(long = "clear-tag", conflicts_with = "tag")]
        clear_tag: bool,
    },
    /// Delete a transaction.
    Delete {
        /// Transaction ID (shown in `goblin list`)
        id: i64,
    },
    /// Manage categories.
    Categories {
        #[command(subcommand)]
        command: CategoriesCommands,
    },
    /// Income, expense and net by category.
    Summary {
        #[arg(long)]
        month: Option<String>,
        #[arg(long)]
        year: Option<i32>,
    },
    /// Export all data to a zip archive.
    Export {
        /// Output path (default: ~/Goblin_Export.zip)
        #[arg(long)]
        output: Option<String>,
        /// Overwrite an existing file without asking
        #[arg(long, short = 'y')]
        yes: bool,
    },
    /// Import data from an exported archive (merges by default).
    Import {
        /// Path to a Goblin export archive
        file: String,
        /// Replace current data instead of merging
        #[arg(long)]
        replace: bool,
        /// Skip the confirmation prompt
        #[arg(long, short = 'y')]
        yes: bool,
    },
    /// Write a backup archive to <data_dir>/backups.
    Backup {
        /// Only back up when the configured schedule says one is due
        #[arg(long)]
        auto: bool,
    },
    /// Show current database and summary statistics.
    Status,
}

#[derive(Subcommand)]
pub enum CategoriesCommands {
    /// List all categories.
    List,
    /// Add a category.
    Add {
        name: String,
        /// income or expense
        #[arg(long = "type", value_parser = parse_txn_type)]
        txn_type: TxnType,
    },
    /// Rename a category.
    Rename {
        /// Category ID (shown in `goblin categories list`)
        id: i64,
        new_name: String,
    },
    /// Delete a category; its transactions move to {NO_CATEGORY}.
    Delete {
        /// Category ID (shown in `goblin categories list`)
        id: i64,
    },
}

fn parse_txn_type(s: &str) -> std::result::Result<TxnType, String> {
    s.parse().map_err(|e: GoblinError| e.to_string())
}
