use std::path::Path;
use std::time::Duration;

use rusqlite::{Connection, OpenFlags};

use crate::error::Result;
use crate::models::{TxnType, NO_CATEGORY};

pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS categories (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    type TEXT NOT NULL CHECK(type IN ('income', 'expense')),
    is_system INTEGER NOT NULL DEFAULT 0,
    UNIQUE(name, type)
);

CREATE TABLE IF NOT EXISTS transactions (
    id INTEGER PRIMARY KEY,
    type TEXT NOT NULL CHECK(type IN ('income', 'expense')),
    amount REAL NOT NULL,
    date TEXT NOT NULL,
    category_id INTEGER NOT NULL,
    tag TEXT,
    FOREIGN KEY (category_id) REFERENCES categories(id)
);

CREATE INDEX IF NOT EXISTS idx_transactions_date ON transactions(date);
";

const DEFAULT_INCOME_CATEGORIES: &[&str] = &["Paycheck", "Freelance", "Investment", "Gift", "Other Income"];

const DEFAULT_EXPENSE_CATEGORIES: &[&str] = &[
    "Grocery",
    "Housing",
    "Transportation",
    "Utilities",
    "Entertainment",
    "Dining",
    "Healthcare",
    "Education",
    "Shopping",
    "Bills",
    "Gas",
    "Other Expense",
];

pub fn get_connection(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)?;
    conn.execute_batch("PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

/// Open a store that must already exist. Unlike [`get_connection`] this never
/// creates an empty file at `db_path`.
pub fn get_existing_connection(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open_with_flags(
        db_path,
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    conn.execute_batch("PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

/// Open a store without any write capability. Used for merge sources, which
/// may be files the user still references elsewhere.
pub fn get_readonly_connection(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open_with_flags(
        db_path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    Ok(conn)
}

/// Fixed back-off retry for transient busy/locked conditions.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    /// Run `op` until it succeeds, fails with a non-transient error, or the
    /// attempts run out. The last error is returned.
    pub fn run<T>(&self, mut op: impl FnMut() -> Result<T>) -> Result<T> {
        let mut attempt = 1;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(e) if e.is_busy() && attempt < self.attempts => {
                    tracing::warn!(
                        "store busy (attempt {attempt}/{}), retrying in {:?}",
                        self.attempts,
                        self.delay
                    );
                    std::thread::sleep(self.delay);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;

    for txn_type in TxnType::ALL {
        conn.execute(
            "INSERT OR IGNORE INTO categories (name, type, is_system) VALUES (?1, ?2, 1)",
            rusqlite::params![NO_CATEGORY, txn_type],
        )?;
    }
    for name in DEFAULT_INCOME_CATEGORIES {
        conn.execute(
            "INSERT OR IGNORE INTO categories (name, type, is_system) VALUES (?1, 'income', 0)",
            [name],
        )?;
    }
    for name in DEFAULT_EXPENSE_CATEGORIES {
        conn.execute(
            "INSERT OR IGNORE INTO categories (name, type, is_system) VALUES (?1, 'expense', 0)",
            [name],
        )?;
    }
    Ok(())
}
