use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::error::{GoblinError, Result};
use crate::models::{Category, Transaction, TxnType, NO_CATEGORY};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionCount {
    #[serde(default)]
    pub total: i64,
    #[serde(default)]
    pub income: i64,
    #[serde(default)]
    pub expense: i64,
}

#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub limit: Option<usize>,
}

impl TransactionFilter {
    /// SQL `WHERE` fragment over a `transactions t` alias plus its parameters.
    pub(crate) fn where_clause(&self) -> (String, Vec<String>) {
        let mut clauses = Vec::new();
        let mut params = Vec::new();
        if let Some(m) = self.month {
            clauses.push("strftime('%m', t.date) = ?");
            params.push(format!("{m:02}"));
        }
        if let Some(y) = self.year {
            clauses.push("strftime('%Y', t.date) = ?");
            params.push(format!("{y:04}"));
        }
        if clauses.is_empty() {
            (String::new(), params)
        } else {
            (format!(" WHERE {}", clauses.join(" AND ")), params)
        }
    }
}

/// Fields to change on an existing transaction; `None` leaves a field alone.
#[derive(Debug, Clone, Default)]
pub struct TransactionUpdate {
    pub amount: Option<f64>,
    pub date: Option<String>,
    pub category: Option<String>,
    pub tag: Option<Option<String>>,
}

pub fn parse_date(raw: &str) -> Result<String> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%m-%d-%Y"))
        .map(|d| d.format("%Y-%m-%d").to_string())
        .map_err(|_| GoblinError::Other(format!("Invalid date: {raw} (expected YYYY-MM-DD)")))
}

fn normalize_amount(amount: f64) -> Result<f64> {
    if !amount.is_finite() || amount == 0.0 {
        return Err(GoblinError::Other(format!("Invalid amount: {amount}")));
    }
    Ok(amount.abs())
}

// ---------------------------------------------------------------------------
// Categories
// ---------------------------------------------------------------------------

fn row_to_category(row: &rusqlite::Row) -> rusqlite::Result<Category> {
    Ok(Category {
        id: row.get(0)?,
        name: row.get(1)?,
        txn_type: row.get(2)?,
        is_system: row.get(3)?,
    })
}

pub fn list_categories(conn: &Connection) -> Result<Vec<Category>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, type, is_system FROM categories \
         ORDER BY CASE type WHEN 'income' THEN 0 ELSE 1 END, is_system DESC, name ASC",
    )?;
    let categories = stmt
        .query_map([], row_to_category)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(categories)
}

pub fn get_category(conn: &Connection, id: i64) -> Result<Category> {
    conn.query_row(
        "SELECT id, name, type, is_system FROM categories WHERE id = ?1",
        [id],
        row_to_category,
    )
    .optional()?
    .ok_or_else(|| GoblinError::NotFound(format!("category id {id}")))
}

pub fn find_category(conn: &Connection, name: &str, txn_type: TxnType) -> Result<Option<i64>> {
    let id = conn
        .query_row(
            "SELECT id FROM categories WHERE name = ?1 AND type = ?2 ORDER BY id LIMIT 1",
            rusqlite::params![name, txn_type],
            |row| row.get(0),
        )
        .optional()?;
    Ok(id)
}

/// Exact `(name, type)` match; the category is created only when absent.
pub fn get_or_create_category(conn: &Connection, name: &str, txn_type: TxnType) -> Result<i64> {
    if let Some(id) = find_category(conn, name, txn_type)? {
        return Ok(id);
    }
    add_category(conn, name, txn_type)
}

pub fn add_category(conn: &Connection, name: &str, txn_type: TxnType) -> Result<i64> {
    if name.trim().is_empty() {
        return Err(GoblinError::Other("Name is required".into()));
    }
    if find_category(conn, name, txn_type)?.is_some() {
        return Err(GoblinError::Other(format!(
            "Category already exists: {name} ({txn_type})"
        )));
    }
    conn.execute(
        "INSERT INTO categories (name, type, is_system) VALUES (?1, ?2, 0)",
        rusqlite::params![name, txn_type],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn rename_category(conn: &Connection, id: i64, new_name: &str) -> Result<()> {
    let category = get_category(conn, id)?;
    if category.is_system {
        return Err(GoblinError::CategoryLocked(category.name));
    }
    if new_name.trim().is_empty() {
        return Err(GoblinError::Other("Name is required".into()));
    }
    if let Some(existing) = find_category(conn, new_name, category.txn_type)? {
        if existing != id {
            return Err(GoblinError::Other(format!(
                "Category already exists: {new_name} ({})",
                category.txn_type
            )));
        }
    }
    conn.execute("UPDATE categories SET name = ?1 WHERE id = ?2", rusqlite::params![new_name, id])?;
    Ok(())
}

pub fn no_category_id(conn: &Connection, txn_type: TxnType) -> Result<i64> {
    conn.query_row(
        "SELECT id FROM categories WHERE name = ?1 AND type = ?2 AND is_system = 1",
        rusqlite::params![NO_CATEGORY, txn_type],
        |row| row.get(0),
    )
    .optional()?
    .ok_or_else(|| GoblinError::NotFound(format!("system category {NO_CATEGORY} for {txn_type}")))
}

/// Moves the category's transactions onto the sentinel of the same type, then
/// removes the category. Returns how many transactions were reassigned.
pub fn delete_category(conn: &mut Connection, id: i64) -> Result<usize> {
    let category = get_category(conn, id)?;
    if category.is_system {
        return Err(GoblinError::CategoryLocked(category.name));
    }
    let tx = conn.transaction()?;
    let sentinel = no_category_id(&tx, category.txn_type)?;
    let moved = tx.execute(
        "UPDATE transactions SET category_id = ?1 WHERE category_id = ?2",
        rusqlite::params![sentinel, id],
    )?;
    tx.execute("DELETE FROM categories WHERE id = ?1", [id])?;
    tx.commit()?;
    tracing::info!("deleted category {} ({moved} transactions reassigned)", category.name);
    Ok(moved)
}

// ---------------------------------------------------------------------------
// Transactions
// ---------------------------------------------------------------------------

pub fn add_transaction(
    conn: &Connection,
    txn_type: TxnType,
    amount: f64,
    date: &str,
    category: &str,
    tag: Option<&str>,
) -> Result<i64> {
    let amount = normalize_amount(amount)?;
    let date = parse_date(date)?;
    let category_id = get_or_create_category(conn, category, txn_type)?;
    conn.execute(
        "INSERT INTO transactions (type, amount, date, category_id, tag) VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![txn_type, amount, date, category_id, tag],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_transaction(conn: &Connection, id: i64) -> Result<Transaction> {
    conn.query_row(
        "SELECT t.id, t.type, t.amount, t.date, t.category_id, c.name, t.tag \
         FROM transactions t JOIN categories c ON t.category_id = c.id WHERE t.id = ?1",
        [id],
        row_to_transaction,
    )
    .optional()?
    .ok_or_else(|| GoblinError::NotFound(format!("transaction id {id}")))
}

pub fn update_transaction(conn: &Connection, id: i64, update: &TransactionUpdate) -> Result<()> {
    let current = get_transaction(conn, id)?;
    let amount = match update.amount {
        Some(a) => normalize_amount(a)?,
        None => current.amount,
    };
    let date = match &update.date {
        Some(d) => parse_date(d)?,
        None => current.date,
    };
    let category_id = match &update.category {
        Some(name) => find_category(conn, name, current.txn_type)?
            .ok_or_else(|| GoblinError::UnknownCategory(format!("{name} ({})", current.txn_type)))?,
        None => current.category_id,
    };
    let tag = match &update.tag {
        Some(t) => t.clone(),
        None => current.tag,
    };
    conn.execute(
        "UPDATE transactions SET amount = ?1, date = ?2, category_id = ?3, tag = ?4 WHERE id = ?5",
        rusqlite::params![amount, date, category_id, tag, id],
    )?;
    Ok(())
}

pub fn delete_transaction(conn: &Connection, id: i64) -> Result<()> {
    let deleted = conn.execute("DELETE FROM transactions WHERE id = ?1", [id])?;
    if deleted == 0 {
        return Err(GoblinError::NotFound(format!("transaction id {id}")));
    }
    Ok(())
}

fn row_to_transaction(row: &rusqlite::Row) -> rusqlite::Result<Transaction> {
    Ok(Transaction {
        id: row.get(0)?,
        txn_type: row.get(1)?,
        amount: row.get(2)?,
        date: row.get(3)?,
        category_id: row.get(4)?,
        category_name: row.get(5)?,
        tag: row.get(6)?,
    })
}

pub fn list_transactions(conn: &Connection, filter: &TransactionFilter) -> Result<Vec<Transaction>> {
    let (where_sql, params) = filter.where_clause();
    let mut sql = format!(
        "SELECT t.id, t.type, t.amount, t.date, t.category_id, c.name, t.tag \
         FROM transactions t JOIN categories c ON t.category_id = c.id{where_sql} \
         ORDER BY t.date DESC, t.id DESC"
    );
    if let Some(limit) = filter.limit {
        sql.push_str(&format!(" LIMIT {limit}"));
    }
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(params.iter()), row_to_transaction)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn transaction_counts(conn: &Connection) -> Result<TransactionCount> {
    let counts = conn.query_row(
        "SELECT COUNT(*), \
                COALESCE(SUM(CASE WHEN type = 'income' THEN 1 ELSE 0 END), 0), \
                COALESCE(SUM(CASE WHEN type = 'expense' THEN 1 ELSE 0 END), 0) \
         FROM transactions",
        [],
        |row| {
            Ok(TransactionCount {
                total: row.get(0)?,
                income: row.get(1)?,
                expense: row.get(2)?,
            })
        },
    )?;
    Ok(counts)
}
