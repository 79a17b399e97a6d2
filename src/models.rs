use std::fmt;
use std::str::FromStr;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

use crate::error::GoblinError;

/// Reserved per-type category that absorbs transactions of deleted categories.
pub const NO_CATEGORY: &str = "{NO_CATEGORY}";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxnType {
    Income,
    Expense,
}

impl TxnType {
    pub const ALL: [TxnType; 2] = [TxnType::Income, TxnType::Expense];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Income => "income",
            Self::Expense => "expense",
        }
    }

    /// Category created when a merged transaction has nowhere else to go.
    pub fn fallback_category(&self) -> &'static str {
        match self {
            Self::Income => "Other Income",
            Self::Expense => "Other Expense",
        }
    }
}

impl fmt::Display for TxnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TxnType {
    type Err = GoblinError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "income" => Ok(Self::Income),
            "expense" => Ok(Self::Expense),
            other => Err(GoblinError::Other(format!(
                "Invalid transaction type: {other} (must be 'income' or 'expense')"
            ))),
        }
    }
}

impl ToSql for TxnType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for TxnType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: GoblinError| FromSqlError::Other(Box::new(e)))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub txn_type: TxnType,
    pub is_system: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub id: i64,
    pub txn_type: TxnType,
    pub amount: f64,
    pub date: String,
    pub category_id: i64,
    pub category_name: String,
    pub tag: Option<String>,
}

/// The (date, amount, type, category name) tuple two transactions must share
/// to count as duplicates during a merge. Tags are not part of it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SemanticIdentity {
    pub date: String,
    pub amount_cents: i64,
    pub txn_type: TxnType,
    pub category_name: String,
}

impl SemanticIdentity {
    pub fn new(date: &str, amount: f64, txn_type: TxnType, category_name: &str) -> Self {
        Self {
            date: date.trim().to_string(),
            amount_cents: to_cents(amount),
            txn_type,
            category_name: category_name.to_string(),
        }
    }
}

pub fn to_cents(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}
