use std::collections::{HashMap, HashSet};
use std::path::Path;

use rusqlite::{Connection, OptionalExtension};

use crate::db::{get_existing_connection, get_readonly_connection, RetryPolicy};
use crate::error::{GoblinError, Result};
use crate::models::{SemanticIdentity, TxnType};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeResult {
    pub imported: usize,
    pub skipped: usize,
}

/// Merge every transaction of the store at `source_path` into the store at
/// `target_path`. The source is opened read-only and never modified.
pub fn merge_databases(target_path: &Path, source_path: &Path, retry: &RetryPolicy) -> Result<MergeResult> {
    let (mut target, source) = retry.run(|| {
        let target = get_existing_connection(target_path)?;
        let source = get_readonly_connection(source_path)?;
        Ok((target, source))
    })?;
    merge_stores(&mut target, &source)
}

/// Connection-level merge. Runs in a single transaction on `target`; on any
/// error nothing is committed.
pub fn merge_stores(target: &mut Connection, source: &Connection) -> Result<MergeResult> {
    let tx = target.transaction()?;
    let result = reconcile(&tx, source)?;
    tx.commit().map_err(|e| GoblinError::merge("committing", e))?;
    tracing::info!(
        "merge complete: {} imported, {} skipped",
        result.imported,
        result.skipped
    );
    Ok(result)
}

struct TargetCategory {
    id: i64,
    name: String,
}

struct SourceTransaction {
    txn_type: TxnType,
    amount: f64,
    date: String,
    category_id: i64,
    tag: Option<String>,
}

fn reconcile(target: &Connection, source: &Connection) -> Result<MergeResult> {
    let mapping = map_categories(target, source).map_err(|e| GoblinError::merge("mapping categories", e))?;
    let mut seen = existing_identities(target).map_err(|e| GoblinError::merge("reading existing transactions", e))?;
    let incoming = source_transactions(source).map_err(|e| GoblinError::merge("reading source transactions", e))?;
    tracing::debug!(
        "merging {} source transactions against {} existing",
        incoming.len(),
        seen.len()
    );

    let mut result = MergeResult::default();
    let mut fallbacks: HashMap<TxnType, TargetCategory> = HashMap::new();
    for txn in incoming {
        let category = match mapping.get(&txn.category_id) {
            Some(category) => category,
            None => {
                if !fallbacks.contains_key(&txn.txn_type) {
                    let fallback = fallback_category(target, txn.txn_type)
                        .map_err(|e| GoblinError::merge("resolving fallback category", e))?;
                    fallbacks.insert(txn.txn_type, fallback);
                }
                &fallbacks[&txn.txn_type]
            }
        };

        let identity = SemanticIdentity::new(&txn.date, txn.amount, txn.txn_type, &category.name);
        if seen.contains(&identity) {
            result.skipped += 1;
            continue;
        }

        target
            .execute(
                "INSERT INTO transactions (type, amount, date, category_id, tag) VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![txn.txn_type, txn.amount, txn.date, category.id, txn.tag],
            )
            .map_err(|e| GoblinError::merge(format!("inserting transaction dated {}", txn.date), e))?;
        seen.insert(identity);
        result.imported += 1;
    }
    Ok(result)
}

/// Source category id -> target category. Categories missing from the target
/// are created there.
fn map_categories(target: &Connection, source: &Connection) -> Result<HashMap<i64, TargetCategory>> {
    let mut existing: HashMap<(String, TxnType), i64> = HashMap::new();
    {
        let mut stmt = target.prepare("SELECT id, name, type FROM categories ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?, row.get::<_, TxnType>(2)?))
        })?;
        for row in rows {
            let (id, name, txn_type) = row?;
            existing.entry((name, txn_type)).or_insert(id);
        }
    }

    let mut stmt = source.prepare("SELECT id, name, type FROM categories ORDER BY id")?;
    let source_categories = stmt
        .query_map([], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?, row.get::<_, TxnType>(2)?))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut mapping = HashMap::with_capacity(source_categories.len());
    for (source_id, name, txn_type) in source_categories {
        let target_id = match existing.get(&(name.clone(), txn_type)) {
            Some(id) => *id,
            None => {
                target.execute(
                    "INSERT INTO categories (name, type, is_system) VALUES (?1, ?2, 0)",
                    rusqlite::params![name, txn_type],
                )?;
                let id = target.last_insert_rowid();
                tracing::debug!("created category {name} ({txn_type}) as id {id}");
                existing.insert((name.clone(), txn_type), id);
                id
            }
        };
        mapping.insert(source_id, TargetCategory { id: target_id, name });
    }
    Ok(mapping)
}

fn existing_identities(target: &Connection) -> Result<HashSet<SemanticIdentity>> {
    let mut stmt = target.prepare(
        "SELECT t.date, t.amount, t.type, c.name FROM transactions t \
         JOIN categories c ON t.category_id = c.id",
    )?;
    let identities = stmt
        .query_map([], |row| {
            let date: String = row.get(0)?;
            let amount: f64 = row.get(1)?;
            let txn_type: TxnType = row.get(2)?;
            let name: String = row.get(3)?;
            Ok(SemanticIdentity::new(&date, amount, txn_type, &name))
        })?
        .collect::<std::result::Result<HashSet<_>, _>>()?;
    Ok(identities)
}

fn source_transactions(source: &Connection) -> Result<Vec<SourceTransaction>> {
    let mut stmt = source.prepare("SELECT type, amount, date, category_id, tag FROM transactions ORDER BY id")?;
    let rows = stmt
        .query_map([], |row| {
            Ok(SourceTransaction {
                txn_type: row.get(0)?,
                amount: row.get(1)?,
                date: row.get(2)?,
                category_id: row.get(3)?,
                tag: row.get(4)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// First target category of the given type, or a freshly created
/// "Other Income"/"Other Expense" when the target has none.
fn fallback_category(target: &Connection, txn_type: TxnType) -> Result<TargetCategory> {
    let existing = target
        .query_row(
            "SELECT id, name FROM categories WHERE type = ?1 ORDER BY id LIMIT 1",
            [txn_type],
            |row| Ok(TargetCategory { id: row.get(0)?, name: row.get(1)? }),
        )
        .optional()?;
    if let Some(category) = existing {
        return Ok(category);
    }
    let name = txn_type.fallback_category();
    target.execute(
        "INSERT INTO categories (name, type, is_system) VALUES (?1, ?2, 0)",
        rusqlite::params![name, txn_type],
    )?;
    tracing::warn!("created fallback category {name} for unmapped {txn_type} transactions");
    Ok(TargetCategory {
        id: target.last_insert_rowid(),
        name: name.to_string(),
    })
}
