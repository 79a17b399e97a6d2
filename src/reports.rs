use rusqlite::Connection;

use crate::error::Result;
use crate::models::TxnType;
use crate::store::TransactionFilter;

#[derive(Debug, Clone, PartialEq)]
pub struct CategoryTotal {
    pub txn_type: TxnType,
    pub name: String,
    pub total: f64,
    pub count: i64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Summary {
    pub income: f64,
    pub expense: f64,
    pub net: f64,
    pub by_category: Vec<CategoryTotal>,
}

/// Income, expense and net for the filtered period, with a per-category
/// breakdown (income first, largest totals first). `limit` is ignored.
pub fn summary(conn: &Connection, filter: &TransactionFilter) -> Result<Summary> {
    let (where_sql, params) = filter.where_clause();
    let sql = format!(
        "SELECT t.type, c.name, SUM(t.amount), COUNT(*) \
         FROM transactions t JOIN categories c ON t.category_id = c.id{where_sql} \
         GROUP BY t.type, c.name \
         ORDER BY CASE t.type WHEN 'income' THEN 0 ELSE 1 END, SUM(t.amount) DESC, c.name ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let by_category = stmt
        .query_map(rusqlite::params_from_iter(params.iter()), |row| {
            Ok(CategoryTotal {
                txn_type: row.get(0)?,
                name: row.get(1)?,
                total: row.get(2)?,
                count: row.get(3)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let sum_of = |t: TxnType| -> f64 {
        let cents: i64 = by_category
            .iter()
            .filter(|c| c.txn_type == t)
            .map(|c| (c.total * 100.0).round() as i64)
            .sum();
        cents as f64 / 100.0
    };
    let income = sum_of(TxnType::Income);
    let expense = sum_of(TxnType::Expense);
    Ok(Summary {
        income,
        expense,
        net: ((income - expense) * 100.0).round() / 100.0,
        by_category,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{get_connection, init_db};
    use crate::store::add_transaction;

    fn test_db() -> (tempfile::TempDir, Connection) {
        let dir = tempfile::tempdir().unwrap();
        let conn = get_connection(&dir.path().join("test.db")).unwrap();
        init_db(&conn).unwrap();
        (dir, conn)
    }

    #[test]
    fn test_empty_summary() {
        let (_dir, conn) = test_db();
        let s = summary(&conn, &TransactionFilter::default()).unwrap();
        assert_eq!(s, Summary::default());
    }

    #[test]
    fn test_summary_totals_and_order() {
        let (_dir, conn) = test_db();
        add_transaction(&conn, TxnType::Income, 2000.0, "2024-01-01", "Paycheck", None).unwrap();
        add_transaction(&conn, TxnType::Income, 150.0, "2024-01-10", "Freelance", None).unwrap();
        add_transaction(&conn, TxnType::Expense, 0.1, "2024-01-11", "Dining", None).unwrap();
        add_transaction(&conn, TxnType::Expense, 0.2, "2024-01-12", "Dining", None).unwrap();
        add_transaction(&conn, TxnType::Expense, 900.0, "2024-01-15", "Housing", None).unwrap();

        let s = summary(&conn, &TransactionFilter::default()).unwrap();
        assert_eq!(s.income, 2150.0);
        assert_eq!(s.expense, 900.3);
        assert_eq!(s.net, 1249.7);
        let names: Vec<&str> = s.by_category.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Paycheck", "Freelance", "Housing", "Dining"]);
        assert_eq!(s.by_category[3].count, 2);
    }

    #[test]
    fn test_summary_respects_filter() {
        let (_dir, conn) = test_db();
        add_transaction(&conn, TxnType::Income, 100.0, "2024-01-01", "Gift", None).unwrap();
        add_transaction(&conn, TxnType::Income, 300.0, "2024-02-01", "Gift", None).unwrap();
        let feb = TransactionFilter { year: Some(2024), month: Some(2), limit: None };
        let s = summary(&conn, &feb).unwrap();
        assert_eq!(s.income, 300.0);
        assert_eq!(s.by_category.len(), 1);
    }
}
