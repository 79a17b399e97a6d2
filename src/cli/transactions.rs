use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::cli::{build_filter, open_store};
use crate::error::Result;
use crate::fmt::money;
use crate::models::TxnType;
use crate::settings::Settings;
use crate::store::{self, TransactionUpdate};

pub fn add(
    settings: &Settings,
    txn_type: TxnType,
    amount: f64,
    category: &str,
    date: Option<&str>,
    tag: Option<&str>,
) -> Result<()> {
    let conn = open_store(settings)?;
    let today = chrono::Local::now().format("%Y-%m-%d").to_string();
    let id = store::add_transaction(&conn, txn_type, amount, date.unwrap_or(&today), category, tag)?;
    println!("Added {txn_type} #{id}: {} in {category}", money(amount.abs()));
    Ok(())
}

pub fn list(settings: &Settings, month: Option<&str>, year: Option<i32>, limit: Option<usize>) -> Result<()> {
    let conn = open_store(settings)?;
    let filter = build_filter(month, year, limit)?;
    let rows = store::list_transactions(&conn, &filter)?;
    if rows.is_empty() {
        println!("No transactions.");
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["ID", "Date", "Type", "Category", "Amount", "Tag"]);
    for txn in rows {
        let amount = match txn.txn_type {
            TxnType::Income => money(txn.amount).green(),
            TxnType::Expense => money(-txn.amount).red(),
        };
        table.add_row(vec![
            Cell::new(txn.id),
            Cell::new(txn.date),
            Cell::new(txn.txn_type),
            Cell::new(txn.category_name),
            Cell::new(amount),
            Cell::new(txn.tag.unwrap_or_default()),
        ]);
    }
    println!("Transactions\n{table}");
    Ok(())
}

pub fn edit(settings: &Settings, id: i64, update: TransactionUpdate) -> Result<()> {
    let conn = open_store(settings)?;
    store::update_transaction(&conn, id, &update)?;
    println!("Updated transaction {id}");
    Ok(())
}

pub fn delete(settings: &Settings, id: i64) -> Result<()> {
    let conn = open_store(settings)?;
    store::delete_transaction(&conn, id)?;
    println!("Deleted transaction {id}");
    Ok(())
}
