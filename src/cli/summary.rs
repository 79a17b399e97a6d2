use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::cli::{build_filter, open_store};
use crate::error::Result;
use crate::fmt::money;
use crate::models::TxnType;
use crate::reports;
use crate::settings::Settings;

pub fn run(settings: &Settings, month: Option<&str>, year: Option<i32>) -> Result<()> {
    let conn = open_store(settings)?;
    let filter = build_filter(month, year, None)?;
    let summary = reports::summary(&conn, &filter)?;

    let mut table = Table::new();
    table.set_header(vec!["Category", "Count", "Amount"]);

    for (txn_type, heading, total) in [
        (TxnType::Income, "INCOME".green().bold(), summary.income),
        (TxnType::Expense, "EXPENSES".red().bold(), summary.expense),
    ] {
        let items: Vec<_> = summary.by_category.iter().filter(|c| c.txn_type == txn_type).collect();
        if items.is_empty() {
            continue;
        }
        table.add_row(vec![Cell::new(heading), Cell::new(""), Cell::new("")]);
        for item in items {
            table.add_row(vec![
                Cell::new(format!("  {}", item.name)),
                Cell::new(item.count),
                Cell::new(money(item.total)),
            ]);
        }
        table.add_row(vec![Cell::new("Total".bold()), Cell::new(""), Cell::new(money(total))]);
        table.add_row(vec![Cell::new(""), Cell::new(""), Cell::new("")]);
    }

    let net_label = if summary.net >= 0.0 {
        "NET".green().bold()
    } else {
        "NET".red().bold()
    };
    table.add_row(vec![Cell::new(net_label), Cell::new(""), Cell::new(money(summary.net))]);

    println!("Summary\n{table}");
    Ok(())
}
