use comfy_table::{Cell, Table};

use crate::cli::open_store;
use crate::error::Result;
use crate::models::TxnType;
use crate::settings::Settings;
use crate::store;

pub fn list(settings: &Settings) -> Result<()> {
    let conn = open_store(settings)?;
    let categories = store::list_categories(&conn)?;

    let mut table = Table::new();
    table.set_header(vec!["ID", "Name", "Type", "System"]);
    for cat in categories {
        table.add_row(vec![
            Cell::new(cat.id),
            Cell::new(cat.name),
            Cell::new(cat.txn_type),
            Cell::new(if cat.is_system { "yes" } else { "" }),
        ]);
    }
    println!("Categories\n{table}");
    Ok(())
}

pub fn add(settings: &Settings, name: &str, txn_type: TxnType) -> Result<()> {
    let conn = open_store(settings)?;
    let id = store::add_category(&conn, name, txn_type)?;
    println!("Added {txn_type} category #{id}: {name}");
    Ok(())
}

pub fn rename(settings: &Settings, id: i64, new_name: &str) -> Result<()> {
    let conn = open_store(settings)?;
    store::rename_category(&conn, id, new_name)?;
    println!("Renamed category {id} to: {new_name}");
    Ok(())
}

pub fn delete(settings: &Settings, id: i64) -> Result<()> {
    let mut conn = open_store(settings)?;
    let moved = store::delete_category(&mut conn, id)?;
    println!("Deleted category {id}");
    if moved > 0 {
        let noun = if moved == 1 { "transaction" } else { "transactions" };
        println!("{moved} {noun} moved to {}", crate::models::NO_CATEGORY);
    }
    Ok(())
}
