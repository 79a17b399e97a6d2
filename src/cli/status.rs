use crate::backup::list_backups;
use crate::db::get_connection;
use crate::error::Result;
use crate::fmt::format_bytes;
use crate::settings::Settings;
use crate::store::transaction_counts;

pub fn run(settings: &Settings) -> Result<()> {
    let db_path = settings.db_path();

    println!("Data dir:   {}", settings.data_dir().display());
    println!("Database:   {}", db_path.display());

    if db_path.exists() {
        let size = std::fs::metadata(&db_path)?.len();
        println!("DB size:    {}", format_bytes(size));

        let conn = get_connection(&db_path)?;
        let counts = transaction_counts(&conn)?;
        let categories: i64 = conn.query_row("SELECT count(*) FROM categories", [], |r| r.get(0))?;

        println!();
        println!("Transactions:  {}", counts.total);
        println!("  Income:      {}", counts.income);
        println!("  Expense:     {}", counts.expense);
        println!("Categories:    {categories}");
    } else {
        println!();
        println!("Database not found. Run `goblin init` to set up.");
    }

    let backups = list_backups(&settings.backups_dir())?;
    println!();
    println!(
        "Backups:       {} ({}{})",
        backups.len(),
        settings.backup.frequency,
        if settings.backup.enabled { "" } else { ", disabled" }
    );
    if let Some(last) = &settings.backup.last_backup {
        println!("Last backup:   {last}");
    }

    Ok(())
}
