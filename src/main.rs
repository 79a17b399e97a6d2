mod archive;
mod backup;
mod cli;
mod db;
mod error;
mod fmt;
mod merger;
mod models;
mod reports;
mod settings;
mod store;
mod transfer;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{CategoriesCommands, Cli, Commands};
use store::TransactionUpdate;

fn init_logging() {
    let filter = EnvFilter::try_from_env("GOBLIN_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn main() {
    init_logging();
    let cli = Cli::parse();
    let mut settings = settings::load_settings();

    let result = match cli.command {
        Some(Commands::Init { data_dir }) => cli::init::run(&mut settings, data_dir),
        Some(Commands::Add {
            txn_type,
            amount,
            category,
            date,
            tag,
        }) => cli::transactions::add(&settings, txn_type, amount, &category, date.as_deref(), tag.as_deref()),
        Some(Commands::List { month, year, limit }) => {
            cli::transactions::list(&settings, month.as_deref(), year, limit)
        }
        Some(Commands::Edit {
            id,
            amount,
            date,
            category,
            tag,
            clear_tag,
        }) => {
            let update = TransactionUpdate {
                amount,
                date,
                category,
                tag: if clear_tag { Some(None) } else { tag.map(Some) },
            };
            cli::transactions::edit(&settings, id, update)
        }
        Some(Commands::Delete { id }) => cli::transactions::delete(&settings, id),
        Some(Commands::Categories { command }) => match command {
            CategoriesCommands::List => cli::categories::list(&settings),
            CategoriesCommands::Add { name, txn_type } => cli::categories::add(&settings, &name, txn_type),
            CategoriesCommands::Rename { id, new_name } => cli::categories::rename(&settings, id, &new_name),
            CategoriesCommands::Delete { id } => cli::categories::delete(&settings, id),
        },
        Some(Commands::Summary { month, year }) => cli::summary::run(&settings, month.as_deref(), year),
        Some(Commands::Export { output, yes }) => cli::export::run(&settings, output, yes),
        Some(Commands::Import { file, replace, yes }) => cli::import::run(&settings, &file, replace, yes),
        Some(Commands::Backup { auto }) => cli::backup::run(&mut settings, auto),
        Some(Commands::Status) | None => cli::status::run(&settings),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
