use std::path::PathBuf;

use crate::cli::confirm;
use crate::cli::export::report;
use crate::error::Result;
use crate::settings::{shellexpand_path, Settings};
use crate::transfer::{self, ImportMode, ImportOptions, Outcome};

pub fn run(settings: &Settings, file: &str, replace: bool, yes: bool) -> Result<()> {
    let archive = PathBuf::from(shellexpand_path(file));
    let mode = if replace { ImportMode::Replace } else { ImportMode::Merge };

    let prompt = match mode {
        ImportMode::Merge => {
            "Merge imported transactions with your current data?\n\
             This will add the imported transactions to your existing financial history."
        }
        ImportMode::Replace => {
            "Importing will replace your current financial data.\n\
             A copy of the current database is kept next to it as .backup. Proceed?"
        }
    };

    let outcome = if !yes && !confirm(prompt) {
        Outcome::cancelled("Import cancelled")
    } else {
        transfer::import(&settings.db_path(), &archive, mode, &ImportOptions::from(settings))
    };
    report(outcome)
}
