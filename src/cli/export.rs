use std::path::PathBuf;

use colored::Colorize;

use crate::cli::confirm;
use crate::error::{GoblinError, Result};
use crate::settings::{shellexpand_path, Settings};
use crate::transfer::{self, Outcome};

fn default_output() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Goblin_Export.zip")
}

pub fn run(settings: &Settings, output: Option<String>, yes: bool) -> Result<()> {
    let dest = match output {
        Some(p) => PathBuf::from(shellexpand_path(&p)),
        None => default_output(),
    };

    let outcome = if dest.exists() && !yes && !confirm(&format!("{} exists. Overwrite?", dest.display())) {
        Outcome::cancelled("Export cancelled")
    } else {
        transfer::export(&settings.db_path(), &dest)
    };
    report(outcome)
}

/// Print a transfer outcome; a failure that is not a cancellation becomes an
/// error for the process exit code.
pub(crate) fn report(outcome: Outcome) -> Result<()> {
    if outcome.success {
        println!("{}", outcome.message.green());
        Ok(())
    } else if outcome.cancelled {
        println!("{}", outcome.message);
        Ok(())
    } else {
        if outcome.rolled_back == Some(true) {
            eprintln!("{}", "Your existing data was left unchanged.".yellow());
        }
        Err(GoblinError::Other(outcome.message))
    }
}
