use crate::backup;
use crate::error::Result;
use crate::fmt::format_bytes;
use crate::settings::{save_settings, Settings};

pub fn run(settings: &mut Settings, auto: bool) -> Result<()> {
    let written = if auto {
        backup::run_if_due(settings)?
    } else {
        Some(backup::create_backup(settings)?)
    };

    let Some(dest_path) = written else {
        println!("No backup due ({}).", settings.backup.frequency);
        return Ok(());
    };
    save_settings(settings)?;

    let size = std::fs::metadata(&dest_path)?.len();
    println!("Backup saved to {}", dest_path.display());
    println!("Size: {}", format_bytes(size));
    Ok(())
}
