use crate::db::{get_connection, init_db};
use crate::error::Result;
use crate::settings::{save_settings, settings_file_exists, shellexpand_path, Settings};

pub fn run(settings: &mut Settings, data_dir: Option<String>) -> Result<()> {
    if let Some(dir) = data_dir {
        settings.data_dir = shellexpand_path(&dir);
    } else if !settings_file_exists() {
        // First run: prompt for data dir
        println!("Data directory [{}]: ", settings.data_dir);
        let mut input = String::new();
        std::io::stdin().read_line(&mut input).ok();
        let chosen = input.trim();
        if !chosen.is_empty() {
            settings.data_dir = shellexpand_path(chosen);
        }
    }

    save_settings(settings)?;

    let resolved = settings.data_dir();
    std::fs::create_dir_all(&resolved)?;
    std::fs::create_dir_all(settings.backups_dir())?;

    let conn = get_connection(&settings.db_path())?;
    init_db(&conn)?;

    tracing::info!("initialized store at {}", settings.db_path().display());
    println!("Initialized goblin at {}", resolved.display());
    Ok(())
}
