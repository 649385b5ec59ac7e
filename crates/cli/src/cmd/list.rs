//! List backups, newest first

use super::init_logging;
use cairn_cli::util::format_size;
use cairn_cli::{list_backups, settings, BackupError};

pub fn run() -> Result<(), BackupError> {
    let config = settings::load()?;
    init_logging(None)?;

    let entries = list_backups(&config.destination).map_err(|e| {
        BackupError::Config(format!(
            "cannot read BACKUP_DESTINATION {}: {:#}",
            config.destination.display(),
            e
        ))
    })?;

    let mut found = false;
    for entry in entries {
        found = true;
        println!("{} - {}", entry.name, format_size(entry.size_bytes));
    }

    if !found {
        println!("No backups found in {}", config.destination.display());
    }
    Ok(())
}
