//! CLI command implementations

pub mod backup;
pub mod list;
pub mod restore;

use cairn_cli::{logging, BackupError};
use std::path::Path;

/// Set up logging, mapping failures to a configuration error
fn init_logging(log_file: Option<&Path>) -> Result<(), BackupError> {
    logging::init(log_file).map_err(|e| BackupError::Config(format!("{:#}", e)))
}
