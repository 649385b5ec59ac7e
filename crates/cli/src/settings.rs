//! Backup configuration
//!
//! The configuration is a shell-style `KEY=VALUE` file (`backup.conf`):
//!
//! ```text
//! BACKUP_DESTINATION=/var/backups/home
//! EXCLUDE_PATTERNS=*.tmp,node_modules/,.cache/
//! DAILY_KEEP=7
//! WEEKLY_KEEP=4
//! MONTHLY_KEEP=6
//! CHECKSUM_CMD=sha256sum
//! ```
//!
//! Keys are case-insensitive. Any key can be overridden from the environment
//! as `CAIRN_<KEY>`. Values are validated once into an immutable [`Config`].
//!
//! The lock file is host-wide by default (`<temp dir>/cairn.lock`), so runs
//! against different destinations still exclude each other.

use crate::error::BackupError;
use cairn_core::{ChecksumAlgorithm, ExcludeRules};
use cairn_retention::RetentionPolicy;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Environment variable naming the config file
pub const CONFIG_ENV: &str = "CAIRN_CONFIG";

/// Prefix for per-key environment overrides
pub const ENV_PREFIX: &str = "CAIRN";

const CONFIG_FILE_NAME: &str = "backup.conf";
const DEFAULT_LOG_NAME: &str = "backup.log";
const DEFAULT_LOCK_NAME: &str = "cairn.lock";

/// Keys read from the file, in the lowercase form `RawConfig` expects
const KEYS: [&str; 8] = [
    "backup_destination",
    "exclude_patterns",
    "daily_keep",
    "weekly_keep",
    "monthly_keep",
    "checksum_cmd",
    "log_file",
    "lock_file",
];

/// Validated configuration, built once per run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Directory holding the archives
    pub destination: PathBuf,
    pub excludes: ExcludeRules,
    pub policy: RetentionPolicy,
    pub checksum: ChecksumAlgorithm,
    pub log_file: PathBuf,
    pub lock_file: PathBuf,
}

/// Raw key/value shape of the file, after environment overrides
#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    backup_destination: Option<String>,
    exclude_patterns: Option<String>,
    daily_keep: Option<String>,
    weekly_keep: Option<String>,
    monthly_keep: Option<String>,
    checksum_cmd: Option<String>,
    log_file: Option<String>,
    lock_file: Option<String>,
}

/// Get the config file path
///
/// `$CAIRN_CONFIG`, else `./backup.conf` when present, else the per-user
/// config directory (`~/.config/cairn/backup.conf` on Linux).
pub fn config_file_path() -> Option<PathBuf> {
    if let Some(path) = std::env::var_os(CONFIG_ENV).filter(|p| !p.is_empty()) {
        return Some(PathBuf::from(path));
    }

    let local = PathBuf::from(CONFIG_FILE_NAME);
    if local.is_file() {
        return Some(local);
    }

    dirs::config_dir().map(|dir| dir.join("cairn").join(CONFIG_FILE_NAME))
}

/// Load configuration from the default location
pub fn load() -> Result<Config, BackupError> {
    let path = config_file_path().ok_or_else(|| {
        BackupError::Config(format!(
            "could not determine a config file location; set {}",
            CONFIG_ENV
        ))
    })?;
    load_from(&path)
}

/// Load configuration from a file, applying `CAIRN_<KEY>` overrides
pub fn load_from(path: &Path) -> Result<Config, BackupError> {
    if !path.is_file() {
        return Err(BackupError::Config(format!(
            "config file not found: {}",
            path.display()
        )));
    }

    let read_error = |e: ::config::ConfigError| {
        BackupError::Config(format!("failed to read {}: {}", path.display(), e))
    };

    // The INI source keeps keys as written; the environment source lowercases
    let file_values: HashMap<String, String> = ::config::Config::builder()
        .add_source(::config::File::from(path).format(::config::FileFormat::Ini))
        .build()
        .and_then(|settings| settings.try_deserialize())
        .map_err(read_error)?;

    let mut builder = ::config::Config::builder();
    for (key, value) in file_values {
        let key = key.trim().to_ascii_lowercase();
        if KEYS.contains(&key.as_str()) {
            builder = builder.set_default(key, value).map_err(read_error)?;
        }
    }

    let raw: RawConfig = builder
        .add_source(::config::Environment::with_prefix(ENV_PREFIX))
        .build()
        .and_then(|settings| settings.try_deserialize())
        .map_err(read_error)?;

    Config::from_raw(raw)
}

impl Config {
    fn from_raw(raw: RawConfig) -> Result<Self, BackupError> {
        let destination = raw
            .backup_destination
            .as_deref()
            .map(unquote)
            .filter(|value| !value.is_empty())
            .map(PathBuf::from)
            .ok_or_else(|| BackupError::Config("BACKUP_DESTINATION is not set".to_string()))?;

        let excludes = ExcludeRules::parse_list(
            raw.exclude_patterns.as_deref().map(unquote).unwrap_or_default(),
        )
        .map_err(|e| BackupError::Config(format!("EXCLUDE_PATTERNS: {}", e)))?;

        let policy = RetentionPolicy::new(
            parse_keep("DAILY_KEEP", raw.daily_keep.as_deref())?,
            parse_keep("WEEKLY_KEEP", raw.weekly_keep.as_deref())?,
            parse_keep("MONTHLY_KEEP", raw.monthly_keep.as_deref())?,
        );

        let checksum = match raw.checksum_cmd.as_deref().map(unquote) {
            Some(cmd) if !cmd.is_empty() => cmd
                .parse::<ChecksumAlgorithm>()
                .map_err(|e| BackupError::Config(format!("CHECKSUM_CMD: {}", e)))?,
            _ => ChecksumAlgorithm::default(),
        };

        let log_file = optional_path(raw.log_file.as_deref())
            .unwrap_or_else(|| destination.join(DEFAULT_LOG_NAME));
        let lock_file =
            optional_path(raw.lock_file.as_deref()).unwrap_or_else(default_lock_path);

        Ok(Self {
            destination,
            excludes,
            policy,
            checksum,
            log_file,
            lock_file,
        })
    }
}

/// One lock per host, whatever the destination
pub fn default_lock_path() -> PathBuf {
    std::env::temp_dir().join(DEFAULT_LOCK_NAME)
}

/// Absent or blank counts disable the tier
fn parse_keep(key: &str, value: Option<&str>) -> Result<usize, BackupError> {
    let value = match value.map(unquote) {
        Some(value) if !value.is_empty() => value,
        _ => return Ok(0),
    };
    value.parse::<usize>().map_err(|_| {
        BackupError::Config(format!(
            "{} must be a non-negative integer, got '{}'",
            key, value
        ))
    })
}

fn optional_path(value: Option<&str>) -> Option<PathBuf> {
    value
        .map(unquote)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

/// Strip shell-style quoting around a value
fn unquote(value: &str) -> &str {
    let value = value.trim();
    for quote in ['"', '\''] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner.trim();
        }
    }
    value
}
