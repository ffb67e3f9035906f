//! Database configuration loading from TOML files and in-memory tables.
//!
//! Loading is deliberately lenient: a missing config file yields full
//! defaults, and a key whose value has the wrong type falls back to its
//! default with a logged warning instead of failing startup. Only an
//! unreadable or syntactically invalid file surfaces [`ConfigError`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use toml::{Table, Value};

/// Which database backend the pool manager drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Networked MySQL-family server.
    Mysql,
    /// Embedded SQLite database file.
    Sqlite,
}

/// Pool sizing and timeout bounds, applied uniformly to both backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSettings {
    /// Maximum number of pooled connections.
    pub max_size: u32,

    /// Minimum number of idle connections the pool keeps open.
    pub min_idle: u32,

    /// How long a checkout waits for a free connection before failing.
    pub connection_timeout: Duration,

    /// Idle connections older than this are closed.
    pub idle_timeout: Duration,

    /// Log a warning when a checked-out connection is held longer than
    /// this. `None` disables the diagnostic.
    pub leak_threshold: Option<Duration>,
}

/// Immutable database settings, built once from defaults overlaid with
/// user-supplied overrides and then owned by the pool manager.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Selected backend.
    pub kind: BackendKind,

    /// MySQL server host.
    pub host: String,

    /// MySQL server port.
    pub port: u16,

    /// Database (schema) name.
    pub database: String,

    /// MySQL username.
    pub user: String,

    /// MySQL password.
    pub password: String,

    /// Extra driver parameters appended verbatim to the MySQL DSN, e.g.
    /// `"?prefer_socket=false"`. Empty by default.
    pub params: String,

    /// SQLite database file name, possibly relative.
    pub file: String,

    /// Directory of the config file these settings came from. A relative
    /// SQLite path resolves against it; `None` means the bare file name
    /// is used as-is.
    pub base_dir: Option<PathBuf>,

    /// Pool tuning values.
    pub pool: PoolSettings,
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

impl Default for DbConfig {
    fn default() -> Self {
        Self::from_table(&Table::new())
    }
}

impl DbConfig {
    /// Loads configuration from a TOML file.
    ///
    /// A missing file yields full defaults. The file's parent directory is
    /// remembered so a relative SQLite path can resolve next to the config
    /// file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file exists but cannot be read, or if
    /// its contents are not valid TOML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let table = match std::fs::read_to_string(path) {
            Ok(contents) => contents.parse::<Table>()?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "config file not found, using defaults");
                Table::new()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        };

        let mut config = Self::from_table(&table);
        config.base_dir = path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .map(Path::to_path_buf);
        Ok(config)
    }

    /// Builds configuration from an in-memory TOML table.
    ///
    /// Every recognized key that is absent or has the wrong type falls
    /// back to its documented default; value problems are logged, never
    /// raised. No directory context is attached, so a relative SQLite
    /// path is used as a bare file name.
    pub fn from_table(table: &Table) -> Self {
        let database = section(table, "database");
        let pool = section(table, "pool");

        let kind = match str_value(database, "database", "type", "sqlite")
            .to_ascii_lowercase()
            .as_str()
        {
            "mysql" => BackendKind::Mysql,
            "sqlite" => BackendKind::Sqlite,
            other => {
                tracing::warn!(value = other, "unknown database.type, using sqlite");
                BackendKind::Sqlite
            }
        };

        let port = match int_value(database, "database", "port", 3306) {
            p @ 0..=65_535 => p as u16,
            out_of_range => {
                tracing::warn!(value = out_of_range, "database.port out of range, using 3306");
                3306
            }
        };

        // SQLite gets a single connection by default; the file is the
        // bottleneck, not the pool.
        let default_max = match kind {
            BackendKind::Sqlite => 1,
            BackendKind::Mysql => 10,
        };
        let max_size = int_value(pool, "pool", "max", default_max)
            .clamp(1, i64::from(u32::MAX)) as u32;

        let mut min_idle = int_value(pool, "pool", "min_idle", i64::from(max_size.min(2)))
            .clamp(0, i64::from(u32::MAX)) as u32;
        if min_idle > max_size {
            tracing::warn!(min_idle, max = max_size, "pool.min_idle exceeds pool.max, clamping");
            min_idle = max_size;
        }

        // A zero timeout would make the pool unusable; degrade it like any
        // other malformed value.
        let connection_timeout =
            Duration::from_millis(positive_ms_value(pool, "pool", "connection_timeout_ms", 30_000));
        let idle_timeout =
            Duration::from_millis(positive_ms_value(pool, "pool", "idle_timeout_ms", 600_000));
        let leak_ms = ms_value(pool, "pool", "leak_detection_ms", 0);
        let leak_threshold = (leak_ms > 0).then(|| Duration::from_millis(leak_ms));

        Self {
            kind,
            host: str_value(database, "database", "host", "localhost"),
            port,
            database: str_value(database, "database", "name", "asuracore"),
            user: str_value(database, "database", "user", "root"),
            password: str_value(database, "database", "password", ""),
            params: str_value(database, "database", "params", ""),
            file: str_value(database, "database", "file", "data.db"),
            base_dir: None,
            pool: PoolSettings {
                max_size,
                min_idle,
                connection_timeout,
                idle_timeout,
                leak_threshold,
            },
        }
    }
}

/// Returns the named sub-table, or `None` when absent or mistyped.
fn section<'a>(table: &'a Table, name: &str) -> Option<&'a Table> {
    match table.get(name) {
        Some(Value::Table(t)) => Some(t),
        Some(other) => {
            tracing::warn!(
                section = name,
                found = other.type_str(),
                "config section is not a table, using defaults"
            );
            None
        }
        None => None,
    }
}

fn str_value(section: Option<&Table>, section_name: &str, key: &str, default: &str) -> String {
    match section.and_then(|s| s.get(key)) {
        Some(Value::String(s)) => s.clone(),
        Some(other) => {
            tracing::warn!(
                section = section_name,
                key,
                found = other.type_str(),
                "config value is not a string, using default"
            );
            default.to_string()
        }
        None => default.to_string(),
    }
}

fn int_value(section: Option<&Table>, section_name: &str, key: &str, default: i64) -> i64 {
    match section.and_then(|s| s.get(key)) {
        Some(Value::Integer(n)) => *n,
        Some(other) => {
            tracing::warn!(
                section = section_name,
                key,
                found = other.type_str(),
                "config value is not an integer, using default"
            );
            default
        }
        None => default,
    }
}

/// Integer key interpreted as a millisecond count; negative values are
/// malformed and fall back to the default.
fn ms_value(section: Option<&Table>, section_name: &str, key: &str, default: u64) -> u64 {
    let raw = int_value(section, section_name, key, default as i64);
    if raw < 0 {
        tracing::warn!(section = section_name, key, value = raw, "negative duration, using default");
        default
    } else {
        raw as u64
    }
}

/// Like [`ms_value`], but zero is malformed too.
fn positive_ms_value(section: Option<&Table>, section_name: &str, key: &str, default: u64) -> u64 {
    let raw = ms_value(section, section_name, key, default);
    if raw == 0 {
        tracing::warn!(section = section_name, key, "zero duration, using default");
        default
    } else {
        raw
    }
}
