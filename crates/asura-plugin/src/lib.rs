//! Plugin lifecycle glue for the AsuraCore block-storage module.
//!
//! [`AsuraCore`] is the host-facing surface: the game server calls
//! [`enable`](AsuraCore::enable) when loading the module and
//! [`disable`](AsuraCore::disable) when unloading it. In between, other
//! plugin components reach the database through
//! [`database`](AsuraCore::database).
//!
//! The lifecycle is a three-state machine, `Uninitialized → Ready →
//! Closed`, with `Closed` terminal. Startup is all-or-nothing: the module
//! only becomes ready once configuration loads, the pool connects, and
//! the schema exists. Any failure is logged, everything partially opened
//! is torn down, and the error is returned so the host can disable the
//! module. Shutdown never raises.

use std::path::Path;

use thiserror::Error;

use asura_db::{init_tables, ConfigError, DatabaseManager, DbConfig, PoolError, SchemaError};

/// Contents written to the config path when no file exists yet.
const DEFAULT_CONFIG: &str = include_str!("default_config.toml");

/// Reasons startup can fail. Every variant is fatal to activation; there
/// is no retry or degraded mode.
#[derive(Debug, Error)]
pub enum EnableError {
    /// The config file exists but could not be read or parsed.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The database was unreachable or refused the probe connection.
    #[error("database connection error: {0}")]
    Connect(#[from] PoolError),

    /// The schema could not be created.
    #[error("schema initialization error: {0}")]
    Schema(#[from] SchemaError),
}

enum State {
    Uninitialized,
    Ready(DatabaseManager),
    Closed,
}

/// The plugin module itself.
pub struct AsuraCore {
    state: State,
}

impl AsuraCore {
    /// Creates the module in its uninitialized state.
    pub fn new() -> Self {
        Self {
            state: State::Uninitialized,
        }
    }

    /// Brings the database online from a config file.
    ///
    /// A commented default config is written first when none exists, so
    /// operators have something to edit. Then: load configuration,
    /// connect the pool, create the schema, become ready.
    ///
    /// # Errors
    ///
    /// Returns `EnableError` when any startup step fails; the cause is
    /// also logged. The host should disable the module on error.
    pub fn enable(&mut self, config_path: &Path) -> Result<(), EnableError> {
        if let Err(e) = write_default_config(config_path) {
            // Not fatal: loading falls back to defaults for a missing file.
            tracing::warn!(
                path = %config_path.display(),
                error = %e,
                "could not write default config file"
            );
        }

        match DbConfig::from_file(config_path) {
            Ok(config) => self.enable_with_config(config),
            Err(e) => {
                tracing::error!(error = %e, "startup failed, module must be disabled");
                Err(e.into())
            }
        }
    }

    /// Brings the database online from an already-built configuration.
    ///
    /// Entry point for embedding and tests; behaves exactly like
    /// [`enable`](AsuraCore::enable) after config loading.
    ///
    /// # Errors
    ///
    /// Returns `EnableError` when connecting or schema creation fails.
    pub fn enable_with_config(&mut self, config: DbConfig) -> Result<(), EnableError> {
        if !matches!(self.state, State::Uninitialized) {
            tracing::warn!("enable called on an already-started module, ignoring");
            return Ok(());
        }

        match start(config) {
            Ok(db) => {
                tracing::info!("AsuraCore enabled, database connected and tables initialized");
                self.state = State::Ready(db);
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "startup failed, module must be disabled");
                Err(e)
            }
        }
    }

    /// Database handle for other plugin components. `None` unless the
    /// module is ready.
    pub fn database(&self) -> Option<&DatabaseManager> {
        match &self.state {
            State::Ready(db) => Some(db),
            State::Uninitialized | State::Closed => None,
        }
    }

    /// Shuts the database down and moves to the terminal state.
    ///
    /// Safe to call in any state, any number of times, including before a
    /// successful enable. Shutdown never raises.
    pub fn disable(&mut self) {
        if let State::Ready(mut db) = std::mem::replace(&mut self.state, State::Closed) {
            db.close();
        }
        tracing::info!("AsuraCore disabled");
    }
}

impl Default for AsuraCore {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs the startup sequence, tearing down the pool if schema creation
/// fails so no half-open state leaks out.
fn start(config: DbConfig) -> Result<DatabaseManager, EnableError> {
    let mut db = DatabaseManager::new(config);
    db.connect()?;
    if let Err(e) = init_tables(&db) {
        db.close();
        return Err(e.into());
    }
    Ok(db)
}

/// Writes the bundled default config when the path does not exist yet.
fn write_default_config(path: &Path) -> std::io::Result<()> {
    if path.exists() {
        return Ok(());
    }
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(path, DEFAULT_CONFIG)?;
    tracing::info!(path = %path.display(), "wrote default configuration");
    Ok(())
}
