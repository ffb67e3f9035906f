//! Connection pool lifecycle for both database backends.
//!
//! One [`DatabaseManager`] drives either a networked MySQL pool or an
//! embedded SQLite pool, selected by [`BackendKind`]. Pool sizing bounds
//! come from [`PoolSettings`] and apply uniformly; backend-specific
//! connection setup (MySQL session charset and statement cache, SQLite
//! pragmas) lives in the r2d2 connection managers so every pooled
//! connection is configured identically.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use mysql::prelude::Queryable;
use mysql::{Opts, OptsBuilder};
use r2d2::{ManageConnection, Pool, PooledConnection};
use r2d2_mysql::MySqlConnectionManager;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::OpenFlags;
use thiserror::Error;

use crate::config::{BackendKind, DbConfig, PoolSettings};

/// Prepared-statement cache entries per MySQL connection.
const MYSQL_STMT_CACHE_SIZE: usize = 250;

/// A driver-level error from either backend.
#[derive(Debug, Error)]
pub enum DriverError {
    /// SQLite driver error.
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    /// MySQL driver error.
    #[error(transparent)]
    Mysql(#[from] mysql::Error),
}

/// Errors from pool lifecycle and connection checkout.
#[derive(Debug, Error)]
pub enum PoolError {
    /// The startup probe connection could not be established.
    #[error("database probe connection failed: {0}")]
    Probe(#[source] DriverError),

    /// Checking a connection out of the pool failed or timed out.
    #[error("failed to acquire pooled connection: {0}")]
    Acquire(#[from] r2d2::Error),

    /// A connection was requested before `connect()` succeeded.
    #[error("database is not connected")]
    NotConnected,
}

/// Owns the connection pool for the configured backend.
///
/// Construction stores the configuration without touching the network or
/// filesystem; [`connect`](DatabaseManager::connect) opens the pool and
/// fails fast when the target is unreachable. [`close`](DatabaseManager::close)
/// is idempotent and shutdown-safe.
pub struct DatabaseManager {
    config: DbConfig,
    pool: Option<PoolHandle>,
}

enum PoolHandle {
    Mysql(Pool<MySqlConnectionManager>),
    Sqlite(Pool<SqliteConnectionManager>),
}

impl DatabaseManager {
    /// Creates a manager for the given configuration. No connection is
    /// opened until [`connect`](DatabaseManager::connect).
    pub fn new(config: DbConfig) -> Self {
        Self { config, pool: None }
    }

    /// The configured backend.
    pub fn backend(&self) -> BackendKind {
        self.config.kind
    }

    /// The credential-free DSN, for logging and diagnostics.
    pub fn database_url(&self) -> String {
        match self.config.kind {
            BackendKind::Mysql => format!(
                "mysql://{}:{}/{}{}",
                self.config.host, self.config.port, self.config.database, self.config.params
            ),
            BackendKind::Sqlite => format!("sqlite://{}", self.sqlite_path().display()),
        }
    }

    /// SQLite file path, resolved against the config file's directory when
    /// one is known.
    fn sqlite_path(&self) -> PathBuf {
        match &self.config.base_dir {
            Some(dir) => dir.join(&self.config.file),
            None => PathBuf::from(&self.config.file),
        }
    }

    /// Opens the connection pool and probes the target once.
    ///
    /// The probe connection is opened and immediately released so an
    /// unreachable server, bad credentials, or an unwritable database file
    /// fail here instead of on first use. No retry is attempted; the retry
    /// policy, if any, belongs to the caller.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::Probe` carrying the underlying driver error
    /// when the probe fails.
    pub fn connect(&mut self) -> Result<(), PoolError> {
        if self.pool.is_some() {
            tracing::debug!("connect() called on an already-connected manager");
            return Ok(());
        }

        let handle = match self.config.kind {
            BackendKind::Mysql => PoolHandle::Mysql(self.connect_mysql()?),
            BackendKind::Sqlite => PoolHandle::Sqlite(self.connect_sqlite()?),
        };
        self.pool = Some(handle);
        tracing::info!(url = %self.database_url(), "database pool ready");
        Ok(())
    }

    fn connect_mysql(&self) -> Result<Pool<MySqlConnectionManager>, PoolError> {
        let opts = Opts::from_url(&self.database_url())
            .map_err(|e| PoolError::Probe(DriverError::Mysql(e.into())))?;
        let opts = OptsBuilder::from_opts(opts)
            .user(Some(&self.config.user))
            .pass(Some(&self.config.password))
            .tcp_connect_timeout(Some(self.config.pool.connection_timeout))
            .stmt_cache_size(MYSQL_STMT_CACHE_SIZE)
            // Force UTF-8 server-side regardless of the server's default
            // character set.
            .init(vec!["SET NAMES utf8mb4"]);

        let manager = MySqlConnectionManager::new(opts);
        let probe = manager
            .connect()
            .map_err(|e| PoolError::Probe(e.into()))?;
        drop(probe);

        Ok(pool_builder(&self.effective_pool_settings()).build_unchecked(manager))
    }

    fn connect_sqlite(&self) -> Result<Pool<SqliteConnectionManager>, PoolError> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_FULL_MUTEX;

        let manager = SqliteConnectionManager::file(self.sqlite_path())
            .with_flags(flags)
            .with_init(|conn| {
                // Set WAL mode and verify it was accepted; SQLite reports
                // the mode actually in effect, and in-memory databases
                // report "memory".
                let journal_mode: String =
                    conn.query_row("PRAGMA journal_mode = WAL;", [], |row| row.get(0))?;
                if journal_mode != "wal" && journal_mode != "memory" {
                    return Err(rusqlite::Error::SqliteFailure(
                        rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_ERROR),
                        Some(format!(
                            "failed to set WAL journal mode, got: {}",
                            journal_mode
                        )),
                    ));
                }
                conn.execute_batch("PRAGMA foreign_keys = ON;")
            });

        let probe = manager
            .connect()
            .map_err(|e| PoolError::Probe(e.into()))?;
        drop(probe);

        Ok(pool_builder(&self.effective_pool_settings()).build_unchecked(manager))
    }

    /// Pool bounds actually applied. SQLite files do not support multiple
    /// concurrent writers, so its pool is capped at one connection.
    fn effective_pool_settings(&self) -> PoolSettings {
        let mut settings = self.config.pool;
        if self.config.kind == BackendKind::Sqlite && settings.max_size > 1 {
            tracing::warn!(
                configured = settings.max_size,
                "SQLite pools are capped at a single connection"
            );
            settings.max_size = 1;
            settings.min_idle = settings.min_idle.min(1);
        }
        settings
    }

    /// Checks a connection out of the pool.
    ///
    /// The returned handle is scoped: dropping it returns the connection
    /// to the pool on every exit path.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::NotConnected` before a successful `connect()`,
    /// and `PoolError::Acquire` when checkout fails or times out.
    pub fn get_connection(&self) -> Result<DbConnection, PoolError> {
        let conn = match self.pool.as_ref().ok_or(PoolError::NotConnected)? {
            PoolHandle::Mysql(pool) => PooledConn::Mysql(pool.get()?),
            PoolHandle::Sqlite(pool) => PooledConn::Sqlite(pool.get()?),
        };

        Ok(DbConnection {
            conn,
            checked_out: Instant::now(),
            leak_threshold: self.config.pool.leak_threshold,
        })
    }

    /// Closes the pool, dropping every idle connection.
    ///
    /// Idempotent: closing a manager that never connected, or was already
    /// closed, is a no-op. Shutdown never raises.
    pub fn close(&mut self) {
        if let Some(handle) = self.pool.take() {
            drop(handle);
            tracing::info!("database pool closed");
        }
    }
}

fn pool_builder<M: ManageConnection>(settings: &PoolSettings) -> r2d2::Builder<M> {
    Pool::builder()
        .max_size(settings.max_size)
        .min_idle(Some(settings.min_idle))
        .connection_timeout(settings.connection_timeout)
        .idle_timeout(Some(settings.idle_timeout))
}

/// A pooled connection checked out of the manager.
///
/// Dropping the handle returns the connection to the pool. When leak
/// detection is configured, a handle held past the threshold logs a
/// warning on release.
#[derive(Debug)]
pub struct DbConnection {
    pub(crate) conn: PooledConn,
    checked_out: Instant,
    leak_threshold: Option<Duration>,
}

#[derive(Debug)]
pub(crate) enum PooledConn {
    Mysql(PooledConnection<MySqlConnectionManager>),
    Sqlite(PooledConnection<SqliteConnectionManager>),
}

impl DbConnection {
    /// The underlying SQLite connection, when the embedded backend is
    /// active.
    pub fn as_sqlite(&self) -> Option<&rusqlite::Connection> {
        match &self.conn {
            PooledConn::Sqlite(conn) => Some(conn),
            PooledConn::Mysql(_) => None,
        }
    }

    /// The underlying MySQL connection, when the network backend is
    /// active.
    pub fn as_mysql(&mut self) -> Option<&mut mysql::Conn> {
        match &mut self.conn {
            PooledConn::Mysql(conn) => Some(conn),
            PooledConn::Sqlite(_) => None,
        }
    }

    /// Executes statements that return no rows, on either backend.
    ///
    /// # Errors
    ///
    /// Returns the driver error of the active backend on failure.
    pub fn execute(&mut self, sql: &str) -> Result<(), DriverError> {
        match &mut self.conn {
            PooledConn::Sqlite(conn) => conn.execute_batch(sql).map_err(DriverError::from),
            PooledConn::Mysql(conn) => conn.query_drop(sql).map_err(DriverError::from),
        }
    }
}

impl Drop for DbConnection {
    fn drop(&mut self) {
        if let Some(threshold) = self.leak_threshold {
            let held = self.checked_out.elapsed();
            if held > threshold {
                tracing::warn!(
                    held_ms = held.as_millis() as u64,
                    threshold_ms = threshold.as_millis() as u64,
                    "connection held past the leak detection threshold"
                );
            }
        }
    }
}
