//! Database layer for the AsuraCore block-storage plugin.
//!
//! Provides configuration loading, a pooled connection manager for two
//! backends, and idempotent creation of the `blocks` / `block_access`
//! schema.
//!
//! # Design decisions
//!
//! - **One manager, two backends**: a single [`DatabaseManager`] drives
//!   either a networked MySQL server or an embedded SQLite file, selected
//!   by [`BackendKind`] in the configuration. There is no separate code
//!   path per backend beyond connection setup.
//! - **`r2d2` connection pool**: bounded connection reuse without manual
//!   lifetime management; concurrency safety for unrelated callers is
//!   delegated entirely to the pool.
//! - **SQLite with WAL mode and enforced foreign keys**: applied to every
//!   pooled connection, so the cascade-delete invariant of `block_access`
//!   holds no matter who checks the connection out.
//! - **Lenient configuration**: a malformed value degrades to its default
//!   with a logged warning; startup only fails on an unreadable or
//!   syntactically invalid file.

mod config;
mod manager;
mod schema;

pub use config::{BackendKind, ConfigError, DbConfig, PoolSettings};
pub use manager::{DatabaseManager, DbConnection, DriverError, PoolError};
pub use schema::{init_tables, SchemaError};
