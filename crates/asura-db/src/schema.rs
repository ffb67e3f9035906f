//! Idempotent schema creation for the block-protection tables.
//!
//! The DDL is embedded at compile time, one statement pair per backend.
//! `blocks` is created before `block_access` because the latter's foreign
//! key references it. Both statements are `CREATE TABLE IF NOT EXISTS`,
//! so running against an existing schema is a no-op; there is no ALTER or
//! migration machinery here.

use mysql::prelude::Queryable;
use thiserror::Error;

use crate::manager::{DatabaseManager, DriverError, PoolError, PooledConn};

const SQLITE_BLOCKS: &str = include_str!("schema/sqlite_blocks.sql");
const SQLITE_BLOCK_ACCESS: &str = include_str!("schema/sqlite_block_access.sql");
const MYSQL_BLOCKS: &str = include_str!("schema/mysql_blocks.sql");
const MYSQL_BLOCK_ACCESS: &str = include_str!("schema/mysql_block_access.sql");

/// Errors that can occur during schema creation.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// Could not check a connection out of the pool.
    #[error("failed to acquire connection for schema setup: {0}")]
    Acquire(#[from] PoolError),

    /// Starting or committing the schema transaction failed.
    #[error("schema transaction failed: {0}")]
    Transaction(#[source] DriverError),

    /// A CREATE TABLE statement failed.
    #[error("schema statement for `{table}` failed: {source}")]
    Statement {
        /// The table whose statement failed.
        table: &'static str,
        /// The underlying driver error.
        #[source]
        source: DriverError,
    },
}

/// Creates the `blocks` and `block_access` tables if they do not exist.
///
/// One connection is checked out for the whole operation. On SQLite the
/// two statements run inside a single transaction, so a failure leaves no
/// half-created schema; MySQL autocommits each DDL statement on its own
/// and cannot be wrapped the same way.
///
/// # Errors
///
/// Returns `SchemaError` when the connection cannot be acquired or a
/// statement fails. Re-running after a success is a no-op.
pub fn init_tables(db: &DatabaseManager) -> Result<(), SchemaError> {
    let mut conn = db.get_connection()?;

    match &mut conn.conn {
        PooledConn::Sqlite(conn) => {
            let tx = conn
                .unchecked_transaction()
                .map_err(|e| SchemaError::Transaction(e.into()))?;
            tx.execute_batch(SQLITE_BLOCKS)
                .map_err(|e| statement_failed("blocks", e))?;
            tx.execute_batch(SQLITE_BLOCK_ACCESS)
                .map_err(|e| statement_failed("block_access", e))?;
            tx.commit().map_err(|e| SchemaError::Transaction(e.into()))?;
        }
        PooledConn::Mysql(conn) => {
            conn.query_drop(MYSQL_BLOCKS)
                .map_err(|e| statement_failed("blocks", e))?;
            conn.query_drop(MYSQL_BLOCK_ACCESS)
                .map_err(|e| statement_failed("block_access", e))?;
        }
    }

    tracing::debug!("block storage schema verified");
    Ok(())
}

fn statement_failed(table: &'static str, source: impl Into<DriverError>) -> SchemaError {
    SchemaError::Statement {
        table,
        source: source.into(),
    }
}
