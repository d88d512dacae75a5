//! `PostgreSQL` backend for the blood bank.
//!
//! Provides [`PostgresStockLedger`] and [`PostgresRequestStore`], the durable
//! counterparts of the in-memory ledger and store in `bloodbank-core`, and
//! [`PostgresBloodBank`], which writes both in one transaction.
//!
//! - Reservations are a single conditional `UPDATE ... WHERE units >= $n`, so
//!   the check and the decrement are one statement for the database.
//! - Releases are an upsert that creates the ledger row on first use.
//! - Status changes are compare-and-set against the legal predecessor
//!   statuses, so a writer that lost a race is told so.
//! - [`PostgresBloodBank`] locks the request row for a status change, so two
//!   processes cancelling the same request release its units once.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use bloodbank_core::{Allocator, SystemClock};
//! use bloodbank_postgres::{PostgresBloodBank, PostgresRequestStore, PostgresStockLedger};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = bloodbank_postgres::connect("postgres://localhost/bloodbank", 10).await?;
//! bloodbank_postgres::migrate(&pool).await?;
//!
//! let clock = Arc::new(SystemClock);
//! let allocator = Allocator::transactional(
//!     Arc::new(PostgresBloodBank::new(pool.clone(), clock.clone())),
//!     Arc::new(PostgresStockLedger::new(pool.clone(), clock.clone())),
//!     Arc::new(PostgresRequestStore::new(pool, clock)),
//! );
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use bloodbank_core::StorageError;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

mod bank;
mod ledger;
mod store;

pub use bank::PostgresBloodBank;
pub use ledger::PostgresStockLedger;
pub use store::PostgresRequestStore;

/// Open a connection pool.
///
/// # Errors
///
/// Returns [`StorageError::Unavailable`] if the database cannot be reached.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool, StorageError> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
        .map_err(|e| StorageError::Unavailable(format!("Failed to connect: {e}")))
}

/// Create the ledger and request tables if they don't already exist.
///
/// # Errors
///
/// Returns [`StorageError::Database`] if a migration fails.
pub async fn migrate(pool: &PgPool) -> Result<(), StorageError> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| StorageError::Database(format!("Migration failed: {e}")))?;
    tracing::info!("Blood bank migrations applied");
    Ok(())
}

/// Map a driver error onto the core storage error.
pub(crate) fn storage_error(error: sqlx::Error) -> StorageError {
    match error {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StorageError::Unavailable(error.to_string())
        },
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            StorageError::Corrupt(error.to_string())
        },
        other => StorageError::Database(other.to_string()),
    }
}

/// Map a malformed column value onto [`StorageError::Corrupt`].
pub(crate) fn corrupt(column: &str, detail: impl std::fmt::Display) -> StorageError {
    StorageError::Corrupt(format!("{column}: {detail}"))
}
