//! Stock ledger backed by the `blood_inventory` table.

use std::sync::Arc;

use bloodbank_core::environment::Clock;
use bloodbank_core::{
    BloodType, DateTime, StockEntry, StockLedger, StockSnapshot, StorageError, Utc,
};
use futures::future::BoxFuture;
use sqlx::{PgExecutor, PgPool, Row};

use crate::{corrupt, storage_error};

/// `PostgreSQL` stock ledger.
///
/// Every mutation is one statement, so concurrent reservations from any
/// number of processes are serialized by the row lock on the blood type.
/// [`PostgresBloodBank`](crate::PostgresBloodBank) runs the same statements
/// inside a transaction.
#[derive(Clone)]
pub struct PostgresStockLedger {
    pool: PgPool,
    clock: Arc<dyn Clock>,
}

impl PostgresStockLedger {
    /// Create a ledger over an existing pool.
    #[must_use]
    pub fn new(pool: PgPool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    /// Get the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn row_to_entry(row: &sqlx::postgres::PgRow) -> Result<StockEntry, StorageError> {
        let blood_type: String = row.try_get("blood_type").map_err(storage_error)?;
        let units: i64 = row.try_get("units").map_err(storage_error)?;

        Ok(StockEntry {
            blood_type: blood_type
                .parse::<BloodType>()
                .map_err(|e| corrupt("blood_type", e))?,
            units: u64::try_from(units).map_err(|e| corrupt("units", e))?,
            last_updated: row.try_get("last_updated").map_err(storage_error)?,
        })
    }
}

/// Take `quantity` units of `blood_type` if that many are on hand.
///
/// One conditional statement: the check and the decrement cannot be split by
/// another writer, and no row is created when the type was never stocked.
pub(crate) async fn reserve<'c, E>(
    executor: E,
    blood_type: BloodType,
    quantity: u32,
    now: DateTime<Utc>,
) -> Result<bool, StorageError>
where
    E: PgExecutor<'c>,
{
    let result = sqlx::query(
        r"
        UPDATE blood_inventory
        SET units = units - $2, last_updated = $3
        WHERE blood_type = $1 AND units >= $2
        ",
    )
    .bind(blood_type.as_str())
    .bind(i64::from(quantity))
    .bind(now)
    .execute(executor)
    .await
    .map_err(storage_error)?;

    let reserved = result.rows_affected() == 1;
    tracing::debug!(%blood_type, quantity, reserved, "Reservation attempted");
    Ok(reserved)
}

/// Add `quantity` units of `blood_type`, creating the row on first use.
pub(crate) async fn credit<'c, E>(
    executor: E,
    blood_type: BloodType,
    quantity: u32,
    now: DateTime<Utc>,
) -> Result<(), StorageError>
where
    E: PgExecutor<'c>,
{
    sqlx::query(
        r"
        INSERT INTO blood_inventory (blood_type, units, last_updated)
        VALUES ($1, $2, $3)
        ON CONFLICT (blood_type) DO UPDATE
        SET units = blood_inventory.units + EXCLUDED.units,
            last_updated = EXCLUDED.last_updated
        ",
    )
    .bind(blood_type.as_str())
    .bind(i64::from(quantity))
    .bind(now)
    .execute(executor)
    .await
    .map_err(storage_error)?;

    tracing::debug!(%blood_type, quantity, "Units released");
    Ok(())
}

impl StockLedger for PostgresStockLedger {
    fn try_reserve(
        &self,
        blood_type: BloodType,
        quantity: u32,
    ) -> BoxFuture<'_, Result<bool, StorageError>> {
        Box::pin(reserve(&self.pool, blood_type, quantity, self.clock.now()))
    }

    fn release(
        &self,
        blood_type: BloodType,
        quantity: u32,
    ) -> BoxFuture<'_, Result<(), StorageError>> {
        Box::pin(credit(&self.pool, blood_type, quantity, self.clock.now()))
    }

    fn snapshot(&self) -> BoxFuture<'_, Result<StockSnapshot, StorageError>> {
        Box::pin(async move {
            let rows = sqlx::query(
                "SELECT blood_type, units, last_updated FROM blood_inventory ORDER BY blood_type",
            )
            .fetch_all(&self.pool)
            .await
            .map_err(storage_error)?;

            let entries = rows
                .iter()
                .map(Self::row_to_entry)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(StockSnapshot::from_entries(entries))
        })
    }
}
