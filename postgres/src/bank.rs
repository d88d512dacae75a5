//! Ledger and request writes committed in one transaction.

use std::sync::Arc;

use bloodbank_core::environment::Clock;
use bloodbank_core::{
    BloodRequest, Error, LedgerEffect, NewBloodRequest, RequestId, RequestStatus, Result,
    TransactionalBank, Transitioned,
};
use futures::future::BoxFuture;
use sqlx::{PgPool, Postgres, Transaction};

use crate::ledger::{credit, reserve};
use crate::storage_error;
use crate::store::{RowLock, compare_and_set, fetch, insert};

/// `PostgreSQL` implementation of [`TransactionalBank`].
///
/// A status change locks the request row before the inventory row. A
/// submission locks only the inventory row. A transaction that returns early
/// is dropped and rolls back.
#[derive(Clone)]
pub struct PostgresBloodBank {
    pool: PgPool,
    clock: Arc<dyn Clock>,
}

impl PostgresBloodBank {
    /// Create a bank over an existing pool.
    #[must_use]
    pub fn new(pool: PgPool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>> {
        Ok(self.pool.begin().await.map_err(storage_error)?)
    }

    async fn transition_in_tx(&self, id: RequestId, to: RequestStatus) -> Result<Transitioned> {
        let mut tx = self.begin().await?;
        let now = self.clock.now();

        let current = fetch(&mut *tx, id, RowLock::ForUpdate)
            .await?
            .ok_or(Error::NotFound(id))?;
        let from = current.status;

        if from == to {
            return Ok(Transitioned {
                from,
                request: current,
            });
        }
        if !from.can_transition_to(to) {
            return Err(Error::InvalidTransition { id, from, to });
        }

        match LedgerEffect::for_transition(from, to) {
            LedgerEffect::None => {},
            LedgerEffect::Reserve => {
                if !reserve(&mut *tx, current.blood_type, current.quantity, now).await? {
                    tracing::info!(request_id = %id, "Not enough stock to fulfil request");
                    return Err(Error::InsufficientStock {
                        blood_type: current.blood_type,
                        requested: current.quantity,
                    });
                }
            },
            LedgerEffect::Release => {
                credit(&mut *tx, current.blood_type, current.quantity, now).await?;
            },
        }

        let request = compare_and_set(&mut *tx, id, to, now)
            .await?
            .ok_or(Error::InvalidTransition { id, from, to })?;

        tx.commit().await.map_err(storage_error)?;
        Ok(Transitioned { from, request })
    }
}

impl TransactionalBank for PostgresBloodBank {
    fn submit(&self, request: NewBloodRequest) -> BoxFuture<'_, Result<BloodRequest>> {
        Box::pin(async move {
            request.validate()?;
            let mut tx = self.begin().await?;
            let now = self.clock.now();

            let status = if reserve(&mut *tx, request.blood_type, request.quantity, now).await? {
                RequestStatus::Fulfilled
            } else {
                RequestStatus::Pending
            };
            let record = insert(&mut *tx, request, status, now).await?;

            tx.commit().await.map_err(storage_error)?;
            Ok(record)
        })
    }

    fn transition(
        &self,
        id: RequestId,
        to: RequestStatus,
    ) -> BoxFuture<'_, Result<Transitioned>> {
        Box::pin(self.transition_in_tx(id, to))
    }
}
