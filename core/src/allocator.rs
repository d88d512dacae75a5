//! Allocator: the decision procedure that pairs ledger changes with request status.
//!
//! Two entry points drive every request through its lifecycle:
//!
//! - [`Allocator::submit`] tries to reserve stock exactly once and records the
//!   request as `fulfilled` or `pending` accordingly.
//! - [`Allocator::transition`] applies the ledger delta implied by an operator's
//!   status change, then persists the new status.
//!
//! | from → to              | ledger effect                                    |
//! |------------------------|--------------------------------------------------|
//! | pending → fulfilled    | reserve; `InsufficientStock` if short            |
//! | pending → canceled     | none                                             |
//! | fulfilled → canceled   | release                                          |
//! | same → same            | none, request returned unchanged                 |
//! | fulfilled → pending    | rejected with `InvalidTransition`                |
//! | canceled → anything    | rejected with `InvalidTransition`                |
//!
//! # Writing both sides
//!
//! Built with [`Allocator::transactional`], the ledger write and the status
//! write go through a [`TransactionalBank`] and commit together.
//!
//! Built with [`Allocator::new`], the ledger and the store are written
//! separately. The ledger effect runs first and the status is persisted only
//! if it succeeded. If persisting fails, the ledger effect is undone before
//! the error is returned. Operations on the same blood type hold a per-type
//! guard for their whole ledger/persist/compensate sequence, so the undo of a
//! release always finds the units it just returned.
//!
//! # Abandoned calls
//!
//! Each operation runs on its own task. A caller that stops waiting (a
//! timeout, a dropped HTTP connection) does not stop the operation; it runs
//! to completion and its result is discarded.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::Instrument;

use crate::bank::{LedgerEffect, TransactionalBank, Transitioned};
use crate::error::{Error, Result, StorageError};
use crate::ledger::StockLedger;
use crate::metrics as names;
use crate::read::ReadApi;
use crate::store::RequestStore;
use crate::types::{BloodRequest, BloodType, NewBloodRequest, RequestId, RequestStatus};

/// Coordinates the stock ledger and the request store.
///
/// Holds no domain state of its own. Cloning is cheap and clones share the
/// same backend and per-blood-type guards.
#[derive(Clone)]
pub struct Allocator {
    inner: Arc<Inner>,
}

struct Inner {
    ledger: Arc<dyn StockLedger>,
    store: Arc<dyn RequestStore>,
    writes: Writes,
}

/// How the two sides of an operation are written.
enum Writes {
    /// Separate writes paired by compensation, one guard per blood type
    Compensating([Mutex<()>; BloodType::COUNT]),
    /// One transaction per operation
    Transactional(Arc<dyn TransactionalBank>),
}

impl Allocator {
    /// Create an allocator over a ledger and a request store that are
    /// written separately and paired by compensation.
    #[must_use]
    pub fn new(ledger: Arc<dyn StockLedger>, store: Arc<dyn RequestStore>) -> Self {
        Self::with_writes(
            ledger,
            store,
            Writes::Compensating(std::array::from_fn(|_| Mutex::new(()))),
        )
    }

    /// Create an allocator whose mutations commit through `bank`.
    ///
    /// `ledger` and `store` serve reads and must see the same data as `bank`.
    #[must_use]
    pub fn transactional(
        bank: Arc<dyn TransactionalBank>,
        ledger: Arc<dyn StockLedger>,
        store: Arc<dyn RequestStore>,
    ) -> Self {
        Self::with_writes(ledger, store, Writes::Transactional(bank))
    }

    fn with_writes(
        ledger: Arc<dyn StockLedger>,
        store: Arc<dyn RequestStore>,
        writes: Writes,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                ledger,
                store,
                writes,
            }),
        }
    }

    /// Read-only view over the same ledger and store.
    #[must_use]
    pub fn read(&self) -> ReadApi {
        ReadApi::new(Arc::clone(&self.inner.ledger), Arc::clone(&self.inner.store))
    }

    /// Record a new request, fulfilling it immediately if stock allows.
    ///
    /// Reservation is attempted exactly once. When `quantity` equals the units
    /// on hand the request is fulfilled. Urgency plays no part in the decision.
    ///
    /// # Errors
    ///
    /// - [`Error::Validation`] for a malformed submission (nothing is touched)
    /// - [`Error::Storage`] on backend failure; a reservation made before a
    ///   failed insert is released again
    #[tracing::instrument(
        skip_all,
        fields(blood_type = %request.blood_type, quantity = request.quantity, urgency = %request.urgency)
    )]
    pub async fn submit(&self, request: NewBloodRequest) -> Result<BloodRequest> {
        request.validate()?;
        let inner = Arc::clone(&self.inner);
        run_to_completion(async move { inner.submit(request).await }).await
    }

    /// Move a request to `to`, applying the implied ledger delta first.
    ///
    /// Same-state requests are idempotent no-ops that return the stored record.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] for an unknown id
    /// - [`Error::InvalidTransition`] for `fulfilled → pending` or any move out of `canceled`
    /// - [`Error::InsufficientStock`] when `pending → fulfilled` cannot be covered;
    ///   the request stays pending
    /// - [`Error::Storage`] on backend failure; the ledger effect is undone
    #[tracing::instrument(skip_all, fields(request_id = %id, to = %to))]
    pub async fn transition(&self, id: RequestId, to: RequestStatus) -> Result<BloodRequest> {
        let inner = Arc::clone(&self.inner);
        run_to_completion(async move { inner.transition(id, to).await }).await
    }
}

/// Run `work` on its own task and wait for it.
///
/// Dropping the returned future stops the wait, not the work.
async fn run_to_completion<T, F>(work: F) -> Result<T>
where
    T: Send + 'static,
    F: Future<Output = Result<T>> + Send + 'static,
{
    match tokio::spawn(work.in_current_span()).await {
        Ok(result) => result,
        Err(e) => {
            tracing::error!(error = %e, "Allocator task did not complete");
            Err(StorageError::Unavailable(format!("allocator task did not complete: {e}")).into())
        },
    }
}

impl Inner {
    async fn submit(&self, request: NewBloodRequest) -> Result<BloodRequest> {
        let record = match &self.writes {
            Writes::Transactional(bank) => bank.submit(request).await?,
            Writes::Compensating(guards) => self.submit_compensating(guards, request).await?,
        };

        tracing::info!(request_id = %record.id, status = %record.status, "Blood request recorded");
        ::metrics::counter!(names::REQUESTS_SUBMITTED, "outcome" => record.status.as_str())
            .increment(1);
        if record.status == RequestStatus::Fulfilled {
            ::metrics::counter!(names::UNITS_RESERVED, "blood_type" => record.blood_type.as_str())
                .increment(u64::from(record.quantity));
        }
        Ok(record)
    }

    async fn transition(&self, id: RequestId, to: RequestStatus) -> Result<BloodRequest> {
        let Transitioned { from, request } = match &self.writes {
            Writes::Transactional(bank) => bank.transition(id, to).await?,
            Writes::Compensating(guards) => self.transition_compensating(guards, id, to).await?,
        };

        if from == to {
            tracing::debug!(status = %from, "Status unchanged");
            return Ok(request);
        }

        tracing::info!(from = %from, "Request status changed");
        ::metrics::counter!(names::TRANSITIONS, "from" => from.as_str(), "to" => to.as_str())
            .increment(1);
        let units = u64::from(request.quantity);
        match LedgerEffect::for_transition(from, to) {
            LedgerEffect::None => {},
            LedgerEffect::Reserve => {
                ::metrics::counter!(names::UNITS_RESERVED, "blood_type" => request.blood_type.as_str())
                    .increment(units);
            },
            LedgerEffect::Release => {
                ::metrics::counter!(names::UNITS_RELEASED, "blood_type" => request.blood_type.as_str())
                    .increment(units);
            },
        }
        Ok(request)
    }

    async fn submit_compensating(
        &self,
        guards: &[Mutex<()>; BloodType::COUNT],
        request: NewBloodRequest,
    ) -> Result<BloodRequest> {
        let blood_type = request.blood_type;
        let quantity = request.quantity;
        let _guard = guards[blood_type.index()].lock().await;

        let reserved = self.ledger.try_reserve(blood_type, quantity).await?;
        let status = if reserved {
            RequestStatus::Fulfilled
        } else {
            RequestStatus::Pending
        };

        match self.store.create(request, status).await {
            Ok(record) => Ok(record),
            Err(err) => {
                if reserved {
                    self.undo(LedgerEffect::Reserve, blood_type, quantity, &err)
                        .await;
                }
                Err(err)
            },
        }
    }

    async fn transition_compensating(
        &self,
        guards: &[Mutex<()>; BloodType::COUNT],
        id: RequestId,
        to: RequestStatus,
    ) -> Result<Transitioned> {
        let blood_type = self.store.get(id).await?.blood_type;
        let _guard = guards[blood_type.index()].lock().await;

        // Re-read under the guard; another transition may have won the race
        let current = self.store.get(id).await?;
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

        let effect = LedgerEffect::for_transition(from, to);
        let quantity = current.quantity;
        self.apply(effect, blood_type, quantity).await?;

        match self.store.set_status(id, to).await {
            Ok(request) => Ok(Transitioned { from, request }),
            Err(err) => {
                self.undo(effect, blood_type, quantity, &err).await;
                Err(err)
            },
        }
    }

    async fn apply(&self, effect: LedgerEffect, blood_type: BloodType, quantity: u32) -> Result<()> {
        match effect {
            LedgerEffect::None => Ok(()),
            LedgerEffect::Reserve => {
                if self.ledger.try_reserve(blood_type, quantity).await? {
                    Ok(())
                } else {
                    tracing::info!("Not enough stock to fulfil request");
                    Err(Error::InsufficientStock {
                        blood_type,
                        requested: quantity,
                    })
                }
            },
            LedgerEffect::Release => Ok(self.ledger.release(blood_type, quantity).await?),
        }
    }

    /// Reverse a ledger effect after the paired status write failed.
    ///
    /// Failure here leaves the ledger out of step with the store; it is logged
    /// with both errors and the original error is still what the caller sees.
    async fn undo(&self, effect: LedgerEffect, blood_type: BloodType, quantity: u32, cause: &Error) {
        if effect == LedgerEffect::None {
            return;
        }
        tracing::warn!(
            error = %cause,
            effect = ?effect,
            "Status write failed after ledger change, compensating"
        );
        ::metrics::counter!(names::COMPENSATIONS).increment(1);

        let outcome = match effect {
            LedgerEffect::None => Ok(()),
            LedgerEffect::Reserve => self.ledger.release(blood_type, quantity).await,
            LedgerEffect::Release => match self.ledger.try_reserve(blood_type, quantity).await {
                Ok(true) => Ok(()),
                Ok(false) => {
                    tracing::error!(
                        error = %cause,
                        "Released units were no longer on hand to take back"
                    );
                    ::metrics::counter!(names::COMPENSATION_FAILURES).increment(1);
                    return;
                },
                Err(e) => Err(e),
            },
        };

        if let Err(e) = outcome {
            tracing::error!(
                error = %cause,
                compensation_error = %e,
                "Compensation failed, ledger and request store disagree"
            );
            ::metrics::counter!(names::COMPENSATION_FAILURES).increment(1);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::environment::SystemClock;
    use crate::ledger::InMemoryStockLedger;
    use crate::store::InMemoryRequestStore;
    use crate::types::RequestDetails;
    use futures::future::BoxFuture;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Records every request as pending and counts calls.
    struct CountingBank {
        store: Arc<InMemoryRequestStore>,
        submits: AtomicUsize,
        transitions: AtomicUsize,
    }

    impl TransactionalBank for CountingBank {
        fn submit(&self, request: NewBloodRequest) -> BoxFuture<'_, Result<BloodRequest>> {
            self.submits.fetch_add(1, Ordering::SeqCst);
            self.store.create(request, RequestStatus::Pending)
        }

        fn transition(
            &self,
            id: RequestId,
            to: RequestStatus,
        ) -> BoxFuture<'_, Result<Transitioned>> {
            self.transitions.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                let from = self.store.get(id).await?.status;
                let request = self.store.set_status(id, to).await?;
                Ok(Transitioned { from, request })
            })
        }
    }

    fn new_request(quantity: u32) -> NewBloodRequest {
        NewBloodRequest {
            requester_id: crate::types::RequesterId::new(),
            blood_type: BloodType::APositive,
            quantity,
            urgency: crate::types::Urgency::Normal,
            details: RequestDetails {
                city: "Surat".into(),
                hospital: "New Civil Hospital".into(),
                patient_name: "K. Desai".into(),
                contact_number: "0261-2244456".into(),
                notes: None,
            },
        }
    }

    #[tokio::test]
    async fn transactional_allocator_delegates_writes_to_the_bank() {
        let clock = Arc::new(SystemClock);
        let ledger = Arc::new(InMemoryStockLedger::with_stock(
            clock.clone(),
            [(BloodType::APositive, 4)],
        ));
        let store = Arc::new(InMemoryRequestStore::new(clock));
        let bank = Arc::new(CountingBank {
            store: store.clone(),
            submits: AtomicUsize::new(0),
            transitions: AtomicUsize::new(0),
        });
        let allocator = Allocator::transactional(bank.clone(), ledger.clone(), store);

        let request = allocator.submit(new_request(2)).await.unwrap();
        assert_eq!(request.status, RequestStatus::Pending);

        let canceled = allocator
            .transition(request.id, RequestStatus::Canceled)
            .await
            .unwrap();
        assert_eq!(canceled.status, RequestStatus::Canceled);

        assert_eq!(bank.submits.load(Ordering::SeqCst), 1);
        assert_eq!(bank.transitions.load(Ordering::SeqCst), 1);
        // The bank owns every write; the read-side ledger is untouched
        assert_eq!(ledger.snapshot().await.unwrap().units(BloodType::APositive), 4);
    }

    #[tokio::test]
    async fn invalid_submission_never_reaches_the_bank() {
        let clock = Arc::new(SystemClock);
        let store = Arc::new(InMemoryRequestStore::new(clock.clone()));
        let bank = Arc::new(CountingBank {
            store: store.clone(),
            submits: AtomicUsize::new(0),
            transitions: AtomicUsize::new(0),
        });
        let allocator = Allocator::transactional(
            bank.clone(),
            Arc::new(InMemoryStockLedger::new(clock)),
            store,
        );

        assert!(matches!(
            allocator.submit(new_request(0)).await,
            Err(Error::Validation(_))
        ));
        assert_eq!(bank.submits.load(Ordering::SeqCst), 0);
    }
}
