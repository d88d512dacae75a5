//! Request record store.
//!
//! Owns blood request records and guards their status field. The store never
//! touches the ledger: the allocator applies the ledger effect of a status
//! change before asking the store to persist it.

use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::environment::Clock;
use crate::error::{Error, Result};
use crate::types::{
    BloodRequest, NewBloodRequest, RequestId, RequestStatus, RequesterId, UrgencyFilter,
};

/// Persistence for blood requests.
///
/// Listings are ordered by `created_at`, newest first.
///
/// # Dyn Compatibility
///
/// Methods return boxed futures so the store can be shared as
/// `Arc<dyn RequestStore>`.
pub trait RequestStore: Send + Sync {
    /// Persist a new request with the status the allocator decided on.
    ///
    /// # Errors
    ///
    /// - [`Error::Validation`] if the submission is malformed
    /// - [`Error::Storage`] on backend failure
    fn create(
        &self,
        request: NewBloodRequest,
        status: RequestStatus,
    ) -> BoxFuture<'_, Result<BloodRequest>>;

    /// Load one request.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] for an unknown id
    /// - [`Error::Storage`] on backend failure
    fn get(&self, id: RequestId) -> BoxFuture<'_, Result<BloodRequest>>;

    /// Change a request's status if the move is legal from its current status.
    ///
    /// The legality check and the write are one atomic step against the
    /// stored value, so a caller that lost a race sees `InvalidTransition`.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] for an unknown id
    /// - [`Error::InvalidTransition`] if the move is not legal (same-state included)
    /// - [`Error::Storage`] on backend failure
    fn set_status(
        &self,
        id: RequestId,
        status: RequestStatus,
    ) -> BoxFuture<'_, Result<BloodRequest>>;

    /// Pending requests whose urgency passes `filter`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] on backend failure.
    fn list_pending(&self, filter: UrgencyFilter) -> BoxFuture<'_, Result<Vec<BloodRequest>>>;

    /// Every request raised by `requester`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] on backend failure.
    fn list_by_requester(
        &self,
        requester: RequesterId,
    ) -> BoxFuture<'_, Result<Vec<BloodRequest>>>;

    /// Every request.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] on backend failure.
    fn list_all(&self) -> BoxFuture<'_, Result<Vec<BloodRequest>>>;
}

#[derive(Default)]
struct Records {
    by_id: HashMap<RequestId, BloodRequest>,
    /// Insertion order, oldest first
    order: Vec<RequestId>,
}

impl Records {
    fn select(&self, keep: impl Fn(&BloodRequest) -> bool) -> Vec<BloodRequest> {
        let mut selected: Vec<BloodRequest> = self
            .order
            .iter()
            .rev()
            .filter_map(|id| self.by_id.get(id))
            .filter(|r| keep(*r))
            .cloned()
            .collect();
        // Stable: equal timestamps keep newest-insert-first
        selected.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        selected
    }
}

/// In-memory request store.
pub struct InMemoryRequestStore {
    records: RwLock<Records>,
    clock: Arc<dyn Clock>,
}

impl InMemoryRequestStore {
    /// Create an empty store.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            records: RwLock::new(Records::default()),
            clock,
        }
    }

    /// Number of stored requests.
    pub async fn len(&self) -> usize {
        self.records.read().await.order.len()
    }

    /// Whether the store holds no requests.
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.order.is_empty()
    }
}

impl RequestStore for InMemoryRequestStore {
    fn create(
        &self,
        request: NewBloodRequest,
        status: RequestStatus,
    ) -> BoxFuture<'_, Result<BloodRequest>> {
        Box::pin(async move {
            request.validate()?;
            let record = BloodRequest::from_new(RequestId::new(), request, status, self.clock.now());

            let mut records = self.records.write().await;
            records.order.push(record.id);
            records.by_id.insert(record.id, record.clone());
            Ok(record)
        })
    }

    fn get(&self, id: RequestId) -> BoxFuture<'_, Result<BloodRequest>> {
        Box::pin(async move {
            self.records
                .read()
                .await
                .by_id
                .get(&id)
                .cloned()
                .ok_or(Error::NotFound(id))
        })
    }

    fn set_status(
        &self,
        id: RequestId,
        status: RequestStatus,
    ) -> BoxFuture<'_, Result<BloodRequest>> {
        Box::pin(async move {
            let now = self.clock.now();
            let mut records = self.records.write().await;
            let record = records.by_id.get_mut(&id).ok_or(Error::NotFound(id))?;

            if !record.status.can_transition_to(status) {
                return Err(Error::InvalidTransition {
                    id,
                    from: record.status,
                    to: status,
                });
            }

            record.status = status;
            record.updated_at = now;
            Ok(record.clone())
        })
    }

    fn list_pending(&self, filter: UrgencyFilter) -> BoxFuture<'_, Result<Vec<BloodRequest>>> {
        Box::pin(async move {
            Ok(self.records.read().await.select(|r| {
                r.status == RequestStatus::Pending && filter.matches(r.urgency)
            }))
        })
    }

    fn list_by_requester(
        &self,
        requester: RequesterId,
    ) -> BoxFuture<'_, Result<Vec<BloodRequest>>> {
        Box::pin(async move {
            Ok(self
                .records
                .read()
                .await
                .select(|r| r.requester_id == requester))
        })
    }

    fn list_all(&self) -> BoxFuture<'_, Result<Vec<BloodRequest>>> {
        Box::pin(async move { Ok(self.records.read().await.select(|_| true)) })
    }
}
