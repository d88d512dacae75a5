//! Read API: projections over the ledger and the request store.
//!
//! Nothing here can change stock or a request's status; those go through the
//! [`Allocator`](crate::Allocator).

use std::sync::Arc;

use crate::error::Result;
use crate::ledger::StockLedger;
use crate::store::RequestStore;
use crate::types::{
    BloodRequest, BloodType, RequestId, RequesterId, StockSnapshot, Urgency, UrgencyFilter,
};

/// Read-only facade for dashboards and listings.
#[derive(Clone)]
pub struct ReadApi {
    ledger: Arc<dyn StockLedger>,
    store: Arc<dyn RequestStore>,
}

impl ReadApi {
    /// Create a read API over a ledger and a store.
    #[must_use]
    pub fn new(ledger: Arc<dyn StockLedger>, store: Arc<dyn RequestStore>) -> Self {
        Self { ledger, store }
    }

    /// Current stock for every blood type that has an entry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`](crate::Error::Storage) on backend failure.
    pub async fn inventory(&self) -> Result<StockSnapshot> {
        Ok(self.ledger.snapshot().await?)
    }

    /// Units on hand for one blood type (zero if it has no entry).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`](crate::Error::Storage) on backend failure.
    pub async fn inventory_for(&self, blood_type: BloodType) -> Result<u64> {
        Ok(self.ledger.snapshot().await?.units(blood_type))
    }

    /// One request.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`](crate::Error::NotFound) for an unknown id.
    pub async fn get_request(&self, id: RequestId) -> Result<BloodRequest> {
        self.store.get(id).await
    }

    /// Pending requests, optionally narrowed by urgency.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`](crate::Error::Storage) on backend failure.
    pub async fn list_pending(&self, filter: UrgencyFilter) -> Result<Vec<BloodRequest>> {
        self.store.list_pending(filter).await
    }

    /// Pending requests marked urgent or critical.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`](crate::Error::Storage) on backend failure.
    pub async fn list_urgent(&self) -> Result<Vec<BloodRequest>> {
        self.store
            .list_pending(UrgencyFilter::AtLeast(Urgency::Urgent))
            .await
    }

    /// Requests raised by one requester.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`](crate::Error::Storage) on backend failure.
    pub async fn list_by_requester(&self, requester: RequesterId) -> Result<Vec<BloodRequest>> {
        self.store.list_by_requester(requester).await
    }

    /// Every request.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`](crate::Error::Storage) on backend failure.
    pub async fn list_all(&self) -> Result<Vec<BloodRequest>> {
        self.store.list_all().await
    }
}
