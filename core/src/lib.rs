//! # Blood Bank Core
//!
//! Blood inventory ledger and request-fulfillment allocator.
//!
//! For each incoming blood request the allocator decides whether to take units
//! out of shared inventory straight away (`fulfilled`) or leave the request
//! queued (`pending`), and it reverses those decrements when an operator later
//! changes a request's status.
//!
//! ## Components
//!
//! - **[`StockLedger`]**: per-blood-type unit counts with atomic reserve/release
//! - **[`RequestStore`]**: request records and their legal status transitions
//! - **[`Allocator`]**: the only code that pairs a ledger change with a status change
//! - **[`ReadApi`]**: read-only projections for dashboards and listings
//! - **[`TransactionalBank`]**: optional backend seam that commits both writes together
//!
//! ## Consistency
//!
//! A request's units are either reserved (status `fulfilled`) or not reserved
//! (`pending`, `canceled`). Over a [`TransactionalBank`] both writes commit in
//! one transaction. Otherwise the allocator applies the ledger effect first,
//! persists the status second, and undoes the ledger effect if persisting fails.
//! Either way an operation, once started, runs to completion even if its
//! caller stops waiting.
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use bloodbank_core::{
//!     Allocator, BloodType, InMemoryRequestStore, InMemoryStockLedger, NewBloodRequest,
//!     RequestDetails, RequestStatus, RequesterId, SystemClock, Urgency,
//! };
//!
//! # tokio_test::block_on(async {
//! let clock = Arc::new(SystemClock);
//! let ledger = Arc::new(InMemoryStockLedger::with_stock(
//!     clock.clone(),
//!     [(BloodType::OPositive, 5)],
//! ));
//! let store = Arc::new(InMemoryRequestStore::new(clock));
//! let allocator = Allocator::new(ledger, store);
//!
//! let request = allocator
//!     .submit(NewBloodRequest {
//!         requester_id: RequesterId::new(),
//!         blood_type: BloodType::OPositive,
//!         quantity: 5,
//!         urgency: Urgency::Critical,
//!         details: RequestDetails {
//!             city: "Ahmedabad".into(),
//!             hospital: "Civil Hospital".into(),
//!             patient_name: "A. Shah".into(),
//!             contact_number: "079-22681892".into(),
//!             notes: None,
//!         },
//!     })
//!     .await?;
//! assert_eq!(request.status, RequestStatus::Fulfilled);
//!
//! let inventory = allocator.read().inventory().await?;
//! assert_eq!(inventory.units(BloodType::OPositive), 0);
//! # Ok::<(), bloodbank_core::Error>(())
//! # }).unwrap();
//! ```

pub mod allocator;
pub mod bank;
pub mod error;
pub mod ledger;
pub mod metrics;
pub mod read;
pub mod store;
pub mod types;

pub use allocator::Allocator;
pub use bank::{LedgerEffect, TransactionalBank, Transitioned};
pub use environment::{Clock, SystemClock};
pub use error::{Error, Result, StorageError};
pub use ledger::{InMemoryStockLedger, StockLedger};
pub use read::ReadApi;
pub use store::{InMemoryRequestStore, RequestStore};
pub use types::{
    BloodRequest, BloodType, NewBloodRequest, ParseBloodTypeError, RequestDetails, RequestId,
    RequestStatus, RequesterId, StockEntry, StockSnapshot, Urgency, UrgencyFilter,
};

// Re-export commonly used types
pub use chrono::{DateTime, Utc};

/// Environment module - injected dependencies
///
/// Timestamps on stock entries and requests come from a [`Clock`] so tests can
/// pin them.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```
    /// use bloodbank_core::{Clock, SystemClock};
    ///
    /// let before = chrono::Utc::now();
    /// assert!(SystemClock.now() >= before);
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall-clock time.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
