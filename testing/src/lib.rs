//! # Blood Bank Testing
//!
//! Testing utilities and helpers for the blood bank allocator.
//!
//! This crate provides:
//! - A fixed clock for deterministic timestamps
//! - Failure-injecting wrappers around the ledger and the request store
//! - Builders for submissions and a ready-made in-memory bank
//! - proptest strategies for domain types
//!
//! ## Example
//!
//! ```
//! use bloodbank_core::{BloodType, RequestStatus};
//! use bloodbank_testing::{TestBank, helpers::RequestBuilder};
//!
//! # tokio_test::block_on(async {
//! let bank = TestBank::with_stock(&[(BloodType::OPositive, 5)]);
//! let request = bank
//!     .allocator
//!     .submit(RequestBuilder::new(BloodType::OPositive, 5).build())
//!     .await
//!     .unwrap();
//!
//! assert_eq!(request.status, RequestStatus::Fulfilled);
//! assert_eq!(bank.units(BloodType::OPositive).await, 0);
//! # });
//! ```

use bloodbank_core::environment::Clock;
use chrono::{DateTime, Utc};

/// Mock implementations of the core seams
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use bloodbank_core::{
        BloodRequest, BloodType, NewBloodRequest, RequestId, RequestStatus, RequestStore,
        RequesterId, Result, StockLedger, StockSnapshot, StorageError, UrgencyFilter,
    };
    use futures::future::BoxFuture;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
    use std::time::Duration;

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use bloodbank_testing::mocks::FixedClock;
    /// use bloodbank_core::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }

    fn injected(operation: &str) -> StorageError {
        StorageError::Unavailable(format!("injected failure in {operation}"))
    }

    fn failing<T: Send + 'static, E: From<StorageError> + Send + 'static>(
        operation: &str,
    ) -> BoxFuture<'static, std::result::Result<T, E>> {
        Box::pin(futures::future::err::<T, E>(injected(operation).into()))
    }

    /// Request store that can be told to fail or stall writes.
    ///
    /// Reads always go to the wrapped store. A failing write returns
    /// [`StorageError::Unavailable`] without touching the wrapped store. A
    /// delayed write sleeps before it reaches the wrapped store.
    pub struct FlakyRequestStore {
        inner: Arc<dyn RequestStore>,
        fail_create: AtomicBool,
        fail_set_status: AtomicBool,
        set_status_calls: AtomicUsize,
        write_delay_ms: AtomicU64,
    }

    impl FlakyRequestStore {
        /// Wrap a store; all writes succeed until a failure is switched on.
        #[must_use]
        pub fn new(inner: Arc<dyn RequestStore>) -> Self {
            Self {
                inner,
                fail_create: AtomicBool::new(false),
                fail_set_status: AtomicBool::new(false),
                set_status_calls: AtomicUsize::new(0),
                write_delay_ms: AtomicU64::new(0),
            }
        }

        /// Sleep for `delay` at the start of every `create` and `set_status`.
        pub fn delay_writes(&self, delay: Duration) {
            let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
            self.write_delay_ms.store(millis, Ordering::SeqCst);
        }

        async fn stall(&self) {
            let millis = self.write_delay_ms.load(Ordering::SeqCst);
            if millis > 0 {
                tokio::time::sleep(Duration::from_millis(millis)).await;
            }
        }

        /// Make `create` fail (or succeed again).
        pub fn fail_create(&self, fail: bool) {
            self.fail_create.store(fail, Ordering::SeqCst);
        }

        /// Make `set_status` fail (or succeed again).
        pub fn fail_set_status(&self, fail: bool) {
            self.fail_set_status.store(fail, Ordering::SeqCst);
        }

        /// How many times `set_status` has been called, failed calls included.
        #[must_use]
        pub fn set_status_calls(&self) -> usize {
            self.set_status_calls.load(Ordering::SeqCst)
        }
    }

    impl RequestStore for FlakyRequestStore {
        fn create(
            &self,
            request: NewBloodRequest,
            status: RequestStatus,
        ) -> BoxFuture<'_, Result<BloodRequest>> {
            if self.fail_create.load(Ordering::SeqCst) {
                return failing("create");
            }
            Box::pin(async move {
                self.stall().await;
                self.inner.create(request, status).await
            })
        }

        fn get(&self, id: RequestId) -> BoxFuture<'_, Result<BloodRequest>> {
            self.inner.get(id)
        }

        fn set_status(
            &self,
            id: RequestId,
            status: RequestStatus,
        ) -> BoxFuture<'_, Result<BloodRequest>> {
            self.set_status_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_set_status.load(Ordering::SeqCst) {
                return failing("set_status");
            }
            Box::pin(async move {
                self.stall().await;
                self.inner.set_status(id, status).await
            })
        }

        fn list_pending(&self, filter: UrgencyFilter) -> BoxFuture<'_, Result<Vec<BloodRequest>>> {
            self.inner.list_pending(filter)
        }

        fn list_by_requester(
            &self,
            requester: RequesterId,
        ) -> BoxFuture<'_, Result<Vec<BloodRequest>>> {
            self.inner.list_by_requester(requester)
        }

        fn list_all(&self) -> BoxFuture<'_, Result<Vec<BloodRequest>>> {
            self.inner.list_all()
        }
    }

    /// Ledger that can be told to fail.
    ///
    /// Counts calls so tests can check that a rejected operation never
    /// reached the ledger.
    pub struct FlakyStockLedger {
        inner: Arc<dyn StockLedger>,
        fail_reserve: AtomicBool,
        fail_release: AtomicBool,
        calls: AtomicUsize,
    }

    impl FlakyStockLedger {
        /// Wrap a ledger; all calls succeed until a failure is switched on.
        #[must_use]
        pub fn new(inner: Arc<dyn StockLedger>) -> Self {
            Self {
                inner,
                fail_reserve: AtomicBool::new(false),
                fail_release: AtomicBool::new(false),
                calls: AtomicUsize::new(0),
            }
        }

        /// Make `try_reserve` fail (or succeed again).
        pub fn fail_reserve(&self, fail: bool) {
            self.fail_reserve.store(fail, Ordering::SeqCst);
        }

        /// Make `release` fail (or succeed again).
        pub fn fail_release(&self, fail: bool) {
            self.fail_release.store(fail, Ordering::SeqCst);
        }

        /// Number of `try_reserve` and `release` calls so far.
        #[must_use]
        pub fn mutation_calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl StockLedger for FlakyStockLedger {
        fn try_reserve(
            &self,
            blood_type: BloodType,
            quantity: u32,
        ) -> BoxFuture<'_, std::result::Result<bool, StorageError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_reserve.load(Ordering::SeqCst) {
                return failing("try_reserve");
            }
            self.inner.try_reserve(blood_type, quantity)
        }

        fn release(
            &self,
            blood_type: BloodType,
            quantity: u32,
        ) -> BoxFuture<'_, std::result::Result<(), StorageError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_release.load(Ordering::SeqCst) {
                return failing("release");
            }
            self.inner.release(blood_type, quantity)
        }

        fn snapshot(&self) -> BoxFuture<'_, std::result::Result<StockSnapshot, StorageError>> {
            self.inner.snapshot()
        }
    }
}

/// Test helpers and utilities
pub mod helpers {
    use bloodbank_core::{BloodType, NewBloodRequest, RequestDetails, RequesterId, Urgency};

    /// Details that pass validation.
    #[must_use]
    pub fn sample_details() -> RequestDetails {
        RequestDetails {
            city: "Ahmedabad".to_string(),
            hospital: "Civil Hospital".to_string(),
            patient_name: "Test Patient".to_string(),
            contact_number: "079-22683721".to_string(),
            notes: None,
        }
    }

    /// Builder for [`NewBloodRequest`] with valid defaults.
    ///
    /// # Example
    ///
    /// ```
    /// use bloodbank_core::{BloodType, Urgency};
    /// use bloodbank_testing::helpers::RequestBuilder;
    ///
    /// let request = RequestBuilder::new(BloodType::ONegative, 2)
    ///     .urgency(Urgency::Critical)
    ///     .build();
    /// assert!(request.validate().is_ok());
    /// ```
    #[derive(Debug, Clone)]
    pub struct RequestBuilder {
        request: NewBloodRequest,
    }

    impl RequestBuilder {
        /// Start a normal-urgency request from a fresh requester.
        #[must_use]
        pub fn new(blood_type: BloodType, quantity: u32) -> Self {
            Self {
                request: NewBloodRequest {
                    requester_id: RequesterId::new(),
                    blood_type,
                    quantity,
                    urgency: Urgency::Normal,
                    details: sample_details(),
                },
            }
        }

        /// Set the requester.
        #[must_use]
        pub const fn requester(mut self, requester_id: RequesterId) -> Self {
            self.request.requester_id = requester_id;
            self
        }

        /// Set the urgency.
        #[must_use]
        pub const fn urgency(mut self, urgency: Urgency) -> Self {
            self.request.urgency = urgency;
            self
        }

        /// Set the hospital name.
        #[must_use]
        pub fn hospital(mut self, hospital: impl Into<String>) -> Self {
            self.request.details.hospital = hospital.into();
            self
        }

        /// Set free-form notes.
        #[must_use]
        pub fn notes(mut self, notes: impl Into<String>) -> Self {
            self.request.details.notes = Some(notes.into());
            self
        }

        /// Finish the submission.
        #[must_use]
        pub fn build(self) -> NewBloodRequest {
            self.request
        }
    }
}

/// Property-based testing utilities using proptest.
pub mod properties {
    use bloodbank_core::{BloodType, RequestStatus, Urgency};
    use proptest::prelude::*;

    /// Any of the eight blood types.
    pub fn blood_type() -> impl Strategy<Value = BloodType> {
        proptest::sample::select(BloodType::ALL.to_vec())
    }

    /// Any urgency.
    pub fn urgency() -> impl Strategy<Value = Urgency> {
        prop_oneof![
            Just(Urgency::Normal),
            Just(Urgency::Urgent),
            Just(Urgency::Critical),
        ]
    }

    /// Any status.
    pub fn status() -> impl Strategy<Value = RequestStatus> {
        prop_oneof![
            Just(RequestStatus::Pending),
            Just(RequestStatus::Fulfilled),
            Just(RequestStatus::Canceled),
        ]
    }

    /// One step of a random allocator workload.
    #[derive(Debug, Clone)]
    pub enum Operation {
        /// Submit a request
        Submit {
            /// Blood type asked for
            blood_type: BloodType,
            /// Units asked for
            quantity: u32,
        },
        /// Move an earlier request (picked by index, wrapping) to a status
        Transition {
            /// Index into the requests submitted so far
            pick: usize,
            /// Target status
            to: RequestStatus,
        },
    }

    /// A single workload step with small quantities so stock runs out often.
    pub fn operation() -> impl Strategy<Value = Operation> {
        prop_oneof![
            (blood_type(), 1u32..=8).prop_map(|(blood_type, quantity)| Operation::Submit {
                blood_type,
                quantity
            }),
            (any::<usize>(), status()).prop_map(|(pick, to)| Operation::Transition { pick, to }),
        ]
    }

    /// Initial units for every blood type.
    pub fn initial_stock() -> impl Strategy<Value = Vec<(BloodType, u64)>> {
        proptest::collection::vec(0u64..=20, BloodType::COUNT).prop_map(|units| {
            BloodType::ALL.into_iter().zip(units).collect()
        })
    }
}

/// In-memory bank wired for tests
///
/// Ledger and store are wrapped in the flaky mocks so a test can inject
/// failures without rebuilding the allocator.
pub struct TestBank {
    /// Allocator over the wrapped ledger and store
    pub allocator: bloodbank_core::Allocator,
    /// Ledger wrapper
    pub ledger: std::sync::Arc<mocks::FlakyStockLedger>,
    /// Store wrapper
    pub store: std::sync::Arc<mocks::FlakyRequestStore>,
}

impl TestBank {
    /// Empty ledger, empty store, fixed clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_stock(&[])
    }

    /// Ledger holding `stock`, empty store, fixed clock.
    #[must_use]
    pub fn with_stock(stock: &[(bloodbank_core::BloodType, u64)]) -> Self {
        use std::sync::Arc;

        let clock: Arc<dyn Clock> = Arc::new(test_clock());
        let ledger = Arc::new(mocks::FlakyStockLedger::new(Arc::new(
            bloodbank_core::InMemoryStockLedger::with_stock(
                Arc::clone(&clock),
                stock.iter().copied(),
            ),
        )));
        let store = Arc::new(mocks::FlakyRequestStore::new(Arc::new(
            bloodbank_core::InMemoryRequestStore::new(clock),
        )));
        let allocator = bloodbank_core::Allocator::new(ledger.clone(), store.clone());

        Self {
            allocator,
            ledger,
            store,
        }
    }

    /// Units on hand for one blood type.
    ///
    /// # Panics
    ///
    /// Panics if the ledger cannot be read; the in-memory ledger never fails.
    #[allow(clippy::expect_used)]
    pub async fn units(&self, blood_type: bloodbank_core::BloodType) -> u64 {
        use bloodbank_core::StockLedger;

        self.ledger
            .snapshot()
            .await
            .expect("in-memory snapshot should not fail")
            .units(blood_type)
    }
}

impl Default for TestBank {
    fn default() -> Self {
        Self::new()
    }
}

// Re-export commonly used items
pub use mocks::{FixedClock, FlakyRequestStore, FlakyStockLedger, test_clock};
