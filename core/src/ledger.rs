//! Stock ledger: per-blood-type unit counts.
//!
//! The ledger is the only mutable shared resource in the system. Every
//! implementation must make `try_reserve` an indivisible check-then-decrement for
//! a given blood type, so two concurrent reservations can never both succeed when
//! their combined quantity exceeds the units on hand.
//!
//! # Implementations
//!
//! - [`InMemoryStockLedger`]: one async mutex per blood type
//! - `PostgresStockLedger` (in `bloodbank-postgres`): conditional row updates

use futures::future::BoxFuture;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::environment::Clock;
use crate::error::StorageError;
use crate::types::{BloodType, StockEntry, StockSnapshot};

/// Ledger of blood units on hand.
///
/// Running short is an ordinary outcome (`Ok(false)`), never an error. The only
/// errors are infrastructure failures.
///
/// # Dyn Compatibility
///
/// Methods return boxed futures so the ledger can be shared as
/// `Arc<dyn StockLedger>` between the allocator and the read API.
pub trait StockLedger: Send + Sync {
    /// Take `quantity` units of `blood_type` if at least that many are on hand.
    ///
    /// Returns `Ok(true)` and decrements the entry when `units >= quantity`;
    /// otherwise leaves the ledger untouched and returns `Ok(false)`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backend cannot be reached.
    fn try_reserve(
        &self,
        blood_type: BloodType,
        quantity: u32,
    ) -> BoxFuture<'_, Result<bool, StorageError>>;

    /// Return `quantity` units of `blood_type` to the ledger.
    ///
    /// Always succeeds at the domain level; there is no upper bound on stock.
    /// Creates the entry if none exists yet.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backend cannot be reached.
    fn release(&self, blood_type: BloodType, quantity: u32)
    -> BoxFuture<'_, Result<(), StorageError>>;

    /// Read every existing entry.
    ///
    /// Each entry holds a value it had at some instant during the call; the
    /// snapshot as a whole is not required to be atomic.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backend cannot be reached.
    fn snapshot(&self) -> BoxFuture<'_, Result<StockSnapshot, StorageError>>;
}

/// In-memory ledger with one lock per blood type.
///
/// Different blood types never contend. Entries are created lazily by the
/// first successful reservation or by any release; a failed reservation
/// against a type with no entry creates nothing.
pub struct InMemoryStockLedger {
    slots: [Mutex<Option<StockEntry>>; BloodType::COUNT],
    clock: Arc<dyn Clock>,
}

impl InMemoryStockLedger {
    /// Create an empty ledger.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            slots: std::array::from_fn(|_| Mutex::new(None)),
            clock,
        }
    }

    /// Create a ledger holding initial stock.
    ///
    /// Repeated blood types accumulate.
    #[must_use]
    pub fn with_stock(
        clock: Arc<dyn Clock>,
        stock: impl IntoIterator<Item = (BloodType, u64)>,
    ) -> Self {
        let now = clock.now();
        let mut initial: [Option<StockEntry>; BloodType::COUNT] = [None; BloodType::COUNT];
        for (blood_type, units) in stock {
            let entry = initial[blood_type.index()].get_or_insert(StockEntry {
                blood_type,
                units: 0,
                last_updated: now,
            });
            entry.units = entry.units.saturating_add(units);
        }

        Self {
            slots: initial.map(Mutex::new),
            clock,
        }
    }

    fn slot(&self, blood_type: BloodType) -> &Mutex<Option<StockEntry>> {
        &self.slots[blood_type.index()]
    }
}

impl StockLedger for InMemoryStockLedger {
    fn try_reserve(
        &self,
        blood_type: BloodType,
        quantity: u32,
    ) -> BoxFuture<'_, Result<bool, StorageError>> {
        Box::pin(async move {
            let mut slot = self.slot(blood_type).lock().await;
            let Some(entry) = slot.as_mut() else {
                return Ok(false);
            };

            let quantity = u64::from(quantity);
            if entry.units < quantity {
                return Ok(false);
            }

            entry.units -= quantity;
            entry.last_updated = self.clock.now();
            Ok(true)
        })
    }

    fn release(
        &self,
        blood_type: BloodType,
        quantity: u32,
    ) -> BoxFuture<'_, Result<(), StorageError>> {
        Box::pin(async move {
            let now = self.clock.now();
            let mut slot = self.slot(blood_type).lock().await;
            let entry = slot.get_or_insert(StockEntry {
                blood_type,
                units: 0,
                last_updated: now,
            });
            entry.units = entry.units.saturating_add(u64::from(quantity));
            entry.last_updated = now;
            Ok(())
        })
    }

    fn snapshot(&self) -> BoxFuture<'_, Result<StockSnapshot, StorageError>> {
        Box::pin(async move {
            let mut entries = Vec::with_capacity(BloodType::COUNT);
            for slot in &self.slots {
                if let Some(entry) = *slot.lock().await {
                    entries.push(entry);
                }
            }
            Ok(StockSnapshot::from_entries(entries))
        })
    }
}
