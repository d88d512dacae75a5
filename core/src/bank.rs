//! Backends that commit a ledger change and its status change together.
//!
//! When the ledger and the request store live in one database, the pair of
//! writes behind a submission or a status change can be a single transaction.
//! [`TransactionalBank`] is that seam. The [`Allocator`](crate::Allocator)
//! uses it when one is supplied and falls back to compensation otherwise.

use futures::future::BoxFuture;

use crate::error::Result;
use crate::types::{BloodRequest, NewBloodRequest, RequestId, RequestStatus};

/// Ledger side of a status change.
///
/// | from → to              | effect    |
/// |------------------------|-----------|
/// | pending → fulfilled    | `Reserve` |
/// | fulfilled → canceled   | `Release` |
/// | anything else          | `None`    |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerEffect {
    /// Stock is untouched
    None,
    /// The request's units leave the ledger
    Reserve,
    /// The request's units go back to the ledger
    Release,
}

impl LedgerEffect {
    /// Effect implied by moving a request from `from` to `to`.
    #[must_use]
    pub const fn for_transition(from: RequestStatus, to: RequestStatus) -> Self {
        match (from.holds_reservation(), to.holds_reservation()) {
            (false, true) => Self::Reserve,
            (true, false) => Self::Release,
            _ => Self::None,
        }
    }
}

/// Outcome of a committed status change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transitioned {
    /// Status the request held when the change started
    pub from: RequestStatus,
    /// The request as stored afterwards
    pub request: BloodRequest,
}

/// A ledger and request store that can write both sides in one transaction.
///
/// Each method either commits every write it makes or none of them. Rows it
/// reads to make a decision are locked until it commits, so concurrent
/// callers in other processes see either the state before or the state after.
pub trait TransactionalBank: Send + Sync {
    /// Reserve `request.quantity` units if stock covers them and record the
    /// request as `fulfilled`; otherwise record it as `pending` and leave
    /// stock alone.
    ///
    /// # Errors
    ///
    /// [`Error::Validation`](crate::Error::Validation) for a malformed
    /// submission, [`Error::Storage`](crate::Error::Storage) on backend failure.
    /// Nothing is written in either case.
    fn submit(&self, request: NewBloodRequest) -> BoxFuture<'_, Result<BloodRequest>>;

    /// Move a request to `to`, applying its [`LedgerEffect`].
    ///
    /// A request already in `to` is returned unchanged with `from == to`.
    ///
    /// # Errors
    ///
    /// `NotFound`, `InvalidTransition`, `InsufficientStock` or `Storage`.
    /// Nothing is written in any of these cases.
    fn transition(&self, id: RequestId, to: RequestStatus)
    -> BoxFuture<'_, Result<Transitioned>>;
}
