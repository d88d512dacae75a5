//! Error types for the blood bank core.

use thiserror::Error;

use crate::types::{BloodType, RequestId, RequestStatus};

/// Result type alias using the core error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Infrastructure failures raised by a ledger or store backend.
///
/// These never describe a domain outcome; running out of stock is not a storage error.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Database query or connection failed
    #[error("Database error: {0}")]
    Database(String),

    /// Backend is not reachable or refused the operation
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// A persisted value could not be mapped back into the domain
    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

/// Errors returned by the request store, the allocator, and the read API.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed input, rejected before the ledger or store is touched
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unknown request id
    #[error("Request not found: {0}")]
    NotFound(RequestId),

    /// A pending request could not be fulfilled from current stock
    #[error("Insufficient stock: {requested} unit(s) of {blood_type} requested")]
    InsufficientStock {
        /// Blood type that ran short
        blood_type: BloodType,
        /// Units the request needs
        requested: u32,
    },

    /// The status change is not in the legal transition set
    #[error("Invalid transition: request {id} cannot move from '{from}' to '{to}'")]
    InvalidTransition {
        /// Request the change was attempted on
        id: RequestId,
        /// Status the request was in
        from: RequestStatus,
        /// Status that was asked for
        to: RequestStatus,
    },

    /// Backend failure
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl Error {
    /// Whether the caller caused the error (as opposed to the infrastructure).
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        !matches!(self, Self::Storage(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offending_values() {
        let err = Error::InsufficientStock {
            blood_type: BloodType::OPositive,
            requested: 3,
        };
        assert_eq!(err.to_string(), "Insufficient stock: 3 unit(s) of O+ requested");

        let id = RequestId::new();
        let err = Error::InvalidTransition {
            id,
            from: RequestStatus::Canceled,
            to: RequestStatus::Fulfilled,
        };
        assert_eq!(
            err.to_string(),
            format!("Invalid transition: request {id} cannot move from 'canceled' to 'fulfilled'")
        );
    }

    #[test]
    fn storage_errors_are_not_client_errors() {
        let err: Error = StorageError::Unavailable("pool closed".to_string()).into();
        assert!(!err.is_client_error());
        assert_eq!(err.to_string(), "Storage unavailable: pool closed");
        assert!(Error::Validation("bad".to_string()).is_client_error());
    }
}
