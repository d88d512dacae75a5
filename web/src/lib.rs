//! Axum HTTP layer for the blood bank.
//!
//! The handlers are a thin shell around [`bloodbank_core`]: they authenticate
//! the caller from gateway headers, check the caller's role, and hand the
//! request to the [`Allocator`](bloodbank_core::Allocator) or the
//! [`ReadApi`](bloodbank_core::ReadApi).
//!
//! # Request Flow
//!
//! 1. **HTTP Request** arrives at an Axum handler
//! 2. **Extract** the caller, path, query and JSON body
//! 3. **Check the role** (hospital submits, admin changes status)
//! 4. **Invoke** the allocator or read API
//! 5. **Map** the result or error to an HTTP response
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use bloodbank_core::{Allocator, InMemoryRequestStore, InMemoryStockLedger, SystemClock};
//! use bloodbank_web::{AppState, build_router};
//!
//! let clock = Arc::new(SystemClock);
//! let allocator = Allocator::new(
//!     Arc::new(InMemoryStockLedger::new(clock.clone())),
//!     Arc::new(InMemoryRequestStore::new(clock)),
//! );
//! let app: axum::Router = build_router(AppState::new(allocator));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod state;

// Re-export key types for convenience
pub use error::AppError;
pub use extractors::{Caller, CorrelationId, Role};
pub use middleware::{CORRELATION_ID_HEADER, correlation_id_layer};
pub use routes::build_router;
pub use state::AppState;

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;
