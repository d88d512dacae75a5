//! Application state for Axum handlers.

use bloodbank_core::{Allocator, ReadApi};
use metrics_exporter_prometheus::PrometheusHandle;

/// Application state shared across all HTTP handlers.
///
/// Mutations go through the allocator; everything else reads through the
/// read API built over the same ledger and store.
#[derive(Clone)]
pub struct AppState {
    /// Decision procedure for submissions and status changes
    pub allocator: Allocator,
    /// Read-only projections
    pub read: ReadApi,
    /// Prometheus handle rendered by `GET /metrics`, when a recorder is installed
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Create state over an allocator, without a metrics endpoint.
    #[must_use]
    pub fn new(allocator: Allocator) -> Self {
        let read = allocator.read();
        Self {
            allocator,
            read,
            metrics: None,
        }
    }

    /// Attach the Prometheus handle served at `GET /metrics`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}
