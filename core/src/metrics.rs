//! Metric names recorded by the allocator.
//!
//! # Exported Metrics
//!
//! ## Counters
//! - `bloodbank_requests_submitted_total{outcome}` - Submissions by initial status
//! - `bloodbank_transitions_total{from,to}` - Operator status changes that took effect
//! - `bloodbank_units_reserved_total{blood_type}` - Units taken from the ledger
//! - `bloodbank_units_released_total{blood_type}` - Units returned to the ledger
//! - `bloodbank_compensations_total` - Ledger effects undone after a failed status write
//! - `bloodbank_compensation_failures_total` - Undo attempts that themselves failed
//!
//! Recording is a no-op until a recorder is installed (the server installs a
//! Prometheus one).

use metrics::describe_counter;

/// Submissions by initial status
pub const REQUESTS_SUBMITTED: &str = "bloodbank_requests_submitted_total";
/// Status changes that took effect
pub const TRANSITIONS: &str = "bloodbank_transitions_total";
/// Units taken from the ledger
pub const UNITS_RESERVED: &str = "bloodbank_units_reserved_total";
/// Units returned to the ledger
pub const UNITS_RELEASED: &str = "bloodbank_units_released_total";
/// Compensating ledger actions
pub const COMPENSATIONS: &str = "bloodbank_compensations_total";
/// Compensating ledger actions that failed
pub const COMPENSATION_FAILURES: &str = "bloodbank_compensation_failures_total";

/// Register descriptions for every allocator metric.
///
/// Call once at startup, after installing a recorder.
pub fn register_metrics() {
    describe_counter!(REQUESTS_SUBMITTED, "Blood requests submitted, by initial status");
    describe_counter!(TRANSITIONS, "Request status changes applied by operators");
    describe_counter!(UNITS_RESERVED, "Blood units reserved against the ledger");
    describe_counter!(UNITS_RELEASED, "Blood units released back to the ledger");
    describe_counter!(
        COMPENSATIONS,
        "Ledger changes undone because the paired status write failed"
    );
    describe_counter!(
        COMPENSATION_FAILURES,
        "Compensating ledger changes that could not be applied"
    );
}
