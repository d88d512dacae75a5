//! Domain types for the blood bank.
//!
//! Value objects, entities, and query types shared by the ledger, the request
//! store, and the allocator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use crate::error::{Error, Result};

// ============================================================================
// Identifiers
// ============================================================================

/// Unique identifier for a blood request
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Creates a new random `RequestId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `RequestId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RequestId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Identifier of the user (usually a hospital account) that raised a request
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequesterId(Uuid);

impl RequesterId {
    /// Creates a new random `RequesterId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `RequesterId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RequesterId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequesterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RequesterId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

// ============================================================================
// Blood types
// ============================================================================

/// Error returned when a string is not one of the eight ABO/Rh blood types.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid blood type: {0:?}")]
pub struct ParseBloodTypeError(String);

/// One of the eight ABO/Rh blood types.
///
/// The text form is the conventional one (`"O+"`, `"AB-"`). Parsing also accepts
/// the Unicode minus sign (`"AB−"`) and is case-insensitive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum BloodType {
    /// A, Rh positive
    APositive,
    /// A, Rh negative
    ANegative,
    /// B, Rh positive
    BPositive,
    /// B, Rh negative
    BNegative,
    /// AB, Rh positive
    AbPositive,
    /// AB, Rh negative
    AbNegative,
    /// O, Rh positive
    OPositive,
    /// O, Rh negative
    ONegative,
}

impl BloodType {
    /// Number of blood types.
    pub const COUNT: usize = 8;

    /// Every blood type, in canonical order.
    pub const ALL: [Self; Self::COUNT] = [
        Self::APositive,
        Self::ANegative,
        Self::BPositive,
        Self::BNegative,
        Self::AbPositive,
        Self::AbNegative,
        Self::OPositive,
        Self::ONegative,
    ];

    /// Dense slot in `0..COUNT`, stable across releases.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::APositive => 0,
            Self::ANegative => 1,
            Self::BPositive => 2,
            Self::BNegative => 3,
            Self::AbPositive => 4,
            Self::AbNegative => 5,
            Self::OPositive => 6,
            Self::ONegative => 7,
        }
    }

    /// Canonical text form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::APositive => "A+",
            Self::ANegative => "A-",
            Self::BPositive => "B+",
            Self::BNegative => "B-",
            Self::AbPositive => "AB+",
            Self::AbNegative => "AB-",
            Self::OPositive => "O+",
            Self::ONegative => "O-",
        }
    }
}

impl fmt::Display for BloodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BloodType {
    type Err = ParseBloodTypeError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let normalized = s.trim().replace('\u{2212}', "-").to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|bt| bt.as_str() == normalized)
            .ok_or_else(|| ParseBloodTypeError(s.to_string()))
    }
}

impl TryFrom<String> for BloodType {
    type Error = ParseBloodTypeError;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<BloodType> for String {
    fn from(value: BloodType) -> Self {
        value.as_str().to_string()
    }
}

// ============================================================================
// Request attributes
// ============================================================================

/// Informational priority label on a request.
///
/// Urgency never changes whether or in which order stock is allocated.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    /// Routine request
    #[default]
    Normal,
    /// Needed soon
    Urgent,
    /// Life-threatening
    Critical,
}

impl Urgency {
    /// Every urgency, lowest first.
    pub const ALL: [Self; 3] = [Self::Normal, Self::Urgent, Self::Critical];

    /// Text form used on the wire and in storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Urgent => "urgent",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Urgency {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "normal" => Ok(Self::Normal),
            "urgent" => Ok(Self::Urgent),
            "critical" => Ok(Self::Critical),
            other => Err(Error::Validation(format!("unknown urgency {other:?}"))),
        }
    }
}

/// Lifecycle status of a blood request.
///
/// ```text
/// pending ──► fulfilled ──► canceled
///    └───────────────────────▲
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    /// Queued, no units reserved
    Pending,
    /// Units reserved against the ledger
    Fulfilled,
    /// Terminal, no units reserved
    Canceled,
}

impl RequestStatus {
    /// Text form used on the wire and in storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Fulfilled => "fulfilled",
            Self::Canceled => "canceled",
        }
    }

    /// Whether moving from `self` to `next` changes a stored request.
    ///
    /// Same-state moves are not store transitions; callers treat them as no-ops.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Fulfilled | Self::Canceled) | (Self::Fulfilled, Self::Canceled)
        )
    }

    /// Statuses from which `self` can legally be reached.
    #[must_use]
    pub const fn legal_predecessors(self) -> &'static [Self] {
        match self {
            Self::Pending => &[],
            Self::Fulfilled => &[Self::Pending],
            Self::Canceled => &[Self::Pending, Self::Fulfilled],
        }
    }

    /// Whether a request in this status holds units in the ledger.
    #[must_use]
    pub const fn holds_reservation(self) -> bool {
        matches!(self, Self::Fulfilled)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "fulfilled" => Ok(Self::Fulfilled),
            "canceled" => Ok(Self::Canceled),
            other => Err(Error::Validation(format!("unknown status {other:?}"))),
        }
    }
}

/// Descriptive fields of a request. Opaque to allocation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestDetails {
    /// City the blood is needed in
    pub city: String,
    /// Receiving hospital
    pub hospital: String,
    /// Patient the units are for
    pub patient_name: String,
    /// Phone number for the request
    pub contact_number: String,
    /// Free-form notes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl RequestDetails {
    fn missing_fields(&self) -> impl Iterator<Item = &'static str> + '_ {
        [
            ("city", &self.city),
            ("hospital", &self.hospital),
            ("patientName", &self.patient_name),
            ("contactNumber", &self.contact_number),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
    }
}

// ============================================================================
// Requests
// ============================================================================

/// A request as submitted, before the allocator has decided its status.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBloodRequest {
    /// Who raised the request
    pub requester_id: RequesterId,
    /// Blood type needed
    pub blood_type: BloodType,
    /// Units needed, at least one
    pub quantity: u32,
    /// Informational priority
    #[serde(default)]
    pub urgency: Urgency,
    /// Descriptive metadata
    #[serde(flatten)]
    pub details: RequestDetails,
}

impl NewBloodRequest {
    /// Largest quantity a single request may ask for.
    ///
    /// Matches the signed 32-bit column every durable store can hold.
    pub const MAX_QUANTITY: u32 = i32::MAX.unsigned_abs();

    /// Check the submission before it touches the ledger or the store.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] listing every offending field.
    pub fn validate(&self) -> Result<()> {
        let mut problems: Vec<String> = Vec::new();
        if self.quantity == 0 {
            problems.push("quantity must be at least 1".to_string());
        } else if self.quantity > Self::MAX_QUANTITY {
            problems.push(format!("quantity must be at most {}", Self::MAX_QUANTITY));
        }
        problems.extend(
            self.details
                .missing_fields()
                .map(|field| format!("{field} is required")),
        );

        if problems.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation(problems.join("; ")))
        }
    }
}

/// A persisted blood request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BloodRequest {
    /// Request identifier
    pub id: RequestId,
    /// Who raised the request
    pub requester_id: RequesterId,
    /// Blood type needed
    pub blood_type: BloodType,
    /// Units needed; never changes after creation
    pub quantity: u32,
    /// Informational priority
    pub urgency: Urgency,
    /// Current lifecycle status
    pub status: RequestStatus,
    /// Descriptive metadata
    #[serde(flatten)]
    pub details: RequestDetails,
    /// When the request was recorded
    pub created_at: DateTime<Utc>,
    /// When the status last changed
    pub updated_at: DateTime<Utc>,
}

impl BloodRequest {
    /// Build a record from a validated submission.
    #[must_use]
    pub fn from_new(
        id: RequestId,
        request: NewBloodRequest,
        status: RequestStatus,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            requester_id: request.requester_id,
            blood_type: request.blood_type,
            quantity: request.quantity,
            urgency: request.urgency,
            status,
            details: request.details,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Which pending requests a listing should include.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UrgencyFilter {
    /// Every urgency
    #[default]
    Any,
    /// Only this urgency
    Exactly(Urgency),
    /// This urgency or higher
    AtLeast(Urgency),
}

impl UrgencyFilter {
    /// Whether `urgency` passes the filter.
    #[must_use]
    pub fn matches(self, urgency: Urgency) -> bool {
        match self {
            Self::Any => true,
            Self::Exactly(wanted) => urgency == wanted,
            Self::AtLeast(floor) => urgency >= floor,
        }
    }
}

// ============================================================================
// Stock
// ============================================================================

/// Units on hand for one blood type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockEntry {
    /// Blood type this entry counts
    pub blood_type: BloodType,
    /// Units available; never negative
    pub units: u64,
    /// Last reservation or release
    pub last_updated: DateTime<Utc>,
}

/// Point-in-time read of every existing ledger entry.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockSnapshot(BTreeMap<BloodType, StockEntry>);

impl StockSnapshot {
    /// Build a snapshot from entries.
    #[must_use]
    pub fn from_entries(entries: impl IntoIterator<Item = StockEntry>) -> Self {
        Self(entries.into_iter().map(|e| (e.blood_type, e)).collect())
    }

    /// Entry for a blood type, if one has been created.
    #[must_use]
    pub fn get(&self, blood_type: BloodType) -> Option<&StockEntry> {
        self.0.get(&blood_type)
    }

    /// Units for a blood type; absent entries count as zero.
    #[must_use]
    pub fn units(&self, blood_type: BloodType) -> u64 {
        self.0.get(&blood_type).map_or(0, |e| e.units)
    }

    /// Sum of units across all types.
    #[must_use]
    pub fn total_units(&self) -> u64 {
        self.0.values().map(|e| e.units).sum()
    }

    /// Existing entries in blood type order.
    pub fn entries(&self) -> impl Iterator<Item = &StockEntry> {
        self.0.values()
    }

    /// Number of existing entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no entry exists yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn details() -> RequestDetails {
        RequestDetails {
            city: "Ahmedabad".to_string(),
            hospital: "Civil Hospital".to_string(),
            patient_name: "R. Patel".to_string(),
            contact_number: "9876543210".to_string(),
            notes: None,
        }
    }

    #[test]
    fn blood_type_round_trips_text() {
        for bt in BloodType::ALL {
            assert_eq!(bt.as_str().parse::<BloodType>().unwrap(), bt);
        }
    }

    #[test]
    fn blood_type_accepts_unicode_minus_and_case() {
        assert_eq!("AB\u{2212}".parse::<BloodType>().unwrap(), BloodType::AbNegative);
        assert_eq!(" ab+ ".parse::<BloodType>().unwrap(), BloodType::AbPositive);
        assert!("C+".parse::<BloodType>().is_err());
        assert!("O".parse::<BloodType>().is_err());
    }

    #[test]
    fn blood_type_indices_are_dense() {
        for (i, bt) in BloodType::ALL.iter().enumerate() {
            assert_eq!(bt.index(), i);
        }
    }

    #[test]
    fn blood_type_serializes_as_text() {
        let json = serde_json::to_string(&BloodType::ONegative).unwrap();
        assert_eq!(json, "\"O-\"");
        let parsed: BloodType = serde_json::from_str("\"B+\"").unwrap();
        assert_eq!(parsed, BloodType::BPositive);
        assert!(serde_json::from_str::<BloodType>("\"X+\"").is_err());
    }

    #[test]
    fn legal_transitions() {
        use RequestStatus::{Canceled, Fulfilled, Pending};

        assert!(Pending.can_transition_to(Fulfilled));
        assert!(Pending.can_transition_to(Canceled));
        assert!(Fulfilled.can_transition_to(Canceled));

        assert!(!Fulfilled.can_transition_to(Pending));
        assert!(!Canceled.can_transition_to(Pending));
        assert!(!Canceled.can_transition_to(Fulfilled));
        for s in [Pending, Fulfilled, Canceled] {
            assert!(!s.can_transition_to(s));
        }
    }

    #[test]
    fn predecessors_agree_with_transitions() {
        use RequestStatus::{Canceled, Fulfilled, Pending};
        for to in [Pending, Fulfilled, Canceled] {
            for from in [Pending, Fulfilled, Canceled] {
                assert_eq!(
                    to.legal_predecessors().contains(&from),
                    from.can_transition_to(to),
                    "{from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn urgency_filter() {
        assert!(UrgencyFilter::Any.matches(Urgency::Normal));
        assert!(UrgencyFilter::Exactly(Urgency::Urgent).matches(Urgency::Urgent));
        assert!(!UrgencyFilter::Exactly(Urgency::Urgent).matches(Urgency::Critical));
        assert!(UrgencyFilter::AtLeast(Urgency::Urgent).matches(Urgency::Critical));
        assert!(!UrgencyFilter::AtLeast(Urgency::Urgent).matches(Urgency::Normal));
    }

    #[test]
    fn validate_rejects_zero_quantity() {
        let request = NewBloodRequest {
            requester_id: RequesterId::new(),
            blood_type: BloodType::OPositive,
            quantity: 0,
            urgency: Urgency::Normal,
            details: details(),
        };
        let err = request.validate().unwrap_err();
        assert!(matches!(err, Error::Validation(msg) if msg.contains("quantity")));
    }

    #[test]
    fn validate_bounds_quantity_above() {
        let mut request = NewBloodRequest {
            requester_id: RequesterId::new(),
            blood_type: BloodType::OPositive,
            quantity: NewBloodRequest::MAX_QUANTITY,
            urgency: Urgency::Normal,
            details: details(),
        };
        assert!(request.validate().is_ok());

        request.quantity = NewBloodRequest::MAX_QUANTITY + 1;
        let err = request.validate().unwrap_err();
        assert!(matches!(err, Error::Validation(msg) if msg.contains("at most 2147483647")));
    }

    #[test]
    fn validate_names_every_missing_field() {
        let request = NewBloodRequest {
            requester_id: RequesterId::new(),
            blood_type: BloodType::OPositive,
            quantity: 1,
            urgency: Urgency::Normal,
            details: RequestDetails {
                city: "  ".to_string(),
                patient_name: String::new(),
                ..details()
            },
        };
        match request.validate().unwrap_err() {
            Error::Validation(msg) => {
                assert!(msg.contains("city"));
                assert!(msg.contains("patientName"));
                assert!(!msg.contains("hospital"));
            },
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn new_request_json_uses_camel_case_and_defaults() {
        let json = serde_json::json!({
            "requesterId": Uuid::nil(),
            "bloodType": "A-",
            "quantity": 2,
            "city": "Surat",
            "hospital": "SSG",
            "patientName": "K. Shah",
            "contactNumber": "0261-2244456"
        });
        let request: NewBloodRequest = serde_json::from_value(json).unwrap();
        assert_eq!(request.blood_type, BloodType::ANegative);
        assert_eq!(request.urgency, Urgency::Normal);
        assert_eq!(request.details.notes, None);
    }

    #[test]
    fn snapshot_counts_absent_types_as_zero() {
        let snapshot = StockSnapshot::from_entries([StockEntry {
            blood_type: BloodType::OPositive,
            units: 5,
            last_updated: Utc::now(),
        }]);
        assert_eq!(snapshot.units(BloodType::OPositive), 5);
        assert_eq!(snapshot.units(BloodType::ONegative), 0);
        assert_eq!(snapshot.total_units(), 5);
        assert_eq!(snapshot.len(), 1);
    }
}
