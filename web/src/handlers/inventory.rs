//! Stock level endpoint.
//!
//! - GET /api/inventory - Units on hand for every blood type

use axum::{Json, extract::State};
use bloodbank_core::{BloodType, DateTime, Utc};
use serde::Serialize;

use crate::error::AppError;
use crate::state::AppState;

/// Units on hand for one blood type.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryItem {
    /// Blood type
    pub blood_type: BloodType,
    /// Units available; zero for types never stocked
    pub units: u64,
    /// Last reservation or release, absent for types never stocked
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

/// Stock across all blood types.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryResponse {
    /// One item per blood type, in canonical order
    pub items: Vec<InventoryItem>,
    /// Sum of units across all types
    pub total_units: u64,
}

/// Current inventory.
///
/// Public endpoint. All eight blood types are listed.
///
/// ```bash
/// curl http://localhost:5000/api/inventory
/// ```
///
/// Response:
/// ```json
/// {
///   "items": [
///     { "bloodType": "A+", "units": 12, "lastUpdated": "2025-01-01T00:00:00Z" },
///     { "bloodType": "A-", "units": 0 }
///   ],
///   "totalUnits": 12
/// }
/// ```
pub async fn get_inventory(State(state): State<AppState>) -> Result<Json<InventoryResponse>, AppError> {
    let snapshot = state.read.inventory().await?;

    let items = BloodType::ALL
        .into_iter()
        .map(|blood_type| {
            let entry = snapshot.get(blood_type);
            InventoryItem {
                blood_type,
                units: entry.map_or(0, |e| e.units),
                last_updated: entry.map(|e| e.last_updated),
            }
        })
        .collect();

    Ok(Json(InventoryResponse {
        items,
        total_units: snapshot.total_units(),
    }))
}
