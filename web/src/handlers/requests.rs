//! Blood request endpoints.
//!
//! - POST /api/requests - Submit a request (hospital)
//! - GET /api/requests - All requests (admin), or pending requests (public, `?pending=true`)
//! - GET /api/requests/me - The caller's own requests
//! - GET /api/requests/urgent - Pending urgent and critical requests (public)
//! - GET /api/requests/:id - One request (admin or owner)
//! - PUT /api/requests/:id - Change a request's status (admin)

use axum::{
    Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::StatusCode,
};
use bloodbank_core::{
    BloodRequest, BloodType, NewBloodRequest, RequestDetails, RequestId, RequestStatus, Urgency,
    UrgencyFilter,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::extractors::{Caller, Role};
use crate::state::AppState;

// ============================================================================
// Request Types
// ============================================================================

/// Body of `POST /api/requests`.
///
/// The requester is the caller; it is never taken from the body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    /// Blood type needed
    pub blood_type: BloodType,
    /// Units needed
    pub quantity: u32,
    /// Informational priority
    #[serde(default)]
    pub urgency: Urgency,
    /// Descriptive metadata
    #[serde(flatten)]
    pub details: RequestDetails,
}

/// Body of `PUT /api/requests/:id`.
#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    /// Target status
    pub status: RequestStatus,
}

/// Query string of `GET /api/requests`.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    /// Restrict to pending requests; makes the listing public
    #[serde(default)]
    pub pending: bool,
    /// With `pending`, restrict to one urgency
    pub urgency: Option<Urgency>,
}

fn request_id(path: Result<Path<Uuid>, PathRejection>) -> Result<RequestId, AppError> {
    path.map(|Path(id)| RequestId::from_uuid(id))
        .map_err(|rejection| AppError::bad_request(rejection.body_text()))
}

// ============================================================================
// Handlers
// ============================================================================

/// Submit a blood request.
///
/// The allocator fulfils it straight away if stock covers the full quantity,
/// otherwise it is recorded as pending.
///
/// ```bash
/// curl -X POST http://localhost:5000/api/requests \
///   -H 'X-Requester-Id: 6f1c...' -H 'X-Requester-Role: hospital' \
///   -H 'Content-Type: application/json' \
///   -d '{"bloodType":"O+","quantity":2,"urgency":"critical","city":"Ahmedabad",
///        "hospital":"Civil Hospital","patientName":"R. Patel","contactNumber":"9876543210"}'
/// ```
///
/// Responds 201 with the stored request, including its `status`.
pub async fn submit_request(
    State(state): State<AppState>,
    caller: Caller,
    body: Result<Json<SubmitRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<BloodRequest>), AppError> {
    caller.require(Role::Hospital)?;
    let Json(body) = body.map_err(|rejection| AppError::validation(rejection.body_text()))?;

    let request = state
        .allocator
        .submit(NewBloodRequest {
            requester_id: caller.requester_id,
            blood_type: body.blood_type,
            quantity: body.quantity,
            urgency: body.urgency,
            details: body.details,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(request)))
}

/// List requests.
///
/// Admins see every request. Anyone may list pending requests with
/// `?pending=true`, optionally narrowed with `&urgency=critical`.
pub async fn list_requests(
    State(state): State<AppState>,
    caller: Option<Caller>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<Vec<BloodRequest>>, AppError> {
    let Query(query) = query.map_err(|rejection| AppError::bad_request(rejection.body_text()))?;

    if query.pending {
        let filter = query.urgency.map_or(UrgencyFilter::Any, UrgencyFilter::Exactly);
        return Ok(Json(state.read.list_pending(filter).await?));
    }

    caller
        .ok_or_else(|| AppError::unauthorized("Not authenticated"))?
        .require(Role::Admin)?;
    Ok(Json(state.read.list_all().await?))
}

/// Requests raised by the caller.
pub async fn my_requests(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<Vec<BloodRequest>>, AppError> {
    Ok(Json(state.read.list_by_requester(caller.requester_id).await?))
}

/// Pending requests marked urgent or critical. Public.
pub async fn urgent_requests(
    State(state): State<AppState>,
) -> Result<Json<Vec<BloodRequest>>, AppError> {
    Ok(Json(state.read.list_urgent().await?))
}

/// One request. Visible to admins and to the hospital that raised it.
pub async fn get_request(
    State(state): State<AppState>,
    caller: Caller,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<BloodRequest>, AppError> {
    let id = request_id(path)?;
    let request = state.read.get_request(id).await?;

    if !caller.is_admin() && request.requester_id != caller.requester_id {
        return Err(AppError::forbidden("Access denied: not your request"));
    }
    Ok(Json(request))
}

/// Change a request's status. Admin only.
///
/// ```bash
/// curl -X PUT http://localhost:5000/api/requests/550e8400-e29b-41d4-a716-446655440000 \
///   -H 'X-Requester-Id: 9a2b...' -H 'X-Requester-Role: admin' \
///   -H 'Content-Type: application/json' -d '{"status":"canceled"}'
/// ```
pub async fn update_status(
    State(state): State<AppState>,
    caller: Caller,
    path: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<UpdateStatusRequest>, JsonRejection>,
) -> Result<Json<BloodRequest>, AppError> {
    caller.require(Role::Admin)?;
    let id = request_id(path)?;
    let Json(body) = body.map_err(|rejection| AppError::validation(rejection.body_text()))?;

    tracing::info!(request_id = %id, to = %body.status, admin = %caller.requester_id, "Status change requested");
    Ok(Json(state.allocator.transition(id, body.status).await?))
}
