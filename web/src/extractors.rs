//! Custom Axum extractors.
//!
//! - `CorrelationId`: the request's correlation ID (set by the middleware, or
//!   read from the header, or freshly generated)
//! - `Caller`: the authenticated requester and their role, as asserted by the
//!   upstream gateway
//!
//! # Examples
//!
//! ```ignore
//! use bloodbank_web::extractors::{Caller, CorrelationId, Role};
//!
//! async fn handler(
//!     State(state): State<AppState>,
//!     correlation_id: CorrelationId,
//!     caller: Caller,
//! ) -> Result<Json<Response>, AppError> {
//!     caller.require(Role::Admin)?;
//!     tracing::info!(correlation_id = %correlation_id.0, caller = %caller.requester_id, "Processing request");
//!     Ok(Json(response))
//! }
//! ```

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{HeaderMap, request::Parts},
};
use bloodbank_core::RequesterId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::CORRELATION_ID_HEADER;

/// Header carrying the caller's user id.
pub const REQUESTER_ID_HEADER: &str = "X-Requester-Id";

/// Header carrying the caller's role.
pub const REQUESTER_ROLE_HEADER: &str = "X-Requester-Role";

/// Correlation ID for request tracing.
///
/// Prefers the ID stored by the correlation middleware, then the
/// `X-Correlation-ID` header, and otherwise generates a new UUID v4.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CorrelationId(pub Uuid);

impl CorrelationId {
    /// Read the `X-Correlation-ID` header, minting a new id if it is absent
    /// or not a UUID.
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self(
            headers
                .get(CORRELATION_ID_HEADER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| Uuid::parse_str(s).ok())
                .unwrap_or_else(Uuid::new_v4),
        )
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for CorrelationId
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(id) = parts.extensions.get::<Self>() {
            return Ok(*id);
        }

        Ok(Self::from_headers(&parts.headers))
    }
}

/// Role of an authenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Blood donor; read-only access to public views
    Donor,
    /// Hospital account; may submit requests
    Hospital,
    /// Blood bank operator; may list everything and change statuses
    Admin,
}

impl Role {
    /// Text form used in the role header.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Donor => "donor",
            Self::Hospital => "hospital",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "donor" => Ok(Self::Donor),
            "hospital" => Ok(Self::Hospital),
            "admin" => Ok(Self::Admin),
            other => Err(AppError::unauthorized(format!("Unknown role {other:?}"))),
        }
    }
}

/// The authenticated caller.
///
/// Authentication happens upstream; this extractor trusts the
/// `X-Requester-Id` and `X-Requester-Role` headers. Missing or malformed
/// headers reject with 401. Use `Option<Caller>` on public routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    /// Who is calling
    pub requester_id: RequesterId,
    /// What they may do
    pub role: Role,
}

impl Caller {
    /// Reject with 403 unless the caller has `role`.
    ///
    /// # Errors
    ///
    /// Returns a 403 [`AppError`] when the role differs.
    pub fn require(&self, role: Role) -> Result<(), AppError> {
        if self.role == role {
            Ok(())
        } else {
            Err(AppError::forbidden(format!(
                "Access denied: {role} role required"
            )))
        }
    }

    /// Whether the caller is an admin.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    fn from_headers(headers: &HeaderMap) -> Result<Self, AppError> {
        let requester_id = headers
            .get(REQUESTER_ID_HEADER)
            .ok_or_else(|| AppError::unauthorized("Not authenticated"))?
            .to_str()
            .ok()
            .and_then(|s| s.parse::<RequesterId>().ok())
            .ok_or_else(|| AppError::unauthorized("Malformed requester id"))?;

        let role = headers
            .get(REQUESTER_ROLE_HEADER)
            .ok_or_else(|| AppError::unauthorized("Missing requester role"))?
            .to_str()
            .map_err(|_| AppError::unauthorized("Malformed requester role"))?
            .parse::<Role>()?;

        Ok(Self { requester_id, role })
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Self::from_headers(&parts.headers)
    }
}
