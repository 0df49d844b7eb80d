//! Clinic tenant context extractor.
//!
//! The upstream gateway authenticates callers and forwards the tenant and
//! user identity as `X-Clinic-Id` / `X-User-Id` headers. Handlers take this
//! extractor to scope every operation to the calling clinic.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::app::AppState;
use crate::error::ApiError;

/// Header carrying the authenticated clinic (tenant) id.
pub const CLINIC_ID_HEADER: &str = "X-Clinic-Id";

/// Header carrying the authenticated user id.
pub const USER_ID_HEADER: &str = "X-User-Id";

/// Identity of the calling clinic and user, as asserted by the gateway.
#[derive(Debug, Clone, Copy)]
pub struct ClinicContext {
    /// Tenant every operation is scoped to.
    pub clinic_id: Uuid,
    /// User recorded as the submitter on writes.
    pub user_id: Uuid,
}

#[async_trait]
impl FromRequestParts<AppState> for ClinicContext {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let clinic_id = header_uuid(parts, CLINIC_ID_HEADER)?;
        let user_id = header_uuid(parts, USER_ID_HEADER)?;

        Ok(Self { clinic_id, user_id })
    }
}

fn header_uuid(parts: &Parts, name: &str) -> Result<Uuid, ApiError> {
    let value = parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized(format!("Missing {} header", name)))?;

    value
        .parse::<Uuid>()
        .map_err(|_| ApiError::Unauthorized(format!("Invalid {} header", name)))
}
