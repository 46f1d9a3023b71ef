use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use uuid::Uuid;

use crate::scan::{ScanContext, ScanEngine};
use crate::utils::error::AppError;
use crate::utils::response::success;

pub mod scan;

/// Shared state for all handlers; cloning is cheap, the engine holds Arcs.
#[derive(Clone)]
pub struct AppState {
    pub engine: ScanEngine,
}

/// The authorization contract consumed from upstream: an authenticated
/// staff identity and its tenant arrive as headers set by the gateway.
/// Requests without them never reach the engine.
#[async_trait]
impl<S> FromRequestParts<S> for ScanContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let tenant_id = header_uuid(parts, "x-tenant-id")?
            .ok_or_else(|| AppError::AuthError("Missing X-Tenant-Id header".to_string()))?;
        let staff_id = header_uuid(parts, "x-staff-id")?
            .ok_or_else(|| AppError::AuthError("Missing X-Staff-Id header".to_string()))?;
        let event_id = header_uuid(parts, "x-event-id")?;

        Ok(ScanContext::new(tenant_id, staff_id).for_event(event_id))
    }
}

fn header_uuid(parts: &Parts, name: &str) -> Result<Option<Uuid>, AppError> {
    let Some(value) = parts.headers.get(name) else {
        return Ok(None);
    };
    value
        .to_str()
        .ok()
        .and_then(|s| Uuid::parse_str(s).ok())
        .map(Some)
        .ok_or_else(|| AppError::ValidationError(format!("Header {name} is not a valid UUID")))
}

#[derive(Serialize)]
struct HealthPayload {
    status: &'static str,
    service: &'static str,
}

pub async fn health_check() -> Response {
    let payload = HealthPayload {
        status: "ok",
        service: "gatecheck-api",
    };

    success(payload, "Health check successful").into_response()
}
