use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Rotatable token bound 1:1 to a ticket at any instant. Rotation inserts a
/// higher `version` and deactivates the previous row; scanning honors only
/// the active credential, so stale printed codes stop resolving.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct QrCredential {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub code: String,
    pub version: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}
