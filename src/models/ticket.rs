use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Canonical ticket lifecycle state. Transitions are monotonic toward a
/// terminal state: the scan finalizer advances `issued` to `used` or
/// `expired`, revocation is external, and `revoked` is never left via
/// scanning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
pub enum TicketStatus {
    Issued,
    Used,
    Expired,
    Revoked,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Ticket {
    pub id: Uuid,
    pub event_id: Uuid,
    pub guest_id: Uuid,
    pub status: TicketStatus,
    pub expires_at: Option<DateTime<Utc>>,
    pub seat_section: Option<String>,
    pub seat_row: Option<String>,
    pub seat_code: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
