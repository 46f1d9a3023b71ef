use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Outcome of one scan decision.
///
/// `Ignored` is produced only by the batch layer for payload-identical
/// retries and is never persisted; the attendance table stores the other
/// five values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
pub enum ScanResult {
    Valid,
    Duplicate,
    Invalid,
    Revoked,
    Expired,
    Ignored,
}

impl ScanResult {
    pub fn as_str(self) -> &'static str {
        match self {
            ScanResult::Valid => "valid",
            ScanResult::Duplicate => "duplicate",
            ScanResult::Invalid => "invalid",
            ScanResult::Revoked => "revoked",
            ScanResult::Expired => "expired",
            ScanResult::Ignored => "ignored",
        }
    }
}

/// Immutable record of one finalized scan attempt. Rows are append-only:
/// corrections happen by recording a new attendance, never by mutating
/// history. Written exclusively by the scan finalizer.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Attendance {
    pub id: Uuid,
    pub event_id: Uuid,
    pub ticket_id: Uuid,
    /// Denormalized from the ticket at write time.
    pub guest_id: Uuid,
    pub checkpoint_id: Option<Uuid>,
    pub scanned_by: Uuid,
    pub result: ScanResult,
    /// Client-supplied; authoritative for ordering across devices.
    pub scanned_at: DateTime<Utc>,
    pub device_id: Option<String>,
    pub offline: bool,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
