use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

/// Authorization context for a scan, resolved by the caller before the
/// engine is invoked. Always passed explicitly; the engine never reads
/// tenant state from anywhere ambient.
#[derive(Debug, Clone, Copy)]
pub struct ScanContext {
    pub tenant_id: Uuid,
    /// Staff member performing the scan.
    pub staff_id: Uuid,
    /// Optional event hint; when present the ticket must belong to it.
    pub event_id: Option<Uuid>,
}

impl ScanContext {
    pub fn new(tenant_id: Uuid, staff_id: Uuid) -> Self {
        Self {
            tenant_id,
            staff_id,
            event_id: None,
        }
    }

    /// Narrow the context to an event. A per-scan hint wins over a broader
    /// default, so a batch item scoped to its own event is checked against
    /// that event and not the submission-wide one.
    pub fn for_event(mut self, event_id: Option<Uuid>) -> Self {
        self.event_id = event_id.or(self.event_id);
        self
    }
}

/// Wire shape of one scan, shared by the single, batch and sync endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct ScanRequest {
    pub qr_code: String,
    pub checkpoint_id: Option<Uuid>,
    pub device_id: Option<String>,
    pub scanned_at: DateTime<Utc>,
    #[serde(default)]
    pub offline: Option<bool>,
    pub event_id: Option<Uuid>,
}

impl ScanRequest {
    /// Normalize into engine input. The offline sync path forces `offline`
    /// regardless of what the client sent per item.
    pub fn to_input(&self, force_offline: bool) -> ScanInput {
        ScanInput {
            qr_code: self.qr_code.clone(),
            checkpoint_id: self.checkpoint_id,
            device_id: self.device_id.clone(),
            scanned_at: self.scanned_at,
            offline: force_offline || self.offline.unwrap_or(false),
        }
    }
}

/// One normalized scan as seen by the resolver and finalizer.
#[derive(Debug, Clone)]
pub struct ScanInput {
    pub qr_code: String,
    pub checkpoint_id: Option<Uuid>,
    pub device_id: Option<String>,
    pub scanned_at: DateTime<Utc>,
    pub offline: bool,
}
