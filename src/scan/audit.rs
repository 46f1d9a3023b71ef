//! Fire-and-forget lifecycle emission for finalized scans.
//!
//! Sinks receive every committed scan decision tagged with tenant, entity
//! and actor. Emission happens after the transaction commits and is
//! infallible from the engine's point of view; a sink that cannot deliver
//! logs and drops.

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::ScanResult;

/// One lifecycle event, e.g. `scan_valid` or `scan_expired`.
#[derive(Debug, Clone, Copy)]
pub struct ScanAudit {
    pub tenant_id: Uuid,
    pub event_id: Uuid,
    pub ticket_id: Uuid,
    pub attendance_id: Uuid,
    pub staff_id: Uuid,
    pub result: ScanResult,
    pub offline: bool,
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, audit: ScanAudit);
}

/// Default sink: structured log line plus a labelled counter.
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, audit: ScanAudit) {
        tracing::info!(
            action = %format!("scan_{}", audit.result.as_str()),
            tenant_id = %audit.tenant_id,
            event_id = %audit.event_id,
            ticket_id = %audit.ticket_id,
            attendance_id = %audit.attendance_id,
            staff_id = %audit.staff_id,
            offline = audit.offline,
            "scan finalized"
        );
        metrics::counter!("checkin_scans_total", "result" => audit.result.as_str()).increment(1);
    }
}
