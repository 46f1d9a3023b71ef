//! Staging of a resolved scan into its persistent side effects.
//!
//! `stage` is the pure half of finalization: it runs the resolver over the
//! under-lock snapshot and materializes the attendance row plus the
//! optional ticket status transition. Store implementations execute the
//! staged record atomically while holding the ticket lock, so exactly one
//! attendance is committed per physical scan and at most one status write.

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use crate::models::{Attendance, Ticket, TicketStatus};

use super::context::{ScanContext, ScanInput};
use super::resolver::{self, Decision, TicketView};

/// A decision plus the rows the store must commit together.
#[derive(Debug, Clone)]
pub struct StagedScan {
    pub decision: Decision,
    pub attendance: Attendance,
    pub new_status: Option<TicketStatus>,
}

/// The committed result echoed back to the client.
#[derive(Debug, Clone)]
pub struct FinalizedScan {
    pub decision: Decision,
    /// Ticket as of after the commit.
    pub ticket: Ticket,
    pub attendance: Attendance,
}

pub fn stage(view: &TicketView, ctx: &ScanContext, scan: &ScanInput) -> StagedScan {
    let decision = resolver::resolve(view, ctx, scan);

    // A hinted checkpoint is recorded only when it actually exists; an
    // unknown id still yields a checkpoint_invalid attendance, without a
    // dangling reference.
    let checkpoint_id = view.checkpoint_owner.and(scan.checkpoint_id);

    let attendance = Attendance {
        id: Uuid::new_v4(),
        event_id: view.ticket.event_id,
        ticket_id: view.ticket.id,
        guest_id: view.ticket.guest_id,
        checkpoint_id,
        scanned_by: ctx.staff_id,
        result: decision.result,
        scanned_at: scan.scanned_at,
        device_id: scan.device_id.clone(),
        offline: scan.offline,
        metadata: json!({ "reason": decision.reason.as_str() }),
        created_at: Utc::now(),
    };

    StagedScan {
        decision,
        attendance,
        new_status: decision.new_status,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CheckinPolicy, ScanResult};
    use crate::scan::resolver::Reason;
    use chrono::{Duration, TimeZone};

    fn view() -> TicketView {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 18, 0, 0).unwrap();
        TicketView {
            ticket: Ticket {
                id: Uuid::new_v4(),
                event_id: Uuid::new_v4(),
                guest_id: Uuid::new_v4(),
                status: TicketStatus::Issued,
                expires_at: None,
                seat_section: None,
                seat_row: None,
                seat_code: None,
                created_at: now - Duration::days(1),
                updated_at: now - Duration::days(1),
            },
            tenant_id: Uuid::new_v4(),
            policy: CheckinPolicy::Single,
            credential_active: true,
            has_valid_attendance: false,
            checkpoint_owner: None,
        }
    }

    fn scan() -> ScanInput {
        ScanInput {
            qr_code: "qr-stage".to_string(),
            checkpoint_id: None,
            device_id: Some("device-7".to_string()),
            scanned_at: Utc.with_ymd_and_hms(2025, 6, 1, 18, 0, 0).unwrap(),
            offline: true,
        }
    }

    #[test]
    fn stages_attendance_with_denormalized_guest_and_reason() {
        let v = view();
        let ctx = ScanContext::new(v.tenant_id, Uuid::new_v4());
        let staged = stage(&v, &ctx, &scan());

        assert_eq!(staged.decision.result, ScanResult::Valid);
        assert_eq!(staged.attendance.ticket_id, v.ticket.id);
        assert_eq!(staged.attendance.guest_id, v.ticket.guest_id);
        assert_eq!(staged.attendance.scanned_by, ctx.staff_id);
        assert!(staged.attendance.offline);
        assert_eq!(staged.attendance.metadata["reason"], "accepted");
        assert_eq!(staged.new_status, Some(TicketStatus::Used));
    }

    #[test]
    fn unknown_checkpoint_hint_is_not_recorded() {
        let v = view();
        let ctx = ScanContext::new(v.tenant_id, Uuid::new_v4());
        let mut s = scan();
        s.checkpoint_id = Some(Uuid::new_v4());

        let staged = stage(&v, &ctx, &s);
        assert_eq!(staged.decision.reason, Reason::CheckpointInvalid);
        assert_eq!(staged.attendance.checkpoint_id, None);
        assert_eq!(staged.attendance.metadata["reason"], "checkpoint_invalid");
    }

    #[test]
    fn known_checkpoint_hint_is_recorded() {
        let mut v = view();
        v.checkpoint_owner = Some(v.ticket.event_id);
        let ctx = ScanContext::new(v.tenant_id, Uuid::new_v4());
        let mut s = scan();
        let checkpoint = Uuid::new_v4();
        s.checkpoint_id = Some(checkpoint);

        let staged = stage(&v, &ctx, &s);
        assert_eq!(staged.attendance.checkpoint_id, Some(checkpoint));
    }
}
