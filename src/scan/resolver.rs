//! Pure scan decision logic.
//!
//! The resolver is an ordered table of predicate rules evaluated
//! first-match-wins over a ticket snapshot taken under the ticket lock.
//! Order encodes staff-facing priority, not just correctness: a revoked
//! ticket must never be reported as merely a duplicate, and an expired
//! ticket reports `expired` even when it would also be a duplicate. No rule
//! performs I/O.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{CheckinPolicy, ScanResult, Ticket, TicketStatus};

use super::context::{ScanContext, ScanInput};

/// Machine-readable reason code attached to every decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reason {
    TenantMismatch,
    EventMismatch,
    CheckpointInvalid,
    QrInactive,
    TicketRevoked,
    TicketExpired,
    DuplicateEntry,
    Accepted,
    DuplicatePayload,
    QrNotFound,
    InternalError,
}

impl Reason {
    pub fn as_str(self) -> &'static str {
        match self {
            Reason::TenantMismatch => "tenant_mismatch",
            Reason::EventMismatch => "event_mismatch",
            Reason::CheckpointInvalid => "checkpoint_invalid",
            Reason::QrInactive => "qr_inactive",
            Reason::TicketRevoked => "ticket_revoked",
            Reason::TicketExpired => "ticket_expired",
            Reason::DuplicateEntry => "duplicate_entry",
            Reason::Accepted => "accepted",
            Reason::DuplicatePayload => "duplicate_payload",
            Reason::QrNotFound => "qr_not_found",
            Reason::InternalError => "internal_error",
        }
    }

    /// Staff-facing message shown on the scanning device.
    pub fn message(self) -> &'static str {
        match self {
            Reason::TenantMismatch => "Ticket belongs to another organization",
            Reason::EventMismatch => "Ticket belongs to another event",
            Reason::CheckpointInvalid => "Checkpoint does not belong to this event",
            Reason::QrInactive => "QR code has been replaced and is no longer valid",
            Reason::TicketRevoked => "Ticket has been revoked",
            Reason::TicketExpired => "Ticket has expired",
            Reason::DuplicateEntry => "Ticket was already used for entry",
            Reason::Accepted => "Entry accepted",
            Reason::DuplicatePayload => "Duplicate submission of an already processed scan",
            Reason::QrNotFound => "QR code not recognized",
            Reason::InternalError => "Scan could not be processed",
        }
    }
}

/// Snapshot of everything the resolver needs, read in one place under the
/// ticket lock so concurrent scans observe a consistent state.
#[derive(Debug, Clone)]
pub struct TicketView {
    pub ticket: Ticket,
    /// Tenant owning the ticket's event.
    pub tenant_id: Uuid,
    pub policy: CheckinPolicy,
    /// Whether the scanned credential is still the active one for the
    /// ticket. Lookup only resolves active codes, so this only goes false
    /// when a rotation lands between lookup and finalization.
    pub credential_active: bool,
    /// A prior `valid` attendance exists for this ticket.
    pub has_valid_attendance: bool,
    /// Owning event of the hinted checkpoint; `None` when the hint is
    /// absent or the checkpoint is unknown.
    pub checkpoint_owner: Option<Uuid>,
}

/// Outcome of resolving one scan against a ticket snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub result: ScanResult,
    pub reason: Reason,
    /// Status the finalizer must write, if the scan mutates the ticket.
    pub new_status: Option<TicketStatus>,
}

impl Decision {
    fn rejected(reason: Reason) -> Self {
        Self {
            result: ScanResult::Invalid,
            reason,
            new_status: None,
        }
    }
}

struct Rule {
    name: &'static str,
    check: fn(&TicketView, &ScanContext, &ScanInput) -> Option<Decision>,
}

/// Evaluation order is the contract; see module docs.
const RULES: &[Rule] = &[
    Rule {
        name: "scope",
        check: scope,
    },
    Rule {
        name: "checkpoint",
        check: checkpoint,
    },
    Rule {
        name: "credential",
        check: credential,
    },
    Rule {
        name: "revoked",
        check: revoked,
    },
    Rule {
        name: "expired",
        check: expired,
    },
    Rule {
        name: "duplicate",
        check: duplicate,
    },
];

/// Decide the outcome for one scan. Pure and deterministic in its inputs.
pub fn resolve(view: &TicketView, ctx: &ScanContext, scan: &ScanInput) -> Decision {
    for rule in RULES {
        if let Some(decision) = (rule.check)(view, ctx, scan) {
            tracing::debug!(
                rule = rule.name,
                result = decision.result.as_str(),
                reason = decision.reason.as_str(),
                ticket_id = %view.ticket.id,
                "scan resolved"
            );
            return decision;
        }
    }
    accept(view)
}

fn scope(view: &TicketView, ctx: &ScanContext, _scan: &ScanInput) -> Option<Decision> {
    if view.tenant_id != ctx.tenant_id {
        return Some(Decision::rejected(Reason::TenantMismatch));
    }
    match ctx.event_id {
        Some(event_id) if event_id != view.ticket.event_id => {
            Some(Decision::rejected(Reason::EventMismatch))
        }
        _ => None,
    }
}

fn checkpoint(view: &TicketView, _ctx: &ScanContext, scan: &ScanInput) -> Option<Decision> {
    if scan.checkpoint_id.is_some() && view.checkpoint_owner != Some(view.ticket.event_id) {
        return Some(Decision::rejected(Reason::CheckpointInvalid));
    }
    None
}

fn credential(view: &TicketView, _ctx: &ScanContext, _scan: &ScanInput) -> Option<Decision> {
    if !view.credential_active {
        return Some(Decision::rejected(Reason::QrInactive));
    }
    None
}

fn revoked(view: &TicketView, _ctx: &ScanContext, _scan: &ScanInput) -> Option<Decision> {
    if view.ticket.status == TicketStatus::Revoked {
        return Some(Decision {
            result: ScanResult::Revoked,
            reason: Reason::TicketRevoked,
            new_status: None,
        });
    }
    None
}

fn expired(view: &TicketView, _ctx: &ScanContext, scan: &ScanInput) -> Option<Decision> {
    let already_expired = view.ticket.status == TicketStatus::Expired;
    let past_expiry = matches!(view.ticket.expires_at, Some(at) if at <= scan.scanned_at);
    if already_expired || past_expiry {
        return Some(Decision {
            result: ScanResult::Expired,
            reason: Reason::TicketExpired,
            new_status: (!already_expired).then_some(TicketStatus::Expired),
        });
    }
    None
}

fn duplicate(view: &TicketView, _ctx: &ScanContext, _scan: &ScanInput) -> Option<Decision> {
    if view.policy != CheckinPolicy::Single {
        return None;
    }
    if view.has_valid_attendance || view.ticket.status == TicketStatus::Used {
        return Some(Decision {
            result: ScanResult::Duplicate,
            reason: Reason::DuplicateEntry,
            new_status: None,
        });
    }
    None
}

fn accept(view: &TicketView) -> Decision {
    let consume = view.policy == CheckinPolicy::Single && view.ticket.status != TicketStatus::Used;
    Decision {
        result: ScanResult::Valid,
        reason: Reason::Accepted,
        new_status: consume.then_some(TicketStatus::Used),
    }
}
