//! Storage seam for the scan engine.
//!
//! `ScanStore` covers the two I/O points of a scan: resolving a QR code
//! through its active credential, and finalizing a decision atomically.
//! `PgScanStore` is the production implementation (one transaction, ticket
//! row locked with `SELECT ... FOR UPDATE`); `MemoryScanStore` provides the
//! same total ordering with a per-ticket mutex and backs the engine and
//! handler tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use thiserror::Error;
use tokio::sync::Mutex as TokioMutex;
use uuid::Uuid;

use crate::models::{
    Attendance, CheckinPolicy, Checkpoint, Event, QrCredential, ScanResult, Ticket, TicketStatus,
};

use super::context::{ScanContext, ScanInput};
use super::finalizer::{self, FinalizedScan};
use super::resolver::TicketView;

#[derive(Debug, Error)]
pub enum ScanStoreError {
    #[error("database error")]
    Database(#[from] sqlx::Error),

    /// The ticket resolved by lookup was gone by the time the lock was
    /// taken. Tickets are never hard-deleted while referenced, so this
    /// indicates an operational problem rather than a scan outcome.
    #[error("ticket {0} disappeared during finalization")]
    TicketVanished(Uuid),
}

/// Minimal handle produced by lookup; all authoritative state is re-read
/// under the ticket lock during finalization.
#[derive(Debug, Clone, Copy)]
pub struct TicketRef {
    pub ticket_id: Uuid,
    pub event_id: Uuid,
}

#[async_trait]
pub trait ScanStore: Send + Sync {
    /// Resolve a QR code through the currently active credential. Unknown
    /// and rotated-away codes both yield `None`; nothing is persisted for
    /// them.
    async fn resolve_qr(&self, qr_code: &str) -> Result<Option<TicketRef>, ScanStoreError>;

    /// Decide and commit one scan while holding exclusive access to the
    /// ticket: exactly one attendance insert, at most one status update,
    /// both in the same atomic unit. Concurrent scans of the same ticket
    /// are totally ordered; the later one re-reads committed state and
    /// re-resolves against it.
    async fn finalize_scan(
        &self,
        ctx: &ScanContext,
        scan: &ScanInput,
        ticket: &TicketRef,
    ) -> Result<FinalizedScan, ScanStoreError>;
}

pub struct PgScanStore {
    pool: PgPool,
}

impl PgScanStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ScanStore for PgScanStore {
    async fn resolve_qr(&self, qr_code: &str) -> Result<Option<TicketRef>, ScanStoreError> {
        let row: Option<(Uuid, Uuid)> = sqlx::query_as(
            r#"
            SELECT t.id, t.event_id
            FROM qr_credentials q
            JOIN tickets t ON t.id = q.ticket_id
            WHERE q.code = $1 AND q.is_active
            "#,
        )
        .bind(qr_code)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(ticket_id, event_id)| TicketRef {
            ticket_id,
            event_id,
        }))
    }

    async fn finalize_scan(
        &self,
        ctx: &ScanContext,
        scan: &ScanInput,
        ticket: &TicketRef,
    ) -> Result<FinalizedScan, ScanStoreError> {
        let mut tx = self.pool.begin().await?;

        // Lock the ticket row first; everything below reads state that no
        // concurrent scan can be mutating.
        let locked: Option<Ticket> = sqlx::query_as(
            r#"
            SELECT id, event_id, guest_id, status, expires_at,
                   seat_section, seat_row, seat_code, created_at, updated_at
            FROM tickets
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(ticket.ticket_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(current) = locked else {
            // Dropping the transaction rolls it back.
            return Err(ScanStoreError::TicketVanished(ticket.ticket_id));
        };

        let (tenant_id, policy): (Uuid, CheckinPolicy) =
            sqlx::query_as("SELECT tenant_id, checkin_policy FROM events WHERE id = $1")
                .bind(current.event_id)
                .fetch_one(&mut *tx)
                .await?;

        // Rotation may have landed between lookup and this lock.
        let credential_active: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM qr_credentials WHERE ticket_id = $1 AND code = $2 AND is_active)",
        )
        .bind(current.id)
        .bind(&scan.qr_code)
        .fetch_one(&mut *tx)
        .await?;

        let has_valid_attendance: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM attendances WHERE ticket_id = $1 AND result = 'valid')",
        )
        .bind(current.id)
        .fetch_one(&mut *tx)
        .await?;

        let checkpoint_owner: Option<Uuid> = match scan.checkpoint_id {
            Some(checkpoint_id) => {
                sqlx::query_scalar("SELECT event_id FROM checkpoints WHERE id = $1")
                    .bind(checkpoint_id)
                    .fetch_optional(&mut *tx)
                    .await?
            }
            None => None,
        };

        let view = TicketView {
            ticket: current,
            tenant_id,
            policy,
            credential_active,
            has_valid_attendance,
            checkpoint_owner,
        };
        let staged = finalizer::stage(&view, ctx, scan);

        sqlx::query(
            r#"
            INSERT INTO attendances
                (id, event_id, ticket_id, guest_id, checkpoint_id, scanned_by,
                 result, scanned_at, device_id, offline, metadata, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(staged.attendance.id)
        .bind(staged.attendance.event_id)
        .bind(staged.attendance.ticket_id)
        .bind(staged.attendance.guest_id)
        .bind(staged.attendance.checkpoint_id)
        .bind(staged.attendance.scanned_by)
        .bind(staged.attendance.result)
        .bind(staged.attendance.scanned_at)
        .bind(&staged.attendance.device_id)
        .bind(staged.attendance.offline)
        .bind(&staged.attendance.metadata)
        .bind(staged.attendance.created_at)
        .execute(&mut *tx)
        .await?;

        let ticket_after = if let Some(new_status) = staged.new_status {
            let updated_at = Utc::now();
            sqlx::query("UPDATE tickets SET status = $2, updated_at = $3 WHERE id = $1")
                .bind(view.ticket.id)
                .bind(new_status)
                .bind(updated_at)
                .execute(&mut *tx)
                .await?;
            Ticket {
                status: new_status,
                updated_at,
                ..view.ticket
            }
        } else {
            view.ticket
        };

        tx.commit().await?;

        Ok(FinalizedScan {
            decision: staged.decision,
            ticket: ticket_after,
            attendance: staged.attendance,
        })
    }
}

#[derive(Default)]
struct MemoryState {
    events: HashMap<Uuid, Event>,
    checkpoints: HashMap<Uuid, Checkpoint>,
    tickets: HashMap<Uuid, Ticket>,
    credentials: Vec<QrCredential>,
    attendances: Vec<Attendance>,
}

/// In-process store with the same finalization contract as Postgres: a
/// keyed mutex per ticket plays the role of the row lock, and the snapshot
/// is taken only after that lock is held.
#[derive(Default)]
pub struct MemoryScanStore {
    state: StdMutex<MemoryState>,
    ticket_locks: StdMutex<HashMap<Uuid, Arc<TokioMutex<()>>>>,
}

impl MemoryScanStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_event(&self, tenant_id: Uuid, policy: CheckinPolicy) -> Uuid {
        let now = Utc::now();
        let event = Event {
            id: Uuid::new_v4(),
            tenant_id,
            title: "event".to_string(),
            checkin_policy: policy,
            timezone: "UTC".to_string(),
            created_at: now,
            updated_at: now,
        };
        let id = event.id;
        self.lock_state().events.insert(id, event);
        id
    }

    pub fn add_checkpoint(&self, event_id: Uuid) -> Uuid {
        let checkpoint = Checkpoint {
            id: Uuid::new_v4(),
            event_id,
            name: "gate".to_string(),
            created_at: Utc::now(),
        };
        let id = checkpoint.id;
        self.lock_state().checkpoints.insert(id, checkpoint);
        id
    }

    /// Issue a ticket with an active version-1 credential for `qr_code`.
    pub fn add_ticket(&self, event_id: Uuid, qr_code: &str) -> Uuid {
        let now = Utc::now();
        let ticket = Ticket {
            id: Uuid::new_v4(),
            event_id,
            guest_id: Uuid::new_v4(),
            status: TicketStatus::Issued,
            expires_at: None,
            seat_section: None,
            seat_row: None,
            seat_code: None,
            created_at: now,
            updated_at: now,
        };
        let id = ticket.id;
        let mut state = self.lock_state();
        state.tickets.insert(id, ticket);
        state.credentials.push(QrCredential {
            id: Uuid::new_v4(),
            ticket_id: id,
            code: qr_code.to_string(),
            version: 1,
            is_active: true,
            created_at: now,
        });
        id
    }

    pub fn set_ticket_status(&self, ticket_id: Uuid, status: TicketStatus) {
        if let Some(ticket) = self.lock_state().tickets.get_mut(&ticket_id) {
            ticket.status = status;
            ticket.updated_at = Utc::now();
        }
    }

    pub fn set_ticket_expiry(&self, ticket_id: Uuid, expires_at: DateTime<Utc>) {
        if let Some(ticket) = self.lock_state().tickets.get_mut(&ticket_id) {
            ticket.expires_at = Some(expires_at);
        }
    }

    /// Deactivate the active credential and install a higher version, the
    /// way external rotation does.
    pub fn rotate_credential(&self, ticket_id: Uuid, new_code: &str) {
        let mut state = self.lock_state();
        let mut version = 1;
        for credential in state
            .credentials
            .iter_mut()
            .filter(|c| c.ticket_id == ticket_id)
        {
            credential.is_active = false;
            version = version.max(credential.version + 1);
        }
        state.credentials.push(QrCredential {
            id: Uuid::new_v4(),
            ticket_id,
            code: new_code.to_string(),
            version,
            is_active: true,
            created_at: Utc::now(),
        });
    }

    pub fn ticket(&self, ticket_id: Uuid) -> Option<Ticket> {
        self.lock_state().tickets.get(&ticket_id).cloned()
    }

    pub fn attendances(&self, ticket_id: Uuid) -> Vec<Attendance> {
        self.lock_state()
            .attendances
            .iter()
            .filter(|a| a.ticket_id == ticket_id)
            .cloned()
            .collect()
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ticket_lock(&self, ticket_id: Uuid) -> Arc<TokioMutex<()>> {
        self.ticket_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(ticket_id)
            .or_default()
            .clone()
    }

    fn snapshot(&self, ticket_id: Uuid, scan: &ScanInput) -> Option<TicketView> {
        let state = self.lock_state();
        let ticket = state.tickets.get(&ticket_id)?.clone();
        let event = state.events.get(&ticket.event_id)?;
        let credential_active = state
            .credentials
            .iter()
            .any(|c| c.ticket_id == ticket_id && c.code == scan.qr_code && c.is_active);
        let has_valid_attendance = state
            .attendances
            .iter()
            .any(|a| a.ticket_id == ticket_id && a.result == ScanResult::Valid);
        let checkpoint_owner = scan
            .checkpoint_id
            .and_then(|id| state.checkpoints.get(&id).map(|c| c.event_id));

        Some(TicketView {
            tenant_id: event.tenant_id,
            policy: event.checkin_policy,
            ticket,
            credential_active,
            has_valid_attendance,
            checkpoint_owner,
        })
    }
}

#[async_trait]
impl ScanStore for MemoryScanStore {
    async fn resolve_qr(&self, qr_code: &str) -> Result<Option<TicketRef>, ScanStoreError> {
        let state = self.lock_state();
        let resolved = state
            .credentials
            .iter()
            .find(|c| c.code == qr_code && c.is_active)
            .and_then(|c| state.tickets.get(&c.ticket_id))
            .map(|t| TicketRef {
                ticket_id: t.id,
                event_id: t.event_id,
            });
        Ok(resolved)
    }

    async fn finalize_scan(
        &self,
        ctx: &ScanContext,
        scan: &ScanInput,
        ticket: &TicketRef,
    ) -> Result<FinalizedScan, ScanStoreError> {
        let lock = self.ticket_lock(ticket.ticket_id);
        let _guard = lock.lock().await;

        let view = self
            .snapshot(ticket.ticket_id, scan)
            .ok_or(ScanStoreError::TicketVanished(ticket.ticket_id))?;
        let staged = finalizer::stage(&view, ctx, scan);

        let mut state = self.lock_state();
        state.attendances.push(staged.attendance.clone());
        let ticket_after = match staged.new_status {
            Some(new_status) => {
                let stored = state
                    .tickets
                    .get_mut(&ticket.ticket_id)
                    .ok_or(ScanStoreError::TicketVanished(ticket.ticket_id))?;
                stored.status = new_status;
                stored.updated_at = Utc::now();
                stored.clone()
            }
            None => view.ticket,
        };

        Ok(FinalizedScan {
            decision: staged.decision,
            ticket: ticket_after,
            attendance: staged.attendance,
        })
    }
}
