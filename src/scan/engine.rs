//! Orchestration of lookup, finalization and audit for single and batched
//! scans.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use crate::models::{Attendance, ScanResult, Ticket};

use super::audit::{AuditSink, ScanAudit};
use super::batch::{BatchSummary, PayloadKey};
use super::context::{ScanContext, ScanRequest};
use super::finalizer::FinalizedScan;
use super::resolver::Reason;
use super::store::{ScanStore, ScanStoreError};

/// Response payload for one resolved scan, valid or not.
#[derive(Debug, Clone, Serialize)]
pub struct ScanOutcome {
    pub result: ScanResult,
    pub message: &'static str,
    pub reason: Reason,
    pub qr_code: String,
    pub ticket: Option<Ticket>,
    pub attendance: Option<Attendance>,
    /// Index of the earlier batch item this one is a retry of.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deduplicated_with: Option<usize>,
}

impl ScanOutcome {
    fn finalized(qr_code: String, finalized: FinalizedScan) -> Self {
        let reason = finalized.decision.reason;
        Self {
            result: finalized.decision.result,
            message: reason.message(),
            reason,
            qr_code,
            ticket: Some(finalized.ticket),
            attendance: Some(finalized.attendance),
            deduplicated_with: None,
        }
    }

    fn unresolved(qr_code: String, result: ScanResult, reason: Reason) -> Self {
        Self {
            result,
            message: reason.message(),
            reason,
            qr_code,
            ticket: None,
            attendance: None,
            deduplicated_with: None,
        }
    }

    fn ignored(qr_code: String, original_index: usize) -> Self {
        Self {
            deduplicated_with: Some(original_index),
            ..Self::unresolved(qr_code, ScanResult::Ignored, Reason::DuplicatePayload)
        }
    }
}

/// One entry of a multi-status batch response, indexed by submission
/// position.
#[derive(Debug, Clone, Serialize)]
pub struct BatchItemOutcome {
    pub index: usize,
    #[serde(flatten)]
    pub outcome: ScanOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchOutcome {
    pub results: Vec<BatchItemOutcome>,
    pub summary: BatchSummary,
}

#[derive(Clone)]
pub struct ScanEngine {
    store: Arc<dyn ScanStore>,
    audit: Arc<dyn AuditSink>,
}

impl ScanEngine {
    pub fn new(store: Arc<dyn ScanStore>, audit: Arc<dyn AuditSink>) -> Self {
        Self { store, audit }
    }

    /// Process one online scan. Unknown codes are a first-class outcome;
    /// store failures propagate so an uncommitted scan is never reported
    /// as decided.
    pub async fn process_scan(
        &self,
        ctx: &ScanContext,
        request: &ScanRequest,
    ) -> Result<ScanOutcome, ScanStoreError> {
        self.run_one(ctx, request, false).await
    }

    /// Process an ordered submission. Payload-identical retries are
    /// suppressed before finalization, and no item failure aborts its
    /// siblings; the response always enumerates every item.
    pub async fn process_batch(
        &self,
        ctx: &ScanContext,
        scans: &[ScanRequest],
        force_offline: bool,
    ) -> BatchOutcome {
        let mut seen: HashMap<PayloadKey, usize> = HashMap::new();
        let mut results = Vec::with_capacity(scans.len());
        let mut summary = BatchSummary::default();

        for (index, request) in scans.iter().enumerate() {
            let key = PayloadKey::from(request);
            let outcome = match seen.get(&key) {
                Some(&original_index) => {
                    ScanOutcome::ignored(request.qr_code.clone(), original_index)
                }
                None => {
                    seen.insert(key, index);
                    match self.run_one(ctx, request, force_offline).await {
                        Ok(outcome) => outcome,
                        Err(err) => {
                            tracing::error!(
                                error = %err,
                                index,
                                qr_code = %request.qr_code,
                                "batch item failed to finalize"
                            );
                            ScanOutcome::unresolved(
                                request.qr_code.clone(),
                                ScanResult::Invalid,
                                Reason::InternalError,
                            )
                        }
                    }
                }
            };

            summary.tally(outcome.result);
            results.push(BatchItemOutcome { index, outcome });
        }

        BatchOutcome { results, summary }
    }

    async fn run_one(
        &self,
        ctx: &ScanContext,
        request: &ScanRequest,
        force_offline: bool,
    ) -> Result<ScanOutcome, ScanStoreError> {
        let ctx = ctx.for_event(request.event_id);
        let scan = request.to_input(force_offline);

        let Some(ticket) = self.store.resolve_qr(&scan.qr_code).await? else {
            // The one path with no persisted record: there is no ticket to
            // attach an attendance to.
            return Ok(ScanOutcome::unresolved(
                scan.qr_code,
                ScanResult::Invalid,
                Reason::QrNotFound,
            ));
        };

        let finalized = self.store.finalize_scan(&ctx, &scan, &ticket).await?;

        self.audit
            .record(ScanAudit {
                tenant_id: ctx.tenant_id,
                event_id: finalized.ticket.event_id,
                ticket_id: finalized.ticket.id,
                attendance_id: finalized.attendance.id,
                staff_id: ctx.staff_id,
                result: finalized.decision.result,
                offline: scan.offline,
            })
            .await;

        Ok(ScanOutcome::finalized(scan.qr_code, finalized))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CheckinPolicy, TicketStatus};
    use crate::scan::store::MemoryScanStore;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use uuid::Uuid;

    fn setup(policy: CheckinPolicy) -> (ScanEngine, Arc<MemoryScanStore>, ScanContext, Uuid, Uuid) {
        let store = Arc::new(MemoryScanStore::new());
        let tenant_id = Uuid::new_v4();
        let event_id = store.add_event(tenant_id, policy);
        let ticket_id = store.add_ticket(event_id, "qr-1");
        let engine = ScanEngine::new(store.clone(), Arc::new(super::super::TracingAuditSink));
        let ctx = ScanContext::new(tenant_id, Uuid::new_v4());
        (engine, store, ctx, event_id, ticket_id)
    }

    fn at(second: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 20, 0, second).unwrap()
    }

    fn request(code: &str, scanned_at: DateTime<Utc>) -> ScanRequest {
        ScanRequest {
            qr_code: code.to_string(),
            checkpoint_id: None,
            device_id: Some("device-1".to_string()),
            scanned_at,
            offline: None,
            event_id: None,
        }
    }

    #[tokio::test]
    async fn single_policy_scans_converge_to_one_valid_entry() {
        let (engine, store, ctx, _, ticket_id) = setup(CheckinPolicy::Single);

        let first = engine.process_scan(&ctx, &request("qr-1", at(0))).await.unwrap();
        assert_eq!(first.result, ScanResult::Valid);
        assert_eq!(store.ticket(ticket_id).unwrap().status, TicketStatus::Used);

        let second = engine.process_scan(&ctx, &request("qr-1", at(30))).await.unwrap();
        assert_eq!(second.result, ScanResult::Duplicate);
        assert_eq!(second.reason, Reason::DuplicateEntry);
        assert_eq!(store.ticket(ticket_id).unwrap().status, TicketStatus::Used);
        assert_eq!(store.attendances(ticket_id).len(), 2);
    }

    #[tokio::test]
    async fn multiple_policy_admits_repeat_entries() {
        let (engine, store, ctx, _, ticket_id) = setup(CheckinPolicy::Multiple);

        for second in [0, 30] {
            let outcome = engine
                .process_scan(&ctx, &request("qr-1", at(second)))
                .await
                .unwrap();
            assert_eq!(outcome.result, ScanResult::Valid);
        }

        let attendances = store.attendances(ticket_id);
        assert_eq!(attendances.len(), 2);
        assert!(attendances.iter().all(|a| a.result == ScanResult::Valid));
        assert_eq!(store.ticket(ticket_id).unwrap().status, TicketStatus::Issued);
    }

    #[tokio::test]
    async fn revocation_is_terminal() {
        let (engine, store, ctx, _, ticket_id) = setup(CheckinPolicy::Multiple);
        store.set_ticket_status(ticket_id, TicketStatus::Revoked);

        for second in [0, 10] {
            let outcome = engine
                .process_scan(&ctx, &request("qr-1", at(second)))
                .await
                .unwrap();
            assert_eq!(outcome.result, ScanResult::Revoked);
            assert_eq!(outcome.reason, Reason::TicketRevoked);
        }
        assert_eq!(
            store.ticket(ticket_id).unwrap().status,
            TicketStatus::Revoked
        );
    }

    #[tokio::test]
    async fn expiry_advances_status_and_wins_over_first_valid() {
        let (engine, store, ctx, _, ticket_id) = setup(CheckinPolicy::Single);
        store.set_ticket_expiry(ticket_id, at(0) - Duration::minutes(5));

        let outcome = engine.process_scan(&ctx, &request("qr-1", at(0))).await.unwrap();
        assert_eq!(outcome.result, ScanResult::Expired);
        assert_eq!(
            store.ticket(ticket_id).unwrap().status,
            TicketStatus::Expired
        );
    }

    #[tokio::test]
    async fn unknown_code_yields_outcome_without_record() {
        let (engine, store, ctx, _, ticket_id) = setup(CheckinPolicy::Single);

        let outcome = engine
            .process_scan(&ctx, &request("qr-unknown", at(0)))
            .await
            .unwrap();
        assert_eq!(outcome.result, ScanResult::Invalid);
        assert_eq!(outcome.reason, Reason::QrNotFound);
        assert!(outcome.ticket.is_none());
        assert!(outcome.attendance.is_none());
        assert!(store.attendances(ticket_id).is_empty());
    }

    #[tokio::test]
    async fn identical_online_replay_records_the_same_result_twice() {
        let (engine, store, ctx, _, ticket_id) = setup(CheckinPolicy::Single);
        let replayed = request("qr-1", at(0));

        let first = engine.process_scan(&ctx, &replayed).await.unwrap();
        let second = engine.process_scan(&ctx, &replayed).await.unwrap();

        // No payload dedup on the online path; the replay converges on the
        // recorded history instead.
        assert_eq!(first.result, ScanResult::Valid);
        assert_eq!(second.result, ScanResult::Duplicate);
        assert_eq!(store.attendances(ticket_id).len(), 2);
    }

    #[tokio::test]
    async fn item_event_hint_overrides_the_submission_scope() {
        let (engine, store, ctx, event_id, _) = setup(CheckinPolicy::Single);
        let scoped_ctx = ctx.for_event(Some(Uuid::new_v4()));

        // Without its own hint the item inherits the (wrong) scope.
        let outcome = engine
            .process_scan(&scoped_ctx, &request("qr-1", at(0)))
            .await
            .unwrap();
        assert_eq!(outcome.reason, Reason::EventMismatch);

        // The item's own event wins over the submission-wide one.
        let mut scan = request("qr-1", at(10));
        scan.event_id = Some(event_id);
        let outcome = engine.process_scan(&scoped_ctx, &scan).await.unwrap();
        assert_eq!(outcome.result, ScanResult::Valid);

        let ticket = store.resolve_qr("qr-1").await.unwrap().unwrap();
        assert_eq!(store.attendances(ticket.ticket_id).len(), 2);
    }

    #[tokio::test]
    async fn batch_collapses_identical_payloads_and_keeps_order() {
        let (engine, store, ctx, _, ticket_id) = setup(CheckinPolicy::Single);

        let scans = vec![
            request("qr-1", at(0)),
            request("qr-1", at(0)),
            request("qr-1", at(45)),
        ];
        let batch = engine.process_batch(&ctx, &scans, true).await;

        assert_eq!(batch.results[0].outcome.result, ScanResult::Valid);
        assert_eq!(batch.results[1].outcome.result, ScanResult::Ignored);
        assert_eq!(batch.results[1].outcome.reason, Reason::DuplicatePayload);
        assert_eq!(batch.results[1].outcome.deduplicated_with, Some(0));
        assert_eq!(batch.results[2].outcome.result, ScanResult::Duplicate);

        assert_eq!(store.attendances(ticket_id).len(), 2);
        assert_eq!(
            batch.summary,
            BatchSummary {
                total_scans: 3,
                processed_scans: 2,
                valid: 1,
                duplicate: 1,
                deduplicated: 1,
                errors: 1,
            }
        );
    }

    #[tokio::test]
    async fn unknown_code_does_not_abort_batch_siblings() {
        let (engine, store, ctx, event_id, ticket_id) = setup(CheckinPolicy::Single);
        let other_ticket = store.add_ticket(event_id, "qr-2");

        let scans = vec![
            request("qr-1", at(0)),
            request("qr-missing", at(1)),
            request("qr-2", at(2)),
        ];
        let batch = engine.process_batch(&ctx, &scans, false).await;

        assert_eq!(batch.results[0].outcome.result, ScanResult::Valid);
        assert_eq!(batch.results[1].outcome.reason, Reason::QrNotFound);
        assert!(batch.results[1].outcome.attendance.is_none());
        assert_eq!(batch.results[2].outcome.result, ScanResult::Valid);

        assert_eq!(store.attendances(ticket_id).len(), 1);
        assert_eq!(store.attendances(other_ticket).len(), 1);
        assert_eq!(batch.summary.valid, 2);
        assert_eq!(batch.summary.errors, 1);
    }

    #[tokio::test]
    async fn sync_path_marks_every_attendance_offline() {
        let (engine, store, ctx, _, ticket_id) = setup(CheckinPolicy::Multiple);

        let mut scan = request("qr-1", at(0));
        scan.offline = Some(false);
        engine.process_batch(&ctx, &[scan], true).await;

        let attendances = store.attendances(ticket_id);
        assert!(attendances[0].offline);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_scans_of_one_ticket_are_serialized() {
        let (engine, store, ctx, _, ticket_id) = setup(CheckinPolicy::Single);
        let barrier = Arc::new(tokio::sync::Barrier::new(2));

        let mut handles = Vec::new();
        for device in ["device-a", "device-b"] {
            let engine = engine.clone();
            let barrier = barrier.clone();
            let mut scan = request("qr-1", at(0));
            scan.device_id = Some(device.to_string());
            handles.push(tokio::spawn(async move {
                barrier.wait().await;
                engine.process_scan(&ctx, &scan).await.unwrap()
            }));
        }

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap().result);
        }
        results.sort_by_key(|r| r.as_str());

        assert_eq!(results, vec![ScanResult::Duplicate, ScanResult::Valid]);
        assert_eq!(store.attendances(ticket_id).len(), 2);
        assert_eq!(store.ticket(ticket_id).unwrap().status, TicketStatus::Used);
    }
}
