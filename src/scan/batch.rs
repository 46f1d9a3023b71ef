//! Batch bookkeeping: payload-identity dedup keys and aggregate counters.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::models::ScanResult;

use super::context::ScanRequest;

/// Identity of one physical scan as submitted. Two items in the same batch
/// with an equal key are retried sends of the same real-world scan, not two
/// scans.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PayloadKey {
    qr_code: String,
    checkpoint_id: Option<Uuid>,
    device_id: Option<String>,
    scanned_at: DateTime<Utc>,
}

impl From<&ScanRequest> for PayloadKey {
    fn from(scan: &ScanRequest) -> Self {
        Self {
            qr_code: scan.qr_code.clone(),
            checkpoint_id: scan.checkpoint_id,
            device_id: scan.device_id.clone(),
            scanned_at: scan.scanned_at,
        }
    }
}

/// Aggregate counters for a batch response. `errors` counts every outcome
/// that is neither `valid` nor `duplicate`, ignored and not-found included;
/// `processed_scans` excludes only payload-deduplicated items.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub total_scans: usize,
    pub processed_scans: usize,
    pub valid: usize,
    pub duplicate: usize,
    pub deduplicated: usize,
    pub errors: usize,
}

impl BatchSummary {
    pub fn tally(&mut self, result: ScanResult) {
        self.total_scans += 1;
        match result {
            ScanResult::Valid => {
                self.processed_scans += 1;
                self.valid += 1;
            }
            ScanResult::Duplicate => {
                self.processed_scans += 1;
                self.duplicate += 1;
            }
            ScanResult::Ignored => {
                self.deduplicated += 1;
                self.errors += 1;
            }
            ScanResult::Invalid | ScanResult::Revoked | ScanResult::Expired => {
                self.processed_scans += 1;
                self.errors += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn request(code: &str, at: DateTime<Utc>) -> ScanRequest {
        ScanRequest {
            qr_code: code.to_string(),
            checkpoint_id: None,
            device_id: Some("d1".to_string()),
            scanned_at: at,
            offline: None,
            event_id: None,
        }
    }

    #[test]
    fn identical_payloads_share_a_key() {
        let at = Utc.with_ymd_and_hms(2025, 6, 1, 20, 0, 0).unwrap();
        assert_eq!(
            PayloadKey::from(&request("qr", at)),
            PayloadKey::from(&request("qr", at))
        );
    }

    #[test]
    fn later_timestamp_is_a_different_payload() {
        let at = Utc.with_ymd_and_hms(2025, 6, 1, 20, 0, 0).unwrap();
        let later = at + chrono::Duration::seconds(30);
        assert_ne!(
            PayloadKey::from(&request("qr", at)),
            PayloadKey::from(&request("qr", later))
        );
    }

    #[test]
    fn summary_counts_follow_the_taxonomy() {
        let mut summary = BatchSummary::default();
        summary.tally(ScanResult::Valid);
        summary.tally(ScanResult::Duplicate);
        summary.tally(ScanResult::Ignored);
        summary.tally(ScanResult::Invalid);
        summary.tally(ScanResult::Expired);

        assert_eq!(summary.total_scans, 5);
        assert_eq!(summary.processed_scans, 4);
        assert_eq!(summary.valid, 1);
        assert_eq!(summary.duplicate, 1);
        assert_eq!(summary.deduplicated, 1);
        assert_eq!(summary.errors, 3);
    }
}
