//! The scan / check-in engine.
//!
//! A scan enters as a single request or a batch, is resolved to a ticket
//! through its active QR credential, decided by the pure resolver rule
//! table, and committed by a store-backed finalizer that serializes
//! concurrent scans of the same ticket.

pub mod audit;
pub mod batch;
pub mod context;
pub mod engine;
pub mod finalizer;
pub mod resolver;
pub mod store;

pub use audit::{AuditSink, TracingAuditSink};
pub use batch::BatchSummary;
pub use context::{ScanContext, ScanInput, ScanRequest};
pub use engine::{BatchItemOutcome, BatchOutcome, ScanEngine, ScanOutcome};
pub use finalizer::{FinalizedScan, StagedScan};
pub use resolver::{Decision, Reason, TicketView};
pub use store::{MemoryScanStore, PgScanStore, ScanStore, ScanStoreError, TicketRef};
