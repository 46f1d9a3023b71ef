use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::scan::{BatchItemOutcome, BatchSummary, ScanContext, ScanRequest};
use crate::utils::error::AppError;
use crate::utils::response::{multi_status, success};

use super::AppState;

#[derive(Debug, Deserialize)]
pub struct BatchScanRequest {
    pub scans: Vec<ScanRequest>,
}

#[derive(Serialize)]
struct BatchBody {
    results: Vec<BatchItemOutcome>,
    meta: BatchMeta,
}

#[derive(Serialize)]
struct BatchMeta {
    summary: BatchSummary,
}

/// Single online scan. Note there is deliberately no payload-level dedup
/// here: an identical replay writes a second attendance recording the same
/// result, and only the batch/sync paths suppress retries.
pub async fn scan_ticket(
    State(state): State<AppState>,
    ctx: ScanContext,
    Json(request): Json<ScanRequest>,
) -> Result<Response, AppError> {
    validate_code(&request)?;

    let outcome = state.engine.process_scan(&ctx, &request).await?;
    let message = outcome.message.to_string();
    Ok(success(outcome, message).into_response())
}

/// Online batch: multi-status, one entry per submitted item.
pub async fn scan_batch(
    State(state): State<AppState>,
    ctx: ScanContext,
    Json(request): Json<BatchScanRequest>,
) -> Result<Response, AppError> {
    run_batch(state, ctx, request, false).await
}

/// Offline queue sync: same shape as batch with `offline` forced per item.
pub async fn scan_sync(
    State(state): State<AppState>,
    ctx: ScanContext,
    Json(request): Json<BatchScanRequest>,
) -> Result<Response, AppError> {
    run_batch(state, ctx, request, true).await
}

async fn run_batch(
    state: AppState,
    ctx: ScanContext,
    request: BatchScanRequest,
    force_offline: bool,
) -> Result<Response, AppError> {
    // Only an empty submission is rejected outright; a malformed member is
    // reported in its own slot so siblings still finalize.
    if request.scans.is_empty() {
        return Err(AppError::ValidationError(
            "scans must contain at least one item".to_string(),
        ));
    }

    let batch = state
        .engine
        .process_batch(&ctx, &request.scans, force_offline)
        .await;

    Ok(multi_status(BatchBody {
        results: batch.results,
        meta: BatchMeta {
            summary: batch.summary,
        },
    })
    .into_response())
}

fn validate_code(scan: &ScanRequest) -> Result<(), AppError> {
    if scan.qr_code.trim().is_empty() {
        return Err(AppError::ValidationError(
            "qr_code must not be empty".to_string(),
        ));
    }
    Ok(())
}
