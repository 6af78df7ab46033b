// gateway-server/src/handlers/dlq.rs
// ============================================================================
// Module: DLQ Control Handlers
// Description: GET/POST/DELETE under /dlq — spec.md §6 DLQ surface.
// Dependencies: axum, gateway-core, gateway-delivery
// ============================================================================

use axum::Json;
use axum::extract::Path;
use axum::extract::Query;
use axum::extract::State;
use gateway_contract::DlqActionRequest;
use gateway_contract::DlqListResponse;
use gateway_contract::DlqRetryResponse;
use gateway_contract::DlqStatsResponse;
use gateway_core::core::DlqId;
use gateway_core::core::DlqStatus;
use gateway_delivery::DeliveryOutcome;
use serde::Deserialize;

use crate::error::ServerError;
use crate::state::AppState;

/// `limit` listings default to, absent an explicit query parameter.
const DEFAULT_LIST_LIMIT: usize = 100;
/// Upper bound on how many entries `/dlq/stats` scans to build its tally.
const STATS_SCAN_LIMIT: usize = 10_000;

/// Query parameters accepted on `GET /dlq`.
#[derive(Debug, Deserialize, Default)]
pub struct DlqListQuery {
    /// Max entries to return.
    pub limit: Option<usize>,
}

async fn load_entry(state: &AppState, dlq_id: &str) -> Result<gateway_core::core::DLQEntry, ServerError> {
    state.dlq_store.get(&DlqId::new(dlq_id)).await?.ok_or_else(|| ServerError::NotFound(format!("dlq entry {dlq_id}")))
}

/// Lists DLQ entries, most recently upserted first, bounded by `?limit=`.
pub async fn list(State(state): State<AppState>, Query(query): Query<DlqListQuery>) -> Result<Json<DlqListResponse>, ServerError> {
    let entries = state.dlq_store.list(query.limit.unwrap_or(DEFAULT_LIST_LIMIT)).await?;
    Ok(Json(DlqListResponse { entries }))
}

/// Fetches one DLQ entry by id.
pub async fn get(State(state): State<AppState>, Path(dlq_id): Path<String>) -> Result<Json<gateway_core::core::DLQEntry>, ServerError> {
    Ok(Json(load_entry(&state, &dlq_id).await?))
}

/// Tallies DLQ entries by status across up to [`STATS_SCAN_LIMIT`] entries.
pub async fn stats(State(state): State<AppState>) -> Result<Json<DlqStatsResponse>, ServerError> {
    let entries = state.dlq_store.list(STATS_SCAN_LIMIT).await?;
    let mut tally = DlqStatsResponse::default();
    for entry in &entries {
        match entry.status {
            DlqStatus::Pending => tally.pending += 1,
            DlqStatus::Retrying => tally.retrying += 1,
            DlqStatus::Resolved => tally.resolved += 1,
            DlqStatus::Abandoned => tally.abandoned += 1,
        }
    }
    Ok(Json(tally))
}

/// Re-runs a DLQ entry's delivery attempt. `DeliveryEngine::redeliver` owns
/// every state transition the attempt produces (resolve on success, a fresh
/// backoff or abandonment on failure); this handler only reports the outcome.
pub async fn retry(State(state): State<AppState>, Path(dlq_id): Path<String>, Json(_body): Json<DlqActionRequest>) -> Result<Json<DlqRetryResponse>, ServerError> {
    let entry = load_entry(&state, &dlq_id).await?;
    let integration =
        state.config_store.get_by_id(&entry.integration_id).await?.ok_or_else(|| ServerError::NotFound(format!("integration {}", entry.integration_id)))?;
    let outcome = state.engine.redeliver(&entry, &integration).await?;
    let outcome = match outcome {
        DeliveryOutcome::Success => "success",
        DeliveryOutcome::Retried => "retried",
        DeliveryOutcome::Failed => "failed",
    };
    Ok(Json(DlqRetryResponse { outcome: outcome.to_string() }))
}

/// Manually abandons a DLQ entry; does not attempt redelivery.
pub async fn abandon(State(state): State<AppState>, Path(dlq_id): Path<String>, Json(body): Json<DlqActionRequest>) -> Result<Json<gateway_core::core::DLQEntry>, ServerError> {
    let mut entry = load_entry(&state, &dlq_id).await?;
    entry.abandon(body.by, body.notes)?;
    state.dlq_store.upsert(&entry).await?;
    Ok(Json(entry))
}

/// Deletes a DLQ entry outright.
pub async fn delete(State(state): State<AppState>, Path(dlq_id): Path<String>) -> Result<axum::http::StatusCode, ServerError> {
    state.dlq_store.delete(&DlqId::new(dlq_id)).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}
