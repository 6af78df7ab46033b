// gateway-server/src/handlers/logs.rs
// ============================================================================
// Module: Execution Log Handlers
// Description: GET /execution-logs, GET /execution-logs/{traceId}/timeline
// Dependencies: axum, gateway-core
// ============================================================================

use axum::Json;
use axum::extract::Path;
use axum::extract::Query;
use axum::extract::State;
use gateway_contract::ExecutionLogListResponse;
use gateway_contract::ExecutionLogTimelineResponse;
use gateway_core::core::TraceId;
use serde::Deserialize;

use crate::error::ServerError;
use crate::state::AppState;

const DEFAULT_LIST_LIMIT: usize = 100;

/// Query parameters accepted on `GET /execution-logs`.
#[derive(Debug, Deserialize, Default)]
pub struct LogListQuery {
    /// Max logs to return, most recent first.
    pub limit: Option<usize>,
}

/// Lists the most recent execution logs.
pub async fn list(State(state): State<AppState>, Query(query): Query<LogListQuery>) -> Result<Json<ExecutionLogListResponse>, ServerError> {
    let logs = state.log_store.list_recent(query.limit.unwrap_or(DEFAULT_LIST_LIMIT)).await?;
    Ok(Json(ExecutionLogListResponse { logs }))
}

/// Returns one log's step-by-step timeline.
pub async fn timeline(State(state): State<AppState>, Path(trace_id): Path<String>) -> Result<Json<ExecutionLogTimelineResponse>, ServerError> {
    let log = state.log_store.get(&TraceId::new(trace_id.clone())).await?.ok_or_else(|| ServerError::NotFound(format!("execution log {trace_id}")))?;
    Ok(Json(ExecutionLogTimelineResponse { trace_id, steps: log.steps }))
}
