use super::logs_api::FilterParams;
use super::{parse_or, AppState};
use crate::error::AppError;
use crate::request_log::interceptor::capture_request;
use crate::request_log::{compute_stats, HttpMethod, LogStats, LogStore};
use axum::extract::{Query, Request, State};
use axum::response::Json;
use chrono::SecondsFormat;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;

const DEFAULT_RETENTION_DAYS: u32 = 30;

#[derive(Debug, Default, Deserialize)]
pub struct ClearParams {
    pub days: Option<String>,
}

/// GET /logger/stats - aggregates over all (or filtered) entries
///
/// Example: GET /logger/stats?method=GET
pub async fn get_stats(
    State(store): State<Arc<dyn LogStore>>,
    Query(params): Query<FilterParams>,
) -> Result<Json<LogStats>, AppError> {
    let filter = params.to_filter()?;
    let logs = store.query(&filter).await?;

    Ok(Json(compute_stats(&logs)))
}

/// DELETE /logger/clear - purge entries older than `days` (default 30)
pub async fn clear_logs(
    State(store): State<Arc<dyn LogStore>>,
    Query(params): Query<ClearParams>,
) -> Result<Json<Value>, AppError> {
    let days = parse_or(params.days.as_deref(), DEFAULT_RETENTION_DAYS);
    let deleted = store.purge(days).await?;

    tracing::info!(days = days, deleted = deleted, "Cleared old logs on request");

    Ok(Json(json!({
        "message": format!("Logs older than {} days have been cleared", days),
    })))
}

/// ANY /logger/log - store an entry describing this request
///
/// The store write is awaited so a failure is reported to the caller; the
/// day-file write goes through the dispatcher.
pub async fn manual_log(
    State(state): State<AppState>,
    request: Request,
) -> Result<Json<Value>, AppError> {
    let started = Instant::now();

    let method = HttpMethod::try_from(request.method())
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let (pending, request) = capture_request(method, request, state.max_body_bytes).await;
    request.map_err(|e| AppError::BadRequest(format!("Failed to read request body: {}", e)))?;

    let elapsed = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    let entry = pending.finish(200, elapsed);

    state.store.save(&entry).await?;
    state.dispatcher.dispatch_to_file(entry.clone());

    Ok(Json(json!({
        "logged": true,
        "time": entry.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
        "id": entry.id,
    })))
}
