//! Read-side endpoints over recorded requests
//!
//! Numeric query values are coerced best-effort: a missing or unparseable
//! `limit`/`days` falls back to its default and an unparseable `statusCode`
//! is ignored. An unknown `method` is rejected.

use super::{parse_method, parse_or};
use crate::error::AppError;
use crate::request_log::{DayFileRecord, FileSink, LogEntry, LogFilter, LogStore};
use axum::extract::{Query, State};
use axum::response::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const DEFAULT_LIMIT: usize = 100;
const DEFAULT_LOCAL_DAYS: u32 = 1;
/// Upper bound on the day window of `/logs/local`
const MAX_LOCAL_DAYS: u32 = 366;

/// Query parameters for `GET /logs`
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    /// Maximum number of results (default 100, 0 for no limit)
    pub limit: Option<String>,
    pub method: Option<String>,
}

/// Query parameters for `GET /logs/local`
#[derive(Debug, Default, Deserialize)]
pub struct LocalParams {
    pub days: Option<String>,
}

/// Query parameters for `GET /logs/filter` and `GET /logger/stats`
#[derive(Debug, Default, Deserialize)]
pub struct FilterParams {
    pub method: Option<String>,
    #[serde(rename = "statusCode")]
    pub status_code: Option<String>,
}

impl FilterParams {
    pub fn to_filter(&self) -> Result<LogFilter, AppError> {
        Ok(LogFilter {
            method: parse_method(self.method.as_deref())?,
            status_code: self
                .status_code
                .as_deref()
                .and_then(|v| v.trim().parse().ok()),
            limit: None,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct LogsResponse<T> {
    pub total: usize,
    pub logs: Vec<T>,
}

#[derive(Debug, Serialize)]
pub struct FilteredLogsResponse {
    pub total: usize,
    pub filters: LogFilter,
    pub logs: Vec<LogEntry>,
}

/// GET /logs - newest entries from the store
///
/// Example: GET /logs?limit=10&method=post
pub async fn list_logs(
    State(store): State<Arc<dyn LogStore>>,
    Query(params): Query<ListParams>,
) -> Result<Json<LogsResponse<LogEntry>>, AppError> {
    let limit = parse_or(params.limit.as_deref(), DEFAULT_LIMIT);
    let filter = LogFilter {
        method: parse_method(params.method.as_deref())?,
        status_code: None,
        limit: (limit > 0).then_some(limit),
    };

    let logs = store.query(&filter).await?;

    Ok(Json(LogsResponse {
        total: logs.len(),
        logs,
    }))
}

/// GET /logs/local - records from the last `days` day-files
///
/// Example: GET /logs/local?days=7
pub async fn list_local_logs(
    State(file_sink): State<FileSink>,
    Query(params): Query<LocalParams>,
) -> Json<LogsResponse<DayFileRecord>> {
    let days = parse_or(params.days.as_deref(), DEFAULT_LOCAL_DAYS).min(MAX_LOCAL_DAYS);
    let logs = file_sink.read_recent(days).await;

    Json(LogsResponse {
        total: logs.len(),
        logs,
    })
}

/// GET /logs/filter - exact-match filter on method and/or status code
///
/// Example: GET /logs/filter?method=get&statusCode=404
pub async fn filter_logs(
    State(store): State<Arc<dyn LogStore>>,
    Query(params): Query<FilterParams>,
) -> Result<Json<FilteredLogsResponse>, AppError> {
    let filter = params.to_filter()?;
    let logs = store.query(&filter).await?;

    Ok(Json(FilteredLogsResponse {
        total: logs.len(),
        filters: filter,
        logs,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request_log::{HttpMethod, PendingLogEntry, SqliteLogStore};

    async fn seeded_store() -> Arc<dyn LogStore> {
        let store = SqliteLogStore::connect("sqlite::memory:", 1).await.unwrap();
        for (method, status) in [
            (HttpMethod::Get, 200),
            (HttpMethod::Post, 201),
            (HttpMethod::Get, 404),
            (HttpMethod::Post, 201),
        ] {
            store
                .save(&PendingLogEntry::new(method, "/x", "Unknown").finish(status, 1))
                .await
                .unwrap();
        }
        Arc::new(store)
    }

    #[tokio::test]
    async fn test_list_logs_limit_and_method() {
        let store = seeded_store().await;

        let Json(response) = list_logs(
            State(store.clone()),
            Query(ListParams {
                limit: Some("1".to_string()),
                method: Some("post".to_string()),
            }),
        )
        .await
        .unwrap();
        assert_eq!(response.total, 1);
        assert_eq!(response.logs[0].method, HttpMethod::Post);

        let Json(response) = list_logs(
            State(store),
            Query(ListParams {
                limit: Some("lots".to_string()),
                method: None,
            }),
        )
        .await
        .unwrap();
        assert_eq!(response.total, 4);
    }

    #[tokio::test]
    async fn test_list_logs_rejects_unknown_method() {
        let store = seeded_store().await;
        let result = list_logs(
            State(store),
            Query(ListParams {
                limit: None,
                method: Some("BREW".to_string()),
            }),
        )
        .await;

        assert!(matches!(result, Err(AppError::InvalidFilter(_))));
    }

    #[test]
    fn test_filter_params_ignore_bad_status_code() {
        let params = FilterParams {
            method: Some("get".to_string()),
            status_code: Some("two hundred".to_string()),
        };
        let filter = params.to_filter().unwrap();

        assert_eq!(filter.method, Some(HttpMethod::Get));
        assert_eq!(filter.status_code, None);
        assert_eq!(
            serde_json::to_value(&filter).unwrap(),
            serde_json::json!({"method": "GET"})
        );
    }

    #[tokio::test]
    async fn test_list_local_logs_defaults_to_today() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::new(dir.path());
        sink.append(&PendingLogEntry::new(HttpMethod::Get, "/today", "Unknown").finish(200, 1))
            .await
            .unwrap();

        let Json(response) =
            list_local_logs(State(sink), Query(LocalParams { days: Some("x".into()) })).await;
        assert_eq!(response.total, 1);
        assert_eq!(response.logs[0].entry.url, "/today");
    }
}
