//! HTTP handlers
//!
//! - `index`: banner, health and echo endpoints
//! - `logs_api`: listing and filtering of recorded requests
//! - `logger_api`: statistics, retention purge and manual inserts
//! - `metrics_handler`: Prometheus exposition

pub mod index;
pub mod logger_api;
pub mod logs_api;
pub mod metrics_handler;

use crate::error::AppError;
use crate::request_log::{FileSink, HttpMethod, LogDispatcher, LogStore};
use axum::extract::FromRef;
use metrics_exporter_prometheus::PrometheusHandle;
use std::str::FromStr;
use std::sync::Arc;

/// Shared state for all handlers
#[derive(Clone, FromRef)]
pub struct AppState {
    pub store: Arc<dyn LogStore>,
    pub file_sink: FileSink,
    pub dispatcher: LogDispatcher,
    pub metrics: Arc<PrometheusHandle>,
    /// Body capture limit for manual inserts
    #[from_ref(skip)]
    pub max_body_bytes: usize,
}

/// Parse a numeric query value, falling back to `default` when it is missing
/// or unparseable
pub(crate) fn parse_or<T: FromStr>(value: Option<&str>, default: T) -> T {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

/// Parse an optional `method` filter; blank counts as absent
pub(crate) fn parse_method(value: Option<&str>) -> Result<Option<HttpMethod>, AppError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) => Ok(Some(v.parse()?)),
        None => Ok(None),
    }
}
