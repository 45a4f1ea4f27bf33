//! HTTP request logging
//!
//! This module provides:
//! - The log entry model and its two-phase construction
//! - An axum middleware that records every request/response pair
//! - Two independent sinks: a SQLite store and local JSON day-files
//! - Background writers that keep persistence off the response path
//! - Aggregate statistics and scheduled retention sweeps

pub mod client_ip;
pub mod entry;
pub mod file_sink;
pub mod interceptor;
pub mod retention;
pub mod stats;
pub mod store;
pub mod writer;

pub use entry::{HttpMethod, LogEntry, PendingLogEntry};
pub use file_sink::{DayFileRecord, FileSink, FileSinkError};
pub use interceptor::{log_requests, Interceptor, RequestLogged, ResponseCapture, ResponseError};
pub use retention::{run_retention_now, spawn_retention_task, RetentionStats};
pub use stats::{compute_stats, LogStats, UrlCount};
pub use store::{LogFilter, LogStore, SqliteLogStore};
pub use writer::{LogDispatcher, WriterTasks};
