//! Scheduled retention sweeps
//!
//! Once a day, at the configured local hour, entries older than
//! `store_days` are purged from the store and day-files older than
//! `file_days` are removed.

use super::file_sink::FileSink;
use super::store::LogStore;
use crate::config::RetentionConfig;
use anyhow::Result;
use chrono::{Datelike, Timelike};
use std::sync::Arc;
use std::time::Duration;
use tokio::time;

/// How often the loop checks whether it is cleanup time
const CHECK_INTERVAL: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetentionStats {
    pub entries_deleted: u64,
    pub files_removed: usize,
}

/// Spawn the daily retention task
///
/// # Example
///
/// ```ignore
/// if config.retention.enabled {
///     spawn_retention_task(store.clone(), file_sink.clone(), config.retention.clone());
/// }
/// ```
pub fn spawn_retention_task(
    store: Arc<dyn LogStore>,
    file_sink: FileSink,
    config: RetentionConfig,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        retention_loop(store, file_sink, config).await;
    })
}

async fn retention_loop(store: Arc<dyn LogStore>, file_sink: FileSink, config: RetentionConfig) {
    let mut interval = time::interval(CHECK_INTERVAL);
    let mut last_run_day: Option<u32> = None;

    loop {
        interval.tick().await;

        let now = chrono::Local::now();
        let current_day = now.ordinal();

        if now.hour() != config.cleanup_hour || Some(current_day) == last_run_day {
            continue;
        }

        tracing::info!(cleanup_hour = config.cleanup_hour, "Starting scheduled retention sweep");

        match run_retention_now(store.as_ref(), &file_sink, &config).await {
            Ok(_) => last_run_day = Some(current_day),
            Err(e) => tracing::error!(error = %format!("{:#}", e), "Retention sweep failed"),
        }
    }
}

/// Run one retention sweep immediately
///
/// The store purge and the day-file prune are independent. A failing prune
/// is logged and counted as zero; a failing purge is returned only after the
/// prune has run.
pub async fn run_retention_now(
    store: &dyn LogStore,
    file_sink: &FileSink,
    config: &RetentionConfig,
) -> Result<RetentionStats> {
    let purged = store.purge(config.store_days).await;

    let files_removed = match file_sink.prune_older_than(config.file_days).await {
        Ok(removed) => removed,
        Err(e) => {
            tracing::error!(error = %e, "Failed to prune day-files");
            0
        }
    };

    let entries_deleted = match purged {
        Ok(deleted) => deleted,
        Err(e) => {
            tracing::error!(
                error = %format!("{:#}", e),
                files_removed = files_removed,
                "Failed to purge the log store"
            );
            return Err(e);
        }
    };

    tracing::info!(
        entries_deleted = entries_deleted,
        files_removed = files_removed,
        "Retention sweep completed"
    );

    Ok(RetentionStats {
        entries_deleted,
        files_removed,
    })
}
