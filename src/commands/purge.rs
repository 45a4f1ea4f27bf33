use anyhow::Result;
use colored::Colorize;
use flexylog::config;
use flexylog::request_log::{run_retention_now, FileSink};
use std::path::Path;
use tracing::info;

/// Execute the purge command
///
/// `days` overrides both the store and the day-file retention windows.
pub async fn execute(config_path: Option<&Path>, days: Option<u32>) -> Result<()> {
    let cfg = config::load_config(config_path)?;

    let mut retention = cfg.retention.clone();
    if let Some(days) = days {
        retention.store_days = days;
        retention.file_days = days;
    }

    println!(
        "{}",
        format!(
            "Purging entries older than {} days and day-files older than {} days...",
            retention.store_days, retention.file_days
        )
        .yellow()
    );
    info!("Running manual retention sweep");

    let store = super::open_store(&cfg).await?;
    let file_sink = FileSink::new(&cfg.file_sink.directory);
    let stats = run_retention_now(&store, &file_sink, &retention).await?;

    println!("{}", "✓ Purge completed".green());
    println!("  Entries deleted:   {}", stats.entries_deleted);
    println!("  Day-files removed: {}", stats.files_removed);

    Ok(())
}
