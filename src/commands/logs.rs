//! Logs query command
//!
//! Query and display recorded requests from the log store, or from the local
//! day-files with `--local`.

use anyhow::Result;
use clap::Parser;
use colored::{ColoredString, Colorize};
use flexylog::config;
use flexylog::request_log::{FileSink, HttpMethod, LogEntry, LogFilter, LogStore};
use std::path::Path;

/// Query and display recorded requests
#[derive(Debug, Clone, Parser)]
pub struct LogsArgs {
    /// Filter by HTTP method (case-insensitive)
    #[arg(short, long)]
    pub method: Option<String>,

    /// Filter by response status code
    #[arg(short, long)]
    pub status_code: Option<u16>,

    /// Maximum number of results
    #[arg(short, long, default_value = "20")]
    pub limit: usize,

    /// Read the last N day-files instead of the store
    #[arg(long, value_name = "DAYS")]
    pub local: Option<u32>,

    /// Print raw JSON
    #[arg(long)]
    pub json: bool,
}

/// Execute the logs command
pub async fn execute(config_path: Option<&Path>, args: LogsArgs) -> Result<()> {
    let cfg = config::load_config(config_path)?;

    let method = args
        .method
        .as_deref()
        .map(str::parse::<HttpMethod>)
        .transpose()?;

    let filter = LogFilter {
        method,
        status_code: args.status_code,
        limit: Some(args.limit),
    };

    let logs: Vec<LogEntry> = match args.local {
        Some(days) => FileSink::new(&cfg.file_sink.directory)
            .read_recent(days)
            .await
            .into_iter()
            .map(|record| record.entry)
            .filter(|entry| filter.matches(entry))
            .take(args.limit)
            .collect(),
        None => super::open_store(&cfg).await?.query(&filter).await?,
    };

    if logs.is_empty() {
        println!("{}", "No requests found matching the criteria".yellow());
        return Ok(());
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&logs)?);
    } else {
        display_logs_text(&logs);
    }

    Ok(())
}

/// Display entries in human-friendly text format
fn display_logs_text(logs: &[LogEntry]) {
    println!("{}", format!("Found {} requests", logs.len()).bold());
    println!();

    for log in logs {
        let timestamp = log.timestamp.format("%Y-%m-%d %H:%M:%S%.3f");
        let status = log
            .status_code
            .map(colorize_status)
            .unwrap_or_else(|| "---".normal());
        let response_time = log
            .response_time
            .map(|ms| format!("{}ms", ms))
            .unwrap_or_default();

        println!(
            "{} {} {:<7} {} {} {}",
            timestamp.to_string().dimmed(),
            status,
            log.method.to_string().cyan(),
            log.url,
            format!("from {}", log.source_ip).dimmed(),
            response_time.dimmed()
        );

        if let Some(error) = &log.error {
            println!("  {}", format!("error: {}", error).red());
        }
    }
}

fn colorize_status(status: u16) -> ColoredString {
    let text = status.to_string();
    match status {
        500..=599 => text.red().bold(),
        400..=499 => text.yellow(),
        300..=399 => text.blue(),
        _ => text.green(),
    }
}
