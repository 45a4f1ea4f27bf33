//! Stats command implementation
//!
//! Prints the same aggregates as `GET /logger/stats`, computed directly
//! against the log store.

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use flexylog::config;
use flexylog::request_log::{compute_stats, HttpMethod, LogFilter, LogStats, LogStore};
use std::path::Path;

#[derive(Debug, Clone, Parser)]
pub struct StatsArgs {
    /// Only count requests with this HTTP method
    #[arg(short, long)]
    pub method: Option<String>,

    /// Only count requests with this status code
    #[arg(short, long)]
    pub status_code: Option<u16>,

    /// Print raw JSON
    #[arg(long)]
    pub json: bool,
}

/// Execute the stats command
pub async fn execute(config_path: Option<&Path>, args: StatsArgs) -> Result<()> {
    let cfg = config::load_config(config_path)?;
    let store = super::open_store(&cfg).await?;

    let filter = LogFilter {
        method: args
            .method
            .as_deref()
            .map(str::parse::<HttpMethod>)
            .transpose()?,
        status_code: args.status_code,
        limit: None,
    };

    let stats = compute_stats(&store.query(&filter).await?);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        display_stats(&stats);
    }

    Ok(())
}

fn display_stats(stats: &LogStats) {
    println!("{}", "Request Statistics".green().bold());
    println!();
    println!("  Total requests:        {}", stats.total_requests.to_string().bold());
    println!("  Average response time: {}ms", stats.average_response_time);

    if !stats.method_counts.is_empty() {
        println!();
        println!("{}", "By method:".bold());
        for (method, count) in &stats.method_counts {
            println!("  {:<8} {}", method.to_string().cyan(), count);
        }
    }

    if !stats.status_code_counts.is_empty() {
        println!();
        println!("{}", "By status code:".bold());
        for (status, count) in &stats.status_code_counts {
            println!("  {:<8} {}", status, count);
        }
    }

    if !stats.top_urls.is_empty() {
        println!();
        println!("{}", "Top URLs:".bold());
        for (rank, url) in stats.top_urls.iter().enumerate() {
            println!("  {:>2}. {:>6}  {}", rank + 1, url.count, url.url);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_args_parsing() {
        let args = StatsArgs::parse_from(["stats", "--method", "post", "--json"]);
        assert_eq!(args.method.as_deref(), Some("post"));
        assert!(args.status_code.is_none());
        assert!(args.json);
    }
}
