use anyhow::Result;
use colored::Colorize;
use flexylog::{config, init_tracing, server};
use std::path::Path;
use tracing::info;

/// Execute the serve command
///
/// Loads configuration, initializes tracing from it and runs the server
/// until a shutdown signal arrives.
pub async fn execute(config_path: Option<&Path>) -> Result<()> {
    let cfg = config::load_config(config_path)?;

    init_tracing(&cfg.server.log_level, cfg.server.log_format == "json");

    println!(
        "{}",
        format!("Starting Flexylog on {}:{}...", cfg.server.host, cfg.server.port).green()
    );
    info!(log_format = %cfg.server.log_format, "Configuration loaded");

    server::start_server(cfg).await
}
