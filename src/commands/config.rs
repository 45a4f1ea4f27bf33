use anyhow::Result;
use colored::Colorize;
use flexylog::config::{self, Config};
use std::path::Path;
use tracing::info;

/// Execute the config show command
///
/// Displays the effective configuration after file and environment overrides
pub fn show(config_path: Option<&Path>) -> Result<()> {
    println!("{}", "Loading configuration...".yellow());

    let cfg = config::load_config(config_path)?;
    let sanitized = sanitize_secrets(&cfg);

    println!("{}", "Current Configuration:".green().bold());
    println!();
    println!("{}", toml::to_string_pretty(&sanitized)?);

    info!("Configuration displayed successfully");
    Ok(())
}

/// Execute the config validate command
pub fn validate(config_path: Option<&Path>) -> Result<()> {
    println!("{}", "Validating configuration...".yellow());

    let cfg = config::load_config(config_path)?;

    println!("{}", "✓ Configuration is valid".green());
    println!();
    println!("{}", "Summary:".bold());
    println!("  Listen:       {}:{}", cfg.server.host, cfg.server.port);
    println!("  Store:        {}", mask_database_url(&cfg.store.database_url));
    println!("  Day-files:    {}", cfg.file_sink.directory);
    println!(
        "  Retention:    {}",
        if cfg.retention.enabled {
            format!(
                "store {}d, files {}d, daily at {:02}:00",
                cfg.retention.store_days, cfg.retention.file_days, cfg.retention.cleanup_hour
            )
        } else {
            "disabled".to_string()
        }
    );
    println!("  Skip paths:   {}", cfg.interceptor.skip_paths.len());

    Ok(())
}

fn sanitize_secrets(cfg: &Config) -> Config {
    let mut sanitized = cfg.clone();
    sanitized.store.database_url = mask_database_url(&sanitized.store.database_url);
    sanitized
}

/// Hide URL query options such as `?password=...`
fn mask_database_url(url: &str) -> String {
    match url.split_once('?') {
        Some((base, _)) => format!("{}?***", base),
        None => url.to_string(),
    }
}
