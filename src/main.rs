use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;

use flexylog::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    // .env is optional
    dotenvy::dotenv().ok();

    let args = cli::Cli::parse();
    let config_path = args.config.as_deref();

    // serve initializes tracing itself, from the loaded configuration
    let command = args.get_command();
    if !matches!(command, cli::Commands::Serve) {
        init_tracing("warn", false);
    }

    match command {
        cli::Commands::Serve => {
            commands::serve::execute(config_path).await?;
        }
        cli::Commands::Logs(logs_args) => {
            commands::logs::execute(config_path, logs_args).await?;
        }
        cli::Commands::Stats(stats_args) => {
            commands::stats::execute(config_path, stats_args).await?;
        }
        cli::Commands::Purge { days } => {
            commands::purge::execute(config_path, days).await?;
        }
        cli::Commands::Config { action } => match action {
            cli::ConfigCommands::Show => commands::config::show(config_path)?,
            cli::ConfigCommands::Validate => commands::config::validate(config_path)?,
        },
        cli::Commands::Version => {
            println!("Flexylog v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
