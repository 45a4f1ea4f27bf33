use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "flexylog", version, about = "HTTP request logging service")]
pub struct Cli {
    /// Configuration file path (defaults to ./config.toml when present)
    #[arg(short, long, global = true, env = "FLEXYLOG_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start the logging server (default)
    Serve,

    /// Show recorded requests from the log store
    Logs(crate::commands::logs::LogsArgs),

    /// Show aggregate statistics over recorded requests
    Stats(crate::commands::stats::StatsArgs),

    /// Delete entries and day-files older than the retention window
    Purge {
        /// Age threshold in days (defaults to the configured retention)
        #[arg(short, long)]
        days: Option<u32>,
    },

    /// Configuration management commands
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },

    /// Show version information
    Version,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigCommands {
    /// Display the effective configuration
    Show,

    /// Validate the configuration
    Validate,
}

impl Cli {
    /// Get the command to execute, defaulting to Serve if none provided
    pub fn get_command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Serve)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_command_is_serve() {
        let cli = Cli::try_parse_from(["flexylog"]).unwrap();
        assert!(matches!(cli.get_command(), Commands::Serve));
    }

    #[test]
    fn test_cli_parsing_purge() {
        let cli = Cli::try_parse_from(["flexylog", "purge", "--days", "7"]).unwrap();

        match cli.get_command() {
            Commands::Purge { days } => assert_eq!(days, Some(7)),
            _ => panic!("Expected Purge command"),
        }
    }

    #[test]
    fn test_cli_parsing_logs_with_global_config() {
        let cli = Cli::try_parse_from([
            "flexylog",
            "logs",
            "--method",
            "post",
            "--limit",
            "5",
            "--config",
            "/etc/flexylog.toml",
        ])
        .unwrap();

        assert_eq!(cli.config, Some(PathBuf::from("/etc/flexylog.toml")));
        match cli.get_command() {
            Commands::Logs(args) => {
                assert_eq!(args.method.as_deref(), Some("post"));
                assert_eq!(args.limit, 5);
            }
            _ => panic!("Expected Logs command"),
        }
    }

    #[test]
    fn test_cli_parsing_config_validate() {
        let cli = Cli::try_parse_from(["flexylog", "config", "validate"]).unwrap();
        assert!(matches!(
            cli.get_command(),
            Commands::Config {
                action: ConfigCommands::Validate
            }
        ));
    }
}
