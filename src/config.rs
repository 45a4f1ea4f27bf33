use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Prefix of `FLEXYLOG__SECTION__KEY` environment overrides
pub const ENV_PREFIX: &str = "FLEXYLOG";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub file_sink: FileSinkConfig,
    #[serde(default)]
    pub writer: WriterConfig,
    #[serde(default)]
    pub interceptor: InterceptorConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// "pretty" or "json"
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            max_connections: default_max_connections(),
        }
    }
}

fn default_database_url() -> String {
    "sqlite:./data/flexylog.db".to_string()
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FileSinkConfig {
    /// Directory holding the `requests-YYYY-MM-DD.json` day-files
    #[serde(default = "default_log_directory")]
    pub directory: String,
}

impl Default for FileSinkConfig {
    fn default() -> Self {
        Self {
            directory: default_log_directory(),
        }
    }
}

fn default_log_directory() -> String {
    "./logs".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WriterConfig {
    /// Entries per store transaction
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
    /// Queue capacity per sink; entries beyond it are dropped
    #[serde(default = "default_max_buffer_size")]
    pub max_buffer_size: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            flush_interval_ms: default_flush_interval_ms(),
            max_buffer_size: default_max_buffer_size(),
        }
    }
}

fn default_batch_size() -> usize {
    100
}

fn default_flush_interval_ms() -> u64 {
    1000
}

fn default_max_buffer_size() -> usize {
    10_000
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InterceptorConfig {
    /// Largest request body captured into a log entry
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Path prefixes that are never logged
    #[serde(default)]
    pub skip_paths: Vec<String>,
}

impl Default for InterceptorConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: default_max_body_bytes(),
            skip_paths: Vec::new(),
        }
    }
}

fn default_max_body_bytes() -> usize {
    1024 * 1024
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetentionConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_retention_days")]
    pub store_days: u32,
    #[serde(default = "default_retention_days")]
    pub file_days: u32,
    /// Local hour of day (0-23) the sweep runs at
    #[serde(default = "default_cleanup_hour")]
    pub cleanup_hour: u32,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            store_days: default_retention_days(),
            file_days: default_retention_days(),
            cleanup_hour: default_cleanup_hour(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_retention_days() -> u32 {
    30
}

fn default_cleanup_hour() -> u32 {
    3
}

/// Values of the conventional `PORT` / `DATABASE_URL` variables
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    pub port: Option<String>,
    pub database_url: Option<String>,
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        Self {
            port: std::env::var("PORT").ok().filter(|v| !v.trim().is_empty()),
            database_url: std::env::var("DATABASE_URL")
                .ok()
                .filter(|v| !v.trim().is_empty()),
        }
    }
}

/// Load configuration
///
/// Sources, lowest precedence first:
/// 1. `path`, or `config.toml` in the working directory (optional)
/// 2. `FLEXYLOG__SECTION__KEY` environment variables
/// 3. `PORT` and `DATABASE_URL`
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    load_config_from(path, ENV_PREFIX, EnvOverrides::from_env())
}

pub fn load_config_from(
    path: Option<&Path>,
    env_prefix: &str,
    overrides: EnvOverrides,
) -> Result<Config> {
    let file = match path {
        Some(path) => config::File::from(path).required(true),
        None => config::File::with_name("config").required(false),
    };

    let config = config::Config::builder()
        .add_source(file)
        .add_source(config::Environment::with_prefix(env_prefix).separator("__"))
        .set_override_option("server.port", overrides.port)?
        .set_override_option("store.database_url", overrides.database_url)?
        .build()?;

    let cfg: Config = config.try_deserialize()?;
    validate_config(&cfg)?;

    Ok(cfg)
}

pub fn validate_config(cfg: &Config) -> Result<()> {
    if cfg.server.host.parse::<std::net::IpAddr>().is_err() {
        anyhow::bail!("server.host must be an IP address, got '{}'", cfg.server.host);
    }

    if !matches!(cfg.server.log_format.as_str(), "pretty" | "json") {
        anyhow::bail!(
            "server.log_format must be 'pretty' or 'json', got '{}'",
            cfg.server.log_format
        );
    }

    if !cfg.store.database_url.starts_with("sqlite:") {
        anyhow::bail!(
            "store.database_url must be a sqlite: URL, got '{}'",
            cfg.store.database_url
        );
    }

    if cfg.store.max_connections == 0 {
        anyhow::bail!("store.max_connections must be at least 1");
    }

    if cfg.file_sink.directory.trim().is_empty() {
        anyhow::bail!("file_sink.directory cannot be empty");
    }

    if cfg.writer.batch_size == 0 {
        anyhow::bail!("writer.batch_size must be at least 1");
    }

    if cfg.writer.flush_interval_ms == 0 {
        anyhow::bail!("writer.flush_interval_ms must be at least 1");
    }

    if cfg.writer.max_buffer_size < cfg.writer.batch_size {
        anyhow::bail!(
            "writer.max_buffer_size ({}) must not be smaller than writer.batch_size ({})",
            cfg.writer.max_buffer_size,
            cfg.writer.batch_size
        );
    }

    if cfg.retention.cleanup_hour > 23 {
        anyhow::bail!(
            "retention.cleanup_hour must be between 0 and 23, got {}",
            cfg.retention.cleanup_hour
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = Config::default();
        assert!(validate_config(&cfg).is_ok());
        assert_eq!(cfg.server.port, 3000);
        assert_eq!(cfg.retention.store_days, 30);
        assert_eq!(cfg.file_sink.directory, "./logs");
    }

    #[test]
    fn test_load_partial_file_fills_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[server]
port = 8080
log_format = "json"

[interceptor]
skip_paths = ["/health", "/metrics"]
"#
        )
        .unwrap();

        let cfg = load_config_from(
            Some(file.path()),
            "FLEXYLOG_TEST_PARTIAL",
            EnvOverrides::default(),
        )
        .unwrap();

        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.server.log_format, "json");
        assert_eq!(cfg.server.host, "0.0.0.0");
        assert_eq!(cfg.interceptor.skip_paths, vec!["/health", "/metrics"]);
        assert_eq!(cfg.writer.batch_size, 100);
    }

    #[test]
    fn test_port_and_database_url_overrides() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[server]\nport = 8080\n").unwrap();

        let cfg = load_config_from(
            Some(file.path()),
            "FLEXYLOG_TEST_OVERRIDES",
            EnvOverrides {
                port: Some("4321".to_string()),
                database_url: Some("sqlite::memory:".to_string()),
            },
        )
        .unwrap();

        assert_eq!(cfg.server.port, 4321);
        assert_eq!(cfg.store.database_url, "sqlite::memory:");
    }

    #[test]
    fn test_validate_config_rejects_bad_log_format() {
        let mut cfg = Config::default();
        cfg.server.log_format = "xml".to_string();

        let result = validate_config(&cfg);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("log_format"));
    }

    #[test]
    fn test_validate_config_rejects_small_buffer() {
        let mut cfg = Config::default();
        cfg.writer.batch_size = 50;
        cfg.writer.max_buffer_size = 10;

        assert!(validate_config(&cfg).is_err());
    }

    #[test]
    fn test_validate_config_rejects_bad_cleanup_hour() {
        let mut cfg = Config::default();
        cfg.retention.cleanup_hour = 24;

        assert!(validate_config(&cfg).is_err());
    }

    #[test]
    fn test_validate_config_requires_sqlite_url() {
        let mut cfg = Config::default();
        cfg.store.database_url = "mongodb://localhost/logs".to_string();

        assert!(validate_config(&cfg).is_err());
    }
}
