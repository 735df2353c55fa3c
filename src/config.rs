//! Configuration for the buffered socket server.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use clap::{Parser, ValueEnum};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Protocol spoken on accepted connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolType {
    /// Raw byte echo
    #[default]
    Echo,
    /// Line-based ping/pong
    Ping,
}

impl ProtocolType {
    /// Can the handler receive straight from the descriptor?
    pub fn supports_direct(self) -> bool {
        matches!(self, ProtocolType::Echo)
    }
}

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "buffered-socket")]
#[command(version)]
#[command(about = "Event-driven server built on buffered sockets", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to bind to (e.g., 127.0.0.1:7777)
    #[arg(short = 'l', long)]
    pub listen: Option<String>,

    /// Number of worker threads (0 = number of CPU cores)
    #[arg(short = 'w', long)]
    pub workers: Option<usize>,

    /// Protocol to serve
    #[arg(short = 'p', long, value_enum)]
    pub protocol: Option<ProtocolType>,

    /// Maximum connections per worker
    #[arg(long)]
    pub max_connections: Option<usize>,

    /// Per-connection input buffer size in bytes
    #[arg(long)]
    pub input_buffer_size: Option<usize>,

    /// Write timeout in milliseconds (0 = disabled)
    #[arg(long)]
    pub write_timeout_ms: Option<u64>,

    /// Receive straight from the socket, bypassing the input buffer
    #[arg(long)]
    pub direct: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub socket: SocketConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Number of worker threads (0 = number of CPU cores)
    #[serde(default)]
    pub workers: usize,
    /// Maximum connections per worker
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    #[serde(default)]
    pub protocol: ProtocolType,
    /// Events fetched per poll
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            workers: 0,
            max_connections: default_max_connections(),
            protocol: ProtocolType::default(),
            batch_size: default_batch_size(),
        }
    }
}

/// Per-connection socket configuration
#[derive(Debug, Deserialize)]
pub struct SocketConfig {
    #[serde(default = "default_input_buffer_size")]
    pub input_buffer_size: usize,
    /// Write timeout in milliseconds (0 = disabled)
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,
    #[serde(default)]
    pub direct: bool,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            input_buffer_size: default_input_buffer_size(),
            write_timeout_ms: default_write_timeout_ms(),
            direct: false,
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_listen() -> String {
    "127.0.0.1:7777".to_string()
}

fn default_max_connections() -> usize {
    1024
}

fn default_batch_size() -> usize {
    256
}

fn default_input_buffer_size() -> usize {
    crate::runtime::DEFAULT_INPUT_CAPACITY
}

fn default_write_timeout_ms() -> u64 {
    30_000
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub listen: String,
    /// 0 = number of CPU cores
    pub workers: usize,
    pub max_connections: usize,
    pub protocol: ProtocolType,
    pub batch_size: usize,
    pub input_buffer_size: usize,
    pub write_timeout: Option<Duration>,
    pub direct: bool,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::merge(CliArgs::default_args(), TomlConfig::default())
    }
}

impl Config {
    /// Load configuration from the process arguments and optional TOML
    /// file.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_args(CliArgs::parse())
    }

    /// Resolve parsed CLI arguments, reading the TOML file they name.
    pub fn from_args(cli: CliArgs) -> Result<Self, ConfigError> {
        let toml_config = match cli.config {
            Some(ref config_path) => {
                let contents = std::fs::read_to_string(config_path)
                    .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
                toml::from_str(&contents)
                    .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
            }
            None => TomlConfig::default(),
        };

        let config = Self::merge(cli, toml_config);
        config.validate()?;
        Ok(config)
    }

    fn merge(cli: CliArgs, toml_config: TomlConfig) -> Self {
        let write_timeout_ms = cli
            .write_timeout_ms
            .unwrap_or(toml_config.socket.write_timeout_ms);

        Config {
            listen: cli.listen.unwrap_or(toml_config.server.listen),
            workers: cli.workers.unwrap_or(toml_config.server.workers),
            max_connections: cli
                .max_connections
                .unwrap_or(toml_config.server.max_connections),
            protocol: cli.protocol.unwrap_or(toml_config.server.protocol),
            batch_size: toml_config.server.batch_size,
            input_buffer_size: cli
                .input_buffer_size
                .unwrap_or(toml_config.socket.input_buffer_size),
            write_timeout: (write_timeout_ms > 0).then(|| Duration::from_millis(write_timeout_ms)),
            direct: cli.direct || toml_config.socket.direct,
            log_level: cli.log_level.unwrap_or(toml_config.logging.level),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.input_buffer_size == 0 {
            return Err(ConfigError::Invalid("input_buffer_size must be positive"));
        }
        if self.max_connections == 0 {
            return Err(ConfigError::Invalid("max_connections must be positive"));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be positive"));
        }
        Ok(())
    }
}

impl CliArgs {
    fn default_args() -> Self {
        Self {
            config: None,
            listen: None,
            workers: None,
            protocol: None,
            max_connections: None,
            input_buffer_size: None,
            write_timeout_ms: None,
            direct: false,
            log_level: None,
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {}", .0.display(), .1)]
    FileRead(PathBuf, #[source] std::io::Error),
    #[error("Failed to parse config file '{}': {}", .0.display(), .1)]
    TomlParse(PathBuf, #[source] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.listen, "127.0.0.1:7777");
        assert_eq!(config.workers, 0);
        assert_eq!(config.max_connections, 1024);
        assert_eq!(config.protocol, ProtocolType::Echo);
        assert_eq!(config.input_buffer_size, 8192);
        assert_eq!(config.write_timeout, Some(Duration::from_secs(30)));
        assert!(!config.direct);
    }

    #[test]
    fn test_toml_parsing() {
        let toml_str = r#"
            [server]
            listen = "0.0.0.0:7000"
            workers = 4
            protocol = "ping"

            [socket]
            input_buffer_size = 4096
            write_timeout_ms = 0
            direct = true

            [logging]
            level = "debug"
        "#;

        let config: TomlConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.listen, "0.0.0.0:7000");
        assert_eq!(config.server.workers, 4);
        assert_eq!(config.server.protocol, ProtocolType::Ping);
        assert_eq!(config.server.batch_size, 256);
        assert_eq!(config.socket.input_buffer_size, 4096);
        assert!(config.socket.direct);

        let config = Config::merge(CliArgs::default_args(), config);
        assert_eq!(config.write_timeout, None);
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(toml::from_str::<TomlConfig>("[storage]\nmax_memory = 1\n").is_err());
    }

    #[test]
    fn test_cli_overrides_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nlisten = \"0.0.0.0:1\"\nprotocol = \"ping\"").unwrap();

        let cli = CliArgs::try_parse_from([
            "buffered-socket",
            "--config",
            file.path().to_str().unwrap(),
            "--listen",
            "127.0.0.1:2",
            "--write-timeout-ms",
            "500",
        ])
        .unwrap();
        let config = Config::from_args(cli).unwrap();

        assert_eq!(config.listen, "127.0.0.1:2");
        assert_eq!(config.protocol, ProtocolType::Ping);
        assert_eq!(config.write_timeout, Some(Duration::from_millis(500)));
    }

    #[test]
    fn test_invalid_values() {
        let cli = CliArgs::try_parse_from(["buffered-socket", "--input-buffer-size", "0"]).unwrap();
        assert!(matches!(
            Config::from_args(cli),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        let cli = CliArgs::try_parse_from(["buffered-socket", "-c", "/nonexistent/x.toml"]).unwrap();
        let err = Config::from_args(cli).unwrap_err();
        assert!(matches!(err, ConfigError::FileRead(..)));
        assert!(err.to_string().contains("/nonexistent/x.toml"));
    }

    #[test]
    fn test_supports_direct() {
        assert!(ProtocolType::Echo.supports_direct());
        assert!(!ProtocolType::Ping.supports_direct());
    }
}
