//! Configuration for the command server
//!
//! Values come from an optional TOML file and are then overridden by
//! command-line flags.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use aesd_logging::LogConfig;
use aesd_storage::{BackendKind, DEFAULT_DATA_FILE, StoreConfig};
use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::directive::SEEK_DIRECTIVE_PREFIX;
use crate::error::{ServerError, ServerResult};

/// Default listening port
pub const DEFAULT_PORT: u16 = 9000;

/// Default pending-connection backlog
pub const DEFAULT_BACKLOG: u32 = 10;

/// Default seconds between timestamp commands
pub const DEFAULT_TIMESTAMP_INTERVAL_SECS: u64 = 10;

/// Configuration for a CommandServer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind
    pub bind: String,
    /// Port to listen on (0 picks a free port)
    pub port: u16,
    /// Listen backlog
    pub backlog: u32,
    /// Command store configuration
    pub store: StoreConfig,
    /// Seconds between timestamp commands; `None` disables them
    pub timestamp_interval_secs: Option<u64>,
    /// Prefix that marks a seek directive line
    pub seek_prefix: String,
    /// Logging configuration
    pub log: LogConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            backlog: DEFAULT_BACKLOG,
            store: StoreConfig::default(),
            timestamp_interval_secs: Some(DEFAULT_TIMESTAMP_INTERVAL_SECS),
            seek_prefix: SEEK_DIRECTIVE_PREFIX.to_string(),
            log: LogConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load a configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> ServerResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ServerError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml(&text)
    }

    /// Parse a configuration from TOML text
    pub fn from_toml(text: &str) -> ServerResult<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Configuration for tests: loopback, ephemeral port, no timestamps
    pub fn local_ephemeral() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 0,
            timestamp_interval_secs: None,
            log: LogConfig::testing(),
            ..Default::default()
        }
    }

    /// Set the store configuration
    pub fn with_store(mut self, store: StoreConfig) -> Self {
        self.store = store;
        self
    }

    /// Set the timestamp interval; `None` disables timestamps
    pub fn with_timestamp_interval(mut self, secs: Option<u64>) -> Self {
        self.timestamp_interval_secs = secs;
        self
    }

    /// The socket address to bind
    pub fn socket_addr(&self) -> ServerResult<SocketAddr> {
        format!("{}:{}", self.bind, self.port)
            .parse()
            .map_err(|e| ServerError::Config(format!("invalid bind address {}: {}", self.bind, e)))
    }

    /// Timestamp period, if enabled
    pub fn timestamp_interval(&self) -> Option<Duration> {
        self.timestamp_interval_secs.map(Duration::from_secs)
    }

    /// Check the configuration
    pub fn validate(&self) -> ServerResult<()> {
        self.socket_addr()?;
        self.store.validate()?;
        if self.seek_prefix.is_empty() {
            return Err(ServerError::Config("seek prefix must not be empty".into()));
        }
        if self.timestamp_interval_secs == Some(0) {
            return Err(ServerError::Config(
                "timestamp interval must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Command-line interface of the `aesdsocket` binary
#[derive(Debug, Parser)]
#[command(name = "aesdsocket", about = "Serve a bounded command history over TCP")]
pub struct Cli {
    /// Daemon mode (accepted for compatibility; the server stays in the foreground)
    #[arg(short = 'd', long)]
    pub daemon: bool,
    /// TOML configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Address to bind
    #[arg(long)]
    pub bind: Option<String>,
    /// Port to listen on
    #[arg(long)]
    pub port: Option<u16>,
    /// Number of commands to retain
    #[arg(long)]
    pub capacity: Option<usize>,
    /// Keep the history in a data file instead of memory
    #[arg(long)]
    pub file_backend: bool,
    /// Data file used by the file backend
    #[arg(long, default_value = DEFAULT_DATA_FILE)]
    pub data_file: PathBuf,
    /// Seconds between timestamp commands
    #[arg(long)]
    pub timestamp_interval_secs: Option<u64>,
    /// Disable timestamp commands
    #[arg(long)]
    pub no_timestamps: bool,
    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,
    /// Human-readable log output
    #[arg(long)]
    pub pretty: bool,
}

impl Cli {
    /// Resolve the final configuration: file (if any), then flags
    pub fn into_config(self) -> ServerResult<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::load(path)?,
            None => ServerConfig::default(),
        };

        if let Some(bind) = self.bind {
            config.bind = bind;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(capacity) = self.capacity {
            config.store.capacity = capacity;
        }
        if self.file_backend {
            config.store.backend = BackendKind::File {
                path: self.data_file,
            };
        }
        if let Some(secs) = self.timestamp_interval_secs {
            config.timestamp_interval_secs = Some(secs);
        }
        if self.no_timestamps {
            config.timestamp_interval_secs = None;
        }
        if let Some(level) = self.log_level {
            config.log.default_level = level;
        }
        if self.pretty {
            config.log.console.pretty = true;
            config.log.console.ansi = true;
        }

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 9000);
        assert_eq!(config.backlog, 10);
        assert_eq!(config.timestamp_interval(), Some(Duration::from_secs(10)));
        assert_eq!(config.seek_prefix, "AESDCHAR_IOCSEEKTO:");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml() {
        let config = ServerConfig::from_toml(
            r#"
            port = 9100
            timestamp_interval_secs = 5

            [store]
            capacity = 20

            [store.backend]
            kind = "file"
            path = "/tmp/aesd-history"

            [log]
            default_level = "debug"
            "#,
        )
        .unwrap();

        assert_eq!(config.port, 9100);
        assert_eq!(config.store.capacity, 20);
        assert_eq!(
            config.store.backend,
            BackendKind::File {
                path: PathBuf::from("/tmp/aesd-history")
            }
        );
        assert_eq!(config.timestamp_interval_secs, Some(5));
        assert_eq!(config.log.default_level, "debug");
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(ServerConfig::from_toml("bind = \"not an address\"").is_err());
        assert!(ServerConfig::from_toml("timestamp_interval_secs = 0").is_err());
        assert!(ServerConfig::from_toml("[store]\ncapacity = 0").is_err());
    }

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::parse_from([
            "aesdsocket",
            "-d",
            "--port",
            "9500",
            "--file-backend",
            "--data-file",
            "/tmp/data",
            "--no-timestamps",
            "--log-level",
            "debug",
        ]);
        assert!(cli.daemon);

        let config = cli.into_config().unwrap();
        assert_eq!(config.port, 9500);
        assert_eq!(
            config.store.backend,
            BackendKind::File {
                path: PathBuf::from("/tmp/data")
            }
        );
        assert_eq!(config.timestamp_interval_secs, None);
        assert_eq!(config.log.default_level, "debug");
    }

    #[test]
    fn test_cli_defaults_match_config() {
        let config = Cli::parse_from(["aesdsocket"]).into_config().unwrap();
        assert_eq!(config, ServerConfig::default());
    }
}
