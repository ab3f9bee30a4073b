//! Server configuration
//!
//! Command line arguments and environment variables via clap, layered over an
//! optional YAML file. Values given on the command line or in the environment
//! win over the file; the file wins over the defaults.

use clap::{Parser, ValueEnum};
use discovery_api::KEY_DELIMITER;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_REDIS_HOST: &str = "localhost";
pub const DEFAULT_REDIS_PORT: u16 = 6379;
pub const DEFAULT_STORE_TIMEOUT_MS: u64 = 5000;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("environment is required")]
    MissingEnvironment,

    #[error("environment cannot contain {}", KEY_DELIMITER)]
    InvalidEnvironment,

    #[error("store timeout must be greater than zero")]
    ZeroTimeout,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    Redis,
    Memory,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Service discovery registry server
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "discovery-server")]
#[command(about = "Service discovery registry backed by Redis")]
pub struct Args {
    /// Optional YAML configuration file
    #[arg(long, env = "DISCOVERY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Environment every registration is scoped to
    #[arg(long, env = "DISCOVERY_ENVIRONMENT")]
    pub environment: Option<String>,

    /// Port to listen on
    #[arg(long, env = "DISCOVERY_PORT")]
    pub port: Option<u16>,

    /// Backing store
    #[arg(long, env = "DISCOVERY_STORE", value_enum)]
    pub store: Option<StoreKind>,

    #[arg(long, env = "REDIS_HOST")]
    pub redis_host: Option<String>,

    #[arg(long, env = "REDIS_PORT")]
    pub redis_port: Option<u16>,

    /// Bound on each store command, in milliseconds
    #[arg(long, env = "DISCOVERY_STORE_TIMEOUT_MS")]
    pub store_timeout_ms: Option<u64>,

    #[arg(long, env = "DISCOVERY_LOG_FORMAT", value_enum)]
    pub log_format: Option<LogFormat>,

    /// Pretty-print JSON responses
    #[arg(long, env = "DISCOVERY_PRETTY_JSON")]
    pub pretty_json: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RedisFile {
    host: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    environment: Option<String>,
    port: Option<u16>,
    store: Option<StoreKind>,
    redis: RedisFile,
    store_timeout_ms: Option<u64>,
    log_format: Option<LogFormat>,
    pretty_json: Option<bool>,
}

impl FileConfig {
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Resolved, validated server settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    pub environment: String,
    pub port: u16,
    pub store: StoreKind,
    pub redis_host: String,
    pub redis_port: u16,
    pub store_timeout: Duration,
    pub log_format: LogFormat,
    pub pretty_json: bool,
}

impl Settings {
    /// Merge arguments over the optional config file and validate the result
    pub fn load(args: Args) -> Result<Self, ConfigError> {
        let file = match &args.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };

        let settings = Self {
            environment: args
                .environment
                .or(file.environment)
                .ok_or(ConfigError::MissingEnvironment)?,
            port: args.port.or(file.port).unwrap_or(DEFAULT_PORT),
            store: args.store.or(file.store).unwrap_or_default(),
            redis_host: args
                .redis_host
                .or(file.redis.host)
                .unwrap_or_else(|| DEFAULT_REDIS_HOST.to_string()),
            redis_port: args.redis_port.or(file.redis.port).unwrap_or(DEFAULT_REDIS_PORT),
            store_timeout: Duration::from_millis(
                args.store_timeout_ms
                    .or(file.store_timeout_ms)
                    .unwrap_or(DEFAULT_STORE_TIMEOUT_MS),
            ),
            log_format: args.log_format.or(file.log_format).unwrap_or_default(),
            pretty_json: args.pretty_json || file.pretty_json.unwrap_or(false),
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.environment.is_empty() {
            return Err(ConfigError::MissingEnvironment);
        }
        if self.environment.contains(KEY_DELIMITER) {
            return Err(ConfigError::InvalidEnvironment);
        }
        if self.store_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults() {
        let args = Args {
            environment: Some("dev".to_string()),
            ..Args::default()
        };
        let settings = Settings::load(args).unwrap();
        assert_eq!(settings.environment, "dev");
        assert_eq!(settings.port, DEFAULT_PORT);
        assert_eq!(settings.store, StoreKind::Redis);
        assert_eq!(settings.redis_host, "localhost");
        assert_eq!(settings.redis_port, 6379);
        assert_eq!(settings.store_timeout, Duration::from_secs(5));
        assert_eq!(settings.log_format, LogFormat::Text);
        assert!(!settings.pretty_json);
    }

    #[test]
    fn test_file_values() {
        let file = write_config(
            "environment: staging\nport: 9090\nstore: memory\nredis:\n  host: redis.internal\n  port: 6380\nstore_timeout_ms: 250\nlog_format: json\n",
        );
        let args = Args {
            config: Some(file.path().to_path_buf()),
            ..Args::default()
        };
        let settings = Settings::load(args).unwrap();
        assert_eq!(settings.environment, "staging");
        assert_eq!(settings.port, 9090);
        assert_eq!(settings.store, StoreKind::Memory);
        assert_eq!(settings.redis_host, "redis.internal");
        assert_eq!(settings.redis_port, 6380);
        assert_eq!(settings.store_timeout, Duration::from_millis(250));
        assert_eq!(settings.log_format, LogFormat::Json);
    }

    #[test]
    fn test_arguments_override_file() {
        let file = write_config("environment: staging\nport: 9090\nredis:\n  host: redis.internal\n");
        let args = Args {
            config: Some(file.path().to_path_buf()),
            environment: Some("prod".to_string()),
            redis_port: Some(7000),
            ..Args::default()
        };
        let settings = Settings::load(args).unwrap();
        assert_eq!(settings.environment, "prod");
        assert_eq!(settings.port, 9090);
        assert_eq!(settings.redis_host, "redis.internal");
        assert_eq!(settings.redis_port, 7000);
    }

    #[test]
    fn test_parse_from_command_line() {
        let args = Args::try_parse_from([
            "discovery-server",
            "--environment",
            "qa",
            "--store",
            "memory",
            "--log-format",
            "json",
        ])
        .unwrap();
        let settings = Settings::load(args).unwrap();
        assert_eq!(settings.environment, "qa");
        assert_eq!(settings.store, StoreKind::Memory);
        assert_eq!(settings.log_format, LogFormat::Json);
    }

    #[test]
    fn test_environment_is_validated() {
        assert!(matches!(
            Settings::load(Args::default()),
            Err(ConfigError::MissingEnvironment)
        ));

        let empty = Args {
            environment: Some(String::new()),
            ..Args::default()
        };
        assert!(matches!(Settings::load(empty), Err(ConfigError::MissingEnvironment)));

        let delimited = Args {
            environment: Some("us:east".to_string()),
            ..Args::default()
        };
        assert!(matches!(Settings::load(delimited), Err(ConfigError::InvalidEnvironment)));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let args = Args {
            environment: Some("dev".to_string()),
            store_timeout_ms: Some(0),
            ..Args::default()
        };
        assert!(matches!(Settings::load(args), Err(ConfigError::ZeroTimeout)));
    }

    #[test]
    fn test_bad_file() {
        let file = write_config("environment: [not, a, string\n");
        let args = Args {
            config: Some(file.path().to_path_buf()),
            ..Args::default()
        };
        assert!(matches!(Settings::load(args), Err(ConfigError::Parse { .. })));

        let missing = Args {
            config: Some(PathBuf::from("/nonexistent/discovery.yaml")),
            ..Args::default()
        };
        assert!(matches!(Settings::load(missing), Err(ConfigError::Read { .. })));
    }
}
