//! Configuration schema definitions.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use qqbot_transport::RetryPolicy;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct QQBotConfig {
    /// Webhook server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Chat gateway API settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Dispatcher settings.
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Message archive settings.
    #[serde(default)]
    pub archive: ArchiveConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

// =============================================================================
// Server
// =============================================================================

/// Webhook server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Path the gateway posts events to.
    #[serde(default = "default_path")]
    pub path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            path: default_path(),
        }
    }
}

impl ServerConfig {
    /// `host:port`, ready for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_path() -> String {
    "/message".to_string()
}

// =============================================================================
// Gateway
// =============================================================================

/// Gateway HTTP API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Base URL of the gateway API.
    #[serde(default = "default_gateway_url")]
    pub url: String,

    /// Bearer token sent with every request.
    #[serde(default)]
    pub access_token: Option<String>,

    /// Per-request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Retry behaviour for failed calls.
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            url: default_gateway_url(),
            access_token: None,
            timeout_ms: default_timeout_ms(),
            retry: RetryConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// The timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn default_gateway_url() -> String {
    "http://127.0.0.1:3000".to_string()
}

fn default_timeout_ms() -> u64 {
    30000
}

/// Retry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per call, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay between attempts in milliseconds.
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_ms: default_delay_ms(),
        }
    }
}

impl RetryConfig {
    /// Converts to the transport's retry policy.
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            delay: Duration::from_millis(self.delay_ms),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_delay_ms() -> u64 {
    1000
}

// =============================================================================
// Dispatch
// =============================================================================

/// Dispatcher configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// How long a disambiguation prompt stays answerable, in seconds.
    #[serde(default = "default_selection_ttl_secs")]
    pub selection_ttl_secs: u64,

    /// How often expired pending interactions are swept, in seconds.
    /// `0` disables the sweeper.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            selection_ttl_secs: default_selection_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl DispatchConfig {
    /// The selection TTL as a [`Duration`].
    pub fn selection_ttl(&self) -> Duration {
        Duration::from_secs(self.selection_ttl_secs)
    }

    /// The sweep interval, or `None` when sweeping is disabled.
    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_secs > 0).then(|| Duration::from_secs(self.sweep_interval_secs))
    }
}

fn default_selection_ttl_secs() -> u64 {
    300
}

fn default_sweep_interval_secs() -> u64 {
    60
}

// =============================================================================
// Archive
// =============================================================================

/// Where archived messages are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveBackend {
    /// One database file per account under [`ArchiveConfig::path`].
    #[default]
    File,
    /// Process memory; lost on restart.
    Memory,
}

/// Message archive configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    #[serde(default)]
    pub backend: ArchiveBackend,

    /// Directory holding `{self_id}.redb`.
    #[serde(default = "default_archive_path")]
    pub path: PathBuf,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            backend: ArchiveBackend::default(),
            path: default_archive_path(),
        }
    }
}

fn default_archive_path() -> PathBuf {
    PathBuf::from("./databases")
}

// =============================================================================
// Logging
// =============================================================================

/// Log verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Returns the level as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    /// Converts to a [`tracing::Level`].
    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            other => Err(format!("unknown log level '{other}'")),
        }
    }
}

/// Log line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    /// Requires the `json-log` feature; falls back to `full` without it.
    Json,
}

/// Where log lines go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    File,
}

/// File rotation for [`LogOutput::File`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    #[default]
    Never,
    Hourly,
    Daily,
}

/// Which span lifecycle events are logged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpanEventConfig {
    #[serde(default)]
    pub new: bool,
    #[serde(default)]
    pub enter: bool,
    #[serde(default)]
    pub exit: bool,
    #[serde(default)]
    pub close: bool,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Base level. `RUST_LOG` takes precedence when set.
    #[serde(default)]
    pub level: LogLevel,

    #[serde(default)]
    pub format: LogFormat,

    #[serde(default)]
    pub output: LogOutput,

    #[serde(default)]
    pub span_events: SpanEventConfig,

    /// Include thread ids.
    #[serde(default)]
    pub thread_ids: bool,

    /// Include source file and line.
    #[serde(default)]
    pub file_location: bool,

    /// Log file for [`LogOutput::File`].
    #[serde(default = "default_log_file")]
    pub file_path: Option<PathBuf>,

    #[serde(default)]
    pub rotation: LogRotation,

    /// Per-module levels, e.g. `qqbot_framework = "debug"`.
    #[serde(default)]
    pub filters: HashMap<String, LogLevel>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::default(),
            format: LogFormat::default(),
            output: LogOutput::default(),
            span_events: SpanEventConfig::default(),
            thread_ids: false,
            file_location: false,
            file_path: default_log_file(),
            rotation: LogRotation::default(),
            filters: HashMap::new(),
        }
    }
}

fn default_log_file() -> Option<PathBuf> {
    Some(PathBuf::from("logs/qqbot.log"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = QQBotConfig::default();
        assert_eq!(config.server.bind_addr(), "0.0.0.0:8080");
        assert_eq!(config.server.path, "/message");
        assert_eq!(config.gateway.url, "http://127.0.0.1:3000");
        assert_eq!(config.gateway.retry.to_policy(), RetryPolicy::default());
        assert_eq!(config.dispatch.selection_ttl(), Duration::from_secs(300));
        assert_eq!(config.dispatch.sweep_interval(), Some(Duration::from_secs(60)));
        assert_eq!(config.archive.backend, ArchiveBackend::File);
        assert_eq!(config.archive.path, PathBuf::from("./databases"));
        assert_eq!(config.logging.level, LogLevel::Info);
    }

    #[test]
    fn test_zero_sweep_interval_disables_sweeper() {
        let dispatch = DispatchConfig {
            sweep_interval_secs: 0,
            ..Default::default()
        };
        assert_eq!(dispatch.sweep_interval(), None);
    }

    #[test]
    fn test_log_level_parsing() {
        assert_eq!("DEBUG".parse::<LogLevel>(), Ok(LogLevel::Debug));
        assert_eq!("warning".parse::<LogLevel>(), Ok(LogLevel::Warn));
        assert!("loud".parse::<LogLevel>().is_err());
        assert_eq!(LogLevel::Error.to_tracing_level(), tracing::Level::ERROR);
    }

    #[test]
    fn test_partial_section_keeps_defaults() {
        let config: QQBotConfig =
            serde_json::from_str(r#"{"server": {"port": 9000}, "logging": {"format": "pretty"}}"#)
                .unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert_eq!(config.gateway.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_memory_archive_backend() {
        let config: QQBotConfig =
            serde_json::from_str(r#"{"archive": {"backend": "memory"}}"#).unwrap();
        assert_eq!(config.archive.backend, ArchiveBackend::Memory);
        assert_eq!(config.archive.path, default_archive_path());
    }
}
