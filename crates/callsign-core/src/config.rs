//! Application configuration
//!
//! This module provides centralized configuration management using the `config` crate.
//! Configuration can be loaded from environment variables and config files.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub freeswitch: FreeSwitchConfig,
    #[serde(default)]
    pub services: ServicesConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP server configuration (document endpoint)
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Number of worker threads
    #[serde(default = "default_workers")]
    pub workers: usize,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_workers() -> usize {
    num_cpus::get()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            workers: default_workers(),
        }
    }
}

/// Database configuration
#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    #[serde(default = "default_database_url")]
    pub url: String,

    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_url() -> String {
    "postgresql://localhost/callsign".to_string()
}

fn default_max_connections() -> u32 {
    10
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
        }
    }
}

/// FreeSWITCH event socket configuration
#[derive(Debug, Deserialize, Clone)]
pub struct FreeSwitchConfig {
    /// Event socket host
    #[serde(default = "default_fs_host")]
    pub host: String,

    /// Event socket port
    #[serde(default = "default_fs_port")]
    pub port: u16,

    /// Event socket password
    #[serde(default = "default_fs_password")]
    pub password: String,

    /// Event classes subscribed on the control connection
    #[serde(default = "default_events")]
    pub events: Vec<String>,

    /// Reconnect attempts before the client gives up
    #[serde(default = "default_reconnect_attempts")]
    pub reconnect_attempts: u32,

    /// Base reconnect delay; attempt N waits N times this
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    /// Timeout for a single api/bgapi command
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,

    /// Capacity of the bounded event channel
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,

    /// Capacity of the error channel
    #[serde(default = "default_error_buffer")]
    pub error_buffer: usize,
}

fn default_fs_host() -> String {
    "127.0.0.1".to_string()
}

fn default_fs_port() -> u16 {
    8021
}

fn default_fs_password() -> String {
    "ClueCon".to_string()
}

fn default_events() -> Vec<String> {
    [
        "CHANNEL_CREATE",
        "CHANNEL_ANSWER",
        "CHANNEL_BRIDGE",
        "CHANNEL_UNBRIDGE",
        "CHANNEL_HANGUP_COMPLETE",
        "CHANNEL_STATE",
        "DTMF",
        "RECORD_START",
        "RECORD_STOP",
        "PLAYBACK_START",
        "PLAYBACK_STOP",
        "CUSTOM",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_reconnect_attempts() -> u32 {
    10
}

fn default_reconnect_delay_ms() -> u64 {
    1000
}

fn default_command_timeout() -> u64 {
    10
}

fn default_event_buffer() -> usize {
    1000
}

fn default_error_buffer() -> usize {
    10
}

impl Default for FreeSwitchConfig {
    fn default() -> Self {
        Self {
            host: default_fs_host(),
            port: default_fs_port(),
            password: default_fs_password(),
            events: default_events(),
            reconnect_attempts: default_reconnect_attempts(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            command_timeout_secs: default_command_timeout(),
            event_buffer: default_event_buffer(),
            error_buffer: default_error_buffer(),
        }
    }
}

impl FreeSwitchConfig {
    /// Event socket address as `host:port`
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

/// Outbound socket listeners, one per call-handling service
#[derive(Debug, Deserialize, Clone)]
pub struct ServicesConfig {
    #[serde(default = "default_callcontrol_addr")]
    pub callcontrol_addr: String,

    #[serde(default = "default_voicemail_addr")]
    pub voicemail_addr: String,

    #[serde(default = "default_queue_addr")]
    pub queue_addr: String,

    #[serde(default = "default_conference_addr")]
    pub conference_addr: String,

    #[serde(default = "default_blf_addr")]
    pub blf_addr: String,

    #[serde(default = "default_featurecodes_addr")]
    pub featurecodes_addr: String,

    /// A call socket that stays silent this long is abandoned
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// Root directory for voicemail recordings
    #[serde(default = "default_voicemail_dir")]
    pub voicemail_dir: String,

    /// Timeout for feature code webhooks
    #[serde(default = "default_webhook_timeout")]
    pub webhook_timeout_secs: u64,
}

fn default_callcontrol_addr() -> String {
    "127.0.0.1:9001".to_string()
}

fn default_voicemail_addr() -> String {
    "127.0.0.2:9001".to_string()
}

fn default_queue_addr() -> String {
    "127.0.0.3:9001".to_string()
}

fn default_conference_addr() -> String {
    "127.0.0.4:9001".to_string()
}

fn default_blf_addr() -> String {
    "127.0.0.5:9001".to_string()
}

fn default_featurecodes_addr() -> String {
    "127.0.0.6:9001".to_string()
}

fn default_idle_timeout() -> u64 {
    3600
}

fn default_voicemail_dir() -> String {
    "/var/lib/callsign/voicemail".to_string()
}

fn default_webhook_timeout() -> u64 {
    5
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            callcontrol_addr: default_callcontrol_addr(),
            voicemail_addr: default_voicemail_addr(),
            queue_addr: default_queue_addr(),
            conference_addr: default_conference_addr(),
            blf_addr: default_blf_addr(),
            featurecodes_addr: default_featurecodes_addr(),
            idle_timeout_secs: default_idle_timeout(),
            voicemail_dir: default_voicemail_dir(),
            webhook_timeout_secs: default_webhook_timeout(),
        }
    }
}

impl ServicesConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

/// Document cache lifetimes
#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_configuration_ttl")]
    pub configuration_ttl_secs: u64,

    #[serde(default = "default_directory_ttl")]
    pub directory_ttl_secs: u64,

    #[serde(default = "default_dialplan_ttl")]
    pub dialplan_ttl_secs: u64,

    /// Interval of the background expiry sweep
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

fn default_configuration_ttl() -> u64 {
    3600 // 1 hour
}

fn default_directory_ttl() -> u64 {
    300 // 5 minutes
}

fn default_dialplan_ttl() -> u64 {
    1800 // 30 minutes
}

fn default_sweep_interval() -> u64 {
    300
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            configuration_ttl_secs: default_configuration_ttl(),
            directory_ttl_secs: default_directory_ttl(),
            dialplan_ttl_secs: default_dialplan_ttl(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of the human format
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment and optional config file
    pub fn load() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Start with default values
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("server.workers", num_cpus::get() as i64)?
            .set_default("database.max_connections", 10)?
            .set_default("freeswitch.host", "127.0.0.1")?
            .set_default("freeswitch.port", 8021)?
            .set_default("freeswitch.reconnect_attempts", 10)?
            .set_default("freeswitch.reconnect_delay_ms", 1000)?
            .set_default("cache.sweep_interval_secs", 300)?
            .set_default("logging.level", "info")?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Load from environment variables with CALLSIGN_ prefix
            .add_source(
                Environment::with_prefix("CALLSIGN")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(Environment::with_prefix("CALLSIGN").separator("__"))
            .build()?;

        config.try_deserialize()
    }

    /// Get the server bind address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
