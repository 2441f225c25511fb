//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::{Result, TelemetryError};
use crate::ingest::protocol::{DEFAULT_MAX_PACKET_SIZE, SHORT_FRAGMENT_THRESHOLD};
use crate::record::Delimiter;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub bus: BusConfig,

    #[serde(default = "default_channels")]
    pub channels: Vec<ChannelConfig>,

    pub modem: ModemConfig,
    pub upload: UploadConfig,
    pub storage: StorageConfig,

    #[serde(default)]
    pub schedule: ScheduleConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Sensor bus configuration (chunk ingestion side)
#[derive(Debug, Deserialize, Clone)]
pub struct BusConfig {
    #[serde(default = "default_bus_port")]
    pub port: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    #[serde(default = "default_max_packet_size")]
    pub max_packet_size: usize,

    #[serde(default = "default_short_fragment_threshold")]
    pub short_fragment_threshold: usize,
}

/// One named input channel and how its frames are recognized
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct ChannelConfig {
    pub name: String,

    /// Token a chunk must start with to open a frame, e.g. `"Temp,"`
    pub header: String,

    /// Column labels written into the day-file header line
    #[serde(default)]
    pub columns: Vec<String>,
}

/// Cellular modem configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ModemConfig {
    #[serde(default = "default_modem_port")]
    pub port: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    #[serde(default = "default_apn")]
    pub apn: String,

    #[serde(default = "default_boot_wait_s")]
    pub boot_wait_s: u64,

    #[serde(default = "default_reset_command")]
    pub reset_command: Option<String>,

    #[serde(default = "default_power_cycle_each_upload")]
    pub power_cycle_each_upload: bool,
}

/// HTTP method used by the modem's HTTP stack
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    /// Numeric action code used by `AT+HTTPACTION`.
    pub fn action_code(&self) -> u8 {
        match self {
            HttpMethod::Get => 0,
            HttpMethod::Post => 1,
        }
    }

    /// Substring that marks a successful request in the action response.
    pub fn success_token(&self) -> String {
        format!("+HTTPACTION: {},200", self.action_code())
    }
}

/// Upload endpoint configuration
#[derive(Debug, Deserialize, Clone)]
pub struct UploadConfig {
    #[serde(default = "default_upload_url")]
    pub url: String,

    pub api_key: String,

    #[serde(default = "default_http_method")]
    pub method: HttpMethod,

    #[serde(default = "default_max_fields")]
    pub max_fields: usize,

    #[serde(default = "default_action_timeout_ms")]
    pub action_timeout_ms: u64,
}

/// Durable storage configuration
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_storage_dir")]
    pub dir: String,

    #[serde(default = "default_delimiter")]
    pub delimiter: Delimiter,

    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,

    #[serde(default = "default_max_files_per_drain")]
    pub max_files_per_drain: usize,

    /// Trailing column for a value the sensor bus does not carry
    #[serde(default)]
    pub aux_column: Option<String>,
}

/// Control loop timing
#[derive(Debug, Deserialize, Clone)]
pub struct ScheduleConfig {
    #[serde(default = "default_sample_interval_s")]
    pub sample_interval_s: u64,

    #[serde(default = "default_drain_interval_s")]
    pub drain_interval_s: u64,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for daily rolling log files; console only when unset
    #[serde(default)]
    pub dir: Option<String>,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            sample_interval_s: default_sample_interval_s(),
            drain_interval_s: default_drain_interval_s(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            dir: None,
        }
    }
}

// Default value functions
fn default_bus_port() -> String { "/dev/ttyUSB1".to_string() }
fn default_baud_rate() -> u32 { 115200 }
fn default_max_packet_size() -> usize { DEFAULT_MAX_PACKET_SIZE }
fn default_short_fragment_threshold() -> usize { SHORT_FRAGMENT_THRESHOLD }

fn default_channels() -> Vec<ChannelConfig> {
    let depths = [10, 20, 30, 40, 50, 60, 70, 80];
    vec![
        ChannelConfig {
            name: "Temp".to_string(),
            header: "Temp,".to_string(),
            columns: depths.iter().map(|d| format!("Temp{}", d)).collect(),
        },
        ChannelConfig {
            name: "Moist".to_string(),
            header: "Moist,".to_string(),
            columns: depths.iter().map(|d| format!("Moist{}", d)).collect(),
        },
    ]
}

fn default_modem_port() -> String { "/dev/ttyUSB2".to_string() }
fn default_apn() -> String { "fast.t-mobile.com".to_string() }
fn default_boot_wait_s() -> u64 { 30 }
fn default_reset_command() -> Option<String> { Some("AT+CRESET".to_string()) }
fn default_power_cycle_each_upload() -> bool { true }

fn default_upload_url() -> String { "http://api.thingspeak.com/update".to_string() }
fn default_http_method() -> HttpMethod { HttpMethod::Get }
fn default_max_fields() -> usize { 8 }
fn default_action_timeout_ms() -> u64 { 30000 }

fn default_storage_dir() -> String { "./data".to_string() }
fn default_delimiter() -> Delimiter { Delimiter::Comma }
fn default_file_prefix() -> String { "DATA_".to_string() }
fn default_max_files_per_drain() -> usize { 32 }

fn default_sample_interval_s() -> u64 { 3600 }
fn default_drain_interval_s() -> u64 { 86400 }

fn default_log_level() -> String { "info".to_string() }

const VALID_BAUD_RATES: &[u32] = &[9600, 19200, 38400, 57600, 115200, 230400, 460800, 921600];

fn invalid(message: impl std::fmt::Display) -> TelemetryError {
    TelemetryError::Config(toml::de::Error::custom(message))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use field_telemetry_node::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse and validate configuration from TOML text.
    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Modem boot wait as a duration
    pub fn boot_wait(&self) -> Duration {
        Duration::from_secs(self.modem.boot_wait_s)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    fn validate(&self) -> Result<()> {
        if self.bus.port.is_empty() {
            return Err(invalid("bus port cannot be empty"));
        }

        if self.modem.port.is_empty() {
            return Err(invalid("modem port cannot be empty"));
        }

        for (name, baud) in [("bus", self.bus.baud_rate), ("modem", self.modem.baud_rate)] {
            if !VALID_BAUD_RATES.contains(&baud) {
                return Err(invalid(format!(
                    "{} baud_rate must be one of: {:?}",
                    name, VALID_BAUD_RATES
                )));
            }
        }

        if self.bus.max_packet_size == 0 || self.bus.max_packet_size > 255 {
            return Err(invalid("max_packet_size must be between 1 and 255"));
        }

        // A threshold above the packet size would close every frame on its
        // first continuation.
        if self.bus.short_fragment_threshold == 0
            || self.bus.short_fragment_threshold > self.bus.max_packet_size
        {
            return Err(invalid(
                "short_fragment_threshold must be between 1 and max_packet_size",
            ));
        }

        if self.channels.is_empty() {
            return Err(invalid("at least one channel must be configured"));
        }

        for (i, channel) in self.channels.iter().enumerate() {
            if channel.name.is_empty() || channel.header.is_empty() {
                return Err(invalid(format!("channel {} needs a name and a header", i)));
            }
            for other in &self.channels[i + 1..] {
                if other.name == channel.name {
                    return Err(invalid(format!("duplicate channel name {:?}", channel.name)));
                }
                if other.header.starts_with(&channel.header)
                    || channel.header.starts_with(&other.header)
                {
                    return Err(invalid(format!(
                        "channel headers {:?} and {:?} overlap",
                        channel.header, other.header
                    )));
                }
            }
        }

        if self.modem.boot_wait_s > 120 {
            return Err(invalid("boot_wait_s must be at most 120"));
        }

        if self.modem.apn.is_empty() {
            return Err(invalid("modem apn cannot be empty"));
        }

        if !(self.upload.url.starts_with("http://") || self.upload.url.starts_with("https://")) {
            return Err(invalid("upload url must start with http:// or https://"));
        }

        if self.upload.api_key.is_empty() {
            return Err(invalid("upload api_key cannot be empty"));
        }

        if self.upload.max_fields == 0 || self.upload.max_fields > 64 {
            return Err(invalid("max_fields must be between 1 and 64"));
        }

        if self.upload.action_timeout_ms < 1000 || self.upload.action_timeout_ms > 120000 {
            return Err(invalid("action_timeout_ms must be between 1000 and 120000"));
        }

        if self.storage.dir.is_empty() {
            return Err(invalid("storage dir cannot be empty"));
        }

        if self.storage.file_prefix.is_empty()
            || !self
                .storage
                .file_prefix
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(invalid("file_prefix must be non-empty ASCII alphanumerics, '_' or '-'"));
        }

        if self.storage.max_files_per_drain == 0 {
            return Err(invalid("max_files_per_drain must be greater than 0"));
        }

        if self.schedule.sample_interval_s == 0 || self.schedule.drain_interval_s == 0 {
            return Err(invalid("schedule intervals must be greater than 0"));
        }

        if self.logging.level.parse::<tracing::Level>().is_err() {
            return Err(invalid(format!("unknown log level {:?}", self.logging.level)));
        }

        Ok(())
    }
}
