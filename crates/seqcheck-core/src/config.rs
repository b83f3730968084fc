//! Configuration management for seqcheck
//!
//! Handles loading and validation of `seqcheck.toml`. Every field has a
//! default so an empty file (or no file at all) is a valid configuration;
//! command-line flags are layered on top by the binary.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, Result};
use crate::extract::ExtractorConfig;
use crate::logging::LogConfig;

/// File name looked up under the user config directory.
pub const CONFIG_FILE_NAME: &str = "seqcheck.toml";

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-friendly output
    #[default]
    Pretty,
    /// JSON lines
    Json,
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pretty => f.write_str("pretty"),
            Self::Json => f.write_str("json"),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            _ => Err(format!("unknown log format: {s}. Expected pretty or json")),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Search backend connection
    #[serde(default)]
    pub backend: BackendConfig,

    /// Scan and extraction settings
    #[serde(default)]
    pub scan: ScanConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LogConfig,
}

/// Search backend connection settings
#[derive(Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Host name or address
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Index (or data stream / alias) holding the test messages
    #[serde(default)]
    pub index: String,

    /// Basic-auth user name
    #[serde(default)]
    pub user: Option<String>,

    /// Basic-auth password; never serialized back out
    #[serde(default, skip_serializing)]
    pub password: Option<String>,

    /// Talk HTTPS instead of HTTP
    #[serde(default = "default_true")]
    pub use_tls: bool,

    /// Verify the server certificate chain
    #[serde(default)]
    pub verify_tls: bool,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl std::fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("index", &self.index)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("use_tls", &self.use_tls)
            .field("verify_tls", &self.verify_tls)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            index: String::new(),
            user: None,
            password: None,
            use_tls: true,
            verify_tls: false,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl BackendConfig {
    /// Base URL without trailing slash, e.g. `https://localhost:9200`.
    #[must_use]
    pub fn base_url(&self) -> String {
        let scheme = if self.use_tls { "https" } else { "http" };
        format!("{scheme}://{}:{}", self.host, self.port)
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    9200
}

fn default_true() -> bool {
    true
}

fn default_request_timeout_secs() -> u64 {
    30
}

/// Scan configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Documents per scroll page
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// How long the backend keeps the scroll cursor alive between pages
    #[serde(default = "default_scroll_ttl_secs")]
    pub scroll_ttl_secs: u64,

    /// Deadline for the whole scan; unset means no deadline
    #[serde(default)]
    pub run_timeout_secs: Option<u64>,

    /// Literal token preceding the counter digits
    #[serde(default = "default_marker")]
    pub marker: String,

    /// Source field carrying the message text
    #[serde(default = "default_message_field")]
    pub message_field: String,

    /// Source field carrying the record timestamp (primary sort key)
    #[serde(default = "default_timestamp_field")]
    pub timestamp_field: String,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            scroll_ttl_secs: default_scroll_ttl_secs(),
            run_timeout_secs: None,
            marker: default_marker(),
            message_field: default_message_field(),
            timestamp_field: default_timestamp_field(),
        }
    }
}

impl ScanConfig {
    #[must_use]
    pub fn scroll_ttl(&self) -> Duration {
        Duration::from_secs(self.scroll_ttl_secs)
    }

    #[must_use]
    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout_secs.map(Duration::from_secs)
    }

    /// Extraction settings derived from this scan config.
    #[must_use]
    pub fn extractor_config(&self) -> ExtractorConfig {
        ExtractorConfig {
            marker: self.marker.clone(),
            message_field: self.message_field.clone(),
            timestamp_field: self.timestamp_field.clone(),
        }
    }
}

fn default_page_size() -> usize {
    10_000
}

fn default_scroll_ttl_secs() -> u64 {
    120
}

fn default_marker() -> String {
    "Test message #".to_string()
}

fn default_message_field() -> String {
    "message".to_string()
}

fn default_timestamp_field() -> String {
    "@timestamp".to_string()
}

impl Config {
    /// Default config file location (`$XDG_CONFIG_HOME/seqcheck/seqcheck.toml`).
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("seqcheck").join(CONFIG_FILE_NAME))
    }

    /// Load configuration.
    ///
    /// An explicit path must exist. Without one, the default location is used
    /// when present and built-in defaults otherwise.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from(path);
        }
        match Self::default_path() {
            Some(path) if path.is_file() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let display = path.display().to_string();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(display).into());
        }
        let text = std::fs::read_to_string(path)
            .map_err(|err| ConfigError::ReadFailed(display.clone(), err.to_string()))?;
        Self::from_toml_str(&text)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|err| ConfigError::ParseFailed(err.to_string()).into())
    }

    /// Check the fields a scan depends on.
    pub fn validate(&self) -> Result<()> {
        if self.backend.host.trim().is_empty() {
            return fail("backend.host must not be empty");
        }
        if self.backend.index.trim().is_empty() {
            return fail("backend.index must not be empty");
        }
        if self.backend.user.is_some() && self.backend.password.is_none() {
            return fail("backend.user is set but no password was provided");
        }
        if self.backend.request_timeout_secs == 0 {
            return fail("backend.request_timeout_secs must be >= 1");
        }
        if self.scan.page_size == 0 {
            return fail("scan.page_size must be >= 1");
        }
        if self.scan.scroll_ttl_secs == 0 {
            return fail("scan.scroll_ttl_secs must be >= 1");
        }
        if self.scan.run_timeout_secs == Some(0) {
            return fail("scan.run_timeout_secs must be >= 1 when set");
        }
        if self.scan.marker.is_empty() {
            return fail("scan.marker must not be empty");
        }
        if self.scan.message_field.is_empty() || self.scan.timestamp_field.is_empty() {
            return fail("scan field names must not be empty");
        }
        Ok(())
    }
}

/// Command-line values layered over the loaded file. `None` keeps the file
/// value; boolean switches only ever turn their setting on.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub index: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub no_tls: bool,
    pub verify_tls: bool,
    pub page_size: Option<usize>,
    pub scroll_ttl_secs: Option<u64>,
    pub run_timeout_secs: Option<u64>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
    pub log_file: Option<PathBuf>,
}

impl Config {
    /// Apply command-line overrides on top of file values.
    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        let backend = &mut self.backend;
        if let Some(host) = overrides.host {
            backend.host = host;
        }
        if let Some(port) = overrides.port {
            backend.port = port;
        }
        if let Some(index) = overrides.index {
            backend.index = index;
        }
        if overrides.user.is_some() {
            backend.user = overrides.user;
        }
        if overrides.password.is_some() {
            backend.password = overrides.password;
        }
        if overrides.no_tls {
            backend.use_tls = false;
        }
        if overrides.verify_tls {
            backend.verify_tls = true;
        }

        let scan = &mut self.scan;
        if let Some(page_size) = overrides.page_size {
            scan.page_size = page_size;
        }
        if let Some(ttl) = overrides.scroll_ttl_secs {
            scan.scroll_ttl_secs = ttl;
        }
        if overrides.run_timeout_secs.is_some() {
            scan.run_timeout_secs = overrides.run_timeout_secs;
        }

        let logging = &mut self.logging;
        if let Some(level) = overrides.log_level {
            logging.level = level;
        }
        if let Some(format) = overrides.log_format {
            logging.format = format;
        }
        if overrides.log_file.is_some() {
            logging.file = overrides.log_file;
        }
    }
}

fn fail(msg: &str) -> Result<()> {
    Err(ConfigError::ValidationError(msg.to_string()).into())
}
