//! Error types for seqcheck-core
//!
//! Every variant here is an infrastructure failure: the fetch could not be
//! completed. A completed fetch whose counters fail the integrity check is
//! reported through [`crate::validate::ValidationResult`], never as an error.

use std::fmt::Write;
use thiserror::Error;

/// Remediation command for resolving an error
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RemediationCommand {
    /// Short label describing the command purpose
    pub label: String,
    /// Command to run
    pub command: String,
}

/// Actionable remediation guidance for an error
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Remediation {
    /// One-line summary of how to fix the issue
    pub summary: String,
    /// Suggested commands to resolve or diagnose the issue
    pub commands: Vec<RemediationCommand>,
    /// Additional alternative guidance
    pub alternatives: Vec<String>,
}

impl Remediation {
    /// Create a new remediation with a summary
    #[must_use]
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            commands: Vec::new(),
            alternatives: Vec::new(),
        }
    }

    /// Add a diagnostic command
    #[must_use]
    pub fn command(mut self, label: impl Into<String>, command: impl Into<String>) -> Self {
        self.commands.push(RemediationCommand {
            label: label.into(),
            command: command.into(),
        });
        self
    }

    /// Add an alternative suggestion
    #[must_use]
    pub fn alternative(mut self, alternative: impl Into<String>) -> Self {
        self.alternatives.push(alternative.into());
        self
    }

    /// Render remediation text for human-readable output
    #[must_use]
    pub fn render_plain(&self) -> String {
        let mut output = String::new();
        let _ = writeln!(output, "To fix:");
        let _ = writeln!(output, "  {}", self.summary);

        if !self.commands.is_empty() {
            let _ = writeln!(output, "  Commands:");
            for cmd in &self.commands {
                let _ = writeln!(output, "    - {}: {}", cmd.label, cmd.command);
            }
        }

        if !self.alternatives.is_empty() {
            let _ = writeln!(output, "  Alternatives:");
            for alt in &self.alternatives {
                let _ = writeln!(output, "    - {alt}");
            }
        }

        output
    }
}

/// Result type alias using the library's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for seqcheck-core
#[derive(Error, Debug)]
pub enum Error {
    /// Search backend errors (transport, auth, protocol)
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// The whole scan exceeded its deadline
    #[error("Scan timed out after {secs} seconds")]
    Timeout { secs: u64 },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Return remediation guidance when available.
    #[must_use]
    pub fn remediation(&self) -> Option<Remediation> {
        match self {
            Self::Backend(err) => Some(err.remediation()),
            Self::Config(err) => Some(err.remediation()),
            Self::Timeout { secs } => Some(
                Remediation::new(format!(
                    "The scan did not finish within {secs} seconds. Raise the limit or enlarge pages."
                ))
                .command("Longer deadline", "seqcheck --timeout-secs 3600 ...")
                .alternative("Increase --page-size to reduce the number of round trips."),
            ),
            Self::Io(_) => Some(
                Remediation::new("Check filesystem permissions and paths, then retry.")
                    .alternative("Verify the log file directory exists and is writable."),
            ),
            Self::Json(_) => Some(
                Remediation::new("Serialising the report failed; retry without --json.")
                    .alternative("Report the issue together with the index name."),
            ),
        }
    }
}

/// Backend operation that produced an error, used for diagnostics only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendOp {
    Count,
    OpenScroll,
    ContinueScroll,
    ReleaseScroll,
}

impl BackendOp {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Count => "count",
            Self::OpenScroll => "open scroll",
            Self::ContinueScroll => "continue scroll",
            Self::ReleaseScroll => "release scroll",
        }
    }
}

impl std::fmt::Display for BackendOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Search backend errors
#[derive(Error, Debug)]
pub enum BackendError {
    /// Connection, TLS or timeout failure before a response arrived
    #[error("{op} request failed: {message}")]
    Transport { op: BackendOp, message: String },

    /// Credentials were rejected
    #[error("{op} request rejected with HTTP {status}: check credentials")]
    Auth { op: BackendOp, status: u16 },

    /// Non-success HTTP status other than an auth rejection
    #[error("{op} request returned HTTP {status}: {body}")]
    Status {
        op: BackendOp,
        status: u16,
        body: String,
    },

    /// Response arrived but could not be decoded
    #[error("{op} response malformed: {message}")]
    Protocol { op: BackendOp, message: String },
}

impl BackendError {
    /// Operation that failed.
    #[must_use]
    pub const fn op(&self) -> BackendOp {
        match self {
            Self::Transport { op, .. }
            | Self::Auth { op, .. }
            | Self::Status { op, .. }
            | Self::Protocol { op, .. } => *op,
        }
    }

    /// True for rejected credentials.
    #[must_use]
    pub const fn is_auth(&self) -> bool {
        matches!(self, Self::Auth { .. })
    }

    #[must_use]
    pub fn remediation(&self) -> Remediation {
        match self {
            Self::Transport { .. } => {
                Remediation::new("The search backend could not be reached. Check host, port and TLS mode.")
                    .command("Probe endpoint", "curl -k https://HOST:9200/")
                    .alternative("Pass --no-ssl when the cluster serves plain HTTP.")
            }
            Self::Auth { .. } => Remediation::new("The backend rejected the credentials.")
                .command("Verify credentials", "curl -k -u USER https://HOST:9200/_cluster/health")
                .alternative("Supply the password through SEQCHECK_PASSWORD."),
            Self::Status { status: 404, .. } => {
                Remediation::new("The index does not exist on this cluster.")
                    .command("List indices", "curl -k -u USER https://HOST:9200/_cat/indices")
                    .alternative("Check the --index value for typos.")
            }
            Self::Status { .. } => Remediation::new("The backend refused the request.")
                .command("Cluster health", "curl -k -u USER https://HOST:9200/_cluster/health")
                .alternative("Inspect the backend logs for the rejected request."),
            Self::Protocol { .. } => {
                Remediation::new("The backend answered with an unexpected response shape.")
                    .command("Server version", "curl -k -u USER https://HOST:9200/")
                    .alternative("Confirm the endpoint is an OpenSearch/Elasticsearch node.")
            }
        }
    }
}

/// Configuration-specific errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to read config file {0}: {1}")]
    ReadFailed(String, String),

    #[error("Failed to parse config: {0}")]
    ParseFailed(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl ConfigError {
    #[must_use]
    pub fn remediation(&self) -> Remediation {
        match self {
            Self::FileNotFound(path) => Remediation::new(format!(
                "Config file not found: {path}. Verify the path and retry."
            ))
            .command("Check path", format!("ls -l \"{path}\""))
            .alternative("Pass --config with the correct path."),
            Self::ReadFailed(path, _) => Remediation::new(format!(
                "Failed to read config file: {path}. Check permissions."
            ))
            .command("Check permissions", format!("ls -l \"{path}\""))
            .alternative("Ensure the file is readable by the current user."),
            Self::ParseFailed(_) => Remediation::new("Config parse failed. Fix the TOML syntax and retry.")
                .command("Show config", "cat ~/.config/seqcheck/seqcheck.toml")
                .alternative("Remove unknown keys and check value types."),
            Self::ValidationError(_) => {
                Remediation::new("Config validation failed. Fix the invalid fields and retry.")
                    .command("Show help", "seqcheck --help")
                    .alternative("Review validation errors and adjust seqcheck.toml or flags.")
            }
        }
    }
}

/// Format an error with remediation guidance for display.
#[must_use]
pub fn format_error_with_remediation(error: &Error) -> String {
    let mut output = format!("Error: {error}");
    if let Some(remediation) = error.remediation() {
        output.push('\n');
        output.push('\n');
        output.push_str(&remediation.render_plain());
    }
    output
}
