//! Counter extraction from retrieved records.
//!
//! Each record carries a free-text message in which the injector embedded
//! `Test message #<digits>`. The extractor pulls that counter out together
//! with the record identifier and timestamp. Records without the marker are
//! out-of-band traffic and are skipped, not reported.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::backend::SearchHit;
use crate::error::{ConfigError, Result};

/// Field names and marker used by [`CounterExtractor`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractorConfig {
    /// Literal token immediately preceding the counter digits
    pub marker: String,
    /// Source field holding the message text
    pub message_field: String,
    /// Source field holding the record timestamp
    pub timestamp_field: String,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            marker: "Test message #".to_string(),
            message_field: "message".to_string(),
            timestamp_field: "@timestamp".to_string(),
        }
    }
}

/// One counter observation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExtractedEntry {
    pub counter: u64,
    pub record_id: String,
    pub timestamp: String,
}

impl ExtractedEntry {
    #[must_use]
    pub fn new(counter: u64, record_id: impl Into<String>, timestamp: impl Into<String>) -> Self {
        Self {
            counter,
            record_id: record_id.into(),
            timestamp: timestamp.into(),
        }
    }
}

/// Extracts counters from search hits.
#[derive(Debug, Clone)]
pub struct CounterExtractor {
    config: ExtractorConfig,
    pattern: Regex,
}

impl CounterExtractor {
    /// Compile the marker pattern once.
    pub fn new(config: ExtractorConfig) -> Result<Self> {
        if config.marker.is_empty() {
            return Err(ConfigError::ValidationError("marker must not be empty".to_string()).into());
        }
        let source = format!(r"{}([0-9]+)", regex::escape(&config.marker));
        let pattern = Regex::new(&source)
            .map_err(|err| ConfigError::ValidationError(format!("marker pattern: {err}")))?;
        Ok(Self { config, pattern })
    }

    #[must_use]
    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Parse the counter out of a message text.
    ///
    /// The first marker occurrence whose digit run fits in `u64` counts; an
    /// overflowing run is skipped like a missing marker.
    #[must_use]
    pub fn parse_counter(&self, text: &str) -> Option<u64> {
        self.pattern
            .captures_iter(text)
            .find_map(|captures| captures.get(1)?.as_str().parse::<u64>().ok())
    }

    /// Extract an entry from one hit, or `None` when the hit carries no counter.
    #[must_use]
    pub fn extract(&self, hit: &SearchHit) -> Option<ExtractedEntry> {
        let message = hit.source.get(&self.config.message_field)?.as_str()?;
        let Some(counter) = self.parse_counter(message) else {
            tracing::trace!(record_id = %hit.id, "record without counter marker skipped");
            return None;
        };
        let timestamp = match hit.source.get(&self.config.timestamp_field) {
            Some(Value::String(ts)) => ts.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };
        Some(ExtractedEntry {
            counter,
            record_id: hit.id.clone(),
            timestamp,
        })
    }
}
