//! seqcheck-core: Core library for seqcheck
//!
//! An integrity oracle for log ingestion pipelines. A test harness emits
//! syslog lines carrying `Test message #<n>`; after ingestion, seqcheck reads
//! every stored record back from OpenSearch/Elasticsearch and reports
//! missing counters, duplicated counters, and whether the unique count
//! matches what was sent.
//!
//! # Architecture
//!
//! ```text
//! OpenSearch ─scroll→ ScrollSession → CounterExtractor → validate → RunReport
//!                        (cursor)       (Test message #N)   (gaps, dups)
//! ```
//!
//! # Modules
//!
//! - `query`: Query template (match-all, timestamp then `_id` ordering)
//! - `backend`: `SearchBackend` trait and the reqwest-based OpenSearch client
//! - `scroll`: Cursor-owning page sequence and the scan driver
//! - `extract`: Counter extraction from record messages
//! - `validate`: Gap, duplicate and count analysis with identifier diagnosis
//! - `report`: JSON and plain-text run reports
//! - `config`: TOML configuration
//! - `logging`: tracing subscriber setup
//! - `error`: Error taxonomy with remediation hints
//!
//! # Safety
//!
//! This crate forbids unsafe code.

#![forbid(unsafe_code)]

pub mod backend;
pub mod config;
pub mod error;
pub mod extract;
pub mod logging;
pub mod query;
pub mod report;
pub mod scroll;
pub mod validate;

pub use error::{Error, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
