//! seqcheck - sequence integrity oracle for log ingestion pipelines
//!
//! Reads every `Test message #N` record back from an OpenSearch/Elasticsearch
//! index and reports gaps, duplicates and count mismatches.
//!
//! Exit codes: 0 all checks passed, 1 integrity or count check failed,
//! 2 the scan could not be completed (connection, auth, config, timeout).

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info};

use seqcheck_core::backend::{OpenSearchBackend, SearchBackend};
use seqcheck_core::config::{Config, ConfigOverrides, LogFormat};
use seqcheck_core::error::format_error_with_remediation;
use seqcheck_core::extract::CounterExtractor;
use seqcheck_core::logging::init_logging;
use seqcheck_core::query::QueryTemplate;
use seqcheck_core::report::{RunReport, group_thousands, render_plain};
use seqcheck_core::scroll::{ScanOptions, scan_entries};
use seqcheck_core::validate::validate;

/// Exit code when the scan completed but an integrity check failed.
const EXIT_VALIDATION_FAILED: u8 = 1;
/// Exit code when the scan could not be completed.
const EXIT_INFRASTRUCTURE: u8 = 2;

#[derive(Parser, Debug)]
#[command(
    name = "seqcheck",
    version,
    about = "Validate message sequence integrity in an OpenSearch index",
    long_about = "Reads every record of an index, extracts the `Test message #N` counter \
                  and reports missing counters, duplicated counters and whether the unique \
                  count matches the number of messages sent."
)]
struct Cli {
    /// Search host (overrides config)
    #[arg(long)]
    host: Option<String>,

    /// Search port [default: 9200]
    #[arg(long)]
    port: Option<u16>,

    /// Index, alias or data stream to validate
    #[arg(long)]
    index: Option<String>,

    /// Basic-auth user
    #[arg(long)]
    user: Option<String>,

    /// Basic-auth password
    #[arg(long, env = "SEQCHECK_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Number of messages the injector sent
    #[arg(long)]
    expected_count: Option<u64>,

    /// Use plain HTTP instead of HTTPS
    #[arg(long)]
    no_ssl: bool,

    /// Verify the server certificate (off by default for self-signed test clusters)
    #[arg(long)]
    verify_tls: bool,

    /// Print the report as JSON on stdout
    #[arg(long)]
    json: bool,

    /// Documents per scroll page
    #[arg(long)]
    page_size: Option<usize>,

    /// Scroll cursor keep-alive between pages, in seconds
    #[arg(long)]
    scroll_ttl_secs: Option<u64>,

    /// Deadline for the whole scan, in seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Path to seqcheck.toml
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Log format (pretty or json)
    #[arg(long)]
    log_format: Option<LogFormat>,

    /// Append logs to this file as well as stderr
    #[arg(long)]
    log_file: Option<PathBuf>,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            host: self.host.clone(),
            port: self.port,
            index: self.index.clone(),
            user: self.user.clone(),
            password: self.password.clone(),
            no_tls: self.no_ssl,
            verify_tls: self.verify_tls,
            page_size: self.page_size,
            scroll_ttl_secs: self.scroll_ttl_secs,
            run_timeout_secs: self.timeout_secs,
            log_level: self.log_level.clone(),
            log_format: self.log_format,
            log_file: self.log_file.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(&cli).await {
        Ok(report) if report.passed() => ExitCode::SUCCESS,
        Ok(_) => ExitCode::from(EXIT_VALIDATION_FAILED),
        Err(err) => {
            match err.downcast_ref::<seqcheck_core::Error>() {
                Some(core) => eprintln!("{}", format_error_with_remediation(core)),
                None => eprintln!("Error: {err:#}"),
            }
            ExitCode::from(EXIT_INFRASTRUCTURE)
        }
    }
}

async fn run(cli: &Cli) -> Result<RunReport> {
    let mut config = Config::load(cli.config.as_deref())?;
    config.apply_overrides(cli.overrides());
    config.validate()?;

    init_logging(&config.logging).context("failed to initialize logging")?;
    debug!(backend = ?config.backend, "configuration loaded");

    let index = config.backend.index.clone();
    if !cli.json {
        println!("Validating data in index: {index}");
        println!("Host: {}:{}", config.backend.host, config.backend.port);
        println!();
    }

    let backend = OpenSearchBackend::new(&config.backend)?;
    let extractor = CounterExtractor::new(config.scan.extractor_config())?;
    let template = QueryTemplate::match_all(index.clone(), extractor.config());

    let total = backend
        .count(&template)
        .await
        .map_err(seqcheck_core::Error::from)?;
    info!(index = %index, documents = total, "index document count");
    if !cli.json {
        println!("Total documents in index: {}", group_thousands(total));
        if let Some(expected) = cli.expected_count {
            println!("Expected count: {}", group_thousands(expected));
        }
        println!();
        println!("Extracting message counters...");
    }

    let options = ScanOptions::from_config(&config.scan);
    let harvest = scan_entries(&backend, &template, &options, &extractor).await?;

    let result = validate(&harvest.entries, cli.expected_count);
    let report = RunReport::new(index, total, &harvest, result);

    if cli.json {
        println!("{}", report.to_json_pretty()?);
    } else {
        println!();
        print!("{}", render_plain(&report));
    }

    Ok(report)
}
