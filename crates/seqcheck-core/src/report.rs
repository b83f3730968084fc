//! Run report: JSON document and human-readable rendering.

use std::fmt::Write;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::scroll::Harvest;
use crate::validate::{IdentifierClass, ValidationResult};

/// Duplicated counters listed before the remainder is summarised.
const MAX_LISTED_DUPLICATES: usize = 10;
/// Gaps listed before the remainder is summarised.
const MAX_LISTED_GAPS: usize = 10;
/// Entries shown per differing diagnosis sample.
const MAX_SAMPLE_ENTRIES: usize = 4;

/// Everything one run found, ready for output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub index: String,
    /// Upfront count reported by the backend (informational).
    pub total_documents: u64,
    pub documents_fetched: u64,
    pub pages: u64,
    /// Fetched documents that carried no counter.
    pub skipped_documents: u64,
    pub checked_at: DateTime<Utc>,
    pub result: ValidationResult,
}

impl RunReport {
    /// Assemble a report for a finished scan, stamped with the current time.
    #[must_use]
    pub fn new(
        index: impl Into<String>,
        total_documents: u64,
        harvest: &Harvest,
        result: ValidationResult,
    ) -> Self {
        Self {
            index: index.into(),
            total_documents,
            documents_fetched: harvest.documents_fetched,
            pages: harvest.pages,
            skipped_documents: harvest.skipped,
            checked_at: Utc::now(),
            result,
        }
    }

    #[must_use]
    pub fn passed(&self) -> bool {
        self.result.passed()
    }

    /// Pretty-printed JSON.
    pub fn to_json_pretty(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Group digits in thousands: `1234567` -> `1,234,567`.
#[must_use]
pub fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Render the human-readable report. No colour codes.
#[must_use]
pub fn render_plain(report: &RunReport) -> String {
    let result = &report.result;
    let mut output = String::new();

    let _ = writeln!(output, "=== Validation Results ===");
    let _ = writeln!(output, "Index: {}", report.index);
    let _ = writeln!(
        output,
        "Documents in index: {}",
        group_thousands(report.total_documents)
    );
    let _ = writeln!(
        output,
        "Documents fetched: {} in {} pages ({} without counter)",
        group_thousands(report.documents_fetched),
        report.pages,
        group_thousands(report.skipped_documents)
    );
    let _ = writeln!(output, "Counters extracted: {}", group_thousands(result.total_messages));
    let _ = writeln!(output, "Unique messages: {}", group_thousands(result.unique_messages));

    if let (Some(first), Some(last)) = (result.first_counter, result.last_counter) {
        let _ = writeln!(output, "Counter range: {first} to {last}");
    }

    if let Some(expected) = result.expected_count {
        let status = if result.count_match { "✓ PASS" } else { "✗ FAIL" };
        let _ = writeln!(output, "Unique count vs expected ({expected}): {status}");
    }

    if result.total_duplicates > 0 {
        render_duplicates(&mut output, result);
    }

    if result.sequence_valid {
        let _ = writeln!(output, "\nSequence integrity: ✓ PASS (no gaps or duplicates)");
    } else if !result.gaps.is_empty() {
        let _ = writeln!(
            output,
            "\nGaps found ({} gaps, {} missing counters):",
            result.gaps.len(),
            group_thousands(result.total_missing())
        );
        for gap in result.gaps.iter().take(MAX_LISTED_GAPS) {
            if gap.is_single() {
                let _ = writeln!(output, "  - Missing: {}", gap.start);
            } else {
                let _ = writeln!(
                    output,
                    "  - Missing: {} to {} ({} values)",
                    gap.start,
                    gap.end,
                    gap.len()
                );
            }
        }
        if result.gaps.len() > MAX_LISTED_GAPS {
            let _ = writeln!(output, "  ... and {} more", result.gaps.len() - MAX_LISTED_GAPS);
        }
    } else {
        let _ = writeln!(output, "\nSequence: ✓ No gaps (all counters present), but duplicates exist");
    }

    let _ = writeln!(output);
    if result.passed() {
        let _ = writeln!(output, "✓ All validation checks passed!");
    } else {
        let _ = writeln!(output, "✗ Validation failed!");
    }
    output
}

fn render_duplicates(output: &mut String, result: &ValidationResult) {
    let ratio = result.duplication_ratio().unwrap_or(0.0);
    let _ = writeln!(
        output,
        "\nDuplicates: {} extra copies ({ratio:.1}x average duplication)",
        group_thousands(result.total_duplicates)
    );

    let ranked = result.ranked_duplicates();
    let _ = writeln!(
        output,
        "Most duplicated values (showing top {MAX_LISTED_DUPLICATES} of {}):",
        group_thousands(ranked.len() as u64)
    );
    for (counter, copies) in ranked.iter().take(MAX_LISTED_DUPLICATES) {
        let _ = writeln!(output, "  - Counter {counter}: {copies} copies");
    }
    if ranked.len() > MAX_LISTED_DUPLICATES {
        let _ = writeln!(output, "  ... and {} more", ranked.len() - MAX_LISTED_DUPLICATES);
    }

    let Some(diagnosis) = &result.duplicate_diagnosis else {
        return;
    };
    let _ = writeln!(output, "\n--- Record Identifier Diagnosis ---");
    for sample in diagnosis
        .samples
        .iter()
        .filter(|s| s.class == IdentifierClass::DifferentIdentifier)
    {
        let _ = writeln!(output, "  Counter {} ({} copies):", sample.counter, sample.copies);
        for entry in sample.entries.iter().take(MAX_SAMPLE_ENTRIES) {
            let _ = writeln!(output, "    _id={}  @timestamp={}", entry.record_id, entry.timestamp);
        }
        if sample.entries.len() > MAX_SAMPLE_ENTRIES {
            let _ = writeln!(output, "    ... and {} more", sample.entries.len() - MAX_SAMPLE_ENTRIES);
        }
    }

    let sampled = diagnosis.samples.len();
    if diagnosis.different_identifier > 0 {
        let _ = writeln!(
            output,
            "\n  → {}/{sampled} sampled duplicates have DIFFERENT _id values",
            diagnosis.different_identifier
        );
        let _ = writeln!(output, "  → Record ids are NOT deterministic for retried records");
        let _ = writeln!(
            output,
            "  → Possible cause: record content changes between original send and retry"
        );
    } else if diagnosis.same_identifier > 0 {
        let _ = writeln!(
            output,
            "\n  → {}/{sampled} sampled duplicates share the SAME _id",
            diagnosis.same_identifier
        );
        let _ = writeln!(output, "  → Record ids ARE deterministic, but the store kept duplicates anyway");
        let _ = writeln!(
            output,
            "  → Possible cause: data stream routing to different backing indices"
        );
    }
}
