//! Sequence integrity validation over extracted counters.
//!
//! Treats the extracted entries as an unordered multiset and computes, exactly:
//! - **Unique count** and its match against an expected count
//! - **Gaps**: maximal contiguous runs of counters missing between the lowest
//!   and highest observed values
//! - **Duplicates**: counters observed more than once, with multiplicities
//!
//! A secondary, sampled [`DuplicateDiagnosis`] inspects record identifiers of
//! the most duplicated counters to tell storage-side duplication (same id)
//! from upstream resends (different ids). It is informational only and never
//! feeds into `sequence_valid`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::extract::ExtractedEntry;

/// Number of most-duplicated counters inspected by the identifier diagnosis.
pub const DIAGNOSIS_SAMPLE_SIZE: usize = 5;

// =============================================================================
// Counter index
// =============================================================================

/// Counter value → entries that produced it, in input order per key.
#[derive(Debug, Clone, Default)]
pub struct CounterIndex<'a> {
    by_counter: BTreeMap<u64, Vec<&'a ExtractedEntry>>,
    total: usize,
}

impl<'a> CounterIndex<'a> {
    #[must_use]
    pub fn build(entries: &'a [ExtractedEntry]) -> Self {
        let mut by_counter: BTreeMap<u64, Vec<&'a ExtractedEntry>> = BTreeMap::new();
        for entry in entries {
            by_counter.entry(entry.counter).or_default().push(entry);
        }
        Self {
            by_counter,
            total: entries.len(),
        }
    }

    /// Entries observed for `counter` (empty if never seen).
    #[must_use]
    pub fn get(&self, counter: u64) -> &[&'a ExtractedEntry] {
        self.by_counter.get(&counter).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of occurrences of `counter`.
    #[must_use]
    pub fn frequency(&self, counter: u64) -> usize {
        self.get(counter).len()
    }

    /// Distinct counters in ascending order.
    pub fn counters(&self) -> impl DoubleEndedIterator<Item = u64> + '_ {
        self.by_counter.keys().copied()
    }

    /// `(counter, occurrences)` pairs in ascending counter order.
    pub fn frequencies(&self) -> impl Iterator<Item = (u64, usize)> + '_ {
        self.by_counter.iter().map(|(&counter, list)| (counter, list.len()))
    }

    #[must_use]
    pub fn unique_len(&self) -> usize {
        self.by_counter.len()
    }

    #[must_use]
    pub fn total_len(&self) -> usize {
        self.total
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_counter.is_empty()
    }
}

// =============================================================================
// Result types
// =============================================================================

/// Inclusive range of missing counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Gap {
    pub start: u64,
    pub end: u64,
}

impl Gap {
    #[must_use]
    pub const fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    /// Number of missing counters in this range.
    #[must_use]
    pub const fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    #[must_use]
    pub const fn is_single(&self) -> bool {
        self.start == self.end
    }
}

/// How the entries behind one duplicated counter relate by identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierClass {
    /// Every copy shares one record id: stored twice despite a deterministic key.
    SameIdentifier,
    /// Copies carry different ids: resent before a stable key was assigned.
    DifferentIdentifier,
}

/// Overall reading of the sampled duplicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosisVerdict {
    /// At least one sample had differing ids: record ids are not deterministic
    /// across retries, so duplication happened upstream of the store.
    UpstreamResend,
    /// All samples shared ids: ids are deterministic, yet the store kept
    /// several copies (e.g. writes routed to different backing indices).
    StorageDuplication,
}

/// One inspected duplicated counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateSample {
    pub counter: u64,
    pub copies: u64,
    pub distinct_ids: usize,
    pub class: IdentifierClass,
    /// All entries for this counter, in retrieval order.
    pub entries: Vec<ExtractedEntry>,
}

/// Sampled identifier diagnosis over the most duplicated counters.
///
/// Covers at most `sample_size` counters, so it is a heuristic reading and
/// not a statement about every duplicate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateDiagnosis {
    pub sample_size: usize,
    pub samples: Vec<DuplicateSample>,
    pub same_identifier: usize,
    pub different_identifier: usize,
    pub verdict: DiagnosisVerdict,
}

impl DuplicateDiagnosis {
    /// Inspect the first `sample_size` counters of `ranked` (already ordered
    /// most-duplicated first). Returns `None` when nothing is duplicated.
    #[must_use]
    pub fn sample(index: &CounterIndex<'_>, ranked: &[(u64, u64)], sample_size: usize) -> Option<Self> {
        if ranked.is_empty() || sample_size == 0 {
            return None;
        }

        let samples: Vec<DuplicateSample> = ranked
            .iter()
            .take(sample_size)
            .map(|&(counter, copies)| {
                let entries: Vec<ExtractedEntry> =
                    index.get(counter).iter().map(|&e| e.clone()).collect();
                let mut ids: Vec<&str> = entries.iter().map(|e| e.record_id.as_str()).collect();
                ids.sort_unstable();
                ids.dedup();
                let distinct_ids = ids.len();
                let class = if distinct_ids == 1 {
                    IdentifierClass::SameIdentifier
                } else {
                    IdentifierClass::DifferentIdentifier
                };
                DuplicateSample {
                    counter,
                    copies,
                    distinct_ids,
                    class,
                    entries,
                }
            })
            .collect();

        let different_identifier = samples
            .iter()
            .filter(|s| s.class == IdentifierClass::DifferentIdentifier)
            .count();
        let same_identifier = samples.len() - different_identifier;
        let verdict = if different_identifier > 0 {
            DiagnosisVerdict::UpstreamResend
        } else {
            DiagnosisVerdict::StorageDuplication
        };

        Some(Self {
            sample_size,
            samples,
            same_identifier,
            different_identifier,
            verdict,
        })
    }
}

/// Outcome of one validation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Entries observed, copies included.
    pub total_messages: u64,
    /// Distinct counter values.
    pub unique_messages: u64,
    pub expected_count: Option<u64>,
    /// `unique_messages == expected_count`; false when no expectation was given.
    pub count_match: bool,
    /// No gaps and no duplicates. Independent of `count_match`.
    pub sequence_valid: bool,
    /// Missing ranges, ascending.
    pub gaps: Vec<Gap>,
    /// Duplicated counter → occurrences.
    pub duplicates: BTreeMap<u64, u64>,
    /// Extra copies beyond the first, summed over all duplicated counters.
    pub total_duplicates: u64,
    pub first_counter: Option<u64>,
    pub last_counter: Option<u64>,
    /// Sampled, informational. Never affects `sequence_valid`.
    pub duplicate_diagnosis: Option<DuplicateDiagnosis>,
}

impl ValidationResult {
    fn empty(expected_count: Option<u64>) -> Self {
        Self {
            total_messages: 0,
            unique_messages: 0,
            expected_count,
            count_match: expected_count == Some(0),
            sequence_valid: true,
            gaps: Vec::new(),
            duplicates: BTreeMap::new(),
            total_duplicates: 0,
            first_counter: None,
            last_counter: None,
            duplicate_diagnosis: None,
        }
    }

    /// All checks passed: valid sequence and, when an expectation was given,
    /// matching unique count.
    #[must_use]
    pub fn passed(&self) -> bool {
        self.sequence_valid && (self.expected_count.is_none() || self.count_match)
    }

    /// Total number of missing counters across all gaps.
    #[must_use]
    pub fn total_missing(&self) -> u64 {
        self.gaps.iter().map(Gap::len).sum()
    }

    /// Average copies per distinct counter, `None` when nothing was observed.
    #[must_use]
    pub fn duplication_ratio(&self) -> Option<f64> {
        if self.unique_messages == 0 {
            return None;
        }
        Some(self.total_messages as f64 / self.unique_messages as f64)
    }

    /// Duplicated counters ordered by copies descending, then counter ascending.
    #[must_use]
    pub fn ranked_duplicates(&self) -> Vec<(u64, u64)> {
        rank_duplicates(&self.duplicates)
    }
}

fn rank_duplicates(duplicates: &BTreeMap<u64, u64>) -> Vec<(u64, u64)> {
    let mut ranked: Vec<(u64, u64)> = duplicates.iter().map(|(&k, &v)| (k, v)).collect();
    // BTreeMap iteration is ascending, so a stable sort keeps counter order on ties.
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked
}

// =============================================================================
// Validation
// =============================================================================

/// Validate with the default diagnosis sample size.
#[must_use]
pub fn validate(entries: &[ExtractedEntry], expected_count: Option<u64>) -> ValidationResult {
    validate_with_sample(entries, expected_count, DIAGNOSIS_SAMPLE_SIZE)
}

/// Validate, inspecting up to `sample_size` duplicated counters for the
/// identifier diagnosis.
#[must_use]
pub fn validate_with_sample(
    entries: &[ExtractedEntry],
    expected_count: Option<u64>,
    sample_size: usize,
) -> ValidationResult {
    if entries.is_empty() {
        return ValidationResult::empty(expected_count);
    }

    let index = CounterIndex::build(entries);
    let unique_messages = index.unique_len() as u64;

    let mut duplicates = BTreeMap::new();
    let mut total_duplicates = 0u64;
    for (counter, occurrences) in index.frequencies() {
        if occurrences > 1 {
            duplicates.insert(counter, occurrences as u64);
            total_duplicates += occurrences as u64 - 1;
        }
    }

    let gaps = find_gaps(index.counters());

    let sequence_valid = duplicates.is_empty() && gaps.is_empty();
    let count_match = expected_count.is_some_and(|expected| expected == unique_messages);

    let duplicate_diagnosis =
        DuplicateDiagnosis::sample(&index, &rank_duplicates(&duplicates), sample_size);

    ValidationResult {
        total_messages: entries.len() as u64,
        unique_messages,
        expected_count,
        count_match,
        sequence_valid,
        gaps,
        duplicates,
        total_duplicates,
        first_counter: index.counters().next(),
        last_counter: index.counters().next_back(),
        duplicate_diagnosis,
    }
}

/// Maximal missing ranges between consecutive values of an ascending,
/// duplicate-free counter stream.
pub fn find_gaps(sorted_unique: impl IntoIterator<Item = u64>) -> Vec<Gap> {
    let mut gaps = Vec::new();
    let mut prev: Option<u64> = None;
    for counter in sorted_unique {
        if let Some(p) = prev {
            debug_assert!(counter > p, "counters must be strictly ascending");
            if counter > p + 1 {
                gaps.push(Gap::new(p + 1, counter - 1));
            }
        }
        prev = Some(counter);
    }
    gaps
}
