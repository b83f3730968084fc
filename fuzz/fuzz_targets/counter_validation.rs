#![no_main]

use std::sync::OnceLock;

use seqcheck_core::backend::SearchHit;
use seqcheck_core::extract::{CounterExtractor, ExtractedEntry, ExtractorConfig};
use seqcheck_core::report::{RunReport, render_plain};
use seqcheck_core::scroll::Harvest;
use seqcheck_core::validate::validate;
use libfuzzer_sys::fuzz_target;

fn extractor() -> &'static CounterExtractor {
    static EXTRACTOR: OnceLock<CounterExtractor> = OnceLock::new();
    EXTRACTOR.get_or_init(|| {
        CounterExtractor::new(ExtractorConfig::default()).expect("default marker compiles")
    })
}

fn hit_for(line: &str, seq: usize) -> SearchHit {
    let mut source = serde_json::Map::new();
    source.insert("message".to_string(), serde_json::Value::String(line.to_string()));
    source.insert(
        "@timestamp".to_string(),
        serde_json::Value::String(format!("2024-05-01T00:00:{:02}Z", seq % 60)),
    );
    SearchHit {
        // Low cardinality so duplicates land on both identifier classes.
        id: format!("doc-{}", seq % 7),
        source,
    }
}

fuzz_target!(|data: &[u8]| {
    let text = String::from_utf8_lossy(data);
    let extractor = extractor();

    // Free text straight through the pattern.
    let _ = extractor.parse_counter(&text);

    // Each line as a record; small counters from raw bytes as extra records.
    let mut entries: Vec<ExtractedEntry> = text
        .lines()
        .enumerate()
        .filter_map(|(seq, line)| extractor.extract(&hit_for(line, seq)))
        .collect();
    for (seq, chunk) in data.chunks(2).enumerate() {
        let counter = chunk.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b)) % 512;
        let line = format!("Test message #{counter}");
        if let Some(entry) = extractor.extract(&hit_for(&line, seq)) {
            assert_eq!(entry.counter, counter);
            entries.push(entry);
        }
    }

    let expected = data.first().map(|&b| u64::from(b));
    let result = validate(&entries, expected);

    assert_eq!(result.total_messages, entries.len() as u64);
    assert_eq!(
        result.unique_messages + result.total_duplicates,
        result.total_messages
    );
    assert_eq!(
        result.sequence_valid,
        result.gaps.is_empty() && result.duplicates.is_empty()
    );
    for pair in result.gaps.windows(2) {
        assert!(pair[0].end + 1 < pair[1].start);
    }

    let harvest = Harvest {
        documents_fetched: entries.len() as u64,
        entries,
        pages: 1,
        skipped: 0,
    };
    let report = RunReport::new("fuzz", harvest.documents_fetched, &harvest, result);
    let _ = render_plain(&report);
});
