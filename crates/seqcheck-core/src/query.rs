//! Query documents sent to the search backend.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::extract::ExtractorConfig;

/// Field used to break ties on the primary sort key. Unique per document,
/// so pagination never skips or repeats records sharing a timestamp.
pub const TIE_BREAKER_FIELD: &str = "_id";

/// Selects and orders the documents of one scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryTemplate {
    /// Index, alias or data stream to search
    pub index: String,
    /// Query clause (`{"match_all": {}}` for a full scan)
    pub query: Value,
    /// Sort clauses; must end with a unique field
    pub sort: Vec<Value>,
    /// `_source` fields to return
    pub source_fields: Vec<String>,
}

impl QueryTemplate {
    /// Every document of `index`, ordered by timestamp then `_id`.
    #[must_use]
    pub fn match_all(index: impl Into<String>, fields: &ExtractorConfig) -> Self {
        Self {
            index: index.into(),
            query: json!({ "match_all": {} }),
            sort: vec![
                json!({ fields.timestamp_field.as_str(): "asc" }),
                json!({ TIE_BREAKER_FIELD: "asc" }),
            ],
            source_fields: vec![fields.message_field.clone(), fields.timestamp_field.clone()],
        }
    }

    /// Body of the initial scroll search.
    #[must_use]
    pub fn to_search_body(&self, page_size: usize) -> Value {
        json!({
            "query": self.query,
            "size": page_size,
            "sort": self.sort,
            "_source": self.source_fields,
        })
    }

    /// Body of the count-only search.
    #[must_use]
    pub fn to_count_body(&self) -> Value {
        json!({
            "query": self.query,
            "size": 0,
            "track_total_hits": true,
        })
    }
}
