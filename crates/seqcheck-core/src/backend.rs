//! Search backend boundary and its OpenSearch/Elasticsearch implementation.
//!
//! The scroll client only talks to [`SearchBackend`]; the HTTP implementation
//! lives in [`OpenSearchBackend`]. Response decoding is kept in free functions
//! so the wire contract can be tested without a cluster.
//!
//! # Wire protocol
//!
//! | Operation        | Request                                          |
//! |------------------|--------------------------------------------------|
//! | open scroll      | `POST /{index}/_search?scroll={ttl}`             |
//! | continue scroll  | `POST /_search/scroll` `{"scroll", "scroll_id"}` |
//! | release scroll   | `DELETE /_search/scroll` `{"scroll_id"}`         |
//! | count            | `POST /{index}/_search` with `size: 0`           |

use std::time::Duration;

use reqwest::{Client, Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::config::BackendConfig;
use crate::error::{BackendError, BackendOp, ConfigError};
use crate::query::QueryTemplate;

/// Timeout for the best-effort cursor release call.
pub const RELEASE_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest response body excerpt carried in an error.
const BODY_EXCERPT_CHARS: usize = 512;

// =============================================================================
// Records and pages
// =============================================================================

/// Opaque server-issued scroll handle.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct QueryCursor(String);

impl QueryCursor {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for QueryCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Scroll ids run to hundreds of bytes; a prefix is enough to correlate.
        let prefix: String = self.0.chars().take(16).collect();
        write!(f, "QueryCursor({prefix}…)")
    }
}

/// One raw document as returned by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    #[serde(rename = "_id", default)]
    pub id: String,
    #[serde(rename = "_source", default)]
    pub source: Map<String, Value>,
}

/// One page of hits plus the cursor for the next call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordPage {
    pub hits: Vec<SearchHit>,
    pub cursor: Option<QueryCursor>,
}

impl RecordPage {
    /// An empty page marks the end of the result set.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.hits.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }
}

// =============================================================================
// Backend trait
// =============================================================================

/// Paginated query service consumed by the scroll client.
#[allow(async_fn_in_trait)]
pub trait SearchBackend: Send + Sync {
    /// Run the initial query and open a server-side cursor.
    async fn open_scroll(
        &self,
        template: &QueryTemplate,
        page_size: usize,
        ttl: Duration,
    ) -> Result<RecordPage, BackendError>;

    /// Fetch the page after `cursor`, extending its lifetime by `ttl`.
    async fn continue_scroll(
        &self,
        cursor: &QueryCursor,
        ttl: Duration,
    ) -> Result<RecordPage, BackendError>;

    /// Free the server-side cursor.
    async fn release_scroll(&self, cursor: &QueryCursor) -> Result<(), BackendError>;

    /// Count documents matching the template, independent of any cursor.
    async fn count(&self, template: &QueryTemplate) -> Result<u64, BackendError>;
}

// =============================================================================
// Wire decoding
// =============================================================================

#[derive(Debug, Deserialize)]
struct WireSearchResponse {
    #[serde(rename = "_scroll_id", default)]
    scroll_id: Option<String>,
    hits: WireHits,
}

#[derive(Debug, Deserialize)]
struct WireHits {
    #[serde(default)]
    hits: Vec<SearchHit>,
    #[serde(default)]
    total: Option<WireTotal>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireTotal {
    Tracked { value: u64 },
    Legacy(u64),
}

impl WireTotal {
    fn value(&self) -> u64 {
        match self {
            Self::Tracked { value } | Self::Legacy(value) => *value,
        }
    }
}

/// Format a TTL the way the scroll API expects (`"120s"`).
#[must_use]
pub fn format_ttl(ttl: Duration) -> String {
    format!("{}s", ttl.as_secs().max(1))
}

/// Decode a search or scroll response into a page.
pub fn decode_page(op: BackendOp, body: &[u8]) -> Result<RecordPage, BackendError> {
    let wire: WireSearchResponse =
        serde_json::from_slice(body).map_err(|err| BackendError::Protocol {
            op,
            message: err.to_string(),
        })?;
    Ok(RecordPage {
        hits: wire.hits.hits,
        cursor: wire.scroll_id.filter(|id| !id.is_empty()).map(QueryCursor),
    })
}

/// Decode the total from a count-only search response.
pub fn decode_count(body: &[u8]) -> Result<u64, BackendError> {
    let wire: WireSearchResponse =
        serde_json::from_slice(body).map_err(|err| BackendError::Protocol {
            op: BackendOp::Count,
            message: err.to_string(),
        })?;
    wire.hits
        .total
        .map(|total| total.value())
        .ok_or_else(|| BackendError::Protocol {
            op: BackendOp::Count,
            message: "response has no hits.total".to_string(),
        })
}

fn body_excerpt(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    let mut excerpt: String = text.chars().take(BODY_EXCERPT_CHARS).collect();
    if text.chars().count() > BODY_EXCERPT_CHARS {
        excerpt.push('…');
    }
    excerpt
}

/// Map a non-success status to the error taxonomy.
pub fn classify_status(op: BackendOp, status: StatusCode, body: &[u8]) -> BackendError {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        BackendError::Auth {
            op,
            status: status.as_u16(),
        }
    } else {
        BackendError::Status {
            op,
            status: status.as_u16(),
            body: body_excerpt(body),
        }
    }
}

// =============================================================================
// HTTP implementation
// =============================================================================

/// [`SearchBackend`] over the OpenSearch/Elasticsearch REST API.
#[derive(Clone)]
pub struct OpenSearchBackend {
    client: Client,
    base_url: String,
    user: Option<String>,
    password: Option<String>,
}

impl std::fmt::Debug for OpenSearchBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenSearchBackend")
            .field("base_url", &self.base_url)
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

impl OpenSearchBackend {
    /// Build a client for the configured endpoint.
    pub fn new(config: &BackendConfig) -> crate::Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .danger_accept_invalid_certs(config.use_tls && !config.verify_tls)
            .build()
            .map_err(|err| ConfigError::ValidationError(format!("http client build failed: {err}")))?;
        Ok(Self {
            client,
            base_url: config.base_url(),
            user: config.user.clone(),
            password: config.password.clone(),
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn search_url(&self, index: &str) -> String {
        format!("{}/{}/_search", self.base_url, index)
    }

    fn scroll_url(&self) -> String {
        format!("{}/_search/scroll", self.base_url)
    }

    async fn send(
        &self,
        op: BackendOp,
        method: Method,
        url: String,
        body: &Value,
        timeout: Option<Duration>,
    ) -> Result<Vec<u8>, BackendError> {
        let mut request = self.client.request(method, url).json(body);
        if let Some(user) = &self.user {
            request = request.basic_auth(user, self.password.as_deref());
        }
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let transport = |err: reqwest::Error| BackendError::Transport {
            op,
            message: err.to_string(),
        };
        let response = request.send().await.map_err(transport)?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(transport)?;

        if !status.is_success() {
            return Err(classify_status(op, status, &bytes));
        }
        Ok(bytes.to_vec())
    }
}

impl SearchBackend for OpenSearchBackend {
    async fn open_scroll(
        &self,
        template: &QueryTemplate,
        page_size: usize,
        ttl: Duration,
    ) -> Result<RecordPage, BackendError> {
        let url = format!("{}?scroll={}", self.search_url(&template.index), format_ttl(ttl));
        let body = template.to_search_body(page_size);
        let bytes = self
            .send(BackendOp::OpenScroll, Method::POST, url, &body, None)
            .await?;
        decode_page(BackendOp::OpenScroll, &bytes)
    }

    async fn continue_scroll(
        &self,
        cursor: &QueryCursor,
        ttl: Duration,
    ) -> Result<RecordPage, BackendError> {
        let body = json!({ "scroll": format_ttl(ttl), "scroll_id": cursor.as_str() });
        let bytes = self
            .send(BackendOp::ContinueScroll, Method::POST, self.scroll_url(), &body, None)
            .await?;
        decode_page(BackendOp::ContinueScroll, &bytes)
    }

    async fn release_scroll(&self, cursor: &QueryCursor) -> Result<(), BackendError> {
        let body = json!({ "scroll_id": cursor.as_str() });
        self.send(
            BackendOp::ReleaseScroll,
            Method::DELETE,
            self.scroll_url(),
            &body,
            Some(RELEASE_TIMEOUT),
        )
        .await?;
        Ok(())
    }

    async fn count(&self, template: &QueryTemplate) -> Result<u64, BackendError> {
        let body = template.to_count_body();
        let bytes = self
            .send(
                BackendOp::Count,
                Method::POST,
                self.search_url(&template.index),
                &body,
                None,
            )
            .await?;
        decode_count(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_page_reads_hits_and_scroll_id() {
        let body = br#"{
            "_scroll_id": "FGluY2x1ZGVfY29udGV4dF91dWlk",
            "took": 3,
            "hits": {
                "total": {"value": 2, "relation": "eq"},
                "hits": [
                    {"_index": "logs", "_id": "a1", "_source": {"message": "Test message #1", "@timestamp": "t1"}},
                    {"_index": "logs", "_id": "a2", "_source": {"message": "Test message #2"}}
                ]
            }
        }"#;
        let page = decode_page(BackendOp::OpenScroll, body).unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page.hits[0].id, "a1");
        assert_eq!(page.hits[1].source["message"], "Test message #2");
        assert_eq!(
            page.cursor.as_ref().map(QueryCursor::as_str),
            Some("FGluY2x1ZGVfY29udGV4dF91dWlk")
        );
        assert!(!page.is_exhausted());
    }

    #[test]
    fn decode_page_empty_hits_is_exhausted() {
        let body = br#"{"_scroll_id": "abc", "hits": {"hits": []}}"#;
        let page = decode_page(BackendOp::ContinueScroll, body).unwrap();
        assert!(page.is_exhausted());
        assert_eq!(page.cursor, Some(QueryCursor::new("abc")));
    }

    #[test]
    fn decode_page_without_scroll_id() {
        let body = br#"{"hits": {"hits": [{"_id": "x"}]}}"#;
        let page = decode_page(BackendOp::ContinueScroll, body).unwrap();
        assert!(page.cursor.is_none());
        assert!(page.hits[0].source.is_empty());
    }

    #[test]
    fn decode_page_rejects_malformed_body() {
        let err = decode_page(BackendOp::OpenScroll, b"<html>bad gateway</html>").unwrap_err();
        assert!(matches!(
            err,
            BackendError::Protocol {
                op: BackendOp::OpenScroll,
                ..
            }
        ));
        let err = decode_page(BackendOp::OpenScroll, br#"{"took": 1}"#).unwrap_err();
        assert!(matches!(err, BackendError::Protocol { .. }));
    }

    #[test]
    fn decode_count_tracked_and_legacy() {
        let tracked = br#"{"hits": {"total": {"value": 150000, "relation": "eq"}, "hits": []}}"#;
        assert_eq!(decode_count(tracked).unwrap(), 150_000);
        let legacy = br#"{"hits": {"total": 42, "hits": []}}"#;
        assert_eq!(decode_count(legacy).unwrap(), 42);
        let missing = br#"{"hits": {"hits": []}}"#;
        assert!(decode_count(missing).is_err());
    }

    #[test]
    fn status_classification() {
        let auth = classify_status(BackendOp::Count, StatusCode::UNAUTHORIZED, b"");
        assert!(auth.is_auth());
        let forbidden = classify_status(BackendOp::Count, StatusCode::FORBIDDEN, b"");
        assert!(forbidden.is_auth());
        let missing = classify_status(
            BackendOp::OpenScroll,
            StatusCode::NOT_FOUND,
            br#"{"error":"index_not_found_exception"}"#,
        );
        match missing {
            BackendError::Status { status, body, .. } => {
                assert_eq!(status, 404);
                assert!(body.contains("index_not_found_exception"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn long_bodies_are_truncated() {
        let body = "x".repeat(BODY_EXCERPT_CHARS * 2);
        let excerpt = body_excerpt(body.as_bytes());
        assert_eq!(excerpt.chars().count(), BODY_EXCERPT_CHARS + 1);
        assert!(excerpt.ends_with('…'));
    }

    #[test]
    fn ttl_formatting() {
        assert_eq!(format_ttl(Duration::from_secs(120)), "120s");
        assert_eq!(format_ttl(Duration::from_millis(10)), "1s");
    }

    #[test]
    fn cursor_debug_is_truncated() {
        let cursor = QueryCursor::new("a".repeat(400));
        let debug = format!("{cursor:?}");
        assert!(debug.len() < 40);
    }

    #[test]
    fn backend_urls_and_redacted_debug() {
        let config = BackendConfig {
            host: "search.local".to_string(),
            index: "logs".to_string(),
            user: Some("admin".to_string()),
            password: Some("hunter2".to_string()),
            ..BackendConfig::default()
        };
        let backend = OpenSearchBackend::new(&config).unwrap();
        assert_eq!(backend.base_url(), "https://search.local:9200");
        assert_eq!(backend.search_url("logs"), "https://search.local:9200/logs/_search");
        assert_eq!(backend.scroll_url(), "https://search.local:9200/_search/scroll");
        assert!(!format!("{backend:?}").contains("hunter2"));
    }
}
