//! Scroll pagination over a [`SearchBackend`].
//!
//! A [`ScrollSession`] owns one server-side cursor for its whole life and
//! yields pages in order until the backend returns an empty page. The cursor
//! is released exactly once: on exhaustion, on a continuation failure, or by
//! an explicit [`ScrollSession::release`]. [`scan_entries`] defers the
//! release until after its run deadline so a slow DELETE can neither turn a
//! finished scan into a timeout nor hide a continuation error. A session
//! dropped while still holding a cursor logs a warning; the server expires
//! the cursor once its TTL lapses.

use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::backend::{QueryCursor, SearchBackend, SearchHit};
use crate::config::ScanConfig;
use crate::error::{BackendError, BackendOp, Error, Result};
use crate::extract::{CounterExtractor, ExtractedEntry};
use crate::query::QueryTemplate;

/// Emit a progress event every this many pages.
pub const PROGRESS_EVERY_PAGES: u64 = 10;

/// Pagination settings for one scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanOptions {
    pub page_size: usize,
    pub scroll_ttl: Duration,
    pub run_timeout: Option<Duration>,
}

impl ScanOptions {
    #[must_use]
    pub fn from_config(config: &ScanConfig) -> Self {
        Self {
            page_size: config.page_size,
            scroll_ttl: config.scroll_ttl(),
            run_timeout: config.run_timeout(),
        }
    }
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self::from_config(&ScanConfig::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Fresh,
    Open,
    Finished,
}

/// Lazy, single-pass page sequence backed by one scroll cursor.
pub struct ScrollSession<'a, B: SearchBackend> {
    backend: &'a B,
    template: &'a QueryTemplate,
    page_size: usize,
    scroll_ttl: Duration,
    state: SessionState,
    cursor: Option<QueryCursor>,
    release_on_finish: bool,
    pages: u64,
    documents: u64,
}

impl<'a, B: SearchBackend> ScrollSession<'a, B> {
    #[must_use]
    pub fn new(
        backend: &'a B,
        template: &'a QueryTemplate,
        page_size: usize,
        scroll_ttl: Duration,
    ) -> Self {
        Self {
            backend,
            template,
            page_size,
            scroll_ttl,
            state: SessionState::Fresh,
            cursor: None,
            release_on_finish: true,
            pages: 0,
            documents: 0,
        }
    }

    /// Leave the cursor held on exhaustion or failure; the caller must call
    /// [`release`](Self::release) once it is done.
    #[must_use]
    pub fn defer_release(mut self) -> Self {
        self.release_on_finish = false;
        self
    }

    /// Non-empty pages yielded so far.
    #[must_use]
    pub fn pages(&self) -> u64 {
        self.pages
    }

    /// Documents yielded so far.
    #[must_use]
    pub fn documents(&self) -> u64 {
        self.documents
    }

    /// True while a server-side cursor is held.
    #[must_use]
    pub fn has_live_cursor(&self) -> bool {
        self.cursor.is_some()
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.state == SessionState::Finished
    }

    /// Fetch the next page.
    ///
    /// Returns `Ok(None)` once the result set is exhausted; the cursor has
    /// been released by then unless release is deferred. A continuation
    /// failure finishes the session and releases the last known cursor the
    /// same way before the error is returned.
    pub async fn next_page(&mut self) -> std::result::Result<Option<Vec<SearchHit>>, BackendError> {
        let page = match self.state {
            SessionState::Finished => return Ok(None),
            SessionState::Fresh => {
                self.state = SessionState::Open;
                match self
                    .backend
                    .open_scroll(self.template, self.page_size, self.scroll_ttl)
                    .await
                {
                    Ok(page) => page,
                    Err(err) => {
                        self.state = SessionState::Finished;
                        return Err(err);
                    }
                }
            }
            SessionState::Open => {
                let Some(cursor) = self.cursor.clone() else {
                    self.state = SessionState::Finished;
                    return Err(BackendError::Protocol {
                        op: BackendOp::ContinueScroll,
                        message: "backend returned hits without a scroll id".to_string(),
                    });
                };
                match self.backend.continue_scroll(&cursor, self.scroll_ttl).await {
                    Ok(page) => page,
                    Err(err) => {
                        warn!(
                            index = %self.template.index,
                            page = self.pages + 1,
                            error = %err,
                            "scroll continuation failed"
                        );
                        self.finish().await;
                        return Err(err);
                    }
                }
            }
        };

        // A response without a scroll id keeps the previous cursor alive.
        if let Some(cursor) = page.cursor {
            self.cursor = Some(cursor);
        }

        if page.hits.is_empty() {
            debug!(
                index = %self.template.index,
                pages = self.pages,
                documents = self.documents,
                "scroll exhausted"
            );
            self.finish().await;
            return Ok(None);
        }

        self.pages += 1;
        self.documents += page.hits.len() as u64;
        Ok(Some(page.hits))
    }

    async fn finish(&mut self) {
        self.state = SessionState::Finished;
        if self.release_on_finish {
            self.release().await;
        }
    }

    /// Release the server-side cursor, if one is held. Idempotent.
    ///
    /// Release failures are logged, never returned. The cursor is only
    /// forgotten once the backend call returns, so a release cancelled
    /// mid-flight can be retried.
    pub async fn release(&mut self) {
        self.state = SessionState::Finished;
        let Some(cursor) = self.cursor.clone() else {
            return;
        };
        let outcome = self.backend.release_scroll(&cursor).await;
        self.cursor = None;
        match outcome {
            Ok(()) => debug!(index = %self.template.index, "scroll cursor released"),
            Err(err) => warn!(
                index = %self.template.index,
                error = %err,
                "failed to release scroll cursor; it expires after its TTL"
            ),
        }
    }
}

impl<B: SearchBackend> Drop for ScrollSession<'_, B> {
    fn drop(&mut self) {
        if self.cursor.is_some() {
            warn!(
                index = %self.template.index,
                ttl_secs = self.scroll_ttl.as_secs(),
                "scroll session dropped with a live cursor"
            );
        }
    }
}

/// Counters collected by one scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Harvest {
    pub entries: Vec<ExtractedEntry>,
    /// Documents returned by the backend, with or without a counter.
    pub documents_fetched: u64,
    pub pages: u64,
    /// Documents without a counter marker.
    pub skipped: u64,
}

/// Scan every document matching `template` and extract counters.
///
/// Enforces `options.run_timeout` over page fetching. On every exit path the
/// cursor is released afterwards, outside the deadline, before returning.
#[instrument(skip_all, fields(index = %template.index, page_size = options.page_size))]
pub async fn scan_entries<B: SearchBackend>(
    backend: &B,
    template: &QueryTemplate,
    options: &ScanOptions,
    extractor: &CounterExtractor,
) -> Result<Harvest> {
    let mut session =
        ScrollSession::new(backend, template, options.page_size, options.scroll_ttl).defer_release();
    let mut harvest = Harvest::default();

    let outcome = match options.run_timeout {
        Some(deadline) => {
            match tokio::time::timeout(deadline, drain(&mut session, extractor, &mut harvest)).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(
                        pages = harvest.pages,
                        documents = harvest.documents_fetched,
                        "scan deadline exceeded"
                    );
                    Err(Error::Timeout {
                        secs: deadline.as_secs(),
                    })
                }
            }
        }
        None => drain(&mut session, extractor, &mut harvest).await,
    };

    session.release().await;
    outcome?;

    info!(
        pages = harvest.pages,
        documents = harvest.documents_fetched,
        entries = harvest.entries.len(),
        skipped = harvest.skipped,
        "scan complete"
    );
    Ok(harvest)
}

async fn drain<B: SearchBackend>(
    session: &mut ScrollSession<'_, B>,
    extractor: &CounterExtractor,
    harvest: &mut Harvest,
) -> Result<()> {
    while let Some(hits) = session.next_page().await? {
        for hit in &hits {
            match extractor.extract(hit) {
                Some(entry) => harvest.entries.push(entry),
                None => harvest.skipped += 1,
            }
        }
        harvest.documents_fetched += hits.len() as u64;
        harvest.pages += 1;

        if harvest.pages % PROGRESS_EVERY_PAGES == 0 {
            info!(
                page = harvest.pages,
                documents = harvest.documents_fetched,
                entries = harvest.entries.len(),
                "scroll progress"
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RecordPage;
    use crate::extract::ExtractorConfig;
    use serde_json::json;
    use std::sync::Mutex;

    /// Serves a fixed page list and records cursor traffic.
    #[derive(Default)]
    struct ScriptedBackend {
        pages: Vec<Vec<SearchHit>>,
        omit_cursor_after_open: bool,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedBackend {
        fn with_pages(pages: Vec<Vec<SearchHit>>) -> Self {
            Self {
                pages,
                ..Self::default()
            }
        }

        fn page(&self, n: usize) -> Vec<SearchHit> {
            self.pages.get(n).cloned().unwrap_or_default()
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl SearchBackend for ScriptedBackend {
        async fn open_scroll(
            &self,
            _template: &QueryTemplate,
            _page_size: usize,
            _ttl: Duration,
        ) -> std::result::Result<RecordPage, BackendError> {
            self.calls.lock().unwrap().push("open".to_string());
            Ok(RecordPage {
                hits: self.page(0),
                cursor: Some(QueryCursor::new("c1")),
            })
        }

        async fn continue_scroll(
            &self,
            cursor: &QueryCursor,
            _ttl: Duration,
        ) -> std::result::Result<RecordPage, BackendError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("continue:{}", cursor.as_str()));
            let next: usize = cursor.as_str()[1..].parse().unwrap();
            Ok(RecordPage {
                hits: self.page(next),
                cursor: if self.omit_cursor_after_open {
                    None
                } else {
                    Some(QueryCursor::new(format!("c{}", next + 1)))
                },
            })
        }

        async fn release_scroll(&self, cursor: &QueryCursor) -> std::result::Result<(), BackendError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("release:{}", cursor.as_str()));
            Ok(())
        }

        async fn count(&self, _template: &QueryTemplate) -> std::result::Result<u64, BackendError> {
            Ok(self.pages.iter().map(Vec::len).sum::<usize>() as u64)
        }
    }

    fn hit(counter: u64) -> SearchHit {
        SearchHit {
            id: format!("doc-{counter}"),
            source: json!({"message": format!("Test message #{counter}"), "@timestamp": "t"})
                .as_object()
                .cloned()
                .unwrap(),
        }
    }

    fn template() -> QueryTemplate {
        QueryTemplate::match_all("logs", &ExtractorConfig::default())
    }

    #[tokio::test]
    async fn session_yields_pages_in_order_then_releases() {
        let backend = ScriptedBackend::with_pages(vec![vec![hit(1), hit(2)], vec![hit(3)]]);
        let template = template();
        let mut session = ScrollSession::new(&backend, &template, 2, Duration::from_secs(60));

        let first = session.next_page().await.unwrap().unwrap();
        assert_eq!(first.len(), 2);
        assert!(session.has_live_cursor());
        let second = session.next_page().await.unwrap().unwrap();
        assert_eq!(second[0].id, "doc-3");
        assert!(session.next_page().await.unwrap().is_none());
        assert!(!session.has_live_cursor());
        assert!(session.is_finished());
        assert!(session.next_page().await.unwrap().is_none());

        assert_eq!(session.pages(), 2);
        assert_eq!(session.documents(), 3);
        assert_eq!(
            backend.calls(),
            vec!["open", "continue:c1", "continue:c2", "release:c3"]
        );
    }

    #[tokio::test]
    async fn release_is_idempotent() {
        let backend = ScriptedBackend::with_pages(vec![vec![hit(1)]]);
        let template = template();
        let mut session = ScrollSession::new(&backend, &template, 1, Duration::from_secs(60));
        session.next_page().await.unwrap();
        session.release().await;
        session.release().await;
        assert!(session.next_page().await.unwrap().is_none());
        let releases = backend
            .calls()
            .iter()
            .filter(|call| call.starts_with("release"))
            .count();
        assert_eq!(releases, 1);
    }

    #[tokio::test]
    async fn deferred_session_holds_cursor_until_released() {
        let backend = ScriptedBackend::with_pages(vec![vec![hit(1)]]);
        let template = template();
        let mut session =
            ScrollSession::new(&backend, &template, 1, Duration::from_secs(60)).defer_release();
        assert!(session.next_page().await.unwrap().is_some());
        assert!(session.next_page().await.unwrap().is_none());
        assert!(session.is_finished());
        assert!(session.has_live_cursor());
        assert_eq!(backend.calls(), vec!["open", "continue:c1"]);

        session.release().await;
        assert!(!session.has_live_cursor());
        assert_eq!(backend.calls().last().map(String::as_str), Some("release:c2"));
    }

    #[tokio::test]
    async fn missing_scroll_id_keeps_previous_cursor() {
        let backend = ScriptedBackend {
            pages: vec![vec![hit(1)], vec![hit(2)]],
            omit_cursor_after_open: true,
            ..ScriptedBackend::default()
        };
        let template = template();
        let mut session = ScrollSession::new(&backend, &template, 1, Duration::from_secs(60));
        session.next_page().await.unwrap();
        session.next_page().await.unwrap();
        assert_eq!(
            backend.calls(),
            vec!["open", "continue:c1"]
        );
        assert!(session.has_live_cursor());
        session.release().await;
        assert_eq!(backend.calls().last().map(String::as_str), Some("release:c1"));
    }

    #[tokio::test]
    async fn scan_entries_counts_skipped_documents() {
        let mut noise = hit(0);
        noise.source.insert("message".to_string(), json!("GET /health 200"));
        let backend = ScriptedBackend::with_pages(vec![vec![hit(1), noise], vec![hit(2)]]);
        let extractor = CounterExtractor::new(ExtractorConfig::default()).unwrap();
        let harvest = scan_entries(&backend, &template(), &ScanOptions::default(), &extractor)
            .await
            .unwrap();
        assert_eq!(harvest.documents_fetched, 3);
        assert_eq!(harvest.skipped, 1);
        assert_eq!(harvest.pages, 2);
        let counters: Vec<u64> = harvest.entries.iter().map(|e| e.counter).collect();
        assert_eq!(counters, vec![1, 2]);
    }

    #[test]
    fn options_from_config() {
        let config = ScanConfig {
            page_size: 500,
            scroll_ttl_secs: 30,
            run_timeout_secs: Some(600),
            ..ScanConfig::default()
        };
        let options = ScanOptions::from_config(&config);
        assert_eq!(options.page_size, 500);
        assert_eq!(options.scroll_ttl, Duration::from_secs(30));
        assert_eq!(options.run_timeout, Some(Duration::from_secs(600)));
    }
}
