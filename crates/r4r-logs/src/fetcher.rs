use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, warn};

use r4r_api::{ApiError, LogQuery, LogTransport};
use r4r_types::{LogLevel, LogRecord, TimeWindow};

use crate::normalizer::{LogNormalizer, RawRecord};

/// Default per-page read timeout
pub const DEFAULT_PAGE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default upper bound on pages per fetch
pub const DEFAULT_MAX_PAGES: usize = 1000;

/// Pages through log history for a set of resources
#[derive(Clone)]
pub struct HistoricalFetcher {
    transport: Arc<dyn LogTransport>,
    page_timeout: Duration,
    max_pages: usize,
}

impl HistoricalFetcher {
    pub fn new(transport: Arc<dyn LogTransport>) -> Self {
        Self {
            transport,
            page_timeout: DEFAULT_PAGE_TIMEOUT,
            max_pages: DEFAULT_MAX_PAGES,
        }
    }

    pub fn with_page_timeout(mut self, page_timeout: Duration) -> Self {
        self.page_timeout = page_timeout;
        self
    }

    /// Stop after this many pages even if the backend offers more
    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    /// Fetch every record in `window`
    ///
    /// All ids go into one query. Pages are concatenated in the order they were
    /// requested; records keep the backend's order. `limit` is the page size.
    pub async fn fetch(
        &self,
        resource_ids: &[String],
        window: TimeWindow,
        level: Option<LogLevel>,
        limit: u32,
    ) -> Result<Vec<LogRecord>, ApiError> {
        let mut query = LogQuery::new(resource_ids.to_vec(), window.start, window.end);
        query.level = level;
        query.limit = limit.max(1);

        let mut records = Vec::new();
        let mut seen_cursors: Vec<String> = Vec::new();

        for page_number in 1..=self.max_pages {
            let page = timeout(self.page_timeout, self.transport.list_logs(&query))
                .await
                .map_err(|_| ApiError::Timeout(self.page_timeout))??;

            debug!(page = page_number, entries = page.logs.len(), "Fetched log page");
            records.extend(
                page.logs
                    .into_iter()
                    .map(|item| LogNormalizer::normalize(RawRecord::Page(item))),
            );

            // An explicit hasMore: false ends paging even if a cursor came back
            if page.has_more == Some(false) {
                return Ok(records);
            }

            if let Some(cursor) = page.next_cursor {
                if query.cursor.as_deref() == Some(cursor.as_str()) || seen_cursors.contains(&cursor) {
                    debug!(%cursor, "Repeated cursor, stopping pagination");
                    return Ok(records);
                }
                seen_cursors.push(cursor.clone());
                query.cursor = Some(cursor);
                continue;
            }

            if page.has_more != Some(true) {
                return Ok(records);
            }

            // has-more paging moves the time window instead of a cursor
            let start = page.next_start.unwrap_or(query.start);
            let end = page.next_end.unwrap_or(query.end);
            if start == query.start && end == query.end {
                return Ok(records);
            }
            query.start = start;
            query.end = end;
        }

        warn!(
            pages = self.max_pages,
            records = records.len(),
            "Log history truncated at the page limit"
        );
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};
    use parking_lot::Mutex;
    use r4r_api::LogPage;
    use serde_json::json;

    /// Serves canned pages in order and records every query it sees
    struct FakeTransport {
        pages: Mutex<Vec<Result<LogPage, ApiError>>>,
        queries: Mutex<Vec<LogQuery>>,
    }

    impl FakeTransport {
        fn new(pages: Vec<Result<LogPage, ApiError>>) -> Arc<Self> {
            Arc::new(Self {
                pages: Mutex::new(pages.into_iter().rev().collect()),
                queries: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl LogTransport for FakeTransport {
        async fn list_logs(&self, query: &LogQuery) -> Result<LogPage, ApiError> {
            self.queries.lock().push(query.clone());
            self.pages.lock().pop().unwrap_or_else(|| Ok(LogPage::default()))
        }
    }

    fn page(prefix: &str, count: usize, cursor: Option<&str>) -> LogPage {
        LogPage {
            logs: (0..count)
                .map(|i| json!({ "message": format!("{prefix}-{i}"), "level": "info" }))
                .collect(),
            next_cursor: cursor.map(str::to_string),
            ..Default::default()
        }
    }

    fn window() -> TimeWindow {
        let end = Utc.with_ymd_and_hms(2024, 1, 1, 1, 0, 0).unwrap();
        TimeWindow::new(end - ChronoDuration::hours(1), end)
    }

    fn ids() -> Vec<String> {
        vec!["srv-1".to_string(), "srv-2".to_string()]
    }

    #[tokio::test]
    async fn test_cursor_pagination_is_complete() {
        let transport = FakeTransport::new(vec![
            Ok(page("a", 100, Some("c1"))),
            Ok(page("b", 100, Some("c2"))),
            Ok(page("c", 42, None)),
        ]);
        let fetcher = HistoricalFetcher::new(transport.clone());

        let records = fetcher.fetch(&ids(), window(), None, 100).await.unwrap();

        assert_eq!(records.len(), 242);
        assert_eq!(records[0].message(), "a-0");
        assert_eq!(records[100].message(), "b-0");
        assert_eq!(records[241].message(), "c-41");

        let queries = transport.queries.lock();
        assert_eq!(queries.len(), 3);
        assert_eq!(queries[1].cursor.as_deref(), Some("c1"));
        assert_eq!(queries[2].cursor.as_deref(), Some("c2"));
        assert!(queries.iter().all(|q| q.resource_ids == ids()));
    }

    #[tokio::test]
    async fn test_has_more_moves_window() {
        let next_end = Utc.with_ymd_and_hms(2024, 1, 1, 0, 30, 0).unwrap();
        let transport = FakeTransport::new(vec![
            Ok(LogPage {
                has_more: Some(true),
                next_end: Some(next_end),
                ..page("a", 2, None)
            }),
            Ok(page("b", 1, None)),
        ]);
        let fetcher = HistoricalFetcher::new(transport.clone());

        let records = fetcher.fetch(&ids(), window(), None, 2).await.unwrap();

        assert_eq!(records.len(), 3);
        let queries = transport.queries.lock();
        assert_eq!(queries[1].end, next_end);
        assert_eq!(queries[1].start, window().start);
    }

    #[tokio::test]
    async fn test_repeated_cursor_stops() {
        let transport = FakeTransport::new(vec![
            Ok(page("a", 1, Some("same"))),
            Ok(page("b", 1, Some("same"))),
            Ok(page("c", 1, None)),
        ]);
        let fetcher = HistoricalFetcher::new(transport.clone());

        let records = fetcher.fetch(&ids(), window(), None, 1).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(transport.queries.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_has_more_false_wins_over_cursor() {
        let transport = FakeTransport::new(vec![
            Ok(LogPage {
                has_more: Some(false),
                ..page("a", 2, Some("c1"))
            }),
            Ok(page("b", 2, None)),
        ]);
        let fetcher = HistoricalFetcher::new(transport.clone());

        let records = fetcher.fetch(&ids(), window(), None, 2).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(transport.queries.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_page_limit_truncates() {
        let pages = (0..5)
            .map(|i| Ok(page(&format!("p{i}"), 1, Some(&format!("c{i}")))))
            .collect();
        let transport = FakeTransport::new(pages);
        let fetcher = HistoricalFetcher::new(transport.clone()).with_max_pages(3);

        let records = fetcher.fetch(&ids(), window(), None, 1).await.unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(transport.queries.lock().len(), 3);
    }

    #[tokio::test]
    async fn test_failed_page_propagates() {
        let transport = FakeTransport::new(vec![
            Ok(page("a", 100, Some("c1"))),
            Err(ApiError::from_status(500, "boom")),
        ]);
        let fetcher = HistoricalFetcher::new(transport);

        let err = fetcher.fetch(&ids(), window(), None, 100).await.unwrap_err();
        assert_eq!(err.status(), Some(500));
    }

    #[tokio::test]
    async fn test_level_passed_upstream() {
        let transport = FakeTransport::new(vec![Ok(page("a", 1, None))]);
        let fetcher = HistoricalFetcher::new(transport.clone());

        fetcher
            .fetch(&ids(), window(), Some(LogLevel::Error), 50)
            .await
            .unwrap();
        let queries = transport.queries.lock();
        assert_eq!(queries[0].level, Some(LogLevel::Error));
        assert_eq!(queries[0].limit, 50);
    }

    struct HangingTransport;

    #[async_trait]
    impl LogTransport for HangingTransport {
        async fn list_logs(&self, _query: &LogQuery) -> Result<LogPage, ApiError> {
            futures::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_page_timeout() {
        let fetcher = HistoricalFetcher::new(Arc::new(HangingTransport))
            .with_page_timeout(Duration::from_secs(3));

        let err = fetcher.fetch(&ids(), window(), None, 10).await.unwrap_err();
        assert!(matches!(err, ApiError::Timeout(d) if d == Duration::from_secs(3)));
    }
}
