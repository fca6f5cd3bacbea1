use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use r4r_api::{LogTransport, SocketConnector};
use r4r_types::{LogLevel, TimeWindow};

use crate::error::StreamError;
use crate::feed::{Diagnostic, DiagnosticKind, FeedSender, LogFeed, StreamStats, feed_channel};
use crate::fetcher::HistoricalFetcher;
use crate::filter::StreamFilter;
use crate::tailer::LiveTailer;

// ============================================================================
// Manager
// ============================================================================

/// Builds subscriptions that replay history and then follow live output
#[derive(Clone)]
pub struct LogStreamManager {
    fetcher: HistoricalFetcher,
    tailer: LiveTailer,
    page_size: u32,
}

impl LogStreamManager {
    pub fn new(transport: Arc<dyn LogTransport>, connector: Arc<dyn SocketConnector>) -> Self {
        let fetcher = HistoricalFetcher::new(transport);
        let tailer = LiveTailer::new(connector, fetcher.clone());
        Self::from_parts(fetcher, tailer)
    }

    pub fn from_parts(fetcher: HistoricalFetcher, tailer: LiveTailer) -> Self {
        Self {
            fetcher,
            tailer,
            page_size: 100,
        }
    }

    /// Page size used for history replay
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn fetcher(&self) -> &HistoricalFetcher {
        &self.fetcher
    }

    /// Create an idle subscription; nothing runs until [`Subscription::open`]
    pub fn subscribe(&self, resource_ids: Vec<String>, filter: StreamFilter) -> Subscription {
        Subscription {
            resource_ids,
            filter,
            fetcher: self.fetcher.clone(),
            tailer: self.tailer.clone(),
            page_size: self.page_size,
            state: Arc::new(AtomicU8::new(SubscriptionState::Idle as u8)),
            stats: Arc::new(StreamStats::default()),
            cancel: CancellationToken::new(),
            task: None,
        }
    }
}

// ============================================================================
// Subscription
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum SubscriptionState {
    Idle = 0,
    Replaying = 1,
    Following = 2,
    Stopped = 3,
}

impl SubscriptionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Replaying,
            2 => Self::Following,
            _ => Self::Stopped,
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, Self::Replaying | Self::Following)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Replaying => "replaying",
            Self::Following => "following",
            Self::Stopped => "stopped",
        }
    }
}

/// One tailing session over a fixed set of resources
///
/// Opened at most once. The feed it returns carries matching history for the
/// requested window, then live records. Records that appear both at the end
/// of the window and at the start of the live stream are delivered twice.
pub struct Subscription {
    resource_ids: Vec<String>,
    filter: StreamFilter,
    fetcher: HistoricalFetcher,
    tailer: LiveTailer,
    page_size: u32,
    state: Arc<AtomicU8>,
    stats: Arc<StreamStats>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Start replay-then-follow and return the feed
    pub fn open(&mut self, window: TimeWindow) -> Result<LogFeed, StreamError> {
        if self.state() != SubscriptionState::Idle {
            return Err(StreamError::AlreadyOpen);
        }
        self.set_state(SubscriptionState::Replaying);

        let (sender, feed) = feed_channel(
            self.tailer.feed_capacity(),
            self.filter.clone(),
            self.stats.clone(),
            self.cancel.clone(),
        );

        let session = Session {
            resource_ids: self.resource_ids.clone(),
            history_level: self
                .filter
                .level()
                .filter(|l| !matches!(l, LogLevel::Other(_)))
                .cloned(),
            fetcher: self.fetcher.clone(),
            tailer: self.tailer.clone(),
            page_size: self.page_size,
            state: self.state.clone(),
        };

        info!(
            resources = self.resource_ids.len(),
            filter = %self.filter.describe(),
            "Opening log subscription"
        );
        self.task = Some(tokio::spawn(session.run(window, sender)));
        Ok(feed)
    }

    /// Cancel the session and wait for it to release the socket
    pub async fn stop(&mut self) -> Result<(), StreamError> {
        let task = match self.task.take() {
            Some(task) if self.state().is_running() => task,
            Some(task) => {
                // finished on its own (terminal error or consumer gone)
                let _ = task.await;
                return Err(StreamError::NotRunning);
            }
            None => return Err(StreamError::NotRunning),
        };

        self.cancel.cancel();
        if let Err(err) = task.await {
            debug!(error = %err, "Subscription task ended abnormally");
        }
        self.set_state(SubscriptionState::Stopped);
        Ok(())
    }

    /// Replace the filter before `open`; counters restart from zero
    ///
    /// A subscription opens only once, so any state past `Idle` rejects the
    /// change with [`StreamError::FilterLocked`].
    pub fn set_filter(&mut self, filter: StreamFilter) -> Result<(), StreamError> {
        if self.state() != SubscriptionState::Idle {
            return Err(StreamError::FilterLocked);
        }
        self.filter = filter;
        self.stats.reset();
        Ok(())
    }

    pub fn filter(&self) -> &StreamFilter {
        &self.filter
    }

    pub fn resource_ids(&self) -> &[String] {
        &self.resource_ids
    }

    pub fn state(&self) -> SubscriptionState {
        SubscriptionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_running(&self) -> bool {
        self.state().is_running()
    }

    pub fn stats(&self) -> &StreamStats {
        &self.stats
    }

    fn set_state(&self, state: SubscriptionState) {
        self.state.store(state as u8, Ordering::Release);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Everything the background task needs, moved off the handle
struct Session {
    resource_ids: Vec<String>,
    history_level: Option<LogLevel>,
    fetcher: HistoricalFetcher,
    tailer: LiveTailer,
    page_size: u32,
    state: Arc<AtomicU8>,
}

impl Session {
    async fn run(self, window: TimeWindow, sender: FeedSender) {
        if self.replay(window, &sender).await {
            self.state
                .store(SubscriptionState::Following as u8, Ordering::Release);
            if let Err(err) = self.tailer.tail(&self.resource_ids, &sender).await {
                warn!(error = %err, "Subscription failed");
                sender.fail(err).await;
            }
        }
        self.state
            .store(SubscriptionState::Stopped as u8, Ordering::Release);
    }

    /// Returns `false` if the session should end without following
    async fn replay(&self, window: TimeWindow, sender: &FeedSender) -> bool {
        let cancel = sender.cancel_token().clone();
        let fetched = tokio::select! {
            biased;
            _ = cancel.cancelled() => return false,
            result = self.fetcher.fetch(&self.resource_ids, window, self.history_level.clone(), self.page_size) => result,
        };

        match fetched {
            Ok(records) => {
                debug!(count = records.len(), "Replaying history");
                for record in records {
                    if !sender.record(record).await {
                        return false;
                    }
                }
                true
            }
            Err(err) if err.is_auth() => {
                sender.fail(err).await;
                false
            }
            Err(err) => {
                warn!(error = %err, "History unavailable, following live only");
                let message = format!("history unavailable: {err}");
                sender
                    .diagnostic(Diagnostic::new(DiagnosticKind::HistoryUnavailable, message))
                    .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::StreamEvent;
    use crate::tailer::testing::{FakeConnector, ScriptedTransport, WhenDrained, text};
    use chrono::Duration as ChronoDuration;
    use r4r_api::{ApiError, LogPage};
    use serde_json::json;

    fn manager(connector: FakeConnector, transport: Arc<ScriptedTransport>) -> LogStreamManager {
        LogStreamManager::new(transport, Arc::new(connector))
    }

    fn window() -> TimeWindow {
        TimeWindow::trailing(ChronoDuration::hours(1))
    }

    fn history(levels: &[&str]) -> LogPage {
        LogPage {
            logs: levels
                .iter()
                .enumerate()
                .map(|(i, level)| {
                    json!({
                        "timestamp": format!("2024-05-01T12:00:0{i}Z"),
                        "level": level,
                        "message": format!("{level} {i}"),
                        "resourceId": "srv-1",
                    })
                })
                .collect(),
            ..Default::default()
        }
    }

    async fn next_record_message(feed: &mut LogFeed) -> String {
        loop {
            match feed.next().await {
                Some(StreamEvent::Record(record)) => return record.message().to_string(),
                Some(StreamEvent::Diagnostic(_)) => continue,
                other => panic!("expected a record, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_replay_applies_filter() {
        let connector = FakeConnector::new().with_socket(vec![], WhenDrained::Hang);
        let transport = ScriptedTransport::new(vec![Ok(history(&["info", "error", "warn"]))]);
        let manager = manager(connector, transport.clone());

        let filter = StreamFilter::new().with_level(Some(LogLevel::Error));
        let mut sub = manager.subscribe(vec!["srv-1".to_string()], filter);
        let mut feed = sub.open(window()).unwrap();

        // replay is complete once the live socket reports in
        let mut replayed = Vec::new();
        loop {
            match feed.next().await {
                Some(StreamEvent::Record(record)) => replayed.push(record.message().to_string()),
                Some(StreamEvent::Diagnostic(d)) if d.kind == DiagnosticKind::Connected => break,
                other => panic!("unexpected {other:?}"),
            }
        }

        assert_eq!(replayed, vec!["error 1"]);
        assert_eq!(sub.stats().seen(), 3);
        assert_eq!(sub.stats().emitted(), 1);

        // history level goes upstream as well
        assert_eq!(transport.calls.lock()[0].level, Some(LogLevel::Error));

        sub.stop().await.unwrap();
        assert_eq!(sub.state(), SubscriptionState::Stopped);
        assert!(feed.next().await.is_none());
    }

    #[tokio::test]
    async fn test_replay_then_follow_order() {
        let connector = FakeConnector::new().with_socket(
            vec![text(r#"{"type":"log","timestamp":"2024-05-01T13:00:00Z","message":"live one"}"#)],
            WhenDrained::Hang,
        );
        let transport = ScriptedTransport::new(vec![Ok(history(&["info", "info"]))]);
        let manager = manager(connector, transport);

        let mut sub = manager.subscribe(vec!["srv-1".to_string()], StreamFilter::new());
        let mut feed = sub.open(window()).unwrap();

        assert_eq!(next_record_message(&mut feed).await, "info 0");
        assert_eq!(next_record_message(&mut feed).await, "info 1");
        assert_eq!(next_record_message(&mut feed).await, "live one");
        assert_eq!(sub.state(), SubscriptionState::Following);

        sub.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_usage_errors() {
        let connector = FakeConnector::new().with_socket(vec![], WhenDrained::Hang);
        let manager = manager(connector, ScriptedTransport::new(vec![]));
        let mut sub = manager.subscribe(vec!["srv-1".to_string()], StreamFilter::new());

        assert!(matches!(sub.stop().await, Err(StreamError::NotRunning)));

        let _feed = sub.open(window()).unwrap();
        assert!(matches!(sub.open(window()), Err(StreamError::AlreadyOpen)));
        assert!(matches!(
            sub.set_filter(StreamFilter::new().with_search(Some("x"))),
            Err(StreamError::FilterLocked)
        ));

        sub.stop().await.unwrap();
        assert!(matches!(sub.stop().await, Err(StreamError::NotRunning)));
        // not restartable
        assert!(matches!(sub.open(window()), Err(StreamError::AlreadyOpen)));
    }

    #[tokio::test]
    async fn test_filter_changes_only_before_open() {
        let connector = FakeConnector::new().with_socket(vec![], WhenDrained::Hang);
        let transport = ScriptedTransport::new(vec![Ok(history(&["info", "warn"]))]);
        let manager = manager(connector, transport);
        let mut sub = manager.subscribe(vec!["srv-1".to_string()], StreamFilter::new());

        sub.set_filter(StreamFilter::new().with_level(Some(LogLevel::Warn)))
            .unwrap();
        assert_eq!(sub.stats().seen(), 0);

        let mut feed = sub.open(window()).unwrap();
        assert_eq!(next_record_message(&mut feed).await, "warn 1");
        sub.stop().await.unwrap();
        assert_eq!(sub.stats().seen(), 2);

        // stopped subscriptions never reopen, so the filter stays put
        assert!(matches!(
            sub.set_filter(StreamFilter::new()),
            Err(StreamError::FilterLocked)
        ));
        assert_eq!(sub.filter().level(), Some(&LogLevel::Warn));
        assert_eq!(sub.stats().seen(), 2);
    }

    #[tokio::test]
    async fn test_history_failure_degrades_to_follow() {
        let connector = FakeConnector::new().with_socket(
            vec![text(r#"{"timestamp":"2024-05-01T13:00:00Z","message":"live"}"#)],
            WhenDrained::Hang,
        );
        let transport = ScriptedTransport::new(vec![Err(ApiError::from_status(500, "down"))]);
        let manager = manager(connector, transport);
        let mut sub = manager.subscribe(vec!["srv-1".to_string()], StreamFilter::new());
        let mut feed = sub.open(window()).unwrap();

        match feed.next().await {
            Some(StreamEvent::Diagnostic(d)) => assert_eq!(d.kind, DiagnosticKind::HistoryUnavailable),
            other => panic!("expected history diagnostic, got {other:?}"),
        }
        assert_eq!(next_record_message(&mut feed).await, "live");
        sub.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_history_auth_failure_is_terminal() {
        let connector = FakeConnector::new().with_socket(vec![], WhenDrained::Hang);
        let transport = ScriptedTransport::new(vec![Err(ApiError::from_status(403, "forbidden"))]);
        let manager = manager(connector, transport);
        let mut sub = manager.subscribe(vec!["srv-1".to_string()], StreamFilter::new());
        let mut feed = sub.open(window()).unwrap();

        match feed.next().await {
            Some(StreamEvent::Failed(err)) => assert!(err.is_auth()),
            other => panic!("expected auth failure, got {other:?}"),
        }
        assert!(feed.next().await.is_none());
        assert_eq!(sub.state(), SubscriptionState::Stopped);
        assert!(matches!(sub.stop().await, Err(StreamError::NotRunning)));
    }

    #[test]
    fn test_state_names() {
        assert_eq!(SubscriptionState::Following.as_str(), "following");
        assert!(!SubscriptionState::Stopped.is_running());
        assert_eq!(SubscriptionState::from_u8(9), SubscriptionState::Stopped);
    }
}
