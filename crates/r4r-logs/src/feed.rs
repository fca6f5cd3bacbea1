//! Channel between a producing task and the feed consumer

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::Stream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use r4r_api::ApiError;
use r4r_types::LogRecord;

use crate::filter::StreamFilter;

/// Default number of buffered events per feed
pub const DEFAULT_FEED_CAPACITY: usize = 1024;

/// Non-record events surfaced to the consumer
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    /// Live socket established
    Connected,
    /// Server-sent connection status frame
    Connection,
    /// Server-sent error frame
    StreamError,
    /// Live socket closed or failed
    Disconnected,
    /// Switched to polling the history endpoint
    PollingFallback,
    /// A poll failed and will be retried
    PollFailed,
    /// History replay failed; following live only
    HistoryUnavailable,
}

impl DiagnosticKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Connection => "connection",
            Self::StreamError => "stream-error",
            Self::Disconnected => "disconnected",
            Self::PollingFallback => "polling",
            Self::PollFailed => "poll-failed",
            Self::HistoryUnavailable => "history-unavailable",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind.as_str(), self.message)
    }
}

/// One item delivered to a feed consumer
#[derive(Debug)]
pub enum StreamEvent {
    Record(LogRecord),
    Diagnostic(Diagnostic),
    /// Terminal error; no further events follow
    Failed(ApiError),
}

/// Counters for one feed
#[derive(Debug, Default)]
pub struct StreamStats {
    seen: AtomicU64,
    emitted: AtomicU64,
    decode_failures: AtomicU64,
}

impl StreamStats {
    /// Records received from any source, before filtering
    pub fn seen(&self) -> u64 {
        self.seen.load(Ordering::Relaxed)
    }

    /// Records delivered to the consumer
    pub fn emitted(&self) -> u64 {
        self.emitted.load(Ordering::Relaxed)
    }

    /// Frames that were not valid JSON
    pub fn decode_failures(&self) -> u64 {
        self.decode_failures.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.seen.store(0, Ordering::Relaxed);
        self.emitted.store(0, Ordering::Relaxed);
        self.decode_failures.store(0, Ordering::Relaxed);
    }
}

/// Consumer interface for callers that prefer callbacks over pulling
pub trait LogSink {
    fn on_record(&mut self, record: LogRecord);
    fn on_diagnostic(&mut self, kind: DiagnosticKind, message: &str);
}

/// Create a feed channel
///
/// The sender applies `filter` to every record it is given, so both history
/// and live records pass through the same predicate.
pub fn feed_channel(
    capacity: usize,
    filter: StreamFilter,
    stats: Arc<StreamStats>,
    cancel: CancellationToken,
) -> (FeedSender, LogFeed) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let sender = FeedSender {
        tx,
        filter,
        stats,
        cancel: cancel.clone(),
    };
    (sender, LogFeed { rx, cancel })
}

/// Producer half of a feed
pub struct FeedSender {
    tx: mpsc::Sender<StreamEvent>,
    filter: StreamFilter,
    stats: Arc<StreamStats>,
    cancel: CancellationToken,
}

impl FeedSender {
    /// Filter and forward a record
    ///
    /// Returns `false` once the feed is cancelled or the consumer is gone.
    pub async fn record(&self, record: LogRecord) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        self.stats.seen.fetch_add(1, Ordering::Relaxed);
        if !self.filter.matches(&record) {
            return true;
        }
        let delivered = self.send(StreamEvent::Record(record)).await;
        if delivered {
            self.stats.emitted.fetch_add(1, Ordering::Relaxed);
        }
        delivered
    }

    pub async fn diagnostic(&self, diagnostic: Diagnostic) -> bool {
        self.send(StreamEvent::Diagnostic(diagnostic)).await
    }

    /// Deliver the terminal error
    pub async fn fail(&self, error: ApiError) -> bool {
        self.send(StreamEvent::Failed(error)).await
    }

    pub fn decode_failure(&self) {
        self.stats.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    async fn send(&self, event: StreamEvent) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            result = self.tx.send(event) => result.is_ok(),
        }
    }
}

/// Consumer half of a feed
///
/// Yields events until the producer finishes or the feed is cancelled. Events
/// still buffered when cancellation is requested are discarded.
pub struct LogFeed {
    rx: mpsc::Receiver<StreamEvent>,
    cancel: CancellationToken,
}

impl LogFeed {
    pub async fn next(&mut self) -> Option<StreamEvent> {
        if self.cancel.is_cancelled() {
            return None;
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            event = self.rx.recv() => event,
        }
    }

    /// Non-blocking poll, for render loops
    pub fn try_next(&mut self) -> Option<StreamEvent> {
        if self.cancel.is_cancelled() {
            return None;
        }
        self.rx.try_recv().ok()
    }

    /// Whether the producer has finished and the buffer is drained
    pub fn is_finished(&self) -> bool {
        self.cancel.is_cancelled() || (self.rx.is_closed() && self.rx.is_empty())
    }

    pub fn into_stream(self) -> impl Stream<Item = StreamEvent> {
        futures::stream::unfold(self, |mut feed| async move {
            let event = feed.next().await?;
            Some((event, feed))
        })
    }

    /// Push every event into `sink` until the feed ends
    ///
    /// Returns the terminal error if the feed failed.
    pub async fn drain_into<S: LogSink>(mut self, sink: &mut S) -> Result<(), ApiError> {
        while let Some(event) = self.next().await {
            match event {
                StreamEvent::Record(record) => sink.on_record(record),
                StreamEvent::Diagnostic(d) => sink.on_diagnostic(d.kind, &d.message),
                StreamEvent::Failed(err) => return Err(err),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use r4r_types::LogLevel;

    fn record(level: LogLevel, message: &str) -> LogRecord {
        LogRecord::new(Utc::now(), level, message)
    }

    #[derive(Default)]
    struct CollectingSink {
        records: Vec<String>,
        diagnostics: Vec<DiagnosticKind>,
    }

    impl LogSink for CollectingSink {
        fn on_record(&mut self, record: LogRecord) {
            self.records.push(record.message().to_string());
        }

        fn on_diagnostic(&mut self, kind: DiagnosticKind, _message: &str) {
            self.diagnostics.push(kind);
        }
    }

    #[tokio::test]
    async fn test_sender_filters_and_counts() {
        let stats = Arc::new(StreamStats::default());
        let filter = StreamFilter::new().with_level(Some(LogLevel::Error));
        let (sender, mut feed) = feed_channel(8, filter, stats.clone(), CancellationToken::new());

        assert!(sender.record(record(LogLevel::Info, "a")).await);
        assert!(sender.record(record(LogLevel::Error, "b")).await);
        drop(sender);

        let Some(StreamEvent::Record(got)) = feed.next().await else {
            panic!("expected a record");
        };
        assert_eq!(got.message(), "b");
        assert!(feed.next().await.is_none());
        assert_eq!(stats.seen(), 2);
        assert_eq!(stats.emitted(), 1);
    }

    #[tokio::test]
    async fn test_cancel_discards_buffered_events() {
        let cancel = CancellationToken::new();
        let stats = Arc::new(StreamStats::default());
        let (sender, mut feed) = feed_channel(8, StreamFilter::new(), stats, cancel.clone());

        assert!(sender.record(record(LogLevel::Info, "before")).await);
        cancel.cancel();
        assert!(!sender.record(record(LogLevel::Info, "after")).await);
        assert!(feed.next().await.is_none());
        assert!(feed.is_finished());
    }

    #[tokio::test]
    async fn test_drain_into_sink() {
        let stats = Arc::new(StreamStats::default());
        let (sender, feed) = feed_channel(8, StreamFilter::new(), stats, CancellationToken::new());

        tokio::spawn(async move {
            sender.diagnostic(Diagnostic::new(DiagnosticKind::Connected, "up")).await;
            sender.record(record(LogLevel::Info, "one")).await;
            sender.fail(ApiError::from_status(401, "nope")).await;
        });

        let mut sink = CollectingSink::default();
        let result = feed.drain_into(&mut sink).await;
        assert!(result.is_err_and(|e| e.is_auth()));
        assert_eq!(sink.records, vec!["one"]);
        assert_eq!(sink.diagnostics, vec![DiagnosticKind::Connected]);
    }

    #[tokio::test]
    async fn test_send_fails_when_consumer_dropped() {
        let stats = Arc::new(StreamStats::default());
        let (sender, feed) = feed_channel(1, StreamFilter::new(), stats, CancellationToken::new());
        drop(feed);
        assert!(!sender.record(record(LogLevel::Info, "x")).await);
        assert!(sender.is_closed());
    }
}
