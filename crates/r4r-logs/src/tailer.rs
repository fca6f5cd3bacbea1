use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::json;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use r4r_api::{ApiError, LogSocket, ReconnectConfig, SocketConnector, SocketFrame};
use r4r_types::TimeWindow;

use crate::feed::{
    DEFAULT_FEED_CAPACITY, Diagnostic, DiagnosticKind, FeedSender, LogFeed, StreamEvent,
    StreamStats, feed_channel,
};
use crate::fetcher::HistoricalFetcher;
use crate::filter::StreamFilter;
use crate::normalizer::{FrameOutcome, LogNormalizer};

/// Default delay between history polls once the live socket is gone
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Follows logs over the streaming socket, degrading to polling on disconnect
#[derive(Clone)]
pub struct LiveTailer {
    connector: Arc<dyn SocketConnector>,
    fetcher: HistoricalFetcher,
    poll_interval: Duration,
    poll_page_size: u32,
    backoff: ReconnectConfig,
    feed_capacity: usize,
}

enum SocketEvent {
    Cancelled,
    Frame(Option<Result<SocketFrame, ApiError>>),
}

impl LiveTailer {
    pub fn new(connector: Arc<dyn SocketConnector>, fetcher: HistoricalFetcher) -> Self {
        Self {
            connector,
            fetcher,
            poll_interval: DEFAULT_POLL_INTERVAL,
            poll_page_size: 100,
            backoff: ReconnectConfig::default(),
            feed_capacity: DEFAULT_FEED_CAPACITY,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_poll_page_size(mut self, page_size: u32) -> Self {
        self.poll_page_size = page_size.max(1);
        self
    }

    pub fn with_backoff(mut self, backoff: ReconnectConfig) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_feed_capacity(mut self, capacity: usize) -> Self {
        self.feed_capacity = capacity;
        self
    }

    pub fn feed_capacity(&self) -> usize {
        self.feed_capacity
    }

    /// Start tailing on a background task
    ///
    /// Nothing is emitted before the consumer starts pulling beyond the feed's
    /// buffer. The feed ends on cancellation, when the consumer drops it, or
    /// after a terminal [`StreamEvent::Failed`].
    pub fn spawn(&self, resource_ids: Vec<String>, filter: StreamFilter) -> (LogFeed, TailHandle) {
        let cancel = CancellationToken::new();
        let stats = Arc::new(StreamStats::default());
        let (sender, feed) = feed_channel(self.feed_capacity, filter, stats.clone(), cancel.clone());

        let tailer = self.clone();
        let task = tokio::spawn(async move {
            if let Err(err) = tailer.tail(&resource_ids, &sender).await {
                warn!(error = %err, "Live tail stopped");
                sender.fail(err).await;
            }
        });

        (feed, TailHandle { cancel, task, stats })
    }

    /// Follow `resource_ids` until cancelled, the consumer goes away, or a
    /// terminal error occurs
    ///
    /// Returns `Ok(())` on cancellation or when the consumer is gone.
    pub async fn tail(&self, resource_ids: &[String], sender: &FeedSender) -> Result<(), ApiError> {
        let cancel = sender.cancel_token().clone();
        let started = Utc::now();

        let connected = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(()),
            result = self.connector.connect(resource_ids) => result,
        };

        let mut socket = match connected {
            Ok(socket) => socket,
            Err(err) if err.is_auth() => return Err(err),
            Err(err) => {
                warn!(error = %err, "Log stream connect failed");
                let reason = format!("live stream unavailable: {err}");
                if !sender.diagnostic(Diagnostic::new(DiagnosticKind::Disconnected, reason)).await {
                    return Ok(());
                }
                return self.poll(resource_ids, sender, started).await;
            }
        };

        info!(resources = resource_ids.len(), "Log stream connected");
        if !sender
            .diagnostic(Diagnostic::new(DiagnosticKind::Connected, "live stream connected"))
            .await
        {
            close_quietly(socket.as_mut()).await;
            return Ok(());
        }

        let (reason, resume_from) = match self.follow(resource_ids, socket.as_mut(), sender, &cancel).await {
            Follow::Stopped => {
                close_quietly(socket.as_mut()).await;
                return Ok(());
            }
            Follow::Fatal(err) => {
                close_quietly(socket.as_mut()).await;
                return Err(err);
            }
            Follow::Dropped { reason, last_seen } => (reason, last_seen.unwrap_or(started)),
        };
        close_quietly(socket.as_mut()).await;

        warn!(%reason, "Log stream disconnected, falling back to polling");
        if !sender
            .diagnostic(Diagnostic::new(DiagnosticKind::Disconnected, reason))
            .await
        {
            return Ok(());
        }
        self.poll(resource_ids, sender, resume_from).await
    }

    /// Read frames until the socket drops or the feed stops
    async fn follow(
        &self,
        resource_ids: &[String],
        socket: &mut dyn LogSocket,
        sender: &FeedSender,
        cancel: &CancellationToken,
    ) -> Follow {
        // Sent even though the URL already names the resources
        let subscribe = json!({ "resourceIds": resource_ids }).to_string();
        if let Err(err) = socket.send_text(subscribe).await {
            if err.is_auth() {
                return Follow::Fatal(err);
            }
            return Follow::Dropped {
                reason: format!("subscribe failed: {err}"),
                last_seen: None,
            };
        }

        let fallback_service = resource_ids.first().cloned().unwrap_or_default();
        let mut last_seen: Option<DateTime<Utc>> = None;

        loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => SocketEvent::Cancelled,
                frame = socket.recv() => SocketEvent::Frame(frame),
            };

            let frame = match event {
                SocketEvent::Cancelled => return Follow::Stopped,
                SocketEvent::Frame(None) => {
                    return Follow::Dropped {
                        reason: "log stream closed by server".to_string(),
                        last_seen,
                    };
                }
                SocketEvent::Frame(Some(Err(err))) if err.is_auth() => return Follow::Fatal(err),
                SocketEvent::Frame(Some(Err(err))) => {
                    return Follow::Dropped {
                        reason: err.to_string(),
                        last_seen,
                    };
                }
                SocketEvent::Frame(Some(Ok(frame))) => frame,
            };

            let text = match frame {
                SocketFrame::Text(text) => text,
                SocketFrame::Binary(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            };

            let delivered = match LogNormalizer::decode_frame(&text, &fallback_service) {
                FrameOutcome::Record(record) => {
                    last_seen = Some(last_seen.map_or(record.timestamp(), |t| t.max(record.timestamp())));
                    sender.record(record).await
                }
                FrameOutcome::Unparsed(record) => {
                    sender.decode_failure();
                    sender.record(record).await
                }
                FrameOutcome::Control(diagnostic) => {
                    debug!(%diagnostic, "Control frame");
                    sender.diagnostic(diagnostic).await
                }
                FrameOutcome::Ignored => true,
            };

            if !delivered {
                return Follow::Stopped;
            }
        }
    }

    /// Degraded mode: re-fetch history on an interval
    ///
    /// Each poll covers `[previous poll, now]`. Consecutive failures back off
    /// exponentially and give up once the retry budget is spent.
    async fn poll(
        &self,
        resource_ids: &[String],
        sender: &FeedSender,
        mut since: DateTime<Utc>,
    ) -> Result<(), ApiError> {
        let cancel = sender.cancel_token().clone();
        let notice = format!("polling history every {}s", self.poll_interval.as_secs().max(1));
        if !sender
            .diagnostic(Diagnostic::new(DiagnosticKind::PollingFallback, notice))
            .await
        {
            return Ok(());
        }

        let mut failures = 0u32;
        loop {
            let delay = if failures == 0 {
                self.poll_interval
            } else {
                self.backoff.delay_for_attempt(failures)
            };

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                _ = sleep(delay) => {}
            }

            let now = Utc::now();
            let window = TimeWindow::new(since, now);
            let fetched = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                result = self.fetcher.fetch(resource_ids, window, None, self.poll_page_size) => result,
            };

            match fetched {
                Ok(records) => {
                    failures = 0;
                    since = now;
                    for record in records {
                        if !sender.record(record).await {
                            return Ok(());
                        }
                    }
                }
                Err(err) if err.is_auth() => return Err(err),
                Err(err) => {
                    failures += 1;
                    if !self.backoff.should_retry(failures) {
                        return Err(ApiError::Exhausted {
                            attempts: failures,
                            last: Box::new(err),
                        });
                    }
                    warn!(attempt = failures, error = %err, "Log poll failed");
                    let message = format!("poll attempt {failures} failed: {err}");
                    if !sender
                        .diagnostic(Diagnostic::new(DiagnosticKind::PollFailed, message))
                        .await
                    {
                        return Ok(());
                    }
                }
            }
        }
    }
}

enum Follow {
    /// Cancelled, or the consumer went away
    Stopped,
    Fatal(ApiError),
    Dropped {
        reason: String,
        last_seen: Option<DateTime<Utc>>,
    },
}

async fn close_quietly(socket: &mut dyn LogSocket) {
    if let Err(err) = socket.close().await {
        debug!(error = %err, "Log stream close failed");
    }
}

/// Handle for a feed started with [`LiveTailer::spawn`]
pub struct TailHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
    stats: Arc<StreamStats>,
}

impl TailHandle {
    /// Request cancellation and wait for the task to close its socket
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Err(err) = (&mut self.task).await {
            debug!(error = %err, "Tail task ended abnormally");
        }
    }

    pub fn stats(&self) -> &StreamStats {
        &self.stats
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for TailHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
