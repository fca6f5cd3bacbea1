//! Log streaming for r4r
//!
//! Normalizes Render log payloads, pages through history, follows the live
//! stream with a polling fallback, and merges both into one filtered feed.

mod aggregator;
mod buffer;
mod error;
mod feed;
mod fetcher;
mod filter;
mod normalizer;
mod tailer;

pub use aggregator::{LogStreamManager, Subscription, SubscriptionState};
pub use buffer::{BufferedRecord, LevelCounts, LogBuffer};
pub use error::StreamError;
pub use feed::{
    DEFAULT_FEED_CAPACITY, Diagnostic, DiagnosticKind, FeedSender, LogFeed, LogSink, StreamEvent,
    StreamStats, feed_channel,
};
pub use fetcher::{DEFAULT_PAGE_TIMEOUT, HistoricalFetcher};
pub use filter::StreamFilter;
pub use normalizer::{FrameOutcome, LogNormalizer, RawRecord, STREAM_SOURCE, UNKNOWN_SOURCE};
pub use tailer::{DEFAULT_POLL_INTERVAL, LiveTailer, TailHandle};

// Re-export types used in our public API
pub use r4r_types::{LogLevel, LogRecord, TimeWindow};
