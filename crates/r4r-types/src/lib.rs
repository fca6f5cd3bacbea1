//! Shared types for r4r
//!
//! This crate contains data structures used across multiple r4r crates.

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use ratatui::style::Color;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

// ============================================================================
// Render Resource Types
// ============================================================================

/// Service information
#[derive(Clone, Debug, Serialize)]
pub struct Service {
    pub id: String,
    pub name: String,
    pub kind: String,
    pub status: ServiceStatus,
    pub auto_deploy: bool,
    pub branch: Option<String>,
    pub repo: Option<String>,
    pub slug: Option<String>,
    pub url: Option<String>,
    pub region: Option<String>,
    pub plan: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Service {
    pub fn new(id: String, name: String) -> Self {
        Self {
            id,
            name,
            kind: String::from("unknown"),
            status: ServiceStatus::Unknown,
            auto_deploy: false,
            branch: None,
            repo: None,
            slug: None,
            url: None,
            region: None,
            plan: None,
            created_at: None,
            updated_at: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Active,
    Suspended,
    Unknown,
}

impl ServiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Suspended => "suspended",
            Self::Unknown => "unknown",
        }
    }
}

/// Maps the `suspended` field of a service payload
impl From<&str> for ServiceStatus {
    fn from(s: &str) -> Self {
        match s {
            "not_suspended" => Self::Active,
            "suspended" => Self::Suspended,
            _ => Self::Unknown,
        }
    }
}

/// Deploy information
#[derive(Clone, Debug, Serialize)]
pub struct Deploy {
    pub id: String,
    pub status: String,
    pub commit_id: Option<String>,
    pub commit_message: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Deploy {
    pub fn new(id: String, status: String) -> Self {
        Self {
            id,
            status,
            commit_id: None,
            commit_message: None,
            created_at: None,
            finished_at: None,
        }
    }

    /// Wall time between creation and completion, if both are known
    pub fn duration(&self) -> Option<Duration> {
        match (self.created_at, self.finished_at) {
            (Some(start), Some(end)) if end >= start => Some(end - start),
            _ => None,
        }
    }

    pub fn is_live(&self) -> bool {
        self.status == "live"
    }

    /// Terminal failure states reported by the deploy endpoint
    pub fn is_failed(&self) -> bool {
        matches!(
            self.status.as_str(),
            "build_failed" | "update_failed" | "canceled" | "deactivated" | "failed"
        )
    }
}

/// One-off job information
#[derive(Clone, Debug, Serialize)]
pub struct Job {
    pub id: String,
    pub service_id: String,
    pub start_command: String,
    pub status: String,
    pub created_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(id: String, service_id: String, start_command: String) -> Self {
        Self {
            id,
            service_id,
            start_command,
            status: String::from("pending"),
            created_at: None,
            finished_at: None,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.status.as_str(), "succeeded" | "failed" | "canceled")
    }
}

/// Account or team that owns services
#[derive(Clone, Debug, Serialize)]
pub struct Owner {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    pub kind: String,
}

// ============================================================================
// Log Types
// ============================================================================

/// Closed time interval used for history queries
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Window ending now and reaching `hours` into the past
    ///
    /// `None` when the start would fall outside the representable range.
    pub fn trailing_hours(hours: i64) -> Option<Self> {
        let span = Duration::try_hours(hours)?;
        let end = Utc::now();
        let start = end.checked_sub_signed(span)?;
        Some(Self { start, end })
    }

    /// Window ending now; an oversized span starts at the earliest instant
    pub fn trailing(span: Duration) -> Self {
        let end = Utc::now();
        Self {
            start: end.checked_sub_signed(span).unwrap_or(DateTime::<Utc>::MIN_UTC),
            end,
        }
    }
}

/// Preset history windows the log viewer cycles through
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TimeRange {
    /// Last 5 minutes
    Last5m,
    /// Last 15 minutes
    Last15m,
    /// Last 1 hour
    #[default]
    Last1h,
    /// Last 6 hours
    Last6h,
    /// Last 24 hours
    Last24h,
}

impl TimeRange {
    pub fn as_seconds(&self) -> i64 {
        match self {
            Self::Last5m => 5 * 60,
            Self::Last15m => 15 * 60,
            Self::Last1h => 60 * 60,
            Self::Last6h => 6 * 60 * 60,
            Self::Last24h => 24 * 60 * 60,
        }
    }

    pub fn window(&self) -> TimeWindow {
        TimeWindow::trailing(Duration::seconds(self.as_seconds()))
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Last5m => "5m",
            Self::Last15m => "15m",
            Self::Last1h => "1h",
            Self::Last6h => "6h",
            Self::Last24h => "24h",
        }
    }

    pub fn next(&self) -> Self {
        match self {
            Self::Last5m => Self::Last15m,
            Self::Last15m => Self::Last1h,
            Self::Last1h => Self::Last6h,
            Self::Last6h => Self::Last24h,
            Self::Last24h => Self::Last5m,
        }
    }

    pub fn prev(&self) -> Self {
        match self {
            Self::Last5m => Self::Last24h,
            Self::Last15m => Self::Last5m,
            Self::Last1h => Self::Last15m,
            Self::Last6h => Self::Last1h,
            Self::Last24h => Self::Last6h,
        }
    }
}

/// Log severity level
///
/// Parsing is case-insensitive and folds common aliases into the closed set.
/// Anything else is kept verbatim (lowercased) in `Other`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    Fatal,
    Other(String),
}

impl LogLevel {
    /// Parse a level label from common formats
    pub fn parse(s: &str) -> Self {
        let lower = s.trim().to_lowercase();
        match lower.as_str() {
            "trace" | "debug" | "dbg" => Self::Debug,
            "info" | "inf" | "information" | "notice" => Self::Info,
            "warn" | "warning" | "wrn" => Self::Warn,
            "error" | "err" => Self::Error,
            "fatal" | "panic" | "critical" | "crit" | "emergency" | "alert" => Self::Fatal,
            _ => Self::Other(lower),
        }
    }

    /// Map numeric levels (bunyan/pino style)
    pub fn from_number(n: i64) -> Self {
        match n {
            ..=20 => Self::Debug,
            21..=30 => Self::Info,
            31..=40 => Self::Warn,
            41..=50 => Self::Error,
            _ => Self::Fatal,
        }
    }

    /// Canonical lowercase label
    pub fn as_str(&self) -> &str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
            Self::Fatal => "fatal",
            Self::Other(s) => s,
        }
    }

    /// Short display string (3 chars)
    pub fn short(&self) -> &'static str {
        match self {
            Self::Debug => "DBG",
            Self::Info => "INF",
            Self::Warn => "WRN",
            Self::Error => "ERR",
            Self::Fatal => "FTL",
            Self::Other(_) => "???",
        }
    }

    /// Get display color for this level
    pub fn color(&self) -> Color {
        match self {
            Self::Debug => Color::Cyan,
            Self::Info => Color::Green,
            Self::Warn => Color::Yellow,
            Self::Error => Color::Red,
            Self::Fatal => Color::Magenta,
            Self::Other(_) => Color::White,
        }
    }

    /// The levels a user can pick as a filter, in severity order
    pub fn selectable() -> [LogLevel; 5] {
        [
            Self::Debug,
            Self::Info,
            Self::Warn,
            Self::Error,
            Self::Fatal,
        ]
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for LogLevel {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}

impl From<String> for LogLevel {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl From<LogLevel> for String {
    fn from(level: LogLevel) -> Self {
        level.as_str().to_string()
    }
}

/// A single normalized log record
///
/// Records are built once at ingestion and never mutated afterwards; the
/// `with_*` builders consume `self` and are only used while constructing.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LogRecord {
    timestamp: DateTime<Utc>,
    level: LogLevel,
    message: String,
    source: String,
    service_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    resource_id: Option<String>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    labels: HashMap<String, String>,
}

impl LogRecord {
    pub fn new(timestamp: DateTime<Utc>, level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp,
            level,
            message: message.into(),
            source: String::new(),
            service_id: String::new(),
            resource_id: None,
            labels: HashMap::new(),
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_service_id(mut self, service_id: impl Into<String>) -> Self {
        self.service_id = service_id.into();
        self
    }

    pub fn with_resource_id(mut self, resource_id: Option<String>) -> Self {
        self.resource_id = resource_id.filter(|r| !r.is_empty());
        self
    }

    pub fn with_labels(mut self, labels: HashMap<String, String>) -> Self {
        self.labels = labels;
        self
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn level(&self) -> &LogLevel {
        &self.level
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn service_id(&self) -> &str {
        &self.service_id
    }

    pub fn resource_id(&self) -> Option<&str> {
        self.resource_id.as_deref()
    }

    pub fn labels(&self) -> &HashMap<String, String> {
        &self.labels
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }

    /// At least one of service id or resource id is present
    pub fn is_attributable(&self) -> bool {
        !self.service_id.is_empty() || self.resource_id.is_some()
    }

    /// Plain-text line used for terminal output and file export
    pub fn export_line(&self) -> String {
        format!(
            "[{}] [{}] {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
            self.level.as_str().to_uppercase(),
            self.message
        )
    }
}

// ============================================================================
// Timestamps
// ============================================================================

/// Parse an API timestamp
///
/// Accepts RFC 3339 with `Z` or a numeric offset. A timestamp without an
/// offset is read as UTC. Returns `None` for anything else.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .map(|naive| naive.and_utc())
}
