use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use r4r_types::{LogLevel, parse_timestamp};

use crate::error::ApiError;

/// Parameters for one page of the log history endpoint
#[derive(Clone, Debug, PartialEq)]
pub struct LogQuery {
    pub resource_ids: Vec<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub limit: u32,
    pub level: Option<LogLevel>,
    pub cursor: Option<String>,
}

impl LogQuery {
    pub fn new(resource_ids: Vec<String>, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            resource_ids,
            start,
            end,
            limit: 100,
            level: None,
            cursor: None,
        }
    }

    /// Query parameters in the order they are sent
    pub fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("resourceIds", self.resource_ids.join(",")),
            ("startTime", self.start.to_rfc3339()),
            ("endTime", self.end.to_rfc3339()),
            ("limit", self.limit.to_string()),
        ];
        if let Some(level) = &self.level {
            params.push(("level", level.as_str().to_string()));
        }
        if let Some(cursor) = &self.cursor {
            params.push(("cursor", cursor.clone()));
        }
        params
    }
}

/// One decoded page of log history
///
/// Items are left as raw JSON; normalization happens in the log pipeline.
#[derive(Clone, Debug, Default)]
pub struct LogPage {
    pub logs: Vec<Value>,
    /// `None` when the page does not say
    pub has_more: Option<bool>,
    pub next_cursor: Option<String>,
    pub next_start: Option<DateTime<Utc>>,
    pub next_end: Option<DateTime<Utc>>,
}

impl LogPage {
    /// Decode a page body
    ///
    /// Accepts a bare array of entries or an object carrying `logs` plus the
    /// pagination fields `cursor`/`nextCursor`, `hasMore`, `nextStartTime`
    /// and `nextEndTime`.
    pub fn from_value(body: Value) -> Result<Self, ApiError> {
        match body {
            Value::Array(logs) => Ok(Self {
                logs,
                ..Default::default()
            }),
            Value::Object(mut map) => {
                let logs = match map.remove("logs") {
                    Some(Value::Array(logs)) => logs,
                    Some(Value::Null) | None => Vec::new(),
                    Some(other) => {
                        return Err(ApiError::Decode(format!(
                            "expected `logs` to be an array, got {other}"
                        )));
                    }
                };
                let text = |key: &str| {
                    map.get(key)
                        .and_then(Value::as_str)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                };
                let next_cursor = text("cursor").or_else(|| text("nextCursor"));
                let next_start = text("nextStartTime").as_deref().and_then(parse_timestamp);
                let next_end = text("nextEndTime").as_deref().and_then(parse_timestamp);
                let has_more = map.get("hasMore").and_then(Value::as_bool);

                Ok(Self {
                    logs,
                    has_more,
                    next_cursor,
                    next_start,
                    next_end,
                })
            }
            other => Err(ApiError::Decode(format!(
                "expected a log page object or array, got {other}"
            ))),
        }
    }
}

/// Source of log history pages
#[async_trait]
pub trait LogTransport: Send + Sync {
    async fn list_logs(&self, query: &LogQuery) -> Result<LogPage, ApiError>;
}
