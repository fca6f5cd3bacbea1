use std::collections::HashMap;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde_json::{Map, Value};

use r4r_types::{LogLevel, LogRecord, parse_timestamp};

use crate::feed::{Diagnostic, DiagnosticKind};

/// Source label given to plain-text stream frames
pub const STREAM_SOURCE: &str = "render-stream";

/// Source label for structured stream frames that carry none
pub const UNKNOWN_SOURCE: &str = "unknown";

const MESSAGE_FIELDS: [&str; 5] = ["message", "msg", "log", "text", "body"];
const LEVEL_FIELDS: [&str; 6] = ["level", "severity", "lvl", "log.level", "loglevel", "log_level"];
const TIME_FIELDS: [&str; 4] = ["timestamp", "time", "ts", "@timestamp"];

/// CSI and OSC escape sequences
static ANSI_ESCAPE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"\x1b\[[0-?]*[ -/]*[@-~]|\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)|\x1b[@-Z\\-_]").ok()
});

/// A wire record before normalization
#[derive(Clone, Debug)]
pub enum RawRecord {
    /// Item from a history page
    Page(Value),
    /// Decoded JSON stream frame
    Frame(Value),
    /// Stream frame that is not JSON
    Text { text: String, service_id: String },
}

/// Result of classifying one live frame
#[derive(Clone, Debug, PartialEq)]
pub enum FrameOutcome {
    Record(LogRecord),
    /// Frame was not valid JSON and went through the plain-text path
    Unparsed(LogRecord),
    Control(Diagnostic),
    Ignored,
}

/// Converts heterogeneous wire records into [`LogRecord`]s
pub struct LogNormalizer;

impl LogNormalizer {
    /// Normalize a raw record. Never fails; missing fields take defaults.
    pub fn normalize(raw: RawRecord) -> LogRecord {
        match raw {
            RawRecord::Page(value) => Self::from_value(value, ""),
            RawRecord::Frame(value) => Self::from_value(value, UNKNOWN_SOURCE),
            RawRecord::Text { text, service_id } => Self::from_text(&text, service_id),
        }
    }

    /// Classify and normalize one text frame from the live stream
    pub fn decode_frame(frame: &str, fallback_service: &str) -> FrameOutcome {
        let value: Value = match serde_json::from_str(frame) {
            Ok(value) => value,
            Err(_) if frame.trim().is_empty() => return FrameOutcome::Ignored,
            Err(_) => {
                return FrameOutcome::Unparsed(Self::from_text(frame, fallback_service.to_string()));
            }
        };

        let Some(obj) = value.as_object() else {
            let text = match &value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            if text.trim().is_empty() {
                return FrameOutcome::Ignored;
            }
            return FrameOutcome::Record(Self::from_text(&text, fallback_service.to_string()));
        };

        match obj.get("type").and_then(Value::as_str) {
            Some("error") => {
                let message = string_field(obj, "message").unwrap_or_else(|| "Unknown error".to_string());
                return FrameOutcome::Control(Diagnostic::new(DiagnosticKind::StreamError, message));
            }
            Some("connection") => {
                let status = string_field(obj, "status").unwrap_or_else(|| "unknown".to_string());
                return FrameOutcome::Control(Diagnostic::new(DiagnosticKind::Connection, status));
            }
            Some("log") => {}
            Some(_) if !obj.contains_key("timestamp") => return FrameOutcome::Ignored,
            _ => {}
        }

        let has_content = obj.contains_key("timestamp")
            || MESSAGE_FIELDS.iter().any(|key| obj.contains_key(*key));
        if !has_content && obj.get("type").is_none() {
            return FrameOutcome::Ignored;
        }

        let record = Self::normalize(RawRecord::Frame(value));
        if record.is_attributable() || fallback_service.is_empty() {
            FrameOutcome::Record(record)
        } else {
            FrameOutcome::Record(record.with_service_id(fallback_service))
        }
    }

    /// Strip escape sequences and control characters, then trim
    pub fn clean_message(raw: &str) -> String {
        let without_ansi = match ANSI_ESCAPE.as_ref() {
            Some(re) => re.replace_all(raw, ""),
            None => raw.into(),
        };
        let cleaned: String = without_ansi
            .chars()
            .filter_map(|c| match c {
                '\n' | '\t' => Some(' '),
                c if c.is_control() => None,
                c => Some(c),
            })
            .collect();
        cleaned.trim().to_string()
    }

    fn from_text(text: &str, service_id: String) -> LogRecord {
        LogRecord::new(Utc::now(), LogLevel::Info, Self::clean_message(text))
            .with_source(STREAM_SOURCE)
            .with_service_id(service_id)
    }

    fn from_value(value: Value, default_source: &str) -> LogRecord {
        let obj = match value {
            Value::Object(obj) => obj,
            Value::String(s) => return Self::from_text(&s, String::new()).with_source(default_source),
            other => {
                return Self::from_text(&other.to_string(), String::new()).with_source(default_source);
            }
        };

        let labels = extract_labels(obj.get("labels"));
        let level = extract_level(&obj)
            .or_else(|| labels.get("level").map(|l| LogLevel::parse(l)))
            .unwrap_or(LogLevel::Info);
        let timestamp = extract_timestamp(&obj).unwrap_or_else(Utc::now);
        let message = extract_message(&obj);
        let source = string_field(&obj, "source")
            .or_else(|| labels.get("type").cloned())
            .unwrap_or_else(|| default_source.to_string());
        let service_id = string_field(&obj, "serviceId")
            .or_else(|| string_field(&obj, "service_id"))
            .unwrap_or_default();
        let resource_id = string_field(&obj, "resourceId")
            .or_else(|| string_field(&obj, "resource_id"))
            .or_else(|| labels.get("resource").cloned());

        LogRecord::new(timestamp, level, Self::clean_message(&message))
            .with_source(source)
            .with_service_id(service_id)
            .with_resource_id(resource_id)
            .with_labels(labels)
    }
}

fn string_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Known message fields first, then the compact JSON of the whole object
fn extract_message(obj: &Map<String, Value>) -> String {
    for key in MESSAGE_FIELDS {
        match obj.get(key) {
            Some(Value::String(s)) => return s.clone(),
            Some(Value::Null) | None => continue,
            Some(other) => return other.to_string(),
        }
    }
    Value::Object(obj.clone()).to_string()
}

fn extract_level(obj: &Map<String, Value>) -> Option<LogLevel> {
    LEVEL_FIELDS.iter().find_map(|key| match obj.get(*key)? {
        Value::String(s) if !s.trim().is_empty() => Some(LogLevel::parse(s)),
        Value::Number(n) => n.as_i64().map(LogLevel::from_number),
        _ => None,
    })
}

fn extract_timestamp(obj: &Map<String, Value>) -> Option<DateTime<Utc>> {
    TIME_FIELDS.iter().find_map(|key| match obj.get(*key)? {
        Value::String(s) => parse_timestamp(s),
        Value::Number(n) => n.as_i64().and_then(epoch_to_datetime),
        _ => None,
    })
}

/// Epoch seconds or milliseconds
fn epoch_to_datetime(n: i64) -> Option<DateTime<Utc>> {
    if n.abs() >= 100_000_000_000 {
        DateTime::from_timestamp_millis(n)
    } else {
        DateTime::from_timestamp(n, 0)
    }
}

/// Labels arrive as an object map or as `[{ "name": k, "value": v }]`
fn extract_labels(labels: Option<&Value>) -> HashMap<String, String> {
    fn as_text(value: &Value) -> Option<String> {
        match value {
            Value::String(s) => Some(s.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }

    match labels {
        Some(Value::Object(map)) => map
            .iter()
            .filter_map(|(k, v)| Some((k.clone(), as_text(v)?)))
            .collect(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| {
                let name = item.get("name")?.as_str()?;
                Some((name.to_string(), as_text(item.get("value")?)?))
            })
            .collect(),
        _ => HashMap::new(),
    }
}
