use regex::Regex;

use r4r_types::{LogLevel, LogRecord};

/// Level and free-text filter applied to every record in a feed
///
/// A record passes when its level equals the filter level (if one is set) and
/// its message contains the search term, ignoring case (if one is set). The
/// predicate is pure; changing the filter means building a new one.
#[derive(Clone, Default)]
pub struct StreamFilter {
    level: Option<LogLevel>,

    /// Original search term
    search: Option<String>,

    /// Case-insensitive literal matcher for `search`
    matcher: Option<Regex>,
}

impl StreamFilter {
    /// Filter that passes everything
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_level(mut self, level: Option<LogLevel>) -> Self {
        self.level = level;
        self
    }

    /// Set the search term; blank terms clear it
    pub fn with_search(mut self, term: Option<&str>) -> Self {
        let term = term.map(str::trim).filter(|t| !t.is_empty());
        self.matcher = term.and_then(|t| Regex::new(&format!("(?i){}", regex::escape(t))).ok());
        self.search = term.map(str::to_string);
        self
    }

    /// Check if a record passes this filter
    pub fn matches(&self, record: &LogRecord) -> bool {
        if let Some(level) = &self.level {
            if record.level() != level {
                return false;
            }
        }

        match (&self.matcher, &self.search) {
            (Some(re), _) => re.is_match(record.message()),
            (None, Some(term)) => record
                .message()
                .to_lowercase()
                .contains(&term.to_lowercase()),
            (None, None) => true,
        }
    }

    /// Byte ranges of search hits in `text` (for highlighting)
    pub fn find_matches(&self, text: &str) -> Vec<(usize, usize)> {
        match &self.matcher {
            Some(re) => re.find_iter(text).map(|m| (m.start(), m.end())).collect(),
            None => Vec::new(),
        }
    }

    pub fn level(&self) -> Option<&LogLevel> {
        self.level.as_ref()
    }

    pub fn search(&self) -> Option<&str> {
        self.search.as_deref()
    }

    /// Check if filter is empty (matches everything)
    pub fn is_empty(&self) -> bool {
        self.level.is_none() && self.search.is_none()
    }

    /// Short human description, e.g. `level=error search="timeout"`
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if let Some(level) = &self.level {
            parts.push(format!("level={level}"));
        }
        if let Some(search) = &self.search {
            parts.push(format!("search={search:?}"));
        }
        if parts.is_empty() {
            "none".to_string()
        } else {
            parts.join(" ")
        }
    }
}

impl PartialEq for StreamFilter {
    fn eq(&self, other: &Self) -> bool {
        self.level == other.level && self.search == other.search
    }
}

impl std::fmt::Debug for StreamFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamFilter")
            .field("level", &self.level)
            .field("search", &self.search)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(level: LogLevel, message: &str) -> LogRecord {
        LogRecord::new(Utc::now(), level, message)
    }

    #[test]
    fn test_level_filter_is_exact() {
        let filter = StreamFilter::new().with_level(Some(LogLevel::Error));
        assert!(filter.matches(&record(LogLevel::Error, "x")));
        assert!(!filter.matches(&record(LogLevel::Fatal, "x")));
        assert!(!filter.matches(&record(LogLevel::Info, "x")));
    }

    #[test]
    fn test_other_level_needs_identical_value() {
        let filter = StreamFilter::new().with_level(Some(LogLevel::Other("audit".into())));
        assert!(filter.matches(&record(LogLevel::Other("audit".into()), "x")));
        assert!(!filter.matches(&record(LogLevel::Other("trace2".into()), "x")));
    }

    #[test]
    fn test_search_case_insensitive_literal() {
        let filter = StreamFilter::new().with_search(Some("TimeOut (5s)"));
        assert!(filter.matches(&record(LogLevel::Info, "request timeout (5s) exceeded")));
        assert!(!filter.matches(&record(LogLevel::Info, "request timeout 5s exceeded")));
    }

    #[test]
    fn test_both_predicates_required() {
        let filter = StreamFilter::new()
            .with_level(Some(LogLevel::Warn))
            .with_search(Some("disk"));
        assert!(filter.matches(&record(LogLevel::Warn, "Disk at 91%")));
        assert!(!filter.matches(&record(LogLevel::Error, "Disk at 91%")));
        assert!(!filter.matches(&record(LogLevel::Warn, "cpu hot")));
    }

    #[test]
    fn test_blank_search_clears() {
        let filter = StreamFilter::new().with_search(Some("   "));
        assert!(filter.is_empty());
        assert_eq!(filter.describe(), "none");
    }

    #[test]
    fn test_filter_is_idempotent() {
        let records: Vec<LogRecord> = vec![
            record(LogLevel::Info, "boot ok"),
            record(LogLevel::Error, "boot failed"),
            record(LogLevel::Error, "db down"),
            record(LogLevel::Warn, "boot slow"),
        ];
        let filter = StreamFilter::new()
            .with_level(Some(LogLevel::Error))
            .with_search(Some("boot"));

        let first: Vec<&LogRecord> = records.iter().filter(|r| filter.matches(r)).collect();
        let second: Vec<&LogRecord> = records.iter().filter(|r| filter.matches(r)).collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 1);
    }

    #[test]
    fn test_find_matches() {
        let filter = StreamFilter::new().with_search(Some("error"));
        let matches = filter.find_matches("an ERROR occurred, another error here");
        assert_eq!(matches, vec![(3, 8), (27, 32)]);
    }
}
