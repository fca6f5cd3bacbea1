use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use r4r_types::{LogLevel, LogRecord};

use crate::filter::StreamFilter;

/// Record plus its position in arrival order
#[derive(Clone, Debug, PartialEq)]
pub struct BufferedRecord {
    pub id: u64,
    pub record: LogRecord,
}

/// Thread-safe ring buffer of received records, for display and export
#[derive(Clone)]
pub struct LogBuffer {
    records: Arc<RwLock<VecDeque<BufferedRecord>>>,

    capacity: usize,

    /// Next record ID
    next_id: Arc<AtomicU64>,
}

impl LogBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: Arc::new(RwLock::new(VecDeque::with_capacity(capacity))),
            capacity,
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Append a record, evicting the oldest at capacity; returns its id
    pub fn push(&self, record: LogRecord) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut records = self.records.write();
        if records.len() >= self.capacity {
            records.pop_front();
        }
        records.push_back(BufferedRecord { id, record });
        id
    }

    pub fn all(&self) -> Vec<BufferedRecord> {
        self.records.read().iter().cloned().collect()
    }

    pub fn filtered<F>(&self, predicate: F) -> Vec<BufferedRecord>
    where
        F: Fn(&LogRecord) -> bool,
    {
        self.records
            .read()
            .iter()
            .filter(|b| predicate(&b.record))
            .cloned()
            .collect()
    }

    /// Records passing `filter`, in arrival order
    pub fn matching(&self, filter: &StreamFilter) -> Vec<BufferedRecord> {
        self.filtered(|r| filter.matches(r))
    }

    pub fn level_counts(&self) -> LevelCounts {
        let records = self.records.read();
        let mut counts = LevelCounts::default();
        for buffered in records.iter() {
            counts.add(buffered.record.level());
        }
        counts
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Export records as `[timestamp] [LEVEL] message` lines
    pub fn export_lines(&self, filter: Option<&StreamFilter>) -> String {
        self.records
            .read()
            .iter()
            .filter(|b| filter.is_none_or(|f| f.matches(&b.record)))
            .map(|b| b.record.export_line())
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn clear(&self) {
        self.records.write().clear();
        self.next_id.store(0, Ordering::SeqCst);
    }

    /// Get the last N records
    pub fn tail(&self, n: usize) -> Vec<BufferedRecord> {
        let records = self.records.read();
        let start = records.len().saturating_sub(n);
        records.iter().skip(start).cloned().collect()
    }

    /// Get records in a range (for virtual scrolling)
    pub fn range(&self, start: usize, count: usize) -> Vec<BufferedRecord> {
        let records = self.records.read();
        records.iter().skip(start).take(count).cloned().collect()
    }
}

/// Counts per log level
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LevelCounts {
    pub debug: usize,
    pub info: usize,
    pub warn: usize,
    pub error: usize,
    pub fatal: usize,
    pub other: usize,
}

impl LevelCounts {
    fn add(&mut self, level: &LogLevel) {
        match level {
            LogLevel::Debug => self.debug += 1,
            LogLevel::Info => self.info += 1,
            LogLevel::Warn => self.warn += 1,
            LogLevel::Error => self.error += 1,
            LogLevel::Fatal => self.fatal += 1,
            LogLevel::Other(_) => self.other += 1,
        }
    }

    pub fn get(&self, level: &LogLevel) -> usize {
        match level {
            LogLevel::Debug => self.debug,
            LogLevel::Info => self.info,
            LogLevel::Warn => self.warn,
            LogLevel::Error => self.error,
            LogLevel::Fatal => self.fatal,
            LogLevel::Other(_) => self.other,
        }
    }

    pub fn total(&self) -> usize {
        self.debug + self.info + self.warn + self.error + self.fatal + self.other
    }
}
