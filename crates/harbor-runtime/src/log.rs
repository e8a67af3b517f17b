//! Request-scoped log buffer
//!
//! Application log records are buffered for the lifetime of a request and
//! emitted through `tracing` when the buffer is flushed. The final flush
//! closes the buffer; anything logged afterwards is emitted immediately.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;

/// Severity of a buffered record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Error
    Error,
    /// Warning
    Warning,
    /// Informational
    Info,
    /// Trace/debug
    Trace,
}

/// One buffered record
#[derive(Debug, Clone)]
pub struct LogRecord {
    /// Severity
    pub level: LogLevel,
    /// Category (component or subsystem name)
    pub category: String,
    /// Message text
    pub message: String,
    /// When the record was logged
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug)]
struct BufferState {
    records: Vec<LogRecord>,
    flushed: usize,
    closed: bool,
}

/// Shared handle to a request's log buffer
#[derive(Debug, Clone)]
pub struct LogBuffer {
    request_id: Arc<str>,
    flush_interval: usize,
    state: Arc<Mutex<BufferState>>,
}

impl LogBuffer {
    /// Create a buffer that auto-flushes every `flush_interval` records (0 = never)
    pub fn new(request_id: impl Into<Arc<str>>, flush_interval: usize) -> Self {
        Self {
            request_id: request_id.into(),
            flush_interval,
            state: Arc::new(Mutex::new(BufferState {
                records: Vec::new(),
                flushed: 0,
                closed: false,
            })),
        }
    }

    /// Buffer a record
    pub fn log(&self, level: LogLevel, category: &str, message: impl Into<String>) {
        let record = LogRecord {
            level,
            category: category.to_string(),
            message: message.into(),
            timestamp: Utc::now(),
        };

        let mut state = self.state.lock();
        if state.closed {
            state.flushed += 1;
            drop(state);
            emit(&self.request_id, &record);
            return;
        }

        state.records.push(record);
        if self.flush_interval > 0 && state.records.len() >= self.flush_interval {
            let records = std::mem::take(&mut state.records);
            state.flushed += records.len();
            drop(state);
            self.emit_all(&records);
        }
    }

    /// Emit buffered records; a final flush also closes the buffer
    ///
    /// Returns the number of records emitted.
    pub fn flush(&self, final_flush: bool) -> usize {
        let records = {
            let mut state = self.state.lock();
            let records = std::mem::take(&mut state.records);
            state.flushed += records.len();
            if final_flush {
                state.closed = true;
            }
            records
        };
        self.emit_all(&records);
        records.len()
    }

    /// Records waiting to be flushed
    pub fn pending(&self) -> usize {
        self.state.lock().records.len()
    }

    /// Records emitted so far
    pub fn flushed(&self) -> usize {
        self.state.lock().flushed
    }

    /// Whether the final flush has happened
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    fn emit_all(&self, records: &[LogRecord]) {
        for record in records {
            emit(&self.request_id, record);
        }
    }
}

fn emit(request_id: &str, record: &LogRecord) {
    let at = record.timestamp.to_rfc3339();
    match record.level {
        LogLevel::Error => tracing::error!(
            request_id = %request_id,
            category = %record.category,
            logged_at = %at,
            "{}",
            record.message
        ),
        LogLevel::Warning => tracing::warn!(
            request_id = %request_id,
            category = %record.category,
            logged_at = %at,
            "{}",
            record.message
        ),
        LogLevel::Info => tracing::info!(
            request_id = %request_id,
            category = %record.category,
            logged_at = %at,
            "{}",
            record.message
        ),
        LogLevel::Trace => tracing::debug!(
            request_id = %request_id,
            category = %record.category,
            logged_at = %at,
            "{}",
            record.message
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffered_until_flush() {
        let buffer = LogBuffer::new("req-1", 0);
        buffer.log(LogLevel::Info, "app", "one");
        buffer.log(LogLevel::Warning, "app", "two");

        assert_eq!(buffer.pending(), 2);
        assert_eq!(buffer.flush(false), 2);
        assert_eq!(buffer.pending(), 0);
        assert!(!buffer.is_closed());
    }

    #[test]
    fn test_auto_flush_interval() {
        let buffer = LogBuffer::new("req-2", 2);
        buffer.log(LogLevel::Info, "app", "one");
        assert_eq!(buffer.pending(), 1);
        buffer.log(LogLevel::Info, "app", "two");
        assert_eq!(buffer.pending(), 0);
        assert_eq!(buffer.flushed(), 2);
    }

    #[test]
    fn test_final_flush_closes() {
        let buffer = LogBuffer::new("req-3", 0);
        buffer.log(LogLevel::Error, "db", "close failed");
        buffer.flush(false);
        assert_eq!(buffer.flush(true), 0);
        assert!(buffer.is_closed());

        buffer.log(LogLevel::Info, "app", "late");
        assert_eq!(buffer.pending(), 0);
        assert_eq!(buffer.flushed(), 2);
    }

    #[test]
    fn test_clones_share_state() {
        let buffer = LogBuffer::new("req-4", 0);
        let handle = buffer.clone();
        handle.log(LogLevel::Trace, "app", "from clone");
        assert_eq!(buffer.pending(), 1);
    }
}
