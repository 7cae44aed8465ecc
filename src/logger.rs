use chrono::{DateTime, Utc};
use once_cell::sync::{Lazy, OnceCell};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

/// Number of entries kept in the in-memory buffer
const MAX_LOG_ENTRIES: usize = 1000;

/// Log level enum for type-safe logging
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug = 0,
    Info = 1,
    Warn = 2,
    Error = 3,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "debug" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warn" => Some(LogLevel::Warn),
            "error" => Some(LogLevel::Error),
            _ => None,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => LogLevel::Debug,
            1 => LogLevel::Info,
            2 => LogLevel::Warn,
            _ => LogLevel::Error,
        }
    }
}

/// A single buffered log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    /// Emitting module, e.g. `pipeline::validate`
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<BTreeMap<String, serde_json::Value>>,
}

/// Process-wide logger
///
/// Entries are kept in a bounded buffer so callers can inspect what the
/// pipeline did for a request, and are forwarded to `tracing` as they arrive.
pub struct Logger {
    entries: Mutex<VecDeque<LogEntry>>,
    capacity: usize,
    min_level: AtomicU8,
}

impl Logger {
    pub fn new() -> Self {
        Self::with_capacity(MAX_LOG_ENTRIES)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(MAX_LOG_ENTRIES))),
            capacity,
            min_level: AtomicU8::new(LogLevel::Debug as u8),
        }
    }

    pub fn log(&self, level: LogLevel, message: &str, source: &str) {
        self.record(level, message, source, None);
    }

    /// Log with structured context fields
    pub fn log_with_context(
        &self,
        level: LogLevel,
        message: &str,
        source: &str,
        context: BTreeMap<String, serde_json::Value>,
    ) {
        self.record(level, message, source, Some(context));
    }

    fn record(
        &self,
        level: LogLevel,
        message: &str,
        source: &str,
        context: Option<BTreeMap<String, serde_json::Value>>,
    ) {
        if (level as u8) < self.min_level.load(Ordering::Relaxed) {
            return;
        }

        forward_to_tracing(level, message, source, context.as_ref());

        let entry = LogEntry {
            timestamp: Utc::now(),
            level,
            message: message.to_string(),
            source: source.to_string(),
            context,
        };

        // A poisoned buffer only loses diagnostics, never the upload
        if let Ok(mut entries) = self.entries.lock() {
            entries.push_back(entry);
            while entries.len() > self.capacity {
                entries.pop_front();
            }
        }
    }

    /// Set minimum log level (runtime filtering)
    pub fn set_min_level(&self, level: LogLevel) {
        self.min_level.store(level as u8, Ordering::Relaxed);
    }

    pub fn min_level(&self) -> LogLevel {
        LogLevel::from_u8(self.min_level.load(Ordering::Relaxed))
    }

    pub fn get_logs(&self) -> Vec<LogEntry> {
        self.entries
            .lock()
            .map(|entries| entries.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn clear_logs(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::new()
    }
}

fn forward_to_tracing(
    level: LogLevel,
    message: &str,
    source: &str,
    context: Option<&BTreeMap<String, serde_json::Value>>,
) {
    let context = context
        .map(|c| serde_json::to_string(c).unwrap_or_default())
        .unwrap_or_default();
    match level {
        LogLevel::Debug => tracing::debug!(source = %source, context = %context, "{}", message),
        LogLevel::Info => tracing::info!(source = %source, context = %context, "{}", message),
        LogLevel::Warn => tracing::warn!(source = %source, context = %context, "{}", message),
        LogLevel::Error => tracing::error!(source = %source, context = %context, "{}", message),
    }
}

// Global logger instance
pub static LOGGER: Lazy<Logger> = Lazy::new(Logger::new);

static TRACING_INIT: OnceCell<()> = OnceCell::new();

/// Install a `tracing` fmt subscriber filtered by `RUST_LOG` (default `info`).
///
/// Safe to call more than once; only the first call installs anything.
pub fn init_tracing() {
    TRACING_INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_round_trip() {
        for level in [LogLevel::Debug, LogLevel::Info, LogLevel::Warn, LogLevel::Error] {
            assert_eq!(LogLevel::parse(level.as_str()), Some(level));
        }
        assert_eq!(LogLevel::parse("trace"), None);
    }

    #[test]
    fn test_min_level_filters_entries() {
        let logger = Logger::new();
        logger.set_min_level(LogLevel::Warn);
        logger.log(LogLevel::Info, "ignored", "test");
        logger.log(LogLevel::Error, "kept", "test");

        let logs = logger.get_logs();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].message, "kept");
        assert_eq!(logger.min_level(), LogLevel::Warn);
    }

    #[test]
    fn test_buffer_is_bounded() {
        let logger = Logger::with_capacity(3);
        for i in 0..5 {
            logger.log(LogLevel::Info, &format!("entry {}", i), "test");
        }

        let logs = logger.get_logs();
        assert_eq!(logs.len(), 3);
        assert_eq!(logs[0].message, "entry 2");
        assert_eq!(logs[2].message, "entry 4");
    }

    #[test]
    fn test_context_is_kept() {
        let logger = Logger::new();
        let mut context = BTreeMap::new();
        context.insert("step".to_string(), serde_json::json!("validate_file"));
        logger.log_with_context(LogLevel::Error, "failed", "pipeline", context);

        let logs = logger.get_logs();
        assert_eq!(
            logs[0].context.as_ref().unwrap()["step"],
            serde_json::json!("validate_file")
        );

        logger.clear_logs();
        assert!(logger.get_logs().is_empty());
    }

    #[test]
    fn test_init_tracing_is_idempotent() {
        init_tracing();
        init_tracing();
        assert!(TRACING_INIT.get().is_some());

        let logger = Logger::new();
        logger.log(LogLevel::Info, "after init", "test");
        assert_eq!(logger.get_logs()[0].message, "after init");
    }
}
