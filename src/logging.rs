//! Logging capability interface for library code.
//!
//! The orchestrator and the reconciliation engine report progress and
//! auto-correction warnings through the [`LogSink`] trait instead of a
//! process-global flag. Call sites depend only on the interface; the binary
//! installs a tracing-backed sink, MCP-style transports can install their
//! own adapter, and tests install [`BufferSink`] to assert on what was
//! logged.

use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};

/// Structured logging capability: `{info, warn, error, debug, success}`.
///
/// Implementations must be `Send + Sync`; sinks are shared across async
/// tasks as `Arc<dyn LogSink>`.
pub trait LogSink: Send + Sync {
    fn info(&self, message: &str);
    fn warn(&self, message: &str);
    fn error(&self, message: &str);
    fn debug(&self, message: &str);
    fn success(&self, message: &str);
}

/// Convenience alias used throughout the crate.
pub type SharedSink = Arc<dyn LogSink>;

/// Sink that forwards to the `tracing` subscriber installed by the binary.
///
/// `success` has no tracing level of its own; it is emitted at info level
/// with an `outcome` field so console formatters can render it distinctly.
#[derive(Debug, Default, Clone)]
pub struct TracingSink;

impl TracingSink {
    /// Create a tracing-backed sink behind an `Arc`.
    #[must_use]
    pub fn shared() -> SharedSink {
        Arc::new(Self)
    }
}

impl LogSink for TracingSink {
    fn info(&self, message: &str) {
        info!("{message}");
    }

    fn warn(&self, message: &str) {
        warn!("{message}");
    }

    fn error(&self, message: &str) {
        error!("{message}");
    }

    fn debug(&self, message: &str) {
        debug!("{message}");
    }

    fn success(&self, message: &str) {
        info!(outcome = "success", "{message}");
    }
}

/// Severity recorded by [`BufferSink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
    Debug,
    Success,
}

/// In-memory sink for tests.
///
/// Records every call so tests can assert that a correction emitted exactly
/// the expected warning (or, for idempotence, no warning at all).
#[derive(Debug, Default)]
pub struct BufferSink {
    entries: Mutex<Vec<(LogLevel, String)>>,
}

impl BufferSink {
    /// Create an empty buffer sink behind an `Arc`.
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn push(&self, level: LogLevel, message: &str) {
        self.entries
            .lock()
            .expect("log buffer poisoned")
            .push((level, message.to_string()));
    }

    /// All recorded entries, in order.
    #[must_use]
    pub fn entries(&self) -> Vec<(LogLevel, String)> {
        self.entries.lock().expect("log buffer poisoned").clone()
    }

    /// Messages recorded at the given level.
    #[must_use]
    pub fn messages_at(&self, level: LogLevel) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m)
            .collect()
    }

    /// Number of warnings recorded.
    #[must_use]
    pub fn warning_count(&self) -> usize {
        self.messages_at(LogLevel::Warn).len()
    }

    /// Check whether any entry at `level` contains `needle`.
    #[must_use]
    pub fn contains(&self, level: LogLevel, needle: &str) -> bool {
        self.messages_at(level).iter().any(|m| m.contains(needle))
    }
}

impl LogSink for BufferSink {
    fn info(&self, message: &str) {
        self.push(LogLevel::Info, message);
    }

    fn warn(&self, message: &str) {
        self.push(LogLevel::Warn, message);
    }

    fn error(&self, message: &str) {
        self.push(LogLevel::Error, message);
    }

    fn debug(&self, message: &str) {
        self.push(LogLevel::Debug, message);
    }

    fn success(&self, message: &str) {
        self.push(LogLevel::Success, message);
    }
}
