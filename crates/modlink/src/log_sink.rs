//! Console sink for channel output.
//!
//! The channel writes human-readable lines; where they end up is the host's
//! business. [`TracingSink`] forwards them as `tracing` events under
//! [`CONSOLE_TARGET`], [`MemorySink`] keeps them for inspection.

use std::sync::{Mutex, PoisonError};

use tracing::Level;

pub const CONSOLE_TARGET: &str = "modlink::console";

/// Line-oriented log output.
///
/// Implementations may call back into the channel; the channel never holds a
/// lock while writing a line.
pub trait LogSink: Send + Sync {
    fn line(&self, level: Level, text: &str);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn line(&self, level: Level, text: &str) {
        match level {
            Level::ERROR => tracing::error!(target: CONSOLE_TARGET, "{}", text),
            Level::WARN => tracing::warn!(target: CONSOLE_TARGET, "{}", text),
            Level::INFO => tracing::info!(target: CONSOLE_TARGET, "{}", text),
            Level::DEBUG => tracing::debug!(target: CONSOLE_TARGET, "{}", text),
            Level::TRACE => tracing::trace!(target: CONSOLE_TARGET, "{}", text),
        }
    }
}

/// Keeps every line in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<(Level, String)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.entries().into_iter().map(|(_, text)| text).collect()
    }

    pub fn entries(&self) -> Vec<(Level, String)> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl LogSink for MemorySink {
    fn line(&self, level: Level, text: &str) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((level, text.to_string()));
    }
}
