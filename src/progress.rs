//! Human-readable progress notifications
//!
//! Agents and the sharing pipeline report what they are doing through a
//! [`ProgressSink`]. Messages are fire-and-forget; nothing reads them back.

use std::sync::{Arc, Mutex};

use tracing::info;

use crate::config::TelemetryConfig;

pub trait ProgressSink: Send + Sync {
    fn notify(&self, message: &str);
}

/// Prints `[TAG] message` lines to stdout
#[derive(Debug, Clone)]
pub struct ConsoleSink {
    tag: String,
}

impl ConsoleSink {
    pub fn new(tag: impl Into<String>) -> Self {
        Self { tag: tag.into() }
    }
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self::new("AGENT")
    }
}

impl ProgressSink for ConsoleSink {
    fn notify(&self, message: &str) {
        println!("[{}] {}", self.tag, message);
    }
}

/// Emits progress as `info` events only
///
/// Used when logs are JSON, where bare stdout lines would break the stream.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn notify(&self, message: &str) {
        info!(progress = %message, "Progress");
    }
}

/// Sink matching the configured log output
pub fn sink_for(telemetry: &TelemetryConfig) -> Arc<dyn ProgressSink> {
    if telemetry.json_logs {
        Arc::new(TracingSink)
    } else {
        Arc::new(ConsoleSink::default())
    }
}

/// Keeps every message in memory
#[derive(Debug, Default)]
pub struct RecordingSink {
    messages: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages
            .lock()
            .map(|m| m.clone())
            .unwrap_or_default()
    }
}

impl ProgressSink for RecordingSink {
    fn notify(&self, message: &str) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push(message.to_string());
        }
    }
}
