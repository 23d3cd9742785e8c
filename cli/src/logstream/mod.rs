//! App log streaming
//!
//! Two producers feed the same presentation sink: a durable polling stream
//! against the control plane and a low-latency live subscription through the
//! tunnel agent. See [`aggregator`] for how they are combined.

pub mod aggregator;
pub mod polling;
pub mod presenter;
pub mod push;

use std::time::Duration;

use platform_api::AppLogEntry;
use serde::{Deserialize, Serialize};

/// Normalized log record, independent of the source that produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub instance: String,
    pub level: String,
    pub message: String,
    pub region: String,
    pub timestamp: String,
    #[serde(default)]
    pub meta: serde_json::Value,
}

impl From<AppLogEntry> for LogEntry {
    fn from(entry: AppLogEntry) -> Self {
        Self {
            instance: entry.instance,
            level: entry.level,
            message: entry.message,
            region: entry.region,
            timestamp: entry.timestamp,
            meta: entry.meta,
        }
    }
}

/// What to stream
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogOptions {
    pub app_name: String,
    pub region: Option<String>,
    pub instance: Option<String>,
    /// Overrides the polling stream's maximum backoff
    pub max_backoff: Option<Duration>,
}
