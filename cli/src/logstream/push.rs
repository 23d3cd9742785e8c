//! Live log subscription

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::errors::CliError;
use crate::logstream::{LogEntry, LogOptions};

/// Low-latency log source
///
/// A failed `subscribe` means the source is unavailable; callers fall back
/// to polling rather than treating it as fatal.
#[async_trait]
pub trait LiveLogSource: Send + Sync {
    async fn subscribe(
        &self,
        opts: &LogOptions,
    ) -> Result<BoxStream<'static, Result<LogEntry, CliError>>, CliError>;
}
