//! Merge polling and live log sources into one sink
//!
//! Both producers start together. The poller runs under its own child token
//! so the live producer can supersede it without that looking like a failure
//! to the group. If the live subscription cannot be established the poller
//! stays the only source.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::errors::CliError;
use crate::logstream::polling::PollingStream;
use crate::logstream::push::LiveLogSource;
use crate::logstream::{LogEntry, LogOptions};
use crate::tasks::TaskGroup;

/// Destination for presented log entries
pub trait LogSink: Send + Sync {
    fn write(&self, entry: &LogEntry) -> Result<(), CliError>;
}

#[derive(Debug, Clone)]
pub struct AggregatorOptions {
    /// Wait after the live subscription succeeds before polling is stopped
    pub settle_delay: Duration,
    pub channel_capacity: usize,
}

impl Default for AggregatorOptions {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_secs(2),
            channel_capacity: 64,
        }
    }
}

#[derive(Debug, Default)]
pub struct AggregateOutcome {
    /// Terminal error that stopped the polling stream, if any
    pub polling_error: Option<CliError>,
}

/// Stream logs from both sources into `sink` until `cancel` fires or both
/// producers finish
pub async fn run(
    polling: PollingStream,
    live: Arc<dyn LiveLogSource>,
    opts: LogOptions,
    options: AggregatorOptions,
    sink: Arc<dyn LogSink>,
    cancel: &CancellationToken,
) -> Result<AggregateOutcome, CliError> {
    let mut group = TaskGroup::new(cancel);
    let group_token = group.token().clone();
    let polling_token = group_token.child_token();

    let capacity = options.channel_capacity.max(1);
    let (poll_tx, poll_rx) = mpsc::channel(capacity);
    let (live_tx, live_rx) = mpsc::channel(capacity);

    {
        let polling = polling.clone();
        let opts = opts.clone();
        let token = polling_token.clone();
        group.spawn(async move {
            polling.run(&opts, poll_tx, token).await;
            Ok(())
        });
    }

    group.spawn(live_producer(
        live,
        opts,
        options.settle_delay,
        live_tx,
        group_token,
        polling_token,
    ));

    group.spawn(consume(poll_rx, sink.clone()));
    group.spawn(consume(live_rx, sink));

    group.wait().await?;

    Ok(AggregateOutcome {
        polling_error: polling.take_err(),
    })
}

async fn live_producer(
    live: Arc<dyn LiveLogSource>,
    opts: LogOptions,
    settle_delay: Duration,
    tx: mpsc::Sender<LogEntry>,
    cancel: CancellationToken,
    polling_token: CancellationToken,
) -> Result<(), CliError> {
    let subscribed = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Ok(()),
        subscribed = live.subscribe(&opts) => subscribed,
    };

    let mut stream = match subscribed {
        Ok(stream) => stream,
        Err(e) => {
            debug!("Could not subscribe to live logs: {}", e);
            debug!("Falling back to log polling...");
            return Ok(());
        }
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => return Ok(()),
        _ = tokio::time::sleep(settle_delay) => {}
    }

    info!("Live logs connected, stopping log polling");
    polling_token.cancel();

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(()),
            next = stream.next() => next,
        };

        match next {
            Some(Ok(entry)) => {
                if tx.send(entry).await.is_err() {
                    return Ok(());
                }
            }
            Some(Err(e)) => return Err(e),
            None => {
                debug!("Live log stream ended");
                return Ok(());
            }
        }
    }
}

async fn consume(mut rx: mpsc::Receiver<LogEntry>, sink: Arc<dyn LogSink>) -> Result<(), CliError> {
    while let Some(entry) = rx.recv().await {
        sink.write(&entry)?;
    }
    Ok(())
}
