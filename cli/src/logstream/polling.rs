//! Polling log stream

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use platform_api::App;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::errors::CliError;
use crate::http::api::{ControlPlane, LogQuery};
use crate::logstream::{LogEntry, LogOptions};
use crate::utils::{Backoff, BackoffOptions};

/// Consecutive request failures tolerated before the stream gives up
pub const MAX_CONSECUTIVE_ERRORS: u32 = 10;

/// Log stream that pages through the control-plane logs endpoint
#[derive(Clone)]
pub struct PollingStream {
    client: Arc<dyn ControlPlane>,
    app: App,
    backoff: BackoffOptions,
    err: Arc<Mutex<Option<CliError>>>,
}

impl PollingStream {
    /// Create a polling stream after checking the app exists
    pub async fn new(
        client: Arc<dyn ControlPlane>,
        opts: &LogOptions,
        backoff: BackoffOptions,
    ) -> Result<Self, CliError> {
        let app = client.get_app(&opts.app_name).await?;

        let mut backoff = backoff;
        if let Some(max) = opts.max_backoff {
            backoff.max_delay = max;
        }

        Ok(Self {
            client,
            app,
            backoff,
            err: Arc::new(Mutex::new(None)),
        })
    }

    /// App resolved when the stream was created
    pub fn app(&self) -> &App {
        &self.app
    }

    /// Poll into `tx` until cancelled; a terminal error is recorded rather
    /// than returned
    ///
    /// `tx` is dropped only after the error is recorded.
    pub async fn run(&self, opts: &LogOptions, tx: mpsc::Sender<LogEntry>, cancel: CancellationToken) {
        let result = poll_loop(
            self.client.as_ref(),
            opts,
            self.backoff.clone(),
            tx.clone(),
            cancel,
            tokio::time::sleep,
        )
        .await;

        if let Err(e) = result {
            if let Ok(mut slot) = self.err.lock() {
                *slot = Some(e);
            }
        }
        drop(tx);
    }

    /// Start polling in the background
    ///
    /// The returned channel closes when `cancel` fires or the stream hits a
    /// terminal error; in the latter case the error is available from
    /// [`PollingStream::take_err`].
    pub fn stream(
        &self,
        opts: LogOptions,
        cancel: CancellationToken,
        capacity: usize,
    ) -> mpsc::Receiver<LogEntry> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let stream = self.clone();
        tokio::spawn(async move { stream.run(&opts, tx, cancel).await });
        rx
    }

    /// Terminal error recorded by the background task, if any
    pub fn take_err(&self) -> Option<CliError> {
        self.err.lock().ok().and_then(|mut slot| slot.take())
    }
}

/// Page through logs until cancelled or a terminal error occurs
///
/// Empty pages and non-terminal errors back off; a page with entries resets
/// the backoff and the next page is requested immediately. The continuation
/// token only advances when the server returns one.
pub async fn poll_loop<S, F>(
    client: &dyn ControlPlane,
    opts: &LogOptions,
    backoff: BackoffOptions,
    tx: mpsc::Sender<LogEntry>,
    cancel: CancellationToken,
    sleep_fn: S,
) -> Result<(), CliError>
where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    let mut backoff = Backoff::new(backoff);
    let mut error_count: u32 = 0;
    let mut query = LogQuery {
        next_token: None,
        region: opts.region.clone(),
        instance: opts.instance.clone(),
    };

    loop {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(()),
            result = client.get_app_logs(&opts.app_name, &query) => result,
        };

        let wait = match result {
            Err(e) => {
                error_count += 1;
                if e.is_not_authenticated() || e.is_not_found() || error_count > MAX_CONSECUTIVE_ERRORS {
                    warn!("Log polling stopped after {} error(s): {}", error_count, e);
                    return Err(e);
                }
                debug!("Log poll failed ({} in a row): {}", error_count, e);
                backoff.next_delay()
            }
            Ok(page) => {
                error_count = 0;

                if page.entries.is_empty() {
                    backoff.next_delay()
                } else {
                    backoff.reset();

                    for entry in page.entries {
                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => return Ok(()),
                            sent = tx.send(LogEntry::from(entry)) => {
                                if sent.is_err() {
                                    debug!("Log consumer went away, stopping poller");
                                    return Ok(());
                                }
                            }
                        }
                    }

                    if let Some(token) = page.next_token.filter(|t| !t.is_empty()) {
                        query.next_token = Some(token);
                    }

                    Duration::ZERO
                }
            }
        };

        if wait.is_zero() {
            if cancel.is_cancelled() {
                return Ok(());
            }
            continue;
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(()),
            _ = sleep_fn(wait) => {}
        }
    }
}
