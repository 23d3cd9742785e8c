//! Polling log stream tests

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use deckhand::errors::CliError;
use deckhand::logstream::polling::{poll_loop, PollingStream, MAX_CONSECUTIVE_ERRORS};
use deckhand::logstream::{LogEntry, LogOptions};
use deckhand::utils::BackoffOptions;

use crate::fakes::*;

fn opts() -> LogOptions {
    LogOptions {
        app_name: "pg-main".to_string(),
        ..Default::default()
    }
}

fn exact_backoff() -> BackoffOptions {
    BackoffOptions {
        jitter: false,
        ..Default::default()
    }
}

fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

fn server_error() -> CliError {
    CliError::ApiError {
        status: 503,
        message: "unavailable".to_string(),
    }
}

fn not_authenticated() -> CliError {
    CliError::NotAuthenticated("token expired".to_string())
}

fn not_found() -> CliError {
    CliError::NotFound("app pg-main".to_string())
}

/// Sleep stand-in that records each delay and cancels after `limit` sleeps
fn recording_sleep(
    cancel: CancellationToken,
    limit: usize,
) -> (
    Arc<Mutex<Vec<Duration>>>,
    impl Fn(Duration) -> std::future::Ready<()>,
) {
    let delays = Arc::new(Mutex::new(Vec::new()));
    let recorded = delays.clone();
    let sleep = move |delay: Duration| {
        let mut delays = recorded.lock().unwrap();
        delays.push(delay);
        if delays.len() >= limit {
            cancel.cancel();
        }
        std::future::ready(())
    };
    (delays, sleep)
}

fn drain(rx: &mut mpsc::Receiver<LogEntry>) -> Vec<String> {
    let mut messages = Vec::new();
    while let Ok(entry) = rx.try_recv() {
        messages.push(entry.message);
    }
    messages
}

#[tokio::test]
async fn test_backoff_grows_and_resets_on_entries() {
    let client = FakeControlPlane::new();
    client.push_logs(LogReply::Page(page(&[], None)));
    client.push_logs(LogReply::Page(page(&[], None)));
    client.push_logs(LogReply::Page(page(&[], None)));
    client.push_logs(LogReply::Page(page(&["a", "b"], Some("t1"))));
    client.push_logs(LogReply::Page(page(&[], None)));

    let cancel = CancellationToken::new();
    let (delays, sleep) = recording_sleep(cancel.clone(), 4);
    let (tx, mut rx) = mpsc::channel(16);

    poll_loop(&client, &opts(), exact_backoff(), tx, cancel, sleep)
        .await
        .unwrap();

    assert_eq!(*delays.lock().unwrap(), vec![ms(250), ms(500), ms(1000), ms(250)]);
    assert_eq!(drain(&mut rx), vec!["a", "b"]);

    let tokens: Vec<Option<String>> = client.queries().into_iter().map(|q| q.next_token).collect();
    assert_eq!(
        tokens,
        vec![None, None, None, None, Some("t1".to_string())]
    );
}

#[tokio::test]
async fn test_jittered_delays_stay_in_range() {
    let client = FakeControlPlane::new();
    let cancel = CancellationToken::new();
    let (delays, sleep) = recording_sleep(cancel.clone(), 3);
    let (tx, _rx) = mpsc::channel(16);

    poll_loop(&client, &opts(), BackoffOptions::default(), tx, cancel, sleep)
        .await
        .unwrap();

    let delays = delays.lock().unwrap().clone();
    assert_eq!(delays[0], ms(250));
    assert!(delays[1] >= ms(250) && delays[1] <= ms(500));
    assert!(delays[2] >= ms(250) && delays[2] <= ms(1000));
}

#[tokio::test]
async fn test_backoff_is_capped() {
    let client = FakeControlPlane::new();
    let cancel = CancellationToken::new();
    let (delays, sleep) = recording_sleep(cancel.clone(), 5);
    let (tx, _rx) = mpsc::channel(16);
    let backoff = BackoffOptions {
        max_delay: Duration::from_secs(1),
        ..exact_backoff()
    };

    poll_loop(&client, &opts(), backoff, tx, cancel, sleep)
        .await
        .unwrap();

    assert_eq!(
        *delays.lock().unwrap(),
        vec![ms(250), ms(500), ms(1000), ms(1000), ms(1000)]
    );
}

#[tokio::test]
async fn test_transient_errors_back_off_then_recover() {
    let client = FakeControlPlane::new();
    client.push_logs(LogReply::Error(server_error));
    client.push_logs(LogReply::Error(server_error));
    client.push_logs(LogReply::Page(page(&["a"], Some("t1"))));

    let cancel = CancellationToken::new();
    let (delays, sleep) = recording_sleep(cancel.clone(), 3);
    let (tx, mut rx) = mpsc::channel(16);

    poll_loop(&client, &opts(), exact_backoff(), tx, cancel, sleep)
        .await
        .unwrap();

    assert_eq!(*delays.lock().unwrap(), vec![ms(250), ms(500), ms(250)]);
    assert_eq!(drain(&mut rx), vec!["a"]);
}

#[tokio::test]
async fn test_not_authenticated_is_terminal() {
    let client = FakeControlPlane::new();
    client.push_logs(LogReply::Error(not_authenticated));

    let cancel = CancellationToken::new();
    let (delays, sleep) = recording_sleep(cancel.clone(), 100);
    let (tx, _rx) = mpsc::channel(16);

    let result = poll_loop(&client, &opts(), exact_backoff(), tx, cancel, sleep).await;

    assert!(matches!(result, Err(CliError::NotAuthenticated(_))));
    assert!(delays.lock().unwrap().is_empty());
    assert_eq!(client.queries().len(), 1);
}

#[tokio::test]
async fn test_not_found_is_terminal() {
    let client = FakeControlPlane::new();
    client.push_logs(LogReply::Page(page(&[], None)));
    client.push_logs(LogReply::Error(not_found));

    let cancel = CancellationToken::new();
    let (delays, sleep) = recording_sleep(cancel.clone(), 100);
    let (tx, _rx) = mpsc::channel(16);

    let result = poll_loop(&client, &opts(), exact_backoff(), tx, cancel, sleep).await;

    assert!(result.unwrap_err().is_not_found());
    assert_eq!(delays.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_gives_up_after_too_many_errors() {
    let mut client = FakeControlPlane::new();
    client.log_fallback = Some(|| LogReply::Error(server_error));

    let cancel = CancellationToken::new();
    let (delays, sleep) = recording_sleep(cancel.clone(), 100);
    let (tx, _rx) = mpsc::channel(16);

    let result = poll_loop(&client, &opts(), exact_backoff(), tx, cancel, sleep).await;

    assert!(matches!(result, Err(CliError::ApiError { status: 503, .. })));
    assert_eq!(client.queries().len(), MAX_CONSECUTIVE_ERRORS as usize + 1);
    assert_eq!(delays.lock().unwrap().len(), MAX_CONSECUTIVE_ERRORS as usize);
}

#[tokio::test]
async fn test_zero_backoff_still_sleeps_between_empty_pages() {
    let client = FakeControlPlane::new();
    client.push_logs(LogReply::Page(page(&[], None)));
    client.push_logs(LogReply::Page(page(&[], None)));
    client.push_logs(LogReply::Page(page(&[], None)));
    client.push_logs(LogReply::Error(not_authenticated));

    let cancel = CancellationToken::new();
    let (delays, sleep) = recording_sleep(cancel.clone(), 100);
    let (tx, _rx) = mpsc::channel(16);
    let backoff = BackoffOptions {
        min_delay: Duration::ZERO,
        max_delay: Duration::ZERO,
        ..exact_backoff()
    };

    let result = poll_loop(&client, &opts(), backoff, tx, cancel, sleep).await;

    assert!(matches!(result, Err(CliError::NotAuthenticated(_))));
    assert_eq!(client.queries().len(), 4);
    assert_eq!(*delays.lock().unwrap(), vec![ms(100), ms(200), ms(400)]);
}

#[tokio::test]
async fn test_token_only_advances_when_returned() {
    let client = FakeControlPlane::new();
    client.push_logs(LogReply::Page(page(&["a"], Some("t1"))));
    client.push_logs(LogReply::Page(page(&["b"], None)));
    client.push_logs(LogReply::Page(page(&["c"], Some(""))));

    let cancel = CancellationToken::new();
    let (_delays, sleep) = recording_sleep(cancel.clone(), 1);
    let (tx, mut rx) = mpsc::channel(16);

    poll_loop(&client, &opts(), exact_backoff(), tx, cancel, sleep)
        .await
        .unwrap();

    assert_eq!(drain(&mut rx), vec!["a", "b", "c"]);
    let tokens: Vec<Option<String>> = client.queries().into_iter().map(|q| q.next_token).collect();
    assert_eq!(
        tokens,
        vec![
            None,
            Some("t1".to_string()),
            Some("t1".to_string()),
            Some("t1".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_filters_are_sent_with_every_query() {
    let client = FakeControlPlane::new();
    let cancel = CancellationToken::new();
    let (_delays, sleep) = recording_sleep(cancel.clone(), 2);
    let (tx, _rx) = mpsc::channel(16);
    let opts = LogOptions {
        region: Some("ord".to_string()),
        instance: Some("abc123".to_string()),
        ..opts()
    };

    poll_loop(&client, &opts, exact_backoff(), tx, cancel, sleep)
        .await
        .unwrap();

    let queries = client.queries();
    assert_eq!(queries.len(), 2);
    for query in queries {
        assert_eq!(query.region.as_deref(), Some("ord"));
        assert_eq!(query.instance.as_deref(), Some("abc123"));
    }
}

#[tokio::test]
async fn test_cancel_before_first_poll() {
    let client = FakeControlPlane::new();
    let cancel = CancellationToken::new();
    cancel.cancel();
    let (delays, sleep) = recording_sleep(cancel.clone(), 100);
    let (tx, _rx) = mpsc::channel(16);

    poll_loop(&client, &opts(), exact_backoff(), tx, cancel, sleep)
        .await
        .unwrap();

    assert!(client.queries().is_empty());
    assert!(delays.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_stream_requires_existing_app() {
    let client = Arc::new(FakeControlPlane::new());
    let opts = LogOptions {
        app_name: "missing".to_string(),
        ..Default::default()
    };

    let result = PollingStream::new(client, &opts, exact_backoff()).await;

    assert!(matches!(result, Err(CliError::NotFound(_))));
}

#[tokio::test]
async fn test_stream_resolves_app_once() {
    let client = Arc::new(FakeControlPlane::new());

    let stream = PollingStream::new(client.clone(), &opts(), exact_backoff())
        .await
        .unwrap();

    assert_eq!(stream.app().name, "pg-main");
    assert_eq!(stream.app().organization.slug, "acme");
    assert_eq!(client.app_lookups.calls(), vec!["pg-main"]);
}

#[tokio::test]
async fn test_stream_records_terminal_error() {
    let client = Arc::new(FakeControlPlane::new());
    client.push_logs(LogReply::Page(page(&["a"], Some("t1"))));
    client.push_logs(LogReply::Error(not_found));

    let stream = PollingStream::new(client, &opts(), exact_backoff())
        .await
        .unwrap();
    let mut rx = stream.stream(opts(), CancellationToken::new(), 8);

    let mut messages = Vec::new();
    while let Some(entry) = rx.recv().await {
        messages.push(entry.message);
    }

    assert_eq!(messages, vec!["a"]);
    assert!(stream.take_err().is_some_and(|e| e.is_not_found()));
    assert!(stream.take_err().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_stream_honours_max_backoff_override() {
    let client = Arc::new(FakeControlPlane::new());
    let opts = LogOptions {
        max_backoff: Some(ms(500)),
        ..opts()
    };

    let stream = PollingStream::new(client.clone(), &opts, exact_backoff())
        .await
        .unwrap();
    let cancel = CancellationToken::new();
    let mut rx = stream.stream(opts, cancel.clone(), 8);

    tokio::time::sleep(ms(2100)).await;
    cancel.cancel();
    assert!(rx.recv().await.is_none());

    let times = client.query_times();
    let gaps: Vec<Duration> = times.windows(2).map(|w| w[1] - w[0]).collect();
    let expected = [ms(250), ms(500), ms(500), ms(500)];
    for (gap, want) in gaps.iter().zip(expected) {
        assert!(gap.abs_diff(want) <= ms(5), "gap {:?}, expected {:?}", gap, want);
    }
    assert!(gaps.len() >= expected.len());
    assert!(stream.take_err().is_none());
}
