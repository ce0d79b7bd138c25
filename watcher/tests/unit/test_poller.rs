//! Resource poller tests, run in paused virtual time

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;

use pipewatch::errors::ObserverError;
use pipewatch::observe::cadence::Cadence;
use pipewatch::observe::poller::{FetchFn, IntervalFn, PollerOptions, ResourcePhase, ResourcePoller};
use pipewatch::utils::RetryOptions;

use crate::support::wait_state;

fn no_retry() -> RetryOptions {
    RetryOptions {
        retries: 0,
        ..Default::default()
    }
}

fn every(ms: u64) -> IntervalFn<u32> {
    Arc::new(move |_: Option<&u32>| Cadence::Every(Duration::from_millis(ms)))
}

/// Fetch returning the call number, counted in `calls`
fn counting_fetch(calls: Arc<AtomicU32>) -> FetchFn<u32> {
    Arc::new(move || {
        let calls = calls.clone();
        async move { Ok(calls.fetch_add(1, Ordering::SeqCst) + 1) }.boxed()
    })
}

#[tokio::test(start_paused = true)]
async fn test_disabled_poller_never_fetches() {
    let calls = Arc::new(AtomicU32::new(0));
    let poller = ResourcePoller::spawn(
        PollerOptions::new("disabled", no_retry()).disabled(),
        counting_fetch(calls.clone()),
        every(100),
    );

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(poller.state().phase, ResourcePhase::Idle);
    assert!(poller.state().is_first_load());

    poller.enable();
    let mut rx = poller.subscribe();
    let state = wait_state(&mut rx, |s| s.phase == ResourcePhase::Ready).await;
    assert_eq!(state.data, Some(1));
    assert_eq!(state.fetches, 1);
}

#[tokio::test(start_paused = true)]
async fn test_polls_at_interval() {
    let calls = Arc::new(AtomicU32::new(0));
    let poller = ResourcePoller::spawn(
        PollerOptions::new("interval", no_retry()),
        counting_fetch(calls.clone()),
        every(1000),
    );

    let mut rx = poller.subscribe();
    wait_state(&mut rx, |s| s.data == Some(1)).await;

    tokio::time::sleep(Duration::from_millis(3500)).await;
    let state = poller.state();
    assert_eq!(state.data, Some(4));
    assert_eq!(state.phase, ResourcePhase::Ready);
    assert!(state.last_success_at.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_no_overlapping_fetches() {
    let active = Arc::new(AtomicUsize::new(0));
    let max_active = Arc::new(AtomicUsize::new(0));
    let calls = Arc::new(AtomicUsize::new(0));

    let fetch: FetchFn<u32> = {
        let (active, max_active, calls) = (active.clone(), max_active.clone(), calls.clone());
        Arc::new(move || {
            let (active, max_active, calls) = (active.clone(), max_active.clone(), calls.clone());
            async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                max_active.fetch_max(now, Ordering::SeqCst);
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(5)).await;
                active.fetch_sub(1, Ordering::SeqCst);
                Ok(1)
            }
            .boxed()
        })
    };

    let poller = ResourcePoller::spawn(PollerOptions::new("slow", no_retry()), fetch, every(100));

    // Let the first fetch start, then ask for more while it is in flight
    tokio::time::sleep(Duration::from_millis(10)).await;
    poller.refresh();
    poller.refresh();

    let mut rx = poller.subscribe();
    let state = wait_state(&mut rx, |s| s.skipped_ticks >= 2).await;
    assert_eq!(state.fetches, 1);

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(max_active.load(Ordering::SeqCst), 1);
    assert!(calls.load(Ordering::SeqCst) > 1);
}

#[tokio::test(start_paused = true)]
async fn test_failure_keeps_last_value_and_keeps_polling() {
    let calls = Arc::new(AtomicU32::new(0));
    let fetch: FetchFn<u32> = {
        let calls = calls.clone();
        Arc::new(move || {
            let call = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if call == 0 {
                    Ok(7)
                } else {
                    Err(ObserverError::Transient("503 Service Unavailable".to_string()))
                }
            }
            .boxed()
        })
    };

    let poller = ResourcePoller::spawn(PollerOptions::new("flaky", no_retry()), fetch, every(1000));
    let mut rx = poller.subscribe();

    let state = wait_state(&mut rx, |s| s.phase == ResourcePhase::Error).await;
    assert_eq!(state.data, Some(7));
    assert!(state.is_stale());
    assert!(state.error.as_deref().unwrap_or_default().contains("503"));

    let state = wait_state(&mut rx, |s| s.consecutive_failures >= 3).await;
    assert_eq!(state.data, Some(7));
    assert_eq!(state.phase, ResourcePhase::Error);
}

#[tokio::test(start_paused = true)]
async fn test_retries_within_one_tick() {
    let attempts = Arc::new(AtomicU32::new(0));
    let fetch: FetchFn<u32> = {
        let attempts = attempts.clone();
        Arc::new(move || {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 2 {
                    Err(ObserverError::Malformed("truncated body".to_string()))
                } else {
                    Ok(attempt)
                }
            }
            .boxed()
        })
    };

    let retry = RetryOptions {
        retries: 2,
        base_delay: Duration::from_millis(100),
        ..Default::default()
    };
    let poller = ResourcePoller::spawn(PollerOptions::new("retry", retry), fetch, every(60_000));
    let mut rx = poller.subscribe();

    let state = wait_state(&mut rx, |s| s.phase == ResourcePhase::Ready).await;
    assert_eq!(state.data, Some(2));
    assert_eq!(state.fetches, 1);
    assert_eq!(state.consecutive_failures, 0);
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_not_found_stops_without_retry() {
    let attempts = Arc::new(AtomicU32::new(0));
    let fetch: FetchFn<u32> = {
        let attempts = attempts.clone();
        Arc::new(move || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(ObserverError::NotFound("/projects/1/pipelines/9".to_string())) }.boxed()
        })
    };

    let retry = RetryOptions {
        retries: 3,
        ..Default::default()
    };
    let poller = ResourcePoller::spawn(PollerOptions::new("gone", retry), fetch, every(100));
    let mut rx = poller.subscribe();

    let state = wait_state(&mut rx, |s| s.phase == ResourcePhase::NotFound).await;
    assert!(state.data.is_none());

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    assert_eq!(poller.state().phase, ResourcePhase::NotFound);
}

#[tokio::test(start_paused = true)]
async fn test_stop_cadence_settles_until_enabled_again() {
    let calls = Arc::new(AtomicU32::new(0));
    let interval: IntervalFn<u32> = Arc::new(|value: Option<&u32>| match value {
        Some(v) if *v >= 3 => Cadence::Stop,
        _ => Cadence::Every(Duration::from_millis(500)),
    });

    let poller = ResourcePoller::spawn(
        PollerOptions::new("settling", no_retry()),
        counting_fetch(calls.clone()),
        interval,
    );
    let mut rx = poller.subscribe();

    let state = wait_state(&mut rx, |s| s.phase == ResourcePhase::Stopped).await;
    assert_eq!(state.data, Some(3));

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    // Re-enabling a stopped poller fetches once more
    poller.enable();
    let state = wait_state(&mut rx, |s| s.fetches == 4).await;
    assert_eq!(state.fetches, 4);
    let state = wait_state(&mut rx, |s| s.phase == ResourcePhase::Stopped).await;
    assert_eq!(state.data, Some(4));
}

#[tokio::test(start_paused = true)]
async fn test_disable_discards_in_flight_result() {
    let calls = Arc::new(AtomicU32::new(0));
    let fetch: FetchFn<u32> = {
        let calls = calls.clone();
        Arc::new(move || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(99)
            }
            .boxed()
        })
    };

    let poller = ResourcePoller::spawn(PollerOptions::new("cancelled", no_retry()), fetch, every(100));
    let mut rx = poller.subscribe();
    wait_state(&mut rx, |s| s.phase == ResourcePhase::Loading).await;

    poller.disable();
    tokio::time::sleep(Duration::from_secs(30)).await;

    let state = poller.state();
    assert_eq!(state.phase, ResourcePhase::Idle);
    assert!(state.data.is_none());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_dropping_poller_stops_fetching() {
    let calls = Arc::new(AtomicU32::new(0));
    let poller = ResourcePoller::spawn(
        PollerOptions::new("dropped", no_retry()),
        counting_fetch(calls.clone()),
        every(100),
    );
    let mut rx = poller.subscribe();
    wait_state(&mut rx, |s| s.data.is_some()).await;

    drop(poller);
    let seen = calls.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(calls.load(Ordering::SeqCst), seen);
}
