//! Retry attempt counts and the in-flight bound of the task runner.

use ragsweep_core::engine::{retry_call, BoundedTaskRunner, RetryPolicy};
use ragsweep_core::errors::ProviderError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 5,
        initial_delay: Duration::from_millis(100),
        max_delay: Duration::from_secs(2),
        multiplier: 2.0,
    }
}

async fn flaky(calls: &AtomicUsize, fail_times: usize, err: ProviderError) -> Result<&'static str, ProviderError> {
    let n = calls.fetch_add(1, Ordering::SeqCst);
    if n < fail_times {
        Err(err)
    } else {
        Ok("ok")
    }
}

#[tokio::test(start_paused = true)]
async fn transient_failures_are_retried_until_success() {
    for k in 0..5 {
        let calls = AtomicUsize::new(0);
        let err = ProviderError::from_status("svc", 503, "unavailable");
        let out = retry_call(&policy(), "op", || flaky(&calls, k, err.clone())).await;
        assert_eq!(out, Ok("ok"), "k = {k}");
        assert_eq!(calls.load(Ordering::SeqCst), k + 1, "k = {k}");
    }
}

#[tokio::test(start_paused = true)]
async fn rate_limit_hint_delays_the_next_attempt() {
    let calls = AtomicUsize::new(0);
    let err = ProviderError::RateLimited {
        provider: "svc".into(),
        retry_after: Some(Duration::from_millis(1500)),
    };
    let started = tokio::time::Instant::now();
    let out = retry_call(&policy(), "op", || flaky(&calls, 1, err.clone())).await;
    assert_eq!(out, Ok("ok"));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(started.elapsed() >= Duration::from_millis(1500), "{:?}", started.elapsed());
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn permanent_failure_is_not_retried() {
    let calls = AtomicUsize::new(0);
    let err = ProviderError::from_status("svc", 400, "bad request");
    let out = retry_call(&policy(), "op", || flaky(&calls, usize::MAX, err.clone())).await;
    assert_eq!(out, Err(err));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_return_the_last_error() {
    let calls = AtomicUsize::new(0);
    let err = ProviderError::from_status("svc", 429, "slow down");
    let out = retry_call(&policy(), "op", || flaky(&calls, usize::MAX, err.clone())).await;
    assert_eq!(out, Err(err));
    assert_eq!(calls.load(Ordering::SeqCst), 5);
}

#[tokio::test(start_paused = true)]
async fn in_flight_units_never_exceed_the_cap() {
    const CAP: usize = 3;
    let current = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let mut pool: BoundedTaskRunner<usize, String> = BoundedTaskRunner::new(CAP);
    for i in 0..20usize {
        let current = current.clone();
        let peak = peak.clone();
        pool.submit(async move {
            let now = current.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10 + (i as u64 * 7) % 30)).await;
            current.fetch_sub(1, Ordering::SeqCst);
            if i % 4 == 0 {
                Err(format!("unit {i} failed"))
            } else {
                Ok(i)
            }
        });
    }
    let done = pool.collect_all().await;
    assert_eq!(done.len(), 20);
    assert_eq!(done.iter().filter(|c| c.outcome.is_err()).count(), 5);
    let peak = peak.load(Ordering::SeqCst);
    assert!(peak <= CAP, "peak in-flight {peak} > {CAP}");
    assert_eq!(peak, CAP);
}
