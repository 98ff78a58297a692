// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use pc_core::{FakeClock, TaskError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn breaker(threshold: u32, recovery_secs: u64) -> (CircuitBreaker<FakeClock>, FakeClock) {
    let clock = FakeClock::new();
    let config = BreakerConfig::default()
        .failure_threshold(threshold)
        .recovery_timeout(Duration::from_secs(recovery_secs));
    (CircuitBreaker::new("alpha", config, clock.clone()), clock)
}

async fn fail(b: &CircuitBreaker<FakeClock>) -> Result<(), BreakerError<TaskError>> {
    b.execute(|| async { Err::<(), _>(TaskError::transient("boom")) }).await
}

async fn succeed(b: &CircuitBreaker<FakeClock>) -> Result<u32, BreakerError<TaskError>> {
    b.execute(|| async { Ok::<_, TaskError>(7) }).await
}

#[tokio::test]
async fn closed_breaker_passes_results_through() {
    let (b, _) = breaker(3, 5);
    assert_eq!(succeed(&b).await.unwrap(), 7);
    assert!(matches!(fail(&b).await, Err(BreakerError::Failed(TaskError::Transient(_)))));
    assert_eq!(b.status().state, BreakerState::Closed);
    assert_eq!(b.status().failures, 1);
}

#[tokio::test]
async fn success_resets_failure_count() {
    let (b, _) = breaker(3, 5);
    fail(&b).await.ok();
    fail(&b).await.ok();
    succeed(&b).await.unwrap();
    assert_eq!(b.status().failures, 0);
    fail(&b).await.ok();
    fail(&b).await.ok();
    assert_eq!(b.status().state, BreakerState::Closed);
}

#[yare::parameterized(
    at_threshold = { 3, 3 },
    past_threshold = { 3, 5 },
    threshold_one = { 1, 1 },
)]
fn consecutive_failures_open_and_reject(threshold: u32, failures: u32) {
    let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
    rt.block_on(async {
        let (b, clock) = breaker(threshold, 5);
        for _ in 0..failures {
            fail(&b).await.ok();
        }
        assert_eq!(b.status().state, BreakerState::Open);

        let calls = &AtomicUsize::new(0);
        clock.advance(Duration::from_millis(4_999));
        let result = b
            .execute(|| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, TaskError>(())
            })
            .await;
        assert!(result.unwrap_err().is_open());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    });
}

#[tokio::test]
async fn open_breaker_admits_trial_after_recovery_timeout() {
    let (b, clock) = breaker(2, 5);
    fail(&b).await.ok();
    fail(&b).await.ok();

    clock.advance(Duration::from_secs(5));
    assert_eq!(b.status().state, BreakerState::HalfOpen);
    assert_eq!(succeed(&b).await.unwrap(), 7);

    let status = b.status();
    assert_eq!(status.state, BreakerState::Closed);
    assert_eq!(status.failures, 0);
}

#[tokio::test]
async fn failed_trial_reopens_with_fresh_timer() {
    let (b, clock) = breaker(1, 5);
    fail(&b).await.ok();
    clock.advance(Duration::from_secs(6));

    assert!(matches!(fail(&b).await, Err(BreakerError::Failed(_))));
    assert_eq!(b.status().state, BreakerState::Open);

    clock.advance(Duration::from_secs(4));
    assert!(succeed(&b).await.unwrap_err().is_open());
    clock.advance(Duration::from_secs(1));
    assert_eq!(succeed(&b).await.unwrap(), 7);
}

#[tokio::test]
async fn only_one_concurrent_trial_is_admitted() {
    let (b, clock) = breaker(1, 5);
    fail(&b).await.ok();
    clock.advance(Duration::from_secs(5));

    let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
    let invoked = Arc::new(AtomicUsize::new(0));

    let trial = {
        let invoked = invoked.clone();
        b.execute(move || async move {
            invoked.fetch_add(1, Ordering::SeqCst);
            release_rx.await.ok();
            Ok::<_, TaskError>(1)
        })
    };
    let others = async {
        // Let the trial get admitted first
        tokio::task::yield_now().await;
        let mut rejected = 0;
        for _ in 0..5 {
            let invoked = invoked.clone();
            let r = b
                .execute(move || async move {
                    invoked.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, TaskError>(2)
                })
                .await;
            if matches!(r, Err(BreakerError::Open { .. })) {
                rejected += 1;
            }
        }
        release_tx.send(()).ok();
        rejected
    };

    let (trial_result, rejected) = tokio::join!(trial, others);
    assert_eq!(trial_result.unwrap(), 1);
    assert_eq!(rejected, 5);
    assert_eq!(invoked.load(Ordering::SeqCst), 1);
    assert_eq!(b.status().state, BreakerState::Closed);
}

#[tokio::test]
async fn expected_errors_do_not_count() {
    let (b, _) = breaker(2, 5);
    for _ in 0..5 {
        let r = b
            .execute_with(TaskError::is_expected, || async {
                Err::<(), _>(TaskError::expected("no contact info"))
            })
            .await;
        assert!(matches!(r, Err(BreakerError::Failed(TaskError::Expected(_)))));
    }
    let status = b.status();
    assert_eq!(status.state, BreakerState::Closed);
    assert_eq!(status.failures, 0);
}

#[tokio::test]
async fn expected_error_during_trial_frees_slot() {
    let (b, clock) = breaker(1, 5);
    fail(&b).await.ok();
    clock.advance(Duration::from_secs(5));

    let r = b
        .execute_with(TaskError::is_expected, || async {
            Err::<(), _>(TaskError::expected("empty page"))
        })
        .await;
    assert!(matches!(r, Err(BreakerError::Failed(_))));
    assert_eq!(b.status().state, BreakerState::HalfOpen);

    // Next call becomes the trial
    assert_eq!(succeed(&b).await.unwrap(), 7);
    assert_eq!(b.status().state, BreakerState::Closed);
}

#[tokio::test]
async fn abandoned_trial_frees_slot() {
    let (b, clock) = breaker(1, 5);
    fail(&b).await.ok();
    clock.advance(Duration::from_secs(5));

    {
        let trial = b.execute(|| std::future::pending::<Result<(), TaskError>>());
        let timed = tokio::time::timeout(Duration::from_millis(5), trial).await;
        assert!(timed.is_err());
    }

    assert_eq!(succeed(&b).await.unwrap(), 7);
}

#[tokio::test]
async fn reset_closes_from_any_state() {
    let (b, clock) = breaker(1, 60);
    fail(&b).await.ok();
    assert_eq!(b.status().state, BreakerState::Open);
    b.reset();
    assert_eq!(b.status().state, BreakerState::Closed);
    assert_eq!(b.status().failures, 0);

    fail(&b).await.ok();
    clock.advance(Duration::from_secs(60));
    assert_eq!(b.status().state, BreakerState::HalfOpen);
    b.reset();
    let status = b.status();
    assert_eq!((status.state, status.failures), (BreakerState::Closed, 0));
}

#[tokio::test]
async fn outcome_of_call_admitted_before_reset_is_ignored() {
    let (b, _) = breaker(1, 60);
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();

    let slow = b.execute(|| async move {
        rx.await.ok();
        Err::<(), _>(TaskError::transient("late"))
    });
    let resetter = async {
        tokio::task::yield_now().await;
        b.reset();
        tx.send(()).ok();
    };
    let (r, ()) = tokio::join!(slow, resetter);

    assert!(matches!(r, Err(BreakerError::Failed(_))));
    assert_eq!(b.status().state, BreakerState::Closed);
    assert_eq!(b.status().failures, 0);
}

#[tokio::test]
async fn status_records_last_failure_time() {
    let (b, clock) = breaker(3, 5);
    clock.set_epoch_ms(42_000);
    fail(&b).await.ok();
    let status = b.status();
    assert_eq!(status.last_failure_ms, Some(42_000));
    assert_eq!(status.failure_threshold, 3);
    assert_eq!(status.recovery_timeout_ms, 5_000);
}

#[tokio::test]
async fn reset_clears_last_failure_time() {
    let (b, clock) = breaker(1, 60);
    clock.set_epoch_ms(7_000);
    fail(&b).await.ok();
    assert_eq!(b.status().last_failure_ms, Some(7_000));

    b.reset();
    assert_eq!(b.status().last_failure_ms, None);
}

#[tokio::test]
async fn retry_in_counts_down_while_open() {
    let (b, clock) = breaker(1, 5);
    assert_eq!(b.retry_in(), None);

    fail(&b).await.ok();
    assert_eq!(b.retry_in(), Some(Duration::from_secs(5)));
    clock.advance(Duration::from_secs(3));
    assert_eq!(b.retry_in(), Some(Duration::from_secs(2)));
    clock.advance(Duration::from_secs(2));
    assert_eq!(b.retry_in(), None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_calls_at_recovery_admit_one_trial() {
    const CALLERS: usize = 8;
    let (b, clock) = breaker(1, 5);
    fail(&b).await.ok();
    clock.advance(Duration::from_secs(5));

    let b = Arc::new(b);
    let barrier = Arc::new(tokio::sync::Barrier::new(CALLERS));
    let release = tokio_util::sync::CancellationToken::new();
    let invoked = Arc::new(AtomicUsize::new(0));
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

    for _ in 0..CALLERS {
        let (b, barrier, release, invoked, tx) =
            (b.clone(), barrier.clone(), release.clone(), invoked.clone(), tx.clone());
        tokio::spawn(async move {
            barrier.wait().await;
            let r = b
                .execute(move || async move {
                    invoked.fetch_add(1, Ordering::SeqCst);
                    release.cancelled().await;
                    Ok::<_, TaskError>(())
                })
                .await;
            tx.send(r).ok();
        });
    }

    // The trial holds its slot until every other caller has been answered
    let rejected = tokio::time::timeout(Duration::from_secs(10), async {
        let mut rejected = 0;
        for _ in 0..CALLERS - 1 {
            if let Some(Err(BreakerError::Open { .. })) = rx.recv().await {
                rejected += 1;
            }
        }
        rejected
    })
    .await
    .unwrap();
    release.cancel();
    let trial = rx.recv().await.unwrap();

    assert_eq!(rejected, CALLERS - 1);
    assert!(trial.is_ok());
    assert_eq!(invoked.load(Ordering::SeqCst), 1);
    assert_eq!(b.status().state, BreakerState::Closed);
}
