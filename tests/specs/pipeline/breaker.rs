//! Circuit breaker isolation specs
//!
//! One failing resource must stop receiving calls without slowing the
//! others, and admits a trial call once its recovery timeout passes.

use crate::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};

fn dispatcher(clock: &FakeClock) -> Dispatcher<FakeClock, FakeSleeper> {
    let breakers = Arc::new(BreakerRegistry::new(
        BreakerConfig::default().failure_threshold(3).recovery_timeout(Duration::from_secs(5)),
        clock.clone(),
    ));
    Dispatcher::new(
        DispatchConfig::default(),
        breakers,
        SwitchGate::healthy(),
        ActivityGauge::new(),
        FakeSleeper::new(clock.clone()),
        CancellationToken::new(),
    )
}

async fn run_failing(
    d: &Dispatcher<FakeClock, FakeSleeper>,
    resource: &str,
    items: usize,
    calls: &AtomicUsize,
) -> Vec<DispatchError> {
    let result = d
        .submit_batch(resource, (0..items).collect(), move |_: usize| async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(TaskError::transient("503"))
        })
        .await;
    result.failed.into_iter().map(|f| f.error).collect()
}

async fn run_ok(
    d: &Dispatcher<FakeClock, FakeSleeper>,
    resource: &str,
    items: usize,
    calls: &AtomicUsize,
) -> usize {
    let result = d
        .submit_batch(resource, (0..items).collect(), move |n: usize| async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, TaskError>(n)
        })
        .await;
    assert!(result.failed.is_empty());
    result.succeeded_count()
}

/// Three failures open A; its next ten items are rejected without a call
/// while B and C keep working.
#[tokio::test]
async fn failing_resource_is_isolated() {
    let clock = FakeClock::new();
    let d = dispatcher(&clock);
    let a_calls = AtomicUsize::new(0);
    let other_calls = AtomicUsize::new(0);

    let errors = run_failing(&d, "a", 3, &a_calls).await;
    assert_eq!(errors.len(), 3);
    assert!(errors.iter().all(|e| matches!(e, DispatchError::Task(_))));
    assert_eq!(d.breakers().get_state("a").state, BreakerState::Open);

    let errors = run_failing(&d, "a", 10, &a_calls).await;
    assert_eq!(errors.len(), 10);
    assert!(errors.iter().all(|e| matches!(e, DispatchError::CircuitOpen { .. })));
    assert_eq!(a_calls.load(Ordering::SeqCst), 3);

    assert_eq!(run_ok(&d, "b", 5, &other_calls).await, 5);
    assert_eq!(run_ok(&d, "c", 5, &other_calls).await, 5);
    assert_eq!(other_calls.load(Ordering::SeqCst), 10);
    assert_eq!(d.breakers().get_state("b").state, BreakerState::Closed);
    assert_eq!(d.breakers().get_state("c").state, BreakerState::Closed);
}

/// After the recovery timeout a single trial is admitted; success closes
/// the breaker and clears its failure count.
#[tokio::test]
async fn successful_trial_closes_after_recovery() {
    let clock = FakeClock::new();
    let d = dispatcher(&clock);
    let calls = AtomicUsize::new(0);
    run_failing(&d, "a", 3, &calls).await;

    clock.advance(Duration::from_secs(4));
    let errors = run_failing(&d, "a", 1, &calls).await;
    assert!(matches!(errors[0], DispatchError::CircuitOpen { .. }));

    clock.advance(Duration::from_secs(1));
    assert_eq!(d.breakers().get_state("a").state, BreakerState::HalfOpen);
    assert_eq!(run_ok(&d, "a", 1, &calls).await, 1);

    let status = d.breakers().get_state("a");
    assert_eq!((status.state, status.failures), (BreakerState::Closed, 0));
    assert_eq!(calls.load(Ordering::SeqCst), 4);
}

/// A failed trial reopens the breaker for another full recovery timeout.
#[tokio::test]
async fn failed_trial_reopens() {
    let clock = FakeClock::new();
    let d = dispatcher(&clock);
    let calls = AtomicUsize::new(0);
    run_failing(&d, "a", 3, &calls).await;

    clock.advance(Duration::from_secs(5));
    let errors = run_failing(&d, "a", 1, &calls).await;
    assert!(matches!(errors[0], DispatchError::Task(_)));
    assert_eq!(d.breakers().get_state("a").state, BreakerState::Open);

    clock.advance(Duration::from_secs(3));
    let errors = run_failing(&d, "a", 2, &calls).await;
    assert!(errors.iter().all(|e| matches!(e, DispatchError::CircuitOpen { .. })));
    assert_eq!(calls.load(Ordering::SeqCst), 4);
}
