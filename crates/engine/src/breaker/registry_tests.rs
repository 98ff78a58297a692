// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use pc_core::{FakeClock, TaskError};
use std::time::Duration;

fn registry() -> (BreakerRegistry<FakeClock>, FakeClock) {
    let clock = FakeClock::new();
    let config =
        BreakerConfig::default().failure_threshold(2).recovery_timeout(Duration::from_secs(5));
    (BreakerRegistry::new(config, clock.clone()), clock)
}

async fn fail(reg: &BreakerRegistry<FakeClock>, name: &str) {
    let _ = reg.execute(name, || async { Err::<(), _>(TaskError::transient("down")) }).await;
}

#[tokio::test]
async fn breakers_are_isolated_per_name() {
    let (reg, _) = registry();
    fail(&reg, "a").await;
    fail(&reg, "a").await;

    assert_eq!(reg.get_state("a").state, BreakerState::Open);
    let ok = reg.execute("b", || async { Ok::<_, TaskError>("fine") }).await;
    assert_eq!(ok.unwrap(), "fine");
    assert_eq!(reg.get_state("b").state, BreakerState::Closed);
}

#[tokio::test]
async fn same_name_returns_same_breaker() {
    let (reg, _) = registry();
    let a1 = reg.breaker("a");
    let a2 = reg.breaker("a");
    assert!(Arc::ptr_eq(&a1, &a2));
}

#[test]
fn get_state_of_unknown_name_does_not_create() {
    let (reg, _) = registry();
    let status = reg.get_state("ghost");
    assert_eq!(status.state, BreakerState::Closed);
    assert_eq!(status.failures, 0);
    assert!(reg.list_states().is_empty());
}

#[test]
fn reset_of_unknown_name_creates_closed_breaker() {
    let (reg, _) = registry();
    reg.reset("fresh");
    let states = reg.list_states();
    assert_eq!(states.len(), 1);
    assert_eq!(states["fresh"].state, BreakerState::Closed);
}

#[tokio::test]
async fn reset_reopens_traffic() {
    let (reg, _) = registry();
    fail(&reg, "a").await;
    fail(&reg, "a").await;
    reg.reset("a");
    let status = reg.get_state("a");
    assert_eq!((status.state, status.failures), (BreakerState::Closed, 0));
}

#[tokio::test]
async fn overrides_apply_per_name() {
    let (reg, _) = registry();
    let reg = reg.with_override("fragile", BreakerConfig::default().failure_threshold(1));
    fail(&reg, "fragile").await;
    fail(&reg, "sturdy").await;

    let states = reg.list_states();
    assert_eq!(states["fragile"].state, BreakerState::Open);
    assert_eq!(states["sturdy"].state, BreakerState::Closed);
    assert_eq!(states.keys().collect::<Vec<_>>(), vec!["fragile", "sturdy"]);
}

#[tokio::test]
async fn execute_with_forwards_expected_classifier() {
    let (reg, _) = registry();
    for _ in 0..3 {
        let _ = reg
            .execute_with("a", TaskError::is_expected, || async {
                Err::<(), _>(TaskError::expected("empty"))
            })
            .await;
    }
    assert_eq!(reg.get_state("a").state, BreakerState::Closed);
}

#[tokio::test]
async fn concurrent_first_use_creates_one_breaker() {
    let (reg, _) = registry();
    let reg = Arc::new(reg);
    let mut handles = Vec::new();
    for _ in 0..16 {
        let reg = Arc::clone(&reg);
        handles.push(tokio::spawn(async move { reg.breaker("shared") }));
    }
    let first = reg.breaker("shared");
    for handle in handles {
        assert!(Arc::ptr_eq(&handle.await.unwrap(), &first));
    }
}

#[tokio::test]
async fn retry_in_is_none_for_unknown_and_closed_names() {
    let (reg, clock) = registry();
    assert_eq!(reg.retry_in("ghost"), None);
    fail(&reg, "a").await;
    assert_eq!(reg.retry_in("a"), None);

    fail(&reg, "a").await;
    clock.advance(Duration::from_secs(1));
    assert_eq!(reg.retry_in("a"), Some(Duration::from_secs(4)));
    assert!(reg.list_states().contains_key("a"));
    assert!(!reg.list_states().contains_key("ghost"));
}
