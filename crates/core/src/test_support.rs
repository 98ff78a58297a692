// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test helpers for use across crates.
//!
//! Gated behind `#[cfg(any(test, feature = "test-support"))]`.

use crate::clock::{FakeClock, FakeSleeper};
use crate::item::WorkItem;
use serde_json::json;

// ── Proptest strategies ─────────────────────────────────────────────────

/// Proptest strategies for core domain types.
pub mod strategies {
    use crate::phase::{Phase, PhaseStatus};
    use crate::task::TaskError;
    use proptest::prelude::*;
    use std::time::Duration;

    pub fn arb_phase() -> impl Strategy<Value = Phase> {
        prop::sample::select(Phase::ALL.to_vec())
    }

    pub fn arb_phase_status() -> impl Strategy<Value = PhaseStatus> {
        prop_oneof![
            Just(PhaseStatus::NotStarted),
            Just(PhaseStatus::InProgress),
            Just(PhaseStatus::Completed),
        ]
    }

    pub fn arb_task_error() -> impl Strategy<Value = TaskError> {
        prop_oneof![
            "[a-z]{1,8}".prop_map(TaskError::Transient),
            (1u64..300).prop_map(|s| TaskError::Timeout(Duration::from_secs(s))),
            "[a-z]{1,8}".prop_map(TaskError::Expected),
        ]
    }
}

// ── Factories ───────────────────────────────────────────────────────────

/// A work item keyed by a fake URL under `resource`.
pub fn work_item(resource: &str, n: usize) -> WorkItem {
    let key = format!("https://{resource}.test/item/{n}");
    WorkItem::new(key.clone(), resource, json!({ "url": key }))
}

/// `count` work items for `resource`.
pub fn work_items(resource: &str, count: usize) -> Vec<WorkItem> {
    (0..count).map(|n| work_item(resource, n)).collect()
}

/// A fake clock paired with a sleeper that advances it.
pub fn fake_time() -> (FakeClock, FakeSleeper) {
    let clock = FakeClock::new();
    let sleeper = FakeSleeper::new(clock.clone());
    (clock, sleeper)
}
