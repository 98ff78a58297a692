// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! pc-core: Domain types shared by the pcrawl pipeline crates

pub mod macros;

pub mod clock;
pub mod id;
pub mod item;
pub mod phase;
pub mod progress;
pub mod task;
pub mod time_fmt;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use clock::{Clock, FakeClock, FakeSleeper, Sleeper, SystemClock, TokioSleeper};
pub use id::{short, JobId, RunId};
pub use item::WorkItem;
pub use phase::{Phase, PhaseStatus};
#[cfg(any(test, feature = "test-support"))]
pub use progress::PhaseProgressBuilder;
pub use progress::PhaseProgress;
pub use task::TaskError;
pub use time_fmt::{format_elapsed, format_elapsed_ms};
