// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-resource circuit breaker.
//!
//! State machine:
//! - `Closed`: calls pass. Consecutive failures reaching the threshold open it.
//! - `Open`: calls are rejected without running. The first call after the
//!   recovery timeout becomes the single trial and moves it to `HalfOpen`.
//! - `HalfOpen`: one trial in flight. Success closes, failure reopens with a
//!   fresh timer. An expected error or an abandoned trial frees the slot.
//!
//! Rejection checks take only the read lock; transitions take the write
//! lock. The lock is never held across the guarded operation.

mod registry;

pub use registry::BreakerRegistry;

use crate::config::BreakerConfig;
use pc_core::Clock;
use parking_lot::RwLock;
use serde::Serialize;
use std::future::Future;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

pc_core::simple_display! {
    BreakerState {
        Closed => "closed",
        Open => "open",
        HalfOpen => "half_open",
    }
}

/// Error returned by a breaker-guarded call.
#[derive(Debug, Error)]
pub enum BreakerError<E> {
    /// Rejected without invoking the operation.
    #[error("circuit open for {name}")]
    Open { name: String },
    /// The operation ran and failed.
    #[error("{0}")]
    Failed(E),
}

impl<E> BreakerError<E> {
    pub fn is_open(&self) -> bool {
        matches!(self, BreakerError::Open { .. })
    }
}

/// Point-in-time view of a breaker, for admin queries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreakerStatus {
    pub name: String,
    pub state: BreakerState,
    pub failures: u32,
    pub failure_threshold: u32,
    pub recovery_timeout_ms: u64,
    pub last_failure_ms: Option<u64>,
}

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    failures: u32,
    last_failure: Option<Instant>,
    last_failure_ms: Option<u64>,
    trial_in_flight: bool,
    /// Bumped by `reset` so outcomes of calls admitted earlier are dropped.
    epoch: u64,
}

#[derive(Clone, Copy)]
struct Ticket {
    trial: bool,
    epoch: u64,
}

pub struct CircuitBreaker<C: Clock> {
    name: String,
    config: BreakerConfig,
    clock: C,
    inner: RwLock<Inner>,
}

impl<C: Clock> CircuitBreaker<C> {
    pub fn new(name: impl Into<String>, config: BreakerConfig, clock: C) -> Self {
        Self {
            name: name.into(),
            config,
            clock,
            inner: RwLock::new(Inner {
                state: BreakerState::Closed,
                failures: 0,
                last_failure: None,
                last_failure_ms: None,
                trial_in_flight: false,
                epoch: 0,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run `op` through the breaker, counting every error as a failure.
    pub async fn execute<T, E, F, Fut>(&self, op: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.execute_with(|_: &E| false, op).await
    }

    /// Run `op` through the breaker. Errors matching `is_expected` are
    /// returned without affecting breaker state.
    pub async fn execute_with<T, E, P, F, Fut>(
        &self,
        is_expected: P,
        op: F,
    ) -> Result<T, BreakerError<E>>
    where
        P: Fn(&E) -> bool,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let ticket = self.admit().ok_or_else(|| BreakerError::Open { name: self.name.clone() })?;
        let mut guard = TrialGuard { breaker: self, ticket, armed: ticket.trial };

        match op().await {
            Ok(value) => {
                guard.armed = false;
                self.on_success(ticket);
                Ok(value)
            }
            Err(e) if is_expected(&e) => {
                // Guard drop releases a trial slot; state is left alone.
                Err(BreakerError::Failed(e))
            }
            Err(e) => {
                guard.armed = false;
                self.on_failure(ticket);
                Err(BreakerError::Failed(e))
            }
        }
    }

    /// Current state without side effects. An open breaker whose recovery
    /// timeout has elapsed reports `HalfOpen`.
    pub fn status(&self) -> BreakerStatus {
        let inner = self.inner.read();
        let state = match inner.state {
            BreakerState::Open if self.recovery_elapsed(&inner) => BreakerState::HalfOpen,
            state => state,
        };
        BreakerStatus {
            name: self.name.clone(),
            state,
            failures: inner.failures,
            failure_threshold: self.config.failure_threshold,
            recovery_timeout_ms: self.config.recovery_timeout.as_millis() as u64,
            last_failure_ms: inner.last_failure_ms,
        }
    }

    /// Force `Closed` with a zero failure count.
    pub fn reset(&self) {
        let mut inner = self.inner.write();
        let previous = inner.state;
        inner.state = BreakerState::Closed;
        inner.failures = 0;
        inner.last_failure = None;
        inner.last_failure_ms = None;
        inner.trial_in_flight = false;
        inner.epoch += 1;
        tracing::info!(breaker = %self.name, from = %previous, "breaker reset");
    }

    /// Time left before an open breaker admits its trial. `None` when a
    /// call would not be rejected for waiting on recovery.
    pub fn retry_in(&self) -> Option<Duration> {
        let inner = self.inner.read();
        if inner.state != BreakerState::Open {
            return None;
        }
        let waited = self.clock.now().saturating_duration_since(inner.last_failure?);
        self.config.recovery_timeout.checked_sub(waited).filter(|left| !left.is_zero())
    }

    fn recovery_elapsed(&self, inner: &Inner) -> bool {
        match inner.last_failure {
            Some(at) => self.clock.now().saturating_duration_since(at) >= self.config.recovery_timeout,
            None => true,
        }
    }

    fn admit(&self) -> Option<Ticket> {
        {
            let inner = self.inner.read();
            match inner.state {
                BreakerState::Closed => {
                    return Some(Ticket { trial: false, epoch: inner.epoch });
                }
                BreakerState::Open if !self.recovery_elapsed(&inner) => return None,
                BreakerState::HalfOpen if inner.trial_in_flight => return None,
                _ => {}
            }
        }

        let mut inner = self.inner.write();
        let epoch = inner.epoch;
        match inner.state {
            BreakerState::Closed => Some(Ticket { trial: false, epoch }),
            BreakerState::Open => {
                if !self.recovery_elapsed(&inner) {
                    return None;
                }
                inner.state = BreakerState::HalfOpen;
                inner.trial_in_flight = true;
                tracing::info!(breaker = %self.name, "breaker half-open, admitting trial");
                Some(Ticket { trial: true, epoch })
            }
            BreakerState::HalfOpen => {
                if inner.trial_in_flight {
                    return None;
                }
                inner.trial_in_flight = true;
                Some(Ticket { trial: true, epoch })
            }
        }
    }

    fn on_success(&self, ticket: Ticket) {
        let mut inner = self.inner.write();
        if inner.epoch != ticket.epoch {
            return;
        }
        if ticket.trial {
            inner.state = BreakerState::Closed;
            inner.failures = 0;
            inner.trial_in_flight = false;
            tracing::info!(breaker = %self.name, "trial succeeded, breaker closed");
        } else if inner.state == BreakerState::Closed {
            inner.failures = 0;
        }
    }

    fn on_failure(&self, ticket: Ticket) {
        let mut inner = self.inner.write();
        if inner.epoch != ticket.epoch {
            return;
        }
        inner.failures = inner.failures.saturating_add(1);
        inner.last_failure = Some(self.clock.now());
        inner.last_failure_ms = Some(self.clock.epoch_ms());

        if ticket.trial {
            inner.state = BreakerState::Open;
            inner.trial_in_flight = false;
            tracing::warn!(breaker = %self.name, failures = inner.failures, "trial failed, breaker reopened");
        } else if inner.state == BreakerState::Closed
            && inner.failures >= self.config.failure_threshold
        {
            inner.state = BreakerState::Open;
            tracing::warn!(
                breaker = %self.name,
                failures = inner.failures,
                recovery_ms = self.config.recovery_timeout.as_millis() as u64,
                "breaker opened",
            );
        }
    }
}

/// Frees the trial slot if the trial future is dropped or ends inconclusive.
struct TrialGuard<'a, C: Clock> {
    breaker: &'a CircuitBreaker<C>,
    ticket: Ticket,
    armed: bool,
}

impl<C: Clock> Drop for TrialGuard<'_, C> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut inner = self.breaker.inner.write();
        if inner.epoch == self.ticket.epoch && inner.state == BreakerState::HalfOpen {
            inner.trial_in_flight = false;
            tracing::debug!(breaker = %self.breaker.name, "trial released without verdict");
        }
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
