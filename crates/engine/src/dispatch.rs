// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded worker pool with breaker-guarded calls and health-gated admission.

use crate::breaker::{BreakerError, BreakerRegistry};
use crate::config::DispatchConfig;
use crate::health::{ActivityGauge, HealthGate};
use pc_core::{Clock, Sleeper, SystemClock, TaskError, TokioSleeper};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

/// Why a submitted item did not produce a result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// The resource's breaker rejected the call; the operation never ran.
    #[error("circuit open for {resource}")]
    CircuitOpen { resource: String },
    /// The worker stayed unhealthy past the admission deadline; not attempted.
    #[error("admission refused after {waited:?} of unhealthy worker")]
    Backpressure { waited: Duration },
    #[error(transparent)]
    Task(TaskError),
}

impl DispatchError {
    /// Whether the item's operation was never invoked.
    pub fn not_attempted(&self) -> bool {
        matches!(self, DispatchError::Backpressure { .. })
    }

    pub fn is_circuit_open(&self) -> bool {
        matches!(self, DispatchError::CircuitOpen { .. })
    }
}

#[derive(Debug, Clone)]
pub struct FailedItem<T> {
    pub item: T,
    pub error: DispatchError,
}

/// Outcome of one `submit_batch` call.
#[derive(Debug, Clone)]
pub struct BatchResult<T, O> {
    pub succeeded: Vec<(T, O)>,
    pub failed: Vec<FailedItem<T>>,
    /// Items never started because shutdown was requested.
    pub skipped: Vec<T>,
}

impl<T, O> Default for BatchResult<T, O> {
    fn default() -> Self {
        Self { succeeded: Vec::new(), failed: Vec::new(), skipped: Vec::new() }
    }
}

impl<T, O> BatchResult<T, O> {
    pub fn succeeded_count(&self) -> usize {
        self.succeeded.len()
    }

    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    /// Failed items whose operation actually ran or was rejected by a breaker.
    pub fn attempted_count(&self) -> usize {
        self.succeeded.len() + self.failed.iter().filter(|f| !f.error.not_attempted()).count()
    }

    pub fn merge(&mut self, other: BatchResult<T, O>) {
        self.succeeded.extend(other.succeeded);
        self.failed.extend(other.failed);
        self.skipped.extend(other.skipped);
    }
}

enum ItemOutcome<T, O> {
    Done(T, O),
    Failed(T, DispatchError),
    Skipped(T),
}

enum Admission {
    Admitted,
    Refused(Duration),
    ShuttingDown,
}

pub struct Dispatcher<C: Clock = SystemClock, Z: Sleeper = TokioSleeper> {
    config: DispatchConfig,
    breakers: Arc<BreakerRegistry<C>>,
    gate: Arc<dyn HealthGate>,
    gauge: ActivityGauge,
    sleeper: Z,
    permits: Arc<Semaphore>,
    shutdown: CancellationToken,
}

impl<C: Clock, Z: Sleeper> Dispatcher<C, Z> {
    pub fn new(
        config: DispatchConfig,
        breakers: Arc<BreakerRegistry<C>>,
        gate: Arc<dyn HealthGate>,
        gauge: ActivityGauge,
        sleeper: Z,
        shutdown: CancellationToken,
    ) -> Self {
        let workers = config.workers.max(1);
        Self {
            config,
            breakers,
            gate,
            gauge,
            sleeper,
            permits: Arc::new(Semaphore::new(workers)),
            shutdown,
        }
    }

    pub fn breakers(&self) -> &Arc<BreakerRegistry<C>> {
        &self.breakers
    }

    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    pub fn workers(&self) -> usize {
        self.config.workers.max(1)
    }

    /// Run `op` once per item, guarded by the breaker named `resource`.
    ///
    /// Items are admitted in worker-sized chunks, each only after the health
    /// gate passes. No item is retried here.
    pub async fn submit_batch<T, O, F, Fut>(
        &self,
        resource: &str,
        items: Vec<T>,
        op: F,
    ) -> BatchResult<T, O>
    where
        T: Clone,
        F: Fn(T) -> Fut,
        Fut: Future<Output = Result<O, TaskError>>,
    {
        let mut result = BatchResult::default();
        let mut pending = items.into_iter().peekable();

        while pending.peek().is_some() {
            let chunk: Vec<T> = pending.by_ref().take(self.workers()).collect();

            match self.admit().await {
                Admission::Admitted => {}
                Admission::ShuttingDown => {
                    result.skipped.extend(chunk);
                    result.skipped.extend(pending);
                    break;
                }
                Admission::Refused(waited) => {
                    tracing::warn!(
                        resource,
                        items = chunk.len(),
                        waited_ms = waited.as_millis() as u64,
                        "worker unhealthy, chunk refused",
                    );
                    result.failed.extend(chunk.into_iter().map(|item| FailedItem {
                        item,
                        error: DispatchError::Backpressure { waited },
                    }));
                    continue;
                }
            }

            let outcomes = futures::future::join_all(
                chunk.into_iter().map(|item| self.run_item(resource, item, &op)),
            )
            .await;

            for outcome in outcomes {
                match outcome {
                    ItemOutcome::Done(item, out) => result.succeeded.push((item, out)),
                    ItemOutcome::Failed(item, error) => result.failed.push(FailedItem { item, error }),
                    ItemOutcome::Skipped(item) => result.skipped.push(item),
                }
            }
        }

        tracing::debug!(
            resource,
            succeeded = result.succeeded.len(),
            failed = result.failed.len(),
            skipped = result.skipped.len(),
            "batch resolved",
        );
        result
    }

    /// Wait for a healthy verdict, polling up to `admission_max_wait`.
    async fn admit(&self) -> Admission {
        let mut waited = Duration::ZERO;
        loop {
            if self.shutdown.is_cancelled() {
                return Admission::ShuttingDown;
            }
            if self.gate.is_healthy() {
                return Admission::Admitted;
            }
            if waited >= self.config.admission_max_wait {
                return Admission::Refused(waited);
            }
            let step = self.config.admission_poll.min(self.config.admission_max_wait - waited);
            tracing::debug!(waited_ms = waited.as_millis() as u64, "admission blocked on health");
            tokio::select! {
                _ = self.shutdown.cancelled() => return Admission::ShuttingDown,
                _ = self.sleeper.sleep(step) => {}
            }
            waited += step;
        }
    }

    async fn run_item<T, O, F, Fut>(&self, resource: &str, item: T, op: &F) -> ItemOutcome<T, O>
    where
        T: Clone,
        F: Fn(T) -> Fut,
        Fut: Future<Output = Result<O, TaskError>>,
    {
        let Ok(_permit) = self.permits.acquire().await else {
            return ItemOutcome::Skipped(item);
        };
        if self.shutdown.is_cancelled() {
            return ItemOutcome::Skipped(item);
        }
        let _active = self.gauge.enter();

        let timeout = self.config.item_timeout;
        let input = item.clone();
        let result = self
            .breakers
            .execute_with(resource, TaskError::is_expected, || async move {
                match tokio::time::timeout(timeout, op(input)).await {
                    Ok(result) => result,
                    Err(_) => Err(TaskError::Timeout(timeout)),
                }
            })
            .await;

        match result {
            Ok(out) => ItemOutcome::Done(item, out),
            Err(BreakerError::Open { .. }) => ItemOutcome::Failed(
                item,
                DispatchError::CircuitOpen { resource: resource.to_string() },
            ),
            Err(BreakerError::Failed(e)) => ItemOutcome::Failed(item, DispatchError::Task(e)),
        }
    }
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
