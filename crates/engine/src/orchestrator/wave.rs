// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wave execution and result persistence.

use super::{Orchestrator, PhaseSummary, RunOutcome};
use crate::dispatch::{BatchResult, DispatchError, FailedItem};
use crate::error::OrchestratorError;
use pc_core::{Clock, Phase, PhaseProgress, Sleeper, TaskError, WorkItem};
use pc_storage::{Record, Table};
use serde_json::Value;
use std::collections::{BTreeMap, VecDeque};
use tracing::Instrument;

/// What one wave did to the store.
#[derive(Debug, Default)]
pub(super) struct WaveOutcome {
    pub attempted: u64,
    pub succeeded: u64,
    /// Items marked `Failed`.
    pub failed: u64,
    /// Items marked `Pending` for a retry wave.
    pub retrying: u64,
    /// Refused admission; not attempted and not persisted.
    pub backpressured: Vec<WorkItem>,
    /// Rejected by an open breaker; attempts unchanged, not persisted.
    pub deferred: Vec<WorkItem>,
    pub skipped: u64,
}

impl<C: Clock, Z: Sleeper> Orchestrator<C, Z> {
    /// Process `remaining` and then every pending retry until the phase's
    /// table holds no pending record.
    ///
    /// Items routed to an open breaker are held back, without spending an
    /// attempt, until that breaker's recovery timeout has passed.
    pub(super) async fn drain(
        &self,
        phase: Phase,
        remaining: Vec<WorkItem>,
        progress: &mut PhaseProgress,
        summary: &mut PhaseSummary,
    ) -> Result<RunOutcome, OrchestratorError> {
        let table = Table::for_phase(phase);
        let wave_size = self.config.wave_size.max(1);
        let shutdown = self.dispatcher.shutdown_token().clone();
        let breakers = self.dispatcher.breakers();
        let mut queue: VecDeque<WorkItem> = remaining.into();
        // Items whose resource breaker is open, waiting out its recovery
        let mut held: Vec<WorkItem> = Vec::new();
        let mut unhealthy_waves = 0u32;

        loop {
            if queue.is_empty() && !held.is_empty() {
                let wait = held.iter().filter_map(|i| breakers.retry_in(&i.resource)).min();
                if let Some(wait) = wait {
                    tracing::info!(
                        held = held.len(),
                        wait_ms = wait.as_millis() as u64,
                        "waiting for open breakers to recover",
                    );
                    tokio::select! {
                        _ = shutdown.cancelled() => return Ok(RunOutcome::Interrupted),
                        _ = self.sleeper.sleep(wait) => {}
                    }
                }
                queue.extend(held.drain(..));
            } else if queue.is_empty() {
                let pending = self.store.read_pending(table, wave_size)?;
                if pending.is_empty() {
                    return Ok(RunOutcome::Completed);
                }
                let attempts = pending.iter().map(|r| r.attempts).min().unwrap_or(1);
                let delay = self.config.retry_delay_for(attempts);
                tracing::info!(
                    pending = pending.len(),
                    attempts,
                    delay_ms = delay.as_millis() as u64,
                    "retrying pending items",
                );
                tokio::select! {
                    _ = shutdown.cancelled() => return Ok(RunOutcome::Interrupted),
                    _ = self.sleeper.sleep(delay) => {}
                }
                queue.extend(pending.iter().map(Record::to_work_item));
            }

            let (ready, blocked): (VecDeque<WorkItem>, VecDeque<WorkItem>) =
                queue.drain(..).partition(|i| breakers.retry_in(&i.resource).is_none());
            queue = ready;
            if !blocked.is_empty() {
                tracing::debug!(held = blocked.len(), "holding items for open breakers");
                held.extend(blocked);
            }
            if queue.is_empty() {
                continue;
            }

            let wave: Vec<WorkItem> = queue.drain(..wave_size.min(queue.len())).collect();
            let size = wave.len();
            let number = progress.waves + 1;
            let outcome = self
                .run_wave(phase, wave)
                .instrument(tracing::debug_span!("wave", wave = number, size))
                .await?;

            progress.record_wave(
                outcome.attempted,
                outcome.succeeded,
                outcome.failed,
                self.clock.epoch_ms(),
            );
            self.checkpoints.save_progress(progress)?;

            summary.attempted += outcome.attempted;
            summary.succeeded += outcome.succeeded;
            summary.failed += outcome.failed;
            summary.skipped += outcome.skipped;
            summary.waves += 1;

            tracing::info!(
                wave = number,
                size,
                succeeded = outcome.succeeded,
                failed = outcome.failed,
                retrying = outcome.retrying,
                backpressured = outcome.backpressured.len(),
                deferred = outcome.deferred.len(),
                queued = queue.len(),
                "wave committed",
            );

            if outcome.skipped > 0 || shutdown.is_cancelled() {
                tracing::info!(wave = number, "shutdown requested, stopping after committed wave");
                return Ok(RunOutcome::Interrupted);
            }

            if outcome.backpressured.len() == size {
                unhealthy_waves += 1;
                tracing::warn!(
                    wave = number,
                    consecutive = unhealthy_waves,
                    limit = self.config.max_unhealthy_waves,
                    "wave refused by unhealthy worker",
                );
                if unhealthy_waves >= self.config.max_unhealthy_waves {
                    tracing::error!(phase = %phase, waves = unhealthy_waves, "aborting phase");
                    return Err(OrchestratorError::ResourceExhausted {
                        phase,
                        waves: unhealthy_waves,
                    });
                }
            } else {
                unhealthy_waves = 0;
            }
            queue.extend(outcome.backpressured);
            held.extend(outcome.deferred);
        }
    }

    /// Dispatch one wave, one batch per resource, and persist every result.
    async fn run_wave(
        &self,
        phase: Phase,
        wave: Vec<WorkItem>,
    ) -> Result<WaveOutcome, OrchestratorError> {
        let mut groups: BTreeMap<String, Vec<WorkItem>> = BTreeMap::new();
        for item in wave {
            groups.entry(item.resource.clone()).or_default().push(item);
        }

        let stages = &self.stages;
        let batches = futures::future::join_all(groups.into_iter().map(|(resource, items)| {
            async move {
                self.dispatcher
                    .submit_batch(&resource, items, move |item: WorkItem| stages.run(phase, item))
                    .await
            }
        }))
        .await;

        let mut batch: BatchResult<WorkItem, Value> = BatchResult::default();
        for b in batches {
            batch.merge(b);
        }
        self.persist(phase, batch)
    }

    fn persist(
        &self,
        phase: Phase,
        batch: BatchResult<WorkItem, Value>,
    ) -> Result<WaveOutcome, OrchestratorError> {
        let table = Table::for_phase(phase);
        let now = self.clock.epoch_ms();
        let mut outcome =
            WaveOutcome { skipped: batch.skipped.len() as u64, ..WaveOutcome::default() };

        for (item, data) in batch.succeeded {
            self.store.insert_if_absent(table, Record::done(&item, data, now))?;
            outcome.succeeded += 1;
        }

        for FailedItem { item, error } in batch.failed {
            if error.not_attempted() {
                outcome.backpressured.push(item);
                continue;
            }
            if error.is_circuit_open() {
                outcome.deferred.push(item);
                continue;
            }
            let item = WorkItem { attempts: item.attempts + 1, ..item };
            let permanent = matches!(&error, DispatchError::Task(TaskError::Expected(_)));
            if permanent || item.attempts > self.config.max_retries {
                tracing::warn!(
                    key = %item.key,
                    resource = %item.resource,
                    attempts = item.attempts,
                    error = %error,
                    "item failed",
                );
                self.store.insert_if_absent(table, Record::failed(&item, error.to_string(), now))?;
                outcome.failed += 1;
            } else {
                tracing::debug!(
                    key = %item.key,
                    attempts = item.attempts,
                    error = %error,
                    "item will be retried",
                );
                self.store.mark_pending(table, Record::pending(&item, error.to_string(), now))?;
                outcome.retrying += 1;
            }
        }
        outcome.attempted = outcome.succeeded + outcome.failed + outcome.retrying;
        Ok(outcome)
    }
}
