// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resume detection: what a phase still has to do, read from the store.

use super::Orchestrator;
use crate::error::OrchestratorError;
use crate::stages::EXPORT_KEY;
use pc_core::{Clock, Phase, PhaseProgress, PhaseStatus, Sleeper, WorkItem};
use pc_storage::{RecordStatus, Table};
use serde::Serialize;
use serde_json::json;
use std::collections::HashSet;

/// Coverage of a phase's inputs by terminal records in its output table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResumeState {
    /// The output table holds no records.
    NotStarted,
    /// Some inputs are covered.
    Partial,
    /// Every input key has a terminal record.
    Completed,
}

pc_core::simple_display! {
    ResumeState {
        NotStarted => "not_started",
        Partial => "partial",
        Completed => "completed",
    }
}

/// Inputs of a phase split by coverage.
#[derive(Debug, Clone)]
pub struct PhasePlan {
    pub phase: Phase,
    pub state: ResumeState,
    /// Number of distinct input keys.
    pub total: usize,
    /// Inputs without a terminal record, carrying attempts from any pending
    /// record.
    pub remaining: Vec<WorkItem>,
}

impl PhasePlan {
    pub fn covered(&self) -> usize {
        self.total - self.remaining.len()
    }
}

impl<C: Clock, Z: Sleeper> Orchestrator<C, Z> {
    /// Compare the phase's inputs against its output table.
    pub async fn plan_phase(&self, phase: Phase) -> Result<PhasePlan, OrchestratorError> {
        let inputs = self.phase_inputs(phase).await?;
        let table = Table::for_phase(phase);
        let terminal = self.store.terminal_keys(table)?;
        let total = inputs.len();

        let mut remaining = Vec::new();
        for item in inputs {
            if terminal.contains(&item.key) {
                continue;
            }
            let item = match self.store.get(table, &item.key)? {
                Some(pending) if pending.status == RecordStatus::Pending => {
                    item.with_attempts(pending.attempts)
                }
                _ => item,
            };
            remaining.push(item);
        }

        let has_records = !terminal.is_empty()
            || self.store.count_by_status(table, RecordStatus::Pending)? > 0;
        let state = if remaining.is_empty() {
            ResumeState::Completed
        } else if has_records {
            ResumeState::Partial
        } else {
            ResumeState::NotStarted
        };

        tracing::debug!(
            phase = %phase,
            state = %state,
            total,
            remaining = remaining.len(),
            "resume detection",
        );
        Ok(PhasePlan { phase, state, total, remaining })
    }

    /// Work items a phase must cover, deduplicated by key.
    async fn phase_inputs(&self, phase: Phase) -> Result<Vec<WorkItem>, OrchestratorError> {
        let items = match phase.prev() {
            None => self.seeds().await?,
            Some(_) if phase == Phase::Export => {
                vec![WorkItem::new(EXPORT_KEY, EXPORT_KEY, json!({ "job": self.config.job }))]
            }
            Some(prev) => self
                .store
                .records(Table::for_phase(prev), Some(RecordStatus::Done))?
                .iter()
                .flat_map(|record| self.stages.follow_ups(prev, record))
                .collect(),
        };

        let mut seen = HashSet::new();
        Ok(items.into_iter().filter(|item| seen.insert(item.key.clone())).collect())
    }

    /// Seeds from the checkpoint, discovering and saving them on first use.
    async fn seeds(&self) -> Result<Vec<WorkItem>, OrchestratorError> {
        let job = &self.config.job;
        if let Some(seeds) = self.checkpoints.load_seeds(job)? {
            return Ok(seeds);
        }
        let seeds = self.stages.discover_seeds().await.map_err(OrchestratorError::Seed)?;
        self.checkpoints.save_seeds(job, &seeds)?;
        tracing::info!(seeds = seeds.len(), "seeds discovered and saved");
        Ok(seeds)
    }

    /// Progress record for the plan, rewritten where the store disagrees.
    pub(super) fn reconcile_progress(
        &self,
        plan: &PhasePlan,
    ) -> Result<PhaseProgress, OrchestratorError> {
        let job = &self.config.job;
        let now = self.clock.epoch_ms();
        let stored = self.checkpoints.load_progress(job, plan.phase)?;
        let mut progress =
            stored.clone().unwrap_or_else(|| PhaseProgress::new(job.clone(), plan.phase, now));

        let status = match plan.state {
            ResumeState::NotStarted => PhaseStatus::NotStarted,
            ResumeState::Partial => PhaseStatus::InProgress,
            ResumeState::Completed => PhaseStatus::Completed,
        };
        if stored.is_some() && progress.status != status {
            tracing::warn!(
                phase = %plan.phase,
                recorded = %progress.status,
                actual = %status,
                covered = plan.covered(),
                total = plan.total,
                "progress record disagrees with store, using store",
            );
        }
        progress.status = status;

        let table = Table::for_phase(plan.phase);
        progress.succeeded = self.store.count_by_status(table, RecordStatus::Done)?;
        progress.failed = self.store.count_by_status(table, RecordStatus::Failed)?;
        progress.updated_at_ms = now;
        Ok(progress)
    }
}

#[cfg(test)]
#[path = "detect_tests.rs"]
mod tests;
