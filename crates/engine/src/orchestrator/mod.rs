// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Phase orchestrator.
//!
//! Runs the six phases in order. Before each phase the store is inspected to
//! decide what is left (see [`ResumeState`]); the remaining items are cut
//! into waves, dispatched, and persisted wave by wave so a restart loses at
//! most the wave in flight.

mod detect;
mod wave;

pub use detect::{PhasePlan, ResumeState};

use crate::config::OrchestratorConfig;
use crate::dispatch::Dispatcher;
use crate::error::OrchestratorError;
use crate::stages::PipelineStages;
use pc_core::{Clock, JobId, Phase, PhaseProgress, RunId, Sleeper, SystemClock, TokioSleeper};
use pc_storage::{CheckpointStore, RecordStatus, Store, Table};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::Instrument;

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Completed,
    /// Shutdown was requested; the interrupted phase resumes on the next run.
    Interrupted,
}

pc_core::simple_display! {
    RunOutcome {
        Completed => "completed",
        Interrupted => "interrupted",
    }
}

/// Counters for one phase within one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseSummary {
    pub phase: Phase,
    /// State found by resume detection when the phase was entered.
    pub resumed_from: ResumeState,
    pub attempted: u64,
    pub succeeded: u64,
    pub failed: u64,
    /// Items abandoned because of shutdown.
    pub skipped: u64,
    pub waves: u64,
    pub elapsed_ms: u64,
}

impl PhaseSummary {
    fn new(phase: Phase, resumed_from: ResumeState) -> Self {
        Self {
            phase,
            resumed_from,
            attempted: 0,
            succeeded: 0,
            failed: 0,
            skipped: 0,
            waves: 0,
            elapsed_ms: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub run: RunId,
    pub job: JobId,
    pub outcome: RunOutcome,
    pub phases: Vec<PhaseSummary>,
    pub elapsed_ms: u64,
}

impl RunReport {
    pub fn phase(&self, phase: Phase) -> Option<&PhaseSummary> {
        self.phases.iter().find(|s| s.phase == phase)
    }
}

/// Clears the running flag when a run or restart ends, however it ends.
struct RunningGuard<'a>(&'a AtomicBool);

impl<'a> RunningGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self, OrchestratorError> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| OrchestratorError::AlreadyRunning)?;
        Ok(Self(flag))
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct Orchestrator<C: Clock = SystemClock, Z: Sleeper = TokioSleeper> {
    config: OrchestratorConfig,
    clock: C,
    sleeper: Z,
    store: Arc<dyn Store>,
    checkpoints: Arc<dyn CheckpointStore>,
    stages: Arc<dyn PipelineStages>,
    dispatcher: Arc<Dispatcher<C, Z>>,
    running: AtomicBool,
}

impl<C: Clock, Z: Sleeper> Orchestrator<C, Z> {
    pub fn new(
        config: OrchestratorConfig,
        clock: C,
        sleeper: Z,
        store: Arc<dyn Store>,
        checkpoints: Arc<dyn CheckpointStore>,
        stages: Arc<dyn PipelineStages>,
        dispatcher: Arc<Dispatcher<C, Z>>,
    ) -> Self {
        Self {
            config,
            clock,
            sleeper,
            store,
            checkpoints,
            stages,
            dispatcher,
            running: AtomicBool::new(false),
        }
    }

    pub fn job(&self) -> &JobId {
        &self.config.job
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher<C, Z>> {
        &self.dispatcher
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Run every phase that is not yet complete, in order.
    ///
    /// Completed phases are skipped; a partially covered phase runs only its
    /// uncovered items.
    pub async fn run(&self) -> Result<RunReport, OrchestratorError> {
        let _running = RunningGuard::acquire(&self.running)?;
        let run = RunId::generate();
        let started = self.clock.now();
        let span = tracing::info_span!("run", job = %self.config.job, run = %run.short(12));

        async {
            tracing::info!("run started");
            let mut phases = Vec::new();
            let mut outcome = RunOutcome::Completed;

            for phase in Phase::ALL {
                if self.dispatcher.shutdown_token().is_cancelled() {
                    outcome = RunOutcome::Interrupted;
                    break;
                }
                let (summary, phase_outcome) = self
                    .run_phase(phase)
                    .instrument(tracing::info_span!("phase", phase = %phase))
                    .await?;
                phases.push(summary);
                if phase_outcome == RunOutcome::Interrupted {
                    outcome = RunOutcome::Interrupted;
                    break;
                }
            }

            let elapsed_ms = elapsed_ms(&self.clock, started);
            tracing::info!(
                outcome = %outcome,
                elapsed = %pc_core::format_elapsed_ms(elapsed_ms),
                "run finished",
            );
            Ok(RunReport { run, job: self.config.job.clone(), outcome, phases, elapsed_ms })
        }
        .instrument(span)
        .await
    }

    async fn run_phase(
        &self,
        phase: Phase,
    ) -> Result<(PhaseSummary, RunOutcome), OrchestratorError> {
        let started = self.clock.now();
        let plan = self.plan_phase(phase).await?;
        let mut progress = self.reconcile_progress(&plan)?;
        let mut summary = PhaseSummary::new(phase, plan.state);

        if plan.state == ResumeState::Completed {
            tracing::info!(inputs = plan.total, "phase already complete, skipping");
            self.finish_phase(&mut progress)?;
            summary.elapsed_ms = elapsed_ms(&self.clock, started);
            return Ok((summary, RunOutcome::Completed));
        }

        tracing::info!(
            state = %plan.state,
            inputs = plan.total,
            remaining = plan.remaining.len(),
            "phase started",
        );
        let outcome = self.drain(phase, plan.remaining, &mut progress, &mut summary).await?;
        if outcome == RunOutcome::Completed {
            self.finish_phase(&mut progress)?;
        }
        summary.elapsed_ms = elapsed_ms(&self.clock, started);
        tracing::info!(
            outcome = %outcome,
            attempted = summary.attempted,
            succeeded = summary.succeeded,
            failed = summary.failed,
            skipped = summary.skipped,
            waves = summary.waves,
            "phase finished",
        );
        Ok((summary, outcome))
    }

    /// Mark the phase completed with counts taken from the store.
    fn finish_phase(&self, progress: &mut PhaseProgress) -> Result<(), OrchestratorError> {
        let table = Table::for_phase(progress.phase);
        progress.succeeded = self.store.count_by_status(table, RecordStatus::Done)?;
        progress.failed = self.store.count_by_status(table, RecordStatus::Failed)?;
        progress.attempted = progress.attempted.max(progress.succeeded + progress.failed);
        progress.complete(self.clock.epoch_ms());
        self.checkpoints.save_progress(progress)?;
        Ok(())
    }

    /// Discard the output of `from` and every later phase.
    ///
    /// Truncates their tables and clears their progress records; the next
    /// [`run`](Self::run) starts at `from`. Seeds are kept.
    pub fn force_restart(&self, from: Phase) -> Result<(), OrchestratorError> {
        let _running = RunningGuard::acquire(&self.running)?;
        for phase in from.through_end() {
            self.store.truncate(Table::for_phase(phase))?;
            self.checkpoints.clear_progress(&self.config.job, phase)?;
        }
        tracing::warn!(job = %self.config.job, from = %from, "forced restart, later output discarded");
        Ok(())
    }

    /// Stored progress records for every phase, in order.
    pub fn phase_progress(&self) -> Result<Vec<PhaseProgress>, OrchestratorError> {
        let now = self.clock.epoch_ms();
        Phase::ALL
            .into_iter()
            .map(|phase| {
                Ok(self
                    .checkpoints
                    .load_progress(&self.config.job, phase)?
                    .unwrap_or_else(|| PhaseProgress::new(self.config.job.clone(), phase, now)))
            })
            .collect()
    }
}

fn elapsed_ms(clock: &impl Clock, since: std::time::Instant) -> u64 {
    clock.now().saturating_duration_since(since).as_millis() as u64
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
