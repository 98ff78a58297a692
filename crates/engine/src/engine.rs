// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wiring of the breaker registry, health monitor, dispatcher and
//! orchestrator into one engine.

use crate::admin::Admin;
use crate::breaker::BreakerRegistry;
use crate::config::EngineConfig;
use crate::dispatch::Dispatcher;
use crate::error::OrchestratorError;
use crate::health::{
    AutomationPool, HealthGate, HealthMonitor, NoAutomation, ResourceSampler, SysinfoSampler,
};
use crate::orchestrator::{Orchestrator, RunReport};
use crate::stages::PipelineStages;
use pc_core::{Clock, Sleeper, SystemClock, TokioSleeper};
use pc_storage::{CheckpointStore, FileCheckpointStore, FileStore, Store};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// External collaborators an engine is built from.
pub struct EngineParts {
    pub store: Arc<dyn Store>,
    pub checkpoints: Arc<dyn CheckpointStore>,
    pub stages: Arc<dyn PipelineStages>,
    pub sampler: Box<dyn ResourceSampler>,
    pub pool: Arc<dyn AutomationPool>,
}

pub struct Engine<C: Clock = SystemClock, Z: Sleeper = TokioSleeper> {
    breakers: Arc<BreakerRegistry<C>>,
    health: Arc<HealthMonitor<C>>,
    orchestrator: Arc<Orchestrator<C, Z>>,
    shutdown: CancellationToken,
}

impl<C: Clock, Z: Sleeper> Engine<C, Z> {
    pub fn build(config: &EngineConfig, clock: C, sleeper: Z, parts: EngineParts) -> Self {
        let shutdown = CancellationToken::new();
        let breakers = Arc::new(BreakerRegistry::new(config.breaker, clock.clone()));
        let health = Arc::new(HealthMonitor::new(
            config.health.clone(),
            clock.clone(),
            parts.sampler,
            parts.pool,
            crate::health::ActivityGauge::new(),
        )
        .with_breakers(breakers.clone()));
        let gate: Arc<dyn HealthGate> = health.clone();
        let dispatcher = Arc::new(Dispatcher::new(
            config.dispatch,
            Arc::clone(&breakers),
            gate,
            health.gauge().clone(),
            sleeper.clone(),
            shutdown.clone(),
        ));
        let orchestrator = Arc::new(Orchestrator::new(
            config.orchestrator.clone(),
            clock,
            sleeper,
            parts.store,
            parts.checkpoints,
            parts.stages,
            dispatcher,
        ));
        Self { breakers, health, orchestrator, shutdown }
    }

    pub async fn run(&self) -> Result<RunReport, OrchestratorError> {
        self.orchestrator.run().await
    }

    /// Let in-flight items finish and stop the run after the current wave.
    pub fn shutdown(&self) {
        tracing::info!("shutdown requested");
        self.shutdown.cancel();
    }

    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    pub fn admin(&self) -> Admin<C, Z> {
        Admin::new(
            Arc::clone(&self.breakers),
            Arc::clone(&self.health),
            Arc::clone(&self.orchestrator),
        )
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator<C, Z>> {
        &self.orchestrator
    }
}

impl Engine {
    /// Engine over file-backed storage in `state_dir`, sampling this process.
    ///
    /// Phase output goes to `state_dir/store`, checkpoints to
    /// `state_dir/checkpoints`. `stages` receives the store so the export
    /// phase can read it.
    pub fn open(
        config: &EngineConfig,
        state_dir: &Path,
        stages: impl FnOnce(Arc<dyn Store>) -> Arc<dyn PipelineStages>,
    ) -> Result<Self, OrchestratorError> {
        let store: Arc<dyn Store> = Arc::new(FileStore::open(state_dir.join("store"))?);
        let checkpoints = Arc::new(FileCheckpointStore::new(state_dir.join("checkpoints")));
        let sampler = SysinfoSampler::new().map_err(OrchestratorError::Setup)?;
        let stages = stages(Arc::clone(&store));
        tracing::info!(state_dir = %state_dir.display(), job = %config.orchestrator.job, "engine opened");
        Ok(Self::build(
            config,
            SystemClock,
            TokioSleeper,
            EngineParts {
                store,
                checkpoints,
                stages,
                sampler: Box::new(sampler),
                pool: Arc::new(NoAutomation),
            },
        ))
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
