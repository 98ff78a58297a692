// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Administrative handle over a running engine.

use crate::breaker::{BreakerRegistry, BreakerStatus};
use crate::error::OrchestratorError;
use crate::health::{HealthMonitor, HealthSnapshot, HealthSummary};
use crate::orchestrator::Orchestrator;
use pc_core::{Clock, Phase, PhaseProgress, Sleeper, SystemClock, TokioSleeper};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Read and reset operations for operators. Cheap to clone.
pub struct Admin<C: Clock = SystemClock, Z: Sleeper = TokioSleeper> {
    breakers: Arc<BreakerRegistry<C>>,
    health: Arc<HealthMonitor<C>>,
    orchestrator: Arc<Orchestrator<C, Z>>,
}

impl<C: Clock, Z: Sleeper> Clone for Admin<C, Z> {
    fn clone(&self) -> Self {
        Self {
            breakers: Arc::clone(&self.breakers),
            health: Arc::clone(&self.health),
            orchestrator: Arc::clone(&self.orchestrator),
        }
    }
}

impl<C: Clock, Z: Sleeper> Admin<C, Z> {
    pub fn new(
        breakers: Arc<BreakerRegistry<C>>,
        health: Arc<HealthMonitor<C>>,
        orchestrator: Arc<Orchestrator<C, Z>>,
    ) -> Self {
        Self { breakers, health, orchestrator }
    }

    pub fn breaker_state(&self, name: &str) -> BreakerStatus {
        self.breakers.get_state(name)
    }

    pub fn breaker_states(&self) -> BTreeMap<String, BreakerStatus> {
        self.breakers.list_states()
    }

    pub fn reset_breaker(&self, name: &str) {
        tracing::info!(breaker = %name, "breaker reset by operator");
        self.breakers.reset(name);
    }

    /// Latest snapshot, sampling once if none was taken yet.
    pub fn health(&self) -> Arc<HealthSnapshot> {
        self.health.latest().unwrap_or_else(|| self.health.check_health(false))
    }

    pub fn health_summary(&self) -> HealthSummary {
        self.health.get_health_summary()
    }

    pub fn phase_progress(&self) -> Result<Vec<PhaseProgress>, OrchestratorError> {
        self.orchestrator.phase_progress()
    }

    /// Fails with [`OrchestratorError::AlreadyRunning`] while a run is active.
    pub fn force_restart(&self, from: Phase) -> Result<(), OrchestratorError> {
        self.orchestrator.force_restart(from)
    }
}
