// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine tuning knobs with defaults and environment overrides.

use crate::env;
use pc_core::JobId;
use std::path::PathBuf;
use std::time::Duration;

/// Circuit breaker parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BreakerConfig {
    /// Consecutive failures that open the breaker.
    pub failure_threshold: u32,
    /// Time an open breaker waits before admitting a trial call.
    pub recovery_timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self { failure_threshold: 5, recovery_timeout: Duration::from_secs(60) }
    }
}

impl BreakerConfig {
    pc_core::setters! {
        set {
            failure_threshold: u32,
            recovery_timeout: Duration,
        }
    }
}

/// Health monitor thresholds and cache behaviour.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthConfig {
    pub cache_interval: Duration,
    pub history_capacity: usize,
    pub max_memory_mb: f64,
    pub max_cpu_percent: f32,
    pub max_handles: usize,
    pub max_contexts: usize,
    pub max_active_tasks: usize,
    /// Reported in snapshots; `worker_<pid>` when unset.
    pub worker_id: Option<String>,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            cache_interval: Duration::from_secs(5),
            history_capacity: 50,
            max_memory_mb: 1500.0,
            max_cpu_percent: 80.0,
            max_handles: 5,
            max_contexts: 8,
            max_active_tasks: 10,
            worker_id: None,
        }
    }
}

impl HealthConfig {
    pc_core::setters! {
        set {
            cache_interval: Duration,
            history_capacity: usize,
            max_memory_mb: f64,
            max_cpu_percent: f32,
            max_handles: usize,
            max_contexts: usize,
            max_active_tasks: usize,
        }
    }

    pub fn worker_id(mut self, id: impl Into<String>) -> Self {
        self.worker_id = Some(id.into());
        self
    }
}

/// Worker pool and admission control.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DispatchConfig {
    pub workers: usize,
    /// Deadline for each item's operation.
    pub item_timeout: Duration,
    /// Sleep between health re-checks while admission is blocked.
    pub admission_poll: Duration,
    /// Longest a chunk waits for a healthy verdict before backpressure.
    pub admission_max_wait: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            item_timeout: Duration::from_secs(120),
            admission_poll: Duration::from_secs(1),
            admission_max_wait: Duration::from_secs(60),
        }
    }
}

impl DispatchConfig {
    pc_core::setters! {
        set {
            workers: usize,
            item_timeout: Duration,
            admission_poll: Duration,
            admission_max_wait: Duration,
        }
    }
}

/// Phase sequencing and retry policy.
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorConfig {
    pub job: JobId,
    pub wave_size: usize,
    /// Retries after the first attempt before an item is marked failed.
    pub max_retries: u32,
    /// Delay before the first retry wave.
    pub retry_delay: Duration,
    /// Multiplier applied to the delay for each further attempt.
    pub retry_backoff: f64,
    pub max_retry_delay: Duration,
    /// Consecutive fully backpressured waves that abort the phase.
    pub max_unhealthy_waves: u32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            job: JobId::new("default"),
            wave_size: 50,
            max_retries: 2,
            retry_delay: Duration::from_secs(10),
            retry_backoff: 2.0,
            max_retry_delay: Duration::from_secs(300),
            max_unhealthy_waves: 3,
        }
    }
}

impl OrchestratorConfig {
    pc_core::setters! {
        into {
            job: JobId,
        }
        set {
            wave_size: usize,
            max_retries: u32,
            retry_delay: Duration,
            retry_backoff: f64,
            max_retry_delay: Duration,
            max_unhealthy_waves: u32,
        }
    }

    /// Wait before retrying an item that has failed `attempts` times:
    /// `retry_delay * retry_backoff^(attempts - 1)`, capped at `max_retry_delay`.
    pub fn retry_delay_for(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(32) as i32;
        let factor = self.retry_backoff.max(1.0).powi(exponent);
        let secs = (self.retry_delay.as_secs_f64() * factor).min(self.max_retry_delay.as_secs_f64());
        Duration::try_from_secs_f64(secs).unwrap_or(self.max_retry_delay)
    }
}

/// Everything the engine reads from the environment.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub breaker: BreakerConfig,
    pub health: HealthConfig,
    pub dispatch: DispatchConfig,
    pub orchestrator: OrchestratorConfig,
    pub state_dir: Option<PathBuf>,
}

impl EngineConfig {
    /// Defaults overridden by any `PC_*` variables that are set and valid.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Some(v) = env::breaker_threshold() {
            cfg.breaker.failure_threshold = v;
        }
        if let Some(v) = env::breaker_recovery() {
            cfg.breaker.recovery_timeout = v;
        }

        if let Some(v) = env::health_cache_interval() {
            cfg.health.cache_interval = v;
        }
        if let Some(v) = env::max_memory_mb() {
            cfg.health.max_memory_mb = v;
        }
        if let Some(v) = env::max_cpu_percent() {
            cfg.health.max_cpu_percent = v;
        }
        if let Some(v) = env::max_handles() {
            cfg.health.max_handles = v;
        }
        if let Some(v) = env::max_contexts() {
            cfg.health.max_contexts = v;
        }
        if let Some(v) = env::max_active_tasks() {
            cfg.health.max_active_tasks = v;
        }
        if let Some(v) = env::worker_id() {
            cfg.health.worker_id = Some(v);
        }

        if let Some(v) = env::workers() {
            cfg.dispatch.workers = v;
        }
        if let Some(v) = env::item_timeout() {
            cfg.dispatch.item_timeout = v;
        }
        if let Some(v) = env::admission_poll() {
            cfg.dispatch.admission_poll = v;
        }
        if let Some(v) = env::admission_max_wait() {
            cfg.dispatch.admission_max_wait = v;
        }

        cfg.orchestrator.job = JobId::new(env::job_name());
        if let Some(v) = env::wave_size() {
            cfg.orchestrator.wave_size = v;
        }
        if let Some(v) = env::max_retries() {
            cfg.orchestrator.max_retries = v;
        }
        if let Some(v) = env::retry_delay() {
            cfg.orchestrator.retry_delay = v;
        }
        if let Some(v) = env::retry_backoff() {
            cfg.orchestrator.retry_backoff = v;
        }
        if let Some(v) = env::max_retry_delay() {
            cfg.orchestrator.max_retry_delay = v;
        }
        if let Some(v) = env::max_unhealthy_waves() {
            cfg.orchestrator.max_unhealthy_waves = v;
        }

        cfg.state_dir = env::state_dir();
        cfg
    }

    /// Directory holding the store, checkpoints and logs.
    pub fn state_dir_or(&self, fallback: impl Into<PathBuf>) -> PathBuf {
        self.state_dir.clone().unwrap_or_else(|| fallback.into())
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
