// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker health monitor.
//!
//! Samples process memory and CPU, the dispatcher's active-task count, and
//! the automation pool's live handles and contexts. Snapshots are cached for
//! `cache_interval`; callers within that window share the same `Arc`.
//! Each snapshot also records the worker id and, when a [`BreakerView`] is
//! attached, every resource's breaker state. Neither affects the verdict.

mod sampler;
mod snapshot;

pub use sampler::{
    ActivityGauge, ActivityGuard, AutomationPool, NoAutomation, ProcessSample, ResourceSampler,
    SysinfoSampler,
};
pub use snapshot::{HealthSnapshot, HealthSummary, Metrics, Verdict, Violation, SUMMARY_WINDOW};

use crate::breaker::{BreakerRegistry, BreakerState};
use crate::config::HealthConfig;
use pc_core::{Clock, SystemClock};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Admission gate polled by the dispatcher.
pub trait HealthGate: Send + Sync {
    fn is_healthy(&self) -> bool;
}

/// Read-only view of breaker states reported with each snapshot.
pub trait BreakerView: Send + Sync {
    fn breaker_states(&self) -> BTreeMap<String, BreakerState>;
}

impl<C: Clock> BreakerView for BreakerRegistry<C> {
    fn breaker_states(&self) -> BTreeMap<String, BreakerState> {
        self.list_states().into_iter().map(|(name, status)| (name, status.state)).collect()
    }
}

/// `worker_<pid>`, used when no worker id is configured.
pub fn default_worker_id() -> String {
    format!("worker_{}", std::process::id())
}

pub struct HealthMonitor<C: Clock = SystemClock> {
    config: HealthConfig,
    worker_id: String,
    breakers: Option<Arc<dyn BreakerView>>,
    clock: C,
    sampler: Mutex<Box<dyn ResourceSampler>>,
    pool: Arc<dyn AutomationPool>,
    gauge: ActivityGauge,
    latest: RwLock<Option<Arc<HealthSnapshot>>>,
    history: Mutex<VecDeque<Arc<HealthSnapshot>>>,
    checks: AtomicU64,
}

impl<C: Clock> HealthMonitor<C> {
    pub fn new(
        config: HealthConfig,
        clock: C,
        sampler: Box<dyn ResourceSampler>,
        pool: Arc<dyn AutomationPool>,
        gauge: ActivityGauge,
    ) -> Self {
        let capacity = config.history_capacity;
        let worker_id = config.worker_id.clone().unwrap_or_else(default_worker_id);
        Self {
            config,
            worker_id,
            breakers: None,
            clock,
            sampler: Mutex::new(sampler),
            pool,
            gauge,
            latest: RwLock::new(None),
            history: Mutex::new(VecDeque::with_capacity(capacity)),
            checks: AtomicU64::new(0),
        }
    }

    /// Report `breakers` in every snapshot taken from now on.
    pub fn with_breakers(mut self, breakers: Arc<dyn BreakerView>) -> Self {
        self.breakers = Some(breakers);
        self
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    pub fn gauge(&self) -> &ActivityGauge {
        &self.gauge
    }

    fn cached(&self) -> Option<Arc<HealthSnapshot>> {
        let latest = self.latest.read();
        let snap = latest.as_ref()?;
        let age = self.clock.now().saturating_duration_since(snap.captured_at);
        (age < self.config.cache_interval).then(|| Arc::clone(snap))
    }

    /// Latest snapshot, resampling only when the cache is stale or `force`.
    pub fn check_health(&self, force: bool) -> Arc<HealthSnapshot> {
        if !force {
            if let Some(snap) = self.cached() {
                return snap;
            }
        }

        let mut sampler = self.sampler.lock();
        // A concurrent caller may have refreshed while we waited
        if !force {
            if let Some(snap) = self.cached() {
                return snap;
            }
        }

        let snap = Arc::new(self.sample(&mut **sampler));
        *self.latest.write() = Some(Arc::clone(&snap));
        {
            let mut history = self.history.lock();
            if history.len() >= self.config.history_capacity {
                history.pop_front();
            }
            if self.config.history_capacity > 0 {
                history.push_back(Arc::clone(&snap));
            }
        }
        self.checks.fetch_add(1, Ordering::Relaxed);
        drop(sampler);

        match snap.verdict {
            Verdict::Unhealthy => {
                let reasons: Vec<String> = snap.reasons.iter().map(ToString::to_string).collect();
                tracing::warn!(
                    worker = %snap.worker_id,
                    memory_mb = snap.memory_mb,
                    cpu = snap.cpu_percent,
                    active_tasks = snap.active_tasks,
                    handles = snap.handles,
                    reasons = ?reasons,
                    "worker unhealthy, releasing idle automation handles",
                );
                self.pool.release_idle();
            }
            Verdict::Degraded => {
                tracing::info!(reasons = ?snap.reasons, "worker degraded");
            }
            Verdict::Healthy => {}
        }
        snap
    }

    fn sample(&self, sampler: &mut dyn ResourceSampler) -> HealthSnapshot {
        let at = self.clock.now();
        let at_ms = self.clock.epoch_ms();
        let mut snap = match self.measure(sampler) {
            Ok(metrics) => HealthSnapshot::evaluate(metrics, &self.config, at, at_ms),
            Err(reason) => {
                tracing::warn!(worker = %self.worker_id, error = %reason, "health sample failed");
                HealthSnapshot::failed(reason, at, at_ms)
            }
        };
        snap.worker_id = self.worker_id.clone();
        if let Some(view) = &self.breakers {
            snap.breakers = view.breaker_states();
        }
        snap
    }

    fn measure(&self, sampler: &mut dyn ResourceSampler) -> Result<Metrics, String> {
        let process = sampler.sample()?;
        Ok(Metrics {
            memory_mb: process.memory_mb,
            cpu_percent: process.cpu_percent,
            active_tasks: self.gauge.current(),
            handles: self.pool.live_handles()?,
            contexts: self.pool.live_contexts()?,
        })
    }

    /// Most recent snapshot without sampling.
    pub fn latest(&self) -> Option<Arc<HealthSnapshot>> {
        self.latest.read().clone()
    }

    pub fn get_health_summary(&self) -> HealthSummary {
        let history: Vec<_> = self.history.lock().iter().cloned().collect();
        HealthSummary::build(&self.worker_id, history, self.checks.load(Ordering::Relaxed))
    }
}

impl<C: Clock> HealthGate for HealthMonitor<C> {
    /// Healthy or degraded, from the cached snapshot when fresh.
    fn is_healthy(&self) -> bool {
        self.check_health(false).verdict != Verdict::Unhealthy
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
