// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::breaker::BreakerState;
use crate::config::HealthConfig;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

/// Overall verdict of a health check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Healthy,
    /// One non-memory threshold exceeded.
    Degraded,
    Unhealthy,
}

pc_core::simple_display! {
    Verdict {
        Healthy => "healthy",
        Degraded => "degraded",
        Unhealthy => "unhealthy",
    }
}

/// A threshold a snapshot exceeded, or why it could not be taken.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Violation {
    Memory,
    Cpu,
    ActiveTasks,
    Handles,
    Contexts,
    SampleFailed(String),
}

pc_core::simple_display! {
    Violation {
        Memory => "memory",
        Cpu => "cpu",
        ActiveTasks => "active_tasks",
        Handles => "handles",
        Contexts => "contexts",
        SampleFailed(..) => "sample_failed",
    }
}

/// Raw measurements before a verdict is applied.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Metrics {
    pub memory_mb: f64,
    pub cpu_percent: f32,
    pub active_tasks: usize,
    pub handles: usize,
    pub contexts: usize,
}

/// Immutable health sample.
#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub memory_mb: f64,
    pub cpu_percent: f32,
    pub active_tasks: usize,
    pub handles: usize,
    pub contexts: usize,
    pub verdict: Verdict,
    pub reasons: Vec<Violation>,
    pub worker_id: String,
    /// Breaker state per resource at sampling time. Informational only.
    pub breakers: BTreeMap<String, BreakerState>,
    #[serde(skip)]
    pub captured_at: Instant,
    pub captured_at_ms: u64,
}

impl HealthSnapshot {
    /// Apply the thresholds in `config` to `metrics`.
    pub fn evaluate(metrics: Metrics, config: &HealthConfig, at: Instant, at_ms: u64) -> Self {
        let mut reasons = Vec::new();
        if metrics.memory_mb > config.max_memory_mb {
            reasons.push(Violation::Memory);
        }
        if metrics.cpu_percent > config.max_cpu_percent {
            reasons.push(Violation::Cpu);
        }
        if metrics.active_tasks > config.max_active_tasks {
            reasons.push(Violation::ActiveTasks);
        }
        if metrics.handles > config.max_handles {
            reasons.push(Violation::Handles);
        }
        if metrics.contexts > config.max_contexts {
            reasons.push(Violation::Contexts);
        }

        let verdict = match reasons.as_slice() {
            [] => Verdict::Healthy,
            [Violation::Memory] => Verdict::Unhealthy,
            [_] => Verdict::Degraded,
            _ => Verdict::Unhealthy,
        };

        Self {
            memory_mb: metrics.memory_mb,
            cpu_percent: metrics.cpu_percent,
            active_tasks: metrics.active_tasks,
            handles: metrics.handles,
            contexts: metrics.contexts,
            verdict,
            reasons,
            worker_id: String::new(),
            breakers: BTreeMap::new(),
            captured_at: at,
            captured_at_ms: at_ms,
        }
    }

    /// Snapshot for a sample that could not be taken.
    pub fn failed(reason: impl Into<String>, at: Instant, at_ms: u64) -> Self {
        Self {
            memory_mb: 0.0,
            cpu_percent: 0.0,
            active_tasks: 0,
            handles: 0,
            contexts: 0,
            verdict: Verdict::Unhealthy,
            reasons: vec![Violation::SampleFailed(reason.into())],
            worker_id: String::new(),
            breakers: BTreeMap::new(),
            captured_at: at,
            captured_at_ms: at_ms,
        }
    }
}

/// Recent history with aggregates over the latest checks.
#[derive(Debug, Clone, Serialize)]
pub struct HealthSummary {
    pub worker_id: String,
    pub latest: Option<Arc<HealthSnapshot>>,
    pub history: Vec<Arc<HealthSnapshot>>,
    /// Checks performed since the monitor was created.
    pub total_checks: u64,
    /// Unhealthy snapshots in the retained history.
    pub unhealthy_checks: usize,
    pub avg_memory_mb: f64,
    pub avg_cpu_percent: f64,
    /// Resources whose breaker was not closed at the latest check.
    pub open_breakers: Vec<String>,
}

/// Checks averaged by [`HealthSummary`].
pub const SUMMARY_WINDOW: usize = 10;

impl HealthSummary {
    pub(crate) fn build(
        worker_id: impl Into<String>,
        history: Vec<Arc<HealthSnapshot>>,
        total_checks: u64,
    ) -> Self {
        let recent: Vec<_> = history.iter().rev().take(SUMMARY_WINDOW).collect();
        let n = recent.len().max(1) as f64;
        let avg_memory_mb = recent.iter().map(|s| s.memory_mb).sum::<f64>() / n;
        let avg_cpu_percent = recent.iter().map(|s| f64::from(s.cpu_percent)).sum::<f64>() / n;
        let unhealthy_checks = history.iter().filter(|s| s.verdict == Verdict::Unhealthy).count();
        let open_breakers = history
            .last()
            .map(|s| {
                s.breakers
                    .iter()
                    .filter(|(_, state)| **state != BreakerState::Closed)
                    .map(|(name, _)| name.clone())
                    .collect()
            })
            .unwrap_or_default();

        Self {
            worker_id: worker_id.into(),
            latest: history.last().cloned(),
            history,
            total_checks,
            unhealthy_checks,
            avg_memory_mb,
            avg_cpu_percent,
            open_breakers,
        }
    }
}

#[cfg(test)]
#[path = "snapshot_tests.rs"]
mod tests;
