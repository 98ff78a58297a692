// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sources of the measurements behind a health snapshot.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

/// Memory and CPU of the current process.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProcessSample {
    pub memory_mb: f64,
    pub cpu_percent: f32,
}

/// Reads process-level resource usage.
pub trait ResourceSampler: Send {
    fn sample(&mut self) -> Result<ProcessSample, String>;
}

/// Samples this process through `sysinfo`.
///
/// CPU usage is computed between consecutive refreshes, so the first sample
/// after construction reports 0%.
pub struct SysinfoSampler {
    sys: System,
    pid: Pid,
}

impl SysinfoSampler {
    pub fn new() -> Result<Self, String> {
        let pid = sysinfo::get_current_pid().map_err(|e| e.to_string())?;
        Ok(Self { sys: System::new(), pid })
    }
}

impl ResourceSampler for SysinfoSampler {
    fn sample(&mut self) -> Result<ProcessSample, String> {
        self.sys.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[self.pid]),
            true,
            ProcessRefreshKind::new().with_cpu().with_memory(),
        );
        let process =
            self.sys.process(self.pid).ok_or_else(|| format!("process {} not found", self.pid))?;
        Ok(ProcessSample {
            memory_mb: process.memory() as f64 / (1024.0 * 1024.0),
            cpu_percent: process.cpu_usage(),
        })
    }
}

/// Live browser-automation resources owned by the fetch engine.
pub trait AutomationPool: Send + Sync {
    fn live_handles(&self) -> Result<usize, String>;
    fn live_contexts(&self) -> Result<usize, String>;
    /// Ask the pool to close idle handles. Must return without waiting.
    fn release_idle(&self);
}

/// Pool for deployments without browser automation.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAutomation;

impl AutomationPool for NoAutomation {
    fn live_handles(&self) -> Result<usize, String> {
        Ok(0)
    }

    fn live_contexts(&self) -> Result<usize, String> {
        Ok(0)
    }

    fn release_idle(&self) {}
}

/// Count of work items currently executing, shared with the dispatcher.
#[derive(Debug, Clone, Default)]
pub struct ActivityGauge(Arc<AtomicUsize>);

impl ActivityGauge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one active task until the guard drops.
    pub fn enter(&self) -> ActivityGuard {
        self.0.fetch_add(1, Ordering::SeqCst);
        ActivityGuard(Arc::clone(&self.0))
    }

    pub fn current(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct ActivityGuard(Arc<AtomicUsize>);

impl Drop for ActivityGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}
