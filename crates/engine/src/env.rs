// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the engine crate.

use std::path::PathBuf;
use std::time::Duration;

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.trim().parse::<T>().ok())
}

fn duration_ms(name: &str) -> Option<Duration> {
    parse_var::<u64>(name).map(Duration::from_millis)
}

/// Resolve state directory: PC_STATE_DIR > XDG_STATE_HOME/pcrawl > ~/.local/state/pcrawl
pub fn state_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var("PC_STATE_DIR") {
        return Some(PathBuf::from(dir));
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Some(PathBuf::from(xdg).join("pcrawl"));
    }
    dirs::home_dir().map(|home| home.join(".local/state/pcrawl"))
}

/// Job name used for checkpoint paths (default `default`).
pub fn job_name() -> String {
    std::env::var("PC_JOB").ok().filter(|s| !s.is_empty()).unwrap_or_else(|| "default".into())
}

/// Consecutive failures before a breaker opens.
pub fn breaker_threshold() -> Option<u32> {
    parse_var("PC_BREAKER_THRESHOLD")
}

pub fn breaker_recovery() -> Option<Duration> {
    duration_ms("PC_BREAKER_RECOVERY_MS")
}

pub fn health_cache_interval() -> Option<Duration> {
    duration_ms("PC_HEALTH_CACHE_MS")
}

pub fn max_memory_mb() -> Option<f64> {
    parse_var("PC_MAX_MEMORY_MB")
}

pub fn max_cpu_percent() -> Option<f32> {
    parse_var("PC_MAX_CPU_PERCENT")
}

pub fn max_handles() -> Option<usize> {
    parse_var("PC_MAX_HANDLES")
}

pub fn max_contexts() -> Option<usize> {
    parse_var("PC_MAX_CONTEXTS")
}

pub fn max_active_tasks() -> Option<usize> {
    parse_var("PC_MAX_ACTIVE_TASKS")
}

/// Identity reported in health snapshots.
pub fn worker_id() -> Option<String> {
    std::env::var("PC_WORKER_ID").ok().filter(|s| !s.is_empty())
}

/// Worker pool size.
pub fn workers() -> Option<usize> {
    parse_var::<usize>("PC_WORKERS").filter(|n| *n > 0)
}

pub fn item_timeout() -> Option<Duration> {
    duration_ms("PC_ITEM_TIMEOUT_MS")
}

pub fn admission_poll() -> Option<Duration> {
    duration_ms("PC_ADMISSION_POLL_MS")
}

pub fn admission_max_wait() -> Option<Duration> {
    duration_ms("PC_ADMISSION_MAX_WAIT_MS")
}

pub fn wave_size() -> Option<usize> {
    parse_var::<usize>("PC_WAVE_SIZE").filter(|n| *n > 0)
}

pub fn max_retries() -> Option<u32> {
    parse_var("PC_MAX_RETRIES")
}

pub fn retry_delay() -> Option<Duration> {
    duration_ms("PC_RETRY_DELAY_MS")
}

/// Growth factor between retry delays; values below 1 are ignored.
pub fn retry_backoff() -> Option<f64> {
    parse_var::<f64>("PC_RETRY_BACKOFF").filter(|f| f.is_finite() && *f >= 1.0)
}

pub fn max_retry_delay() -> Option<Duration> {
    duration_ms("PC_MAX_RETRY_DELAY_MS")
}

pub fn max_unhealthy_waves() -> Option<u32> {
    parse_var::<u32>("PC_MAX_UNHEALTHY_WAVES").filter(|n| *n > 0)
}

/// Default filter directive when `RUST_LOG` is unset.
pub fn log_level() -> String {
    std::env::var("PC_LOG").ok().filter(|s| !s.is_empty()).unwrap_or_else(|| "info".into())
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
