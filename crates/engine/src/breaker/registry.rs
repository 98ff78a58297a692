// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::{BreakerError, BreakerState, BreakerStatus, CircuitBreaker};
use crate::config::BreakerConfig;
use pc_core::{Clock, SystemClock};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Owns one breaker per resource name, created lazily on first use.
///
/// Lookups take the map's read lock; only creating a breaker takes the write
/// lock, so calls for different names never contend.
pub struct BreakerRegistry<C: Clock = SystemClock> {
    clock: C,
    defaults: BreakerConfig,
    overrides: HashMap<String, BreakerConfig>,
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker<C>>>>,
}

impl<C: Clock> BreakerRegistry<C> {
    pub fn new(defaults: BreakerConfig, clock: C) -> Self {
        Self { clock, defaults, overrides: HashMap::new(), breakers: RwLock::new(HashMap::new()) }
    }

    /// Use `config` instead of the defaults for breakers named `name`.
    pub fn with_override(mut self, name: impl Into<String>, config: BreakerConfig) -> Self {
        self.overrides.insert(name.into(), config);
        self
    }

    fn config_for(&self, name: &str) -> BreakerConfig {
        self.overrides.get(name).copied().unwrap_or(self.defaults)
    }

    /// The breaker for `name`, creating it if needed.
    pub fn breaker(&self, name: &str) -> Arc<CircuitBreaker<C>> {
        if let Some(existing) = self.breakers.read().get(name) {
            return Arc::clone(existing);
        }
        let mut breakers = self.breakers.write();
        // Another caller may have created it between the two locks
        Arc::clone(breakers.entry(name.to_string()).or_insert_with(|| {
            tracing::debug!(breaker = %name, "creating breaker");
            Arc::new(CircuitBreaker::new(name, self.config_for(name), self.clock.clone()))
        }))
    }

    pub async fn execute<T, E, F, Fut>(&self, name: &str, op: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.breaker(name).execute(op).await
    }

    pub async fn execute_with<T, E, P, F, Fut>(
        &self,
        name: &str,
        is_expected: P,
        op: F,
    ) -> Result<T, BreakerError<E>>
    where
        P: Fn(&E) -> bool,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.breaker(name).execute_with(is_expected, op).await
    }

    /// State of `name`. Unknown names report a fresh closed breaker and are
    /// not created.
    pub fn get_state(&self, name: &str) -> BreakerStatus {
        if let Some(existing) = self.breakers.read().get(name) {
            return existing.status();
        }
        let config = self.config_for(name);
        BreakerStatus {
            name: name.to_string(),
            state: BreakerState::Closed,
            failures: 0,
            failure_threshold: config.failure_threshold,
            recovery_timeout_ms: config.recovery_timeout.as_millis() as u64,
            last_failure_ms: None,
        }
    }

    /// Time before the open breaker for `name` admits a trial. Unknown names
    /// are never open.
    pub fn retry_in(&self, name: &str) -> Option<Duration> {
        self.breakers.read().get(name).and_then(|b| b.retry_in())
    }

    /// Force `name` closed, creating it if unknown.
    pub fn reset(&self, name: &str) {
        self.breaker(name).reset();
    }

    /// Every known breaker, ordered by name.
    pub fn list_states(&self) -> BTreeMap<String, BreakerStatus> {
        self.breakers.read().iter().map(|(name, b)| (name.clone(), b.status())).collect()
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
