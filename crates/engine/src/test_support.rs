// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake collaborators and a wired orchestrator for tests.
//!
//! Gated behind `#[cfg(any(test, feature = "test-support"))]`.

use crate::breaker::BreakerRegistry;
use crate::config::{BreakerConfig, DispatchConfig, OrchestratorConfig};
use crate::dispatch::Dispatcher;
use crate::export::{ExportRow, ExportSummary, Exporter};
use crate::health::{ActivityGauge, HealthGate};
use crate::orchestrator::Orchestrator;
use crate::stages::{ExtractKind, Extractor, Fetcher, PipelineStages};
use async_trait::async_trait;
use chrono::Utc;
use pc_core::{FakeClock, FakeSleeper, Phase, TaskError, WorkItem};
use pc_storage::{CheckpointStore, MemoryCheckpointStore, MemoryStore, Record, Store};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

// ── Collaborator fakes ──────────────────────────────────────────────────

/// Fetcher serving canned pages. Unknown URLs fail transiently.
#[derive(Default)]
pub struct FakeFetcher {
    pages: Mutex<HashMap<String, Result<String, TaskError>>>,
    calls: Mutex<Vec<String>>,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(self, url: &str, content: impl Into<String>) -> Self {
        self.pages.lock().insert(url.to_string(), Ok(content.into()));
        self
    }

    pub fn json_page(self, url: &str, content: Value) -> Self {
        self.page(url, content.to_string())
    }

    pub fn failing(self, url: &str, error: TaskError) -> Self {
        self.pages.lock().insert(url.to_string(), Err(error));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl Fetcher for FakeFetcher {
    async fn fetch(&self, url: &str) -> Result<String, TaskError> {
        self.calls.lock().push(url.to_string());
        self.pages
            .lock()
            .get(url)
            .cloned()
            .unwrap_or_else(|| Err(TaskError::transient(format!("404 {url}"))))
    }
}

/// Extractor for pages that are JSON documents: returns the document as is.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonExtractor;

impl Extractor for JsonExtractor {
    fn extract(&self, kind: ExtractKind, content: &str) -> Result<Value, TaskError> {
        serde_json::from_str(content)
            .map_err(|e| TaskError::expected(format!("no {kind} in page: {e}")))
    }
}

/// Exporter collecting rows in memory.
#[derive(Default)]
pub struct MemoryExporter {
    rows: Mutex<Vec<ExportRow>>,
    exports: AtomicUsize,
}

impl MemoryExporter {
    pub fn rows(&self) -> Vec<ExportRow> {
        self.rows.lock().clone()
    }

    pub fn exports(&self) -> usize {
        self.exports.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Exporter for MemoryExporter {
    async fn export(&self, rows: &[ExportRow]) -> Result<ExportSummary, TaskError> {
        *self.rows.lock() = rows.to_vec();
        self.exports.fetch_add(1, Ordering::SeqCst);
        Ok(ExportSummary { rows: rows.len(), location: "memory".into(), exported_at: Utc::now() })
    }
}

/// Health gate flipped by the test.
#[derive(Debug)]
pub struct SwitchGate(AtomicBool);

impl SwitchGate {
    pub fn healthy() -> Arc<Self> {
        Arc::new(Self(AtomicBool::new(true)))
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.0.store(healthy, Ordering::SeqCst);
    }
}

impl HealthGate for SwitchGate {
    fn is_healthy(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ── Scripted stages ─────────────────────────────────────────────────────

/// Stages with no I/O: every item succeeds unless told to fail.
///
/// Phase 1 fans each seed out into `fan_out` items keyed `<seed>/<n>`;
/// later phases map each record to one item with the same key.
pub struct ScriptedStages {
    seeds: Vec<WorkItem>,
    fan_out: usize,
    failures: Mutex<HashMap<(Phase, String), (usize, TaskError)>>,
    calls: Mutex<Vec<(Phase, String)>>,
    discoveries: AtomicUsize,
    cancel_after: Mutex<Option<(usize, CancellationToken)>>,
}

impl ScriptedStages {
    pub fn new(seeds: Vec<WorkItem>) -> Self {
        Self {
            seeds,
            fan_out: 1,
            failures: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            discoveries: AtomicUsize::new(0),
            cancel_after: Mutex::new(None),
        }
    }

    pub fn fan_out(mut self, n: usize) -> Self {
        self.fan_out = n;
        self
    }

    /// Fail the next `times` runs of `key` in `phase` with `error`.
    pub fn fail(&self, phase: Phase, key: &str, times: usize, error: TaskError) {
        self.failures.lock().insert((phase, key.to_string()), (times, error));
    }

    /// Cancel `token` once `calls` items have started.
    pub fn cancel_after(&self, calls: usize, token: CancellationToken) {
        *self.cancel_after.lock() = Some((calls, token));
    }

    pub fn calls(&self) -> Vec<(Phase, String)> {
        self.calls.lock().clone()
    }

    /// Keys run in `phase`, in call order.
    pub fn calls_for(&self, phase: Phase) -> Vec<String> {
        self.calls.lock().iter().filter(|(p, _)| *p == phase).map(|(_, k)| k.clone()).collect()
    }

    pub fn discoveries(&self) -> usize {
        self.discoveries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PipelineStages for ScriptedStages {
    async fn discover_seeds(&self) -> Result<Vec<WorkItem>, TaskError> {
        self.discoveries.fetch_add(1, Ordering::SeqCst);
        Ok(self.seeds.clone())
    }

    async fn run(&self, phase: Phase, item: WorkItem) -> Result<Value, TaskError> {
        let started = {
            let mut calls = self.calls.lock();
            calls.push((phase, item.key.clone()));
            calls.len()
        };
        if let Some((limit, token)) = self.cancel_after.lock().as_ref() {
            if started >= *limit {
                token.cancel();
            }
        }

        if let Some((remaining, error)) = self.failures.lock().get_mut(&(phase, item.key.clone())) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(error.clone());
            }
        }
        Ok(json!({ "phase": phase.number(), "key": item.key }))
    }

    fn follow_ups(&self, phase: Phase, record: &Record) -> Vec<WorkItem> {
        match phase {
            Phase::LinkDiscovery => (0..self.fan_out)
                .map(|n| {
                    let key = format!("{}/{n}", record.key);
                    WorkItem::new(key.clone(), record.resource.clone(), json!({ "url": key }))
                })
                .collect(),
            Phase::PageFetch | Phase::Extraction | Phase::FollowUpFetch => {
                vec![WorkItem::new(record.key.clone(), record.resource.clone(), record.payload.clone())]
            }
            Phase::SecondaryExtraction | Phase::Export => Vec::new(),
        }
    }
}

// ── Wired orchestrator ──────────────────────────────────────────────────

/// An orchestrator over in-memory storage and fake time.
pub struct TestPipeline {
    pub orchestrator: Orchestrator<FakeClock, FakeSleeper>,
    pub breakers: Arc<BreakerRegistry<FakeClock>>,
    pub store: Arc<dyn Store>,
    pub checkpoints: Arc<dyn CheckpointStore>,
    pub stages: Arc<ScriptedStages>,
    pub gate: Arc<SwitchGate>,
    pub clock: FakeClock,
    pub sleeper: FakeSleeper,
    pub shutdown: CancellationToken,
}

impl TestPipeline {
    pub fn new(stages: ScriptedStages, config: OrchestratorConfig) -> Self {
        Self::with_parts(
            Arc::new(stages),
            config,
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryCheckpointStore::new()),
        )
    }

    /// A pipeline over existing storage, as after a process restart.
    pub fn with_parts(
        stages: Arc<ScriptedStages>,
        config: OrchestratorConfig,
        store: Arc<dyn Store>,
        checkpoints: Arc<dyn CheckpointStore>,
    ) -> Self {
        Self::with_configs(
            stages,
            config,
            DispatchConfig::default(),
            BreakerConfig::default(),
            store,
            checkpoints,
        )
    }

    pub fn with_configs(
        stages: Arc<ScriptedStages>,
        config: OrchestratorConfig,
        dispatch: DispatchConfig,
        breaker: BreakerConfig,
        store: Arc<dyn Store>,
        checkpoints: Arc<dyn CheckpointStore>,
    ) -> Self {
        let clock = FakeClock::new();
        let sleeper = FakeSleeper::new(clock.clone());
        let shutdown = CancellationToken::new();
        let gate = SwitchGate::healthy();
        let breakers = Arc::new(BreakerRegistry::new(breaker, clock.clone()));
        let dispatcher = Arc::new(Dispatcher::new(
            dispatch,
            Arc::clone(&breakers),
            gate.clone(),
            ActivityGauge::new(),
            sleeper.clone(),
            shutdown.clone(),
        ));
        let orchestrator = Orchestrator::new(
            config,
            clock.clone(),
            sleeper.clone(),
            Arc::clone(&store),
            Arc::clone(&checkpoints),
            stages.clone(),
            dispatcher,
        );
        Self { orchestrator, breakers, store, checkpoints, stages, gate, clock, sleeper, shutdown }
    }

    /// Same storage and stages, fresh orchestrator: a simulated restart.
    pub fn restart(&self, config: OrchestratorConfig) -> Self {
        Self::with_parts(
            Arc::clone(&self.stages),
            config,
            Arc::clone(&self.store),
            Arc::clone(&self.checkpoints),
        )
    }
}
