// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! pc-engine: Resilience and orchestration for the pcrawl pipeline
//!
//! Circuit breakers isolate failing resources, the health monitor gates
//! admission on local resource pressure, the dispatcher runs items through
//! both, and the orchestrator sequences phases with resumable checkpoints.

pub mod admin;
pub mod breaker;
pub mod config;
pub mod dispatch;
mod engine;
pub mod env;
mod error;
pub mod export;
pub mod health;
pub mod logging;
pub mod orchestrator;
pub mod stages;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use admin::Admin;
pub use breaker::{BreakerError, BreakerRegistry, BreakerState, BreakerStatus, CircuitBreaker};
pub use config::{BreakerConfig, DispatchConfig, EngineConfig, HealthConfig, OrchestratorConfig};
pub use dispatch::{BatchResult, DispatchError, Dispatcher, FailedItem};
pub use engine::{Engine, EngineParts};
pub use error::OrchestratorError;
pub use export::{ExportRow, ExportSummary, Exporter, JsonlExporter};
pub use health::{BreakerView, HealthGate, HealthMonitor, HealthSnapshot, HealthSummary, Verdict};
pub use orchestrator::{
    Orchestrator, PhasePlan, PhaseSummary, ResumeState, RunOutcome, RunReport,
};
pub use stages::{CrawlStages, ExtractKind, Extractor, Fetcher, PipelineStages};
