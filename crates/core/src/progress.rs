// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-phase progress record.
//!
//! The record is a cache of what the store already knows. Resume decisions
//! are made from store contents, and the record is rewritten to match.

use crate::id::JobId;
use crate::phase::{Phase, PhaseStatus};
use serde::{Deserialize, Serialize};

/// Progress of one `(job, phase)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseProgress {
    pub job: JobId,
    pub phase: Phase,
    pub status: PhaseStatus,
    /// Items handed to the dispatcher, retries included.
    pub attempted: u64,
    pub succeeded: u64,
    pub failed: u64,
    /// Waves committed so far.
    pub waves: u64,
    pub updated_at_ms: u64,
}

impl PhaseProgress {
    pub fn new(job: JobId, phase: Phase, now_ms: u64) -> Self {
        Self {
            job,
            phase,
            status: PhaseStatus::NotStarted,
            attempted: 0,
            succeeded: 0,
            failed: 0,
            waves: 0,
            updated_at_ms: now_ms,
        }
    }

    /// Fold one committed wave into the counters.
    pub fn record_wave(&mut self, attempted: u64, succeeded: u64, failed: u64, now_ms: u64) {
        self.status = PhaseStatus::InProgress;
        self.attempted += attempted;
        self.succeeded += succeeded;
        self.failed += failed;
        self.waves += 1;
        self.updated_at_ms = now_ms;
    }

    pub fn complete(&mut self, now_ms: u64) {
        self.status = PhaseStatus::Completed;
        self.updated_at_ms = now_ms;
    }
}

crate::builder! {
    pub struct PhaseProgressBuilder => PhaseProgress {
        into {
            job: JobId = "test-job",
        }
        set {
            phase: Phase = Phase::LinkDiscovery,
            status: PhaseStatus = PhaseStatus::NotStarted,
            attempted: u64 = 0,
            succeeded: u64 = 0,
            failed: u64 = 0,
            waves: u64 = 0,
            updated_at_ms: u64 = 1_000_000,
        }
    }
}
