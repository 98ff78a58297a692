// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use pc_core::{Phase, TaskError};
use pc_storage::{CheckpointError, StoreError};
use thiserror::Error;

/// Failures that abort a run.
///
/// Individual item failures never surface here; they are recorded in the
/// store and retried or marked failed.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),
    #[error("phase {phase} aborted: worker unhealthy for {waves} consecutive waves")]
    ResourceExhausted { phase: Phase, waves: u32 },
    #[error("a run or restart is already in progress")]
    AlreadyRunning,
    #[error("seed discovery failed: {0}")]
    Seed(TaskError),
    #[error("engine setup failed: {0}")]
    Setup(String),
}
