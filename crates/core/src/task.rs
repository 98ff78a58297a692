// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Errors raised by external collaborators (fetchers, extractors, exporters).

use std::time::Duration;
use thiserror::Error;

/// Failure of a single work item's external operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    /// Network error, bad status, or any failure worth counting against the
    /// resource.
    #[error("transient failure: {0}")]
    Transient(String),
    /// Per-item deadline exceeded.
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    /// Failure that says nothing about the resource's health (e.g. a page
    /// with no extractable content). Never trips a breaker.
    #[error("expected failure: {0}")]
    Expected(String),
}

impl TaskError {
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    pub fn expected(msg: impl Into<String>) -> Self {
        Self::Expected(msg.into())
    }

    /// Whether the breaker should ignore this error.
    pub fn is_expected(&self) -> bool {
        matches!(self, TaskError::Expected(_))
    }
}
