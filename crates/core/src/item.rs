// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Work items handed from the orchestrator to the dispatcher.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One unit of work within a phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    /// Natural key, unique within the phase's output table (usually a URL).
    pub key: String,
    /// Breaker resource the item's external call is guarded by.
    pub resource: String,
    pub payload: Value,
    /// Failed attempts so far, carried across retry waves and restarts.
    #[serde(default)]
    pub attempts: u32,
}

impl WorkItem {
    pub fn new(key: impl Into<String>, resource: impl Into<String>, payload: Value) -> Self {
        Self { key: key.into(), resource: resource.into(), payload, attempts: 0 }
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    /// String field from the payload, if present.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.payload.get(name).and_then(Value::as_str)
    }
}
