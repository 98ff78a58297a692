// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Key-addressable store contract and the in-memory implementation.
//!
//! Every table enforces uniqueness on the record key. Once a key holds a
//! terminal record (`Done` or `Failed`) further inserts for it are no-ops,
//! which is what makes re-submitting items across resumed runs safe.

use crate::record::{Record, RecordStatus, Table};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use thiserror::Error;

/// Errors that can occur in store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Persistent output of the pipeline phases.
pub trait Store: Send + Sync {
    /// Write `record` unless the key already holds a terminal record.
    ///
    /// A pending record for the same key is replaced. Returns whether the
    /// record was written.
    fn insert_if_absent(&self, table: Table, record: Record) -> Result<bool, StoreError>;

    /// Record a retryable failure. No-op when the key is already terminal.
    fn mark_pending(&self, table: Table, record: Record) -> Result<bool, StoreError>;

    fn get(&self, table: Table, key: &str) -> Result<Option<Record>, StoreError>;

    fn count_by_status(&self, table: Table, status: RecordStatus) -> Result<u64, StoreError>;

    /// Up to `limit` pending records, least recently updated first.
    fn read_pending(&self, table: Table, limit: usize) -> Result<Vec<Record>, StoreError>;

    /// All records of a table ordered by key, optionally filtered by status.
    fn records(&self, table: Table, status: Option<RecordStatus>)
        -> Result<Vec<Record>, StoreError>;

    /// Keys holding a `Done` or `Failed` record.
    fn terminal_keys(&self, table: Table) -> Result<HashSet<String>, StoreError>;

    /// Remove every record of a table.
    fn truncate(&self, table: Table) -> Result<(), StoreError>;
}

/// Materialized table contents shared by the store implementations.
#[derive(Debug, Default)]
pub(crate) struct Tables {
    tables: HashMap<Table, BTreeMap<String, Record>>,
}

impl Tables {
    /// Whether an insert of `record` would be applied.
    pub(crate) fn accepts(&self, table: Table, key: &str) -> bool {
        !self
            .tables
            .get(&table)
            .and_then(|rows| rows.get(key))
            .is_some_and(|existing| existing.status.is_terminal())
    }

    pub(crate) fn put(&mut self, table: Table, record: Record) {
        self.tables.entry(table).or_default().insert(record.key.clone(), record);
    }

    pub(crate) fn get(&self, table: Table, key: &str) -> Option<Record> {
        self.tables.get(&table)?.get(key).cloned()
    }

    pub(crate) fn count(&self, table: Table, status: RecordStatus) -> u64 {
        self.rows(table).filter(|r| r.status == status).count() as u64
    }

    pub(crate) fn pending(&self, table: Table, limit: usize) -> Vec<Record> {
        let mut pending: Vec<Record> =
            self.rows(table).filter(|r| r.status == RecordStatus::Pending).cloned().collect();
        pending.sort_by(|a, b| {
            a.updated_at_ms.cmp(&b.updated_at_ms).then_with(|| a.key.cmp(&b.key))
        });
        pending.truncate(limit);
        pending
    }

    pub(crate) fn records(&self, table: Table, status: Option<RecordStatus>) -> Vec<Record> {
        self.rows(table).filter(|r| status.map_or(true, |s| r.status == s)).cloned().collect()
    }

    pub(crate) fn terminal_keys(&self, table: Table) -> HashSet<String> {
        self.rows(table).filter(|r| r.status.is_terminal()).map(|r| r.key.clone()).collect()
    }

    pub(crate) fn clear(&mut self, table: Table) {
        self.tables.remove(&table);
    }

    fn rows(&self, table: Table) -> impl Iterator<Item = &Record> {
        self.tables.get(&table).into_iter().flat_map(|rows| rows.values())
    }
}

/// Volatile store for tests and embedders without a database.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn insert_if_absent(&self, table: Table, record: Record) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock();
        if !tables.accepts(table, &record.key) {
            return Ok(false);
        }
        tables.put(table, record);
        Ok(true)
    }

    fn mark_pending(&self, table: Table, mut record: Record) -> Result<bool, StoreError> {
        record.status = RecordStatus::Pending;
        self.insert_if_absent(table, record)
    }

    fn get(&self, table: Table, key: &str) -> Result<Option<Record>, StoreError> {
        Ok(self.tables.lock().get(table, key))
    }

    fn count_by_status(&self, table: Table, status: RecordStatus) -> Result<u64, StoreError> {
        Ok(self.tables.lock().count(table, status))
    }

    fn read_pending(&self, table: Table, limit: usize) -> Result<Vec<Record>, StoreError> {
        Ok(self.tables.lock().pending(table, limit))
    }

    fn records(
        &self,
        table: Table,
        status: Option<RecordStatus>,
    ) -> Result<Vec<Record>, StoreError> {
        Ok(self.tables.lock().records(table, status))
    }

    fn terminal_keys(&self, table: Table) -> Result<HashSet<String>, StoreError> {
        Ok(self.tables.lock().terminal_keys(table))
    }

    fn truncate(&self, table: Table) -> Result<(), StoreError> {
        self.tables.lock().clear(table);
        Ok(())
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
