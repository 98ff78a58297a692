//! Shared imports and fixtures for pipeline scenarios.

pub use pc_core::test_support::work_items;
pub use pc_core::{
    FakeClock, FakeSleeper, Phase, PhaseProgressBuilder, PhaseStatus, TaskError, WorkItem,
};
pub use pc_engine::health::ActivityGauge;
pub use pc_engine::test_support::{ScriptedStages, SwitchGate, TestPipeline};
pub use pc_engine::{
    BreakerConfig, BreakerRegistry, BreakerState, DispatchConfig, DispatchError, Dispatcher,
    OrchestratorConfig, OrchestratorError, ResumeState, RunOutcome,
};
pub use pc_storage::{
    CheckpointStore, FileCheckpointStore, FileStore, MemoryCheckpointStore, MemoryStore, Record,
    RecordStatus, Store, StoreError, Table,
};
pub use serde_json::json;
pub use tokio_util::sync::CancellationToken;
pub use std::sync::Arc;
pub use std::time::Duration;

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

pub fn config() -> OrchestratorConfig {
    OrchestratorConfig::default().job("crawl").retry_delay(Duration::from_secs(1))
}

/// Store that stops accepting inserts after a fixed number succeed,
/// standing in for a process killed mid-wave.
pub struct FlakyStore {
    inner: Arc<dyn Store>,
    inserts_left: AtomicUsize,
}

impl FlakyStore {
    pub fn new(inner: Arc<dyn Store>, inserts: usize) -> Self {
        Self { inner, inserts_left: AtomicUsize::new(inserts) }
    }
}

impl Store for FlakyStore {
    fn insert_if_absent(&self, table: Table, record: Record) -> Result<bool, StoreError> {
        let left = self.inserts_left.load(Ordering::SeqCst);
        if left == 0 {
            return Err(StoreError::Unavailable("connection lost".into()));
        }
        self.inserts_left.store(left - 1, Ordering::SeqCst);
        self.inner.insert_if_absent(table, record)
    }

    fn mark_pending(&self, table: Table, record: Record) -> Result<bool, StoreError> {
        self.inner.mark_pending(table, record)
    }

    fn get(&self, table: Table, key: &str) -> Result<Option<Record>, StoreError> {
        self.inner.get(table, key)
    }

    fn count_by_status(&self, table: Table, status: RecordStatus) -> Result<u64, StoreError> {
        self.inner.count_by_status(table, status)
    }

    fn read_pending(&self, table: Table, limit: usize) -> Result<Vec<Record>, StoreError> {
        self.inner.read_pending(table, limit)
    }

    fn records(
        &self,
        table: Table,
        status: Option<RecordStatus>,
    ) -> Result<Vec<Record>, StoreError> {
        self.inner.records(table, status)
    }

    fn terminal_keys(&self, table: Table) -> Result<HashSet<String>, StoreError> {
        self.inner.terminal_keys(table)
    }

    fn truncate(&self, table: Table) -> Result<(), StoreError> {
        self.inner.truncate(table)
    }
}

/// Keys that appear more than once.
pub fn duplicates(keys: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    keys.iter().filter(|k| !seen.insert(k.as_str())).cloned().collect()
}
