// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! pc-storage: Phase output store and checkpoint persistence

mod checkpoint;
mod file;
mod record;
mod store;

pub use checkpoint::{
    CheckpointError, CheckpointStore, FileCheckpointStore, MemoryCheckpointStore,
    PhaseCheckpoint, SeedCheckpoint, CURRENT_CHECKPOINT_VERSION,
};
pub use file::FileStore;
pub use record::{Record, RecordStatus, Table};
pub use store::{MemoryStore, Store, StoreError};
