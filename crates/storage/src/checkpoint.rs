// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Checkpoint persistence: seed lists and per-phase progress records.
//!
//! Files live under `<dir>/<job>/`: `seeds.json` and `phase-<N>.json`.
//! Writes go to a temp file, are fsynced, and replace the previous version
//! by rename after rotating it into `.bak`, `.bak.2`, `.bak.3`. Loads fall
//! back to the newest readable backup.

use chrono::{DateTime, Utc};
use pc_core::{JobId, Phase, PhaseProgress, WorkItem};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Current checkpoint schema version
pub const CURRENT_CHECKPOINT_VERSION: u32 = 1;

const MAX_BAK_FILES: u32 = 3;

/// Errors that can occur in checkpoint operations
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported checkpoint version {found} (expected {CURRENT_CHECKPOINT_VERSION})")]
    Version { found: u32 },
}

/// Durable record of one phase's progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseCheckpoint {
    #[serde(rename = "v")]
    pub version: u32,
    pub progress: PhaseProgress,
    pub saved_at: DateTime<Utc>,
}

/// Seed list captured on the first run of a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedCheckpoint {
    #[serde(rename = "v")]
    pub version: u32,
    pub seeds: Vec<WorkItem>,
    pub saved_at: DateTime<Utc>,
}

/// Storage for the orchestrator's checkpoints.
pub trait CheckpointStore: Send + Sync {
    fn load_seeds(&self, job: &JobId) -> Result<Option<Vec<WorkItem>>, CheckpointError>;
    fn save_seeds(&self, job: &JobId, seeds: &[WorkItem]) -> Result<(), CheckpointError>;
    fn load_progress(
        &self,
        job: &JobId,
        phase: Phase,
    ) -> Result<Option<PhaseProgress>, CheckpointError>;
    fn save_progress(&self, progress: &PhaseProgress) -> Result<(), CheckpointError>;
    fn clear_progress(&self, job: &JobId, phase: Phase) -> Result<(), CheckpointError>;
}

/// File-backed [`CheckpointStore`].
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn job_dir(&self, job: &JobId) -> PathBuf {
        self.dir.join(job.as_str())
    }

    fn seeds_path(&self, job: &JobId) -> PathBuf {
        self.job_dir(job).join("seeds.json")
    }

    fn phase_path(&self, job: &JobId, phase: Phase) -> PathBuf {
        self.job_dir(job).join(format!("phase-{}.json", phase.number()))
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn load_seeds(&self, job: &JobId) -> Result<Option<Vec<WorkItem>>, CheckpointError> {
        let loaded: Option<SeedCheckpoint> = load_with_fallback(&self.seeds_path(job))?;
        match loaded {
            Some(cp) if cp.version != CURRENT_CHECKPOINT_VERSION => {
                Err(CheckpointError::Version { found: cp.version })
            }
            Some(cp) => Ok(Some(cp.seeds)),
            None => Ok(None),
        }
    }

    fn save_seeds(&self, job: &JobId, seeds: &[WorkItem]) -> Result<(), CheckpointError> {
        let cp = SeedCheckpoint {
            version: CURRENT_CHECKPOINT_VERSION,
            seeds: seeds.to_vec(),
            saved_at: Utc::now(),
        };
        write_atomic(&self.seeds_path(job), &cp)
    }

    fn load_progress(
        &self,
        job: &JobId,
        phase: Phase,
    ) -> Result<Option<PhaseProgress>, CheckpointError> {
        let loaded: Option<PhaseCheckpoint> = load_with_fallback(&self.phase_path(job, phase))?;
        match loaded {
            Some(cp) if cp.version != CURRENT_CHECKPOINT_VERSION => {
                Err(CheckpointError::Version { found: cp.version })
            }
            Some(cp) => Ok(Some(cp.progress)),
            None => Ok(None),
        }
    }

    fn save_progress(&self, progress: &PhaseProgress) -> Result<(), CheckpointError> {
        let cp = PhaseCheckpoint {
            version: CURRENT_CHECKPOINT_VERSION,
            progress: progress.clone(),
            saved_at: Utc::now(),
        };
        write_atomic(&self.phase_path(&progress.job, progress.phase), &cp)
    }

    fn clear_progress(&self, job: &JobId, phase: Phase) -> Result<(), CheckpointError> {
        let path = self.phase_path(job, phase);
        let backups = (1..=MAX_BAK_FILES).map(|n| bak(&path, n));
        for candidate in std::iter::once(path.clone()).chain(backups) {
            match fs::remove_file(&candidate) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

/// Volatile [`CheckpointStore`] for tests.
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    seeds: Mutex<HashMap<JobId, Vec<WorkItem>>>,
    progress: Mutex<HashMap<(JobId, Phase), PhaseProgress>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn load_seeds(&self, job: &JobId) -> Result<Option<Vec<WorkItem>>, CheckpointError> {
        Ok(self.seeds.lock().get(job).cloned())
    }

    fn save_seeds(&self, job: &JobId, seeds: &[WorkItem]) -> Result<(), CheckpointError> {
        self.seeds.lock().insert(job.clone(), seeds.to_vec());
        Ok(())
    }

    fn load_progress(
        &self,
        job: &JobId,
        phase: Phase,
    ) -> Result<Option<PhaseProgress>, CheckpointError> {
        Ok(self.progress.lock().get(&(job.clone(), phase)).cloned())
    }

    fn save_progress(&self, progress: &PhaseProgress) -> Result<(), CheckpointError> {
        self.progress.lock().insert((progress.job.clone(), progress.phase), progress.clone());
        Ok(())
    }

    fn clear_progress(&self, job: &JobId, phase: Phase) -> Result<(), CheckpointError> {
        self.progress.lock().remove(&(job.clone(), phase));
        Ok(())
    }
}

fn bak(path: &Path, n: u32) -> PathBuf {
    if n == 1 {
        path.with_extension("bak")
    } else {
        path.with_extension(format!("bak.{n}"))
    }
}

/// Pick the next `.bak` path, rotating older backups out.
///
/// Keeps up to [`MAX_BAK_FILES`] backups; the oldest is removed at capacity.
pub(crate) fn rotate_bak_path(path: &Path) -> PathBuf {
    let oldest = bak(path, MAX_BAK_FILES);
    if oldest.exists() {
        let _ = fs::remove_file(&oldest);
    }

    for n in (1..MAX_BAK_FILES).rev() {
        let src = bak(path, n);
        if src.exists() {
            let _ = fs::rename(&src, bak(path, n + 1));
        }
    }

    bak(path, 1)
}

fn write_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), CheckpointError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    {
        let mut file = File::create(&tmp)?;
        serde_json::to_writer_pretty(&mut file, value)?;
        file.write_all(b"\n")?;
        file.sync_all()?;
    }
    if path.exists() {
        fs::rename(path, rotate_bak_path(path))?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

fn load_with_fallback<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, CheckpointError> {
    let primary = read_json::<T>(path);
    let err = match primary {
        Ok(Some(value)) => return Ok(Some(value)),
        Ok(None) => None,
        Err(e) => Some(e),
    };

    for n in 1..=MAX_BAK_FILES {
        let backup = bak(path, n);
        match read_json::<T>(&backup) {
            Ok(Some(value)) => {
                tracing::warn!(
                    path = %path.display(),
                    backup = %backup.display(),
                    "checkpoint unreadable, recovered from backup",
                );
                return Ok(Some(value));
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(path = %backup.display(), error = %e, "skipping unreadable backup");
            }
        }
    }

    match err {
        Some(e) => Err(e),
        None => Ok(None),
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, CheckpointError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    Ok(Some(serde_json::from_slice(&bytes)?))
}

#[cfg(test)]
#[path = "checkpoint_tests.rs"]
mod tests;
