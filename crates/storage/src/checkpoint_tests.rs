// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use pc_core::test_support::work_items;
use pc_core::PhaseStatus;
use tempfile::tempdir;

fn job() -> JobId {
    JobId::new("companies")
}

fn progress(phase: Phase, succeeded: u64) -> PhaseProgress {
    PhaseProgress::builder()
        .job("companies")
        .phase(phase)
        .status(PhaseStatus::InProgress)
        .succeeded(succeeded)
        .build()
}

#[test]
fn seeds_round_trip() {
    let dir = tempdir().unwrap();
    let store = FileCheckpointStore::new(dir.path());
    assert!(store.load_seeds(&job()).unwrap().is_none());

    let seeds = work_items("industry", 3);
    store.save_seeds(&job(), &seeds).unwrap();

    assert_eq!(store.load_seeds(&job()).unwrap(), Some(seeds));
    assert!(dir.path().join("companies/seeds.json").exists());
}

#[test]
fn progress_is_stored_per_phase() {
    let dir = tempdir().unwrap();
    let store = FileCheckpointStore::new(dir.path());
    store.save_progress(&progress(Phase::PageFetch, 7)).unwrap();
    store.save_progress(&progress(Phase::Extraction, 3)).unwrap();

    let loaded = store.load_progress(&job(), Phase::PageFetch).unwrap().unwrap();
    assert_eq!(loaded.succeeded, 7);
    assert!(dir.path().join("companies/phase-2.json").exists());
    assert!(store.load_progress(&job(), Phase::Export).unwrap().is_none());
}

#[test]
fn overwrite_rotates_backups_up_to_three() {
    let dir = tempdir().unwrap();
    let store = FileCheckpointStore::new(dir.path());
    for n in 0..5 {
        store.save_progress(&progress(Phase::LinkDiscovery, n)).unwrap();
    }

    let base = dir.path().join("companies");
    assert!(base.join("phase-1.bak").exists());
    assert!(base.join("phase-1.bak.2").exists());
    assert!(base.join("phase-1.bak.3").exists());
    assert!(!base.join("phase-1.bak.4").exists());
    assert!(!base.join("phase-1.tmp").exists());
    let latest = store.load_progress(&job(), Phase::LinkDiscovery).unwrap().unwrap();
    assert_eq!(latest.succeeded, 4);
}

#[test]
fn corrupt_checkpoint_falls_back_to_backup() {
    let dir = tempdir().unwrap();
    let store = FileCheckpointStore::new(dir.path());
    store.save_progress(&progress(Phase::PageFetch, 1)).unwrap();
    store.save_progress(&progress(Phase::PageFetch, 2)).unwrap();

    fs::write(dir.path().join("companies/phase-2.json"), "{ torn").unwrap();

    let loaded = store.load_progress(&job(), Phase::PageFetch).unwrap().unwrap();
    assert_eq!(loaded.succeeded, 1);
}

#[test]
fn corrupt_checkpoint_without_backup_is_an_error() {
    let dir = tempdir().unwrap();
    let store = FileCheckpointStore::new(dir.path());
    fs::create_dir_all(dir.path().join("companies")).unwrap();
    fs::write(dir.path().join("companies/seeds.json"), "garbage").unwrap();

    assert!(matches!(store.load_seeds(&job()), Err(CheckpointError::Json(_))));
}

#[test]
fn unknown_version_is_rejected() {
    let dir = tempdir().unwrap();
    let store = FileCheckpointStore::new(dir.path());
    store.save_seeds(&job(), &work_items("industry", 1)).unwrap();

    let path = dir.path().join("companies/seeds.json");
    let mut value: serde_json::Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
    value["v"] = serde_json::json!(99);
    fs::write(&path, serde_json::to_vec(&value).unwrap()).unwrap();

    assert!(matches!(store.load_seeds(&job()), Err(CheckpointError::Version { found: 99 })));
}

#[test]
fn clear_progress_removes_file_and_backups() {
    let dir = tempdir().unwrap();
    let store = FileCheckpointStore::new(dir.path());
    store.save_progress(&progress(Phase::SecondaryExtraction, 1)).unwrap();
    store.save_progress(&progress(Phase::SecondaryExtraction, 2)).unwrap();

    store.clear_progress(&job(), Phase::SecondaryExtraction).unwrap();

    let base = dir.path().join("companies");
    assert!(!base.join("phase-5.json").exists());
    assert!(!base.join("phase-5.bak").exists());
    assert!(store.load_progress(&job(), Phase::SecondaryExtraction).unwrap().is_none());
    // Clearing twice is fine
    store.clear_progress(&job(), Phase::SecondaryExtraction).unwrap();
}

#[test]
fn memory_store_mirrors_file_semantics() {
    let store = MemoryCheckpointStore::new();
    store.save_seeds(&job(), &work_items("industry", 2)).unwrap();
    store.save_progress(&progress(Phase::Export, 1)).unwrap();

    assert_eq!(store.load_seeds(&job()).unwrap().map(|s| s.len()), Some(2));
    assert!(store.load_progress(&job(), Phase::Export).unwrap().is_some());
    store.clear_progress(&job(), Phase::Export).unwrap();
    assert!(store.load_progress(&job(), Phase::Export).unwrap().is_none());
}
