//! Resume specs
//!
//! A restarted job continues from what the store already holds: covered
//! items are never run again and completed phases are skipped.

use crate::prelude::*;

fn page_item(key: &str) -> WorkItem {
    WorkItem::new(key, "alpha", json!({ "url": key }))
}

/// Phase 2 interrupted at 80%: the rerun fetches only the missing 20%.
#[tokio::test]
async fn partial_phase_processes_only_missing_items() {
    let seeds = work_items("alpha", 2);
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let checkpoints: Arc<dyn CheckpointStore> = Arc::new(MemoryCheckpointStore::new());
    checkpoints.save_seeds(&config().job, &seeds).unwrap();
    for seed in &seeds {
        store.insert_if_absent(Table::Links, Record::done(seed, json!({}), 1)).unwrap();
    }

    let pages: Vec<String> = seeds
        .iter()
        .flat_map(|s| (0..5).map(move |n| format!("{}/{n}", s.key)))
        .collect();
    for key in &pages[..8] {
        store.insert_if_absent(Table::DetailPages, Record::done(&page_item(key), json!({}), 1)).unwrap();
    }

    let stages = Arc::new(ScriptedStages::new(seeds).fan_out(5));
    let p = TestPipeline::with_parts(stages, config(), store, checkpoints);
    let report = p.orchestrator.run().await.unwrap();

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(p.stages.discoveries(), 0);
    assert!(p.stages.calls_for(Phase::LinkDiscovery).is_empty());
    assert_eq!(
        report.phase(Phase::LinkDiscovery).map(|s| s.resumed_from),
        Some(ResumeState::Completed)
    );

    let mut fetched = p.stages.calls_for(Phase::PageFetch);
    fetched.sort();
    assert_eq!(fetched, pages[8..].to_vec());
    let fetch = report.phase(Phase::PageFetch).unwrap();
    assert_eq!((fetch.resumed_from, fetch.succeeded), (ResumeState::Partial, 2));

    assert_eq!(p.store.count_by_status(Table::DetailPages, RecordStatus::Done).unwrap(), 10);
    assert_eq!(p.stages.calls_for(Phase::Extraction).len(), 10);
    assert!(duplicates(&p.stages.calls_for(Phase::Extraction)).is_empty());
}

/// Running a finished job again does no work at all.
#[tokio::test]
async fn finished_job_reruns_as_noop() {
    let p = TestPipeline::new(ScriptedStages::new(work_items("alpha", 4)).fan_out(2), config());
    p.orchestrator.run().await.unwrap();
    let calls = p.stages.calls().len();

    let next = p.restart(config());
    let report = next.orchestrator.run().await.unwrap();

    assert_eq!(next.stages.calls().len(), calls);
    assert!(report.phases.iter().all(|s| s.resumed_from == ResumeState::Completed));
    for progress in next.orchestrator.phase_progress().unwrap() {
        assert_eq!(progress.status, PhaseStatus::Completed);
    }
}

/// Items left pending by an earlier run keep their attempt count.
#[tokio::test]
async fn pending_items_resume_with_their_attempts() {
    let seeds = work_items("alpha", 2);
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let checkpoints: Arc<dyn CheckpointStore> = Arc::new(MemoryCheckpointStore::new());
    checkpoints.save_seeds(&config().job, &seeds).unwrap();
    let retried = seeds[1].clone().with_attempts(2);
    store.mark_pending(Table::Links, Record::pending(&retried, "503", 1)).unwrap();

    let stages = ScriptedStages::new(seeds.clone());
    stages.fail(Phase::LinkDiscovery, &seeds[1].key, 1, TaskError::transient("503"));
    let p = TestPipeline::with_parts(Arc::new(stages), config(), store, checkpoints);
    p.orchestrator.run().await.unwrap();

    // Third attempt exceeds the default two retries
    let record = p.store.get(Table::Links, &seeds[1].key).unwrap().unwrap();
    assert_eq!((record.status, record.attempts), (RecordStatus::Failed, 3));
}
