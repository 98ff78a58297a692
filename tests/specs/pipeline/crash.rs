//! Crash recovery specs
//!
//! A process that dies mid-wave leaves its progress record behind the
//! store. On restart the store decides what is left to do.

use crate::prelude::*;

/// The store fails partway through the second wave. A new process over
/// the same files runs only the items without a record.
#[tokio::test]
async fn restart_after_store_failure_runs_only_missing_items() {
    let dir = tempfile::tempdir().unwrap();
    let config = config().wave_size(4);
    let seeds = work_items("alpha", 10);

    let crashed = {
        let file: Arc<dyn Store> = Arc::new(FileStore::open(dir.path().join("store")).unwrap());
        let store: Arc<dyn Store> = Arc::new(FlakyStore::new(file, 5));
        let checkpoints: Arc<dyn CheckpointStore> =
            Arc::new(FileCheckpointStore::new(dir.path().join("checkpoints")));
        let p = TestPipeline::with_parts(
            Arc::new(ScriptedStages::new(seeds.clone())),
            config.clone(),
            store,
            checkpoints,
        );
        let err = p.orchestrator.run().await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Store(StoreError::Unavailable(_))));
        assert!(!p.orchestrator.is_running());

        let progress = p.checkpoints.load_progress(p.orchestrator.job(), Phase::LinkDiscovery);
        let progress = progress.unwrap().unwrap();
        assert_eq!((progress.succeeded, progress.waves), (4, 1));
        p.stages.calls_for(Phase::LinkDiscovery)
    };
    assert_eq!(crashed.len(), 8);

    let store: Arc<dyn Store> = Arc::new(FileStore::open(dir.path().join("store")).unwrap());
    let persisted = store.terminal_keys(Table::Links).unwrap();
    assert_eq!(persisted.len(), 5);

    let checkpoints: Arc<dyn CheckpointStore> =
        Arc::new(FileCheckpointStore::new(dir.path().join("checkpoints")));
    let p = TestPipeline::with_parts(
        Arc::new(ScriptedStages::new(seeds.clone())),
        config,
        store,
        checkpoints,
    );
    let report = p.orchestrator.run().await.unwrap();

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(p.stages.discoveries(), 0);
    let rerun = p.stages.calls_for(Phase::LinkDiscovery);
    assert_eq!(rerun.len(), 5);
    assert!(rerun.iter().all(|key| !persisted.contains(key)));

    let links = report.phase(Phase::LinkDiscovery).unwrap();
    assert_eq!((links.resumed_from, links.succeeded), (ResumeState::Partial, 5));
    let progress = p.checkpoints.load_progress(p.orchestrator.job(), Phase::LinkDiscovery);
    let progress = progress.unwrap().unwrap();
    assert_eq!((progress.status, progress.succeeded), (PhaseStatus::Completed, 10));
    assert_eq!(p.store.count_by_status(Table::Links, RecordStatus::Done).unwrap(), 10);
}

/// A progress record claiming completion is ignored when the store
/// disagrees.
#[tokio::test]
async fn stale_completed_progress_is_not_trusted() {
    let seeds = work_items("alpha", 3);
    let p = TestPipeline::new(ScriptedStages::new(seeds.clone()), config());
    p.checkpoints.save_seeds(p.orchestrator.job(), &seeds).unwrap();
    p.store.insert_if_absent(Table::Links, Record::done(&seeds[0], json!({}), 1)).unwrap();
    let stale = PhaseProgressBuilder::default()
        .job(p.orchestrator.job().clone())
        .phase(Phase::LinkDiscovery)
        .status(PhaseStatus::Completed)
        .succeeded(3)
        .build();
    p.checkpoints.save_progress(&stale).unwrap();

    let report = p.orchestrator.run().await.unwrap();

    let mut rerun = p.stages.calls_for(Phase::LinkDiscovery);
    rerun.sort();
    assert_eq!(rerun, vec![seeds[1].key.clone(), seeds[2].key.clone()]);
    assert_eq!(
        report.phase(Phase::LinkDiscovery).map(|s| s.resumed_from),
        Some(ResumeState::Partial)
    );
}
