//! Force restart specs

use crate::prelude::*;

/// Restarting from phase 1 empties every table and reruns every item, but
/// keeps the discovered seeds.
#[tokio::test]
async fn restart_from_first_phase_reprocesses_everything() {
    let p = TestPipeline::new(ScriptedStages::new(work_items("alpha", 3)).fan_out(2), config());
    p.orchestrator.run().await.unwrap();
    let first: Vec<usize> = Phase::ALL.iter().map(|&ph| p.stages.calls_for(ph).len()).collect();

    p.orchestrator.force_restart(Phase::LinkDiscovery).unwrap();

    for table in Table::ALL {
        assert!(p.store.records(table, None).unwrap().is_empty(), "{}", table.name());
    }
    for phase in Phase::ALL {
        assert!(p.checkpoints.load_progress(p.orchestrator.job(), phase).unwrap().is_none());
    }
    assert!(p.checkpoints.load_seeds(p.orchestrator.job()).unwrap().is_some());

    let report = p.orchestrator.run().await.unwrap();
    assert_eq!(report.outcome, RunOutcome::Completed);
    assert!(report.phases.iter().all(|s| s.resumed_from == ResumeState::NotStarted));
    let second: Vec<usize> = Phase::ALL.iter().map(|&ph| p.stages.calls_for(ph).len()).collect();
    assert_eq!(second, first.iter().map(|n| n * 2).collect::<Vec<_>>());
    assert_eq!(p.stages.discoveries(), 1);
}

/// Restarting from a later phase leaves earlier output untouched.
#[tokio::test]
async fn restart_from_export_only_reexports() {
    let p = TestPipeline::new(ScriptedStages::new(work_items("alpha", 2)), config());
    p.orchestrator.run().await.unwrap();
    let calls = p.stages.calls().len();

    p.orchestrator.force_restart(Phase::Export).unwrap();
    assert_eq!(p.store.count_by_status(Table::Contacts, RecordStatus::Done).unwrap(), 2);

    p.orchestrator.run().await.unwrap();
    assert_eq!(p.stages.calls().len(), calls + 1);
    assert_eq!(p.stages.calls_for(Phase::Export).len(), 2);
}
