//! End-to-end daily cycle tests: planning through reporting over real
//! spawned workers.

use masthead_core::gate::Classification;
use masthead_core::types::{
    BusinessMetrics, Department, IssueKind, Priority, Task, TaskStatus, WorkMetrics, WorkOutcome,
    WorkerId, WorkerResult,
};
use masthead_core::{EngineError, StatusFeed};
use masthead_test_utils::{
    default_fixture, engine_fixture, test_config, ApproveAll, DenyAll, FailingExecutor,
    FlakyExecutor, StaticMetricsSource, SteadyExecutor, UnavailableMetricsSource,
};
use pretty_assertions::{assert_eq, assert_ne};
use std::sync::Arc;

#[tokio::test]
async fn full_cycle_completes_every_department_task() {
    let fixture = default_fixture(Arc::new(SteadyExecutor::default()));
    let report = fixture.coordinator.run_cycle().await.unwrap();

    // one task per department, all successful
    assert_eq!(report.completed_count(), Department::ALL.len());
    assert_eq!(report.failed_count(), 0);
    assert!(report
        .completed
        .iter()
        .all(|t| t.status == TaskStatus::Completed));
    assert!(!report
        .issues
        .iter()
        .any(|i| i.kind == IssueKind::TaskFailed));

    // every proposal was classified and the auto spends were debited
    assert_eq!(report.flagged_decisions.len(), 1);
    assert_eq!(
        report.flagged_decisions[0].department,
        Department::Marketing
    );
    assert!((report.budget.spent_today - 500.0).abs() < 1e-9);

    // the day closed: ledger cleared for the next cycle
    assert!(fixture.ledger.spent_today().abs() < 1e-9);
    assert_eq!(report.system.completed, Department::ALL.len() as u64);
}

#[tokio::test]
async fn each_cycle_gets_a_fresh_id_and_report() {
    let fixture = default_fixture(Arc::new(SteadyExecutor::default()));
    let first = fixture.coordinator.run_cycle().await.unwrap();
    let second = fixture.coordinator.run_cycle().await.unwrap();

    assert_ne!(first.cycle_id, second.cycle_id);
    assert_eq!(second.completed_count(), Department::ALL.len());
}

#[tokio::test]
async fn exhausted_retries_fail_permanently_exactly_once() {
    let fixture = default_fixture(Arc::new(FailingExecutor));
    let report = fixture.coordinator.run_cycle().await.unwrap();

    assert_eq!(report.completed_count(), 0);
    assert_eq!(report.failed_count(), Department::ALL.len());
    for task in &report.failed {
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.attempts, fixture.config.max_attempts);
    }

    // one permanent-failure issue per task, no more
    let failures = report
        .issues
        .iter()
        .filter(|i| i.kind == IssueKind::TaskFailed)
        .count();
    assert_eq!(failures, Department::ALL.len());

    // the next cycle reports only its own failures; the ruined success
    // rates earn every department a remediation task on top of its batch
    let second = fixture.coordinator.run_cycle().await.unwrap();
    assert_eq!(second.failed_count(), 2 * Department::ALL.len());
}

#[tokio::test]
async fn transient_failure_is_retried_within_the_cycle() {
    // exactly one failure somewhere in the batch; the task comes back
    // through the queue and completes on its second attempt
    let fixture = default_fixture(Arc::new(FlakyExecutor::new(1)));
    let report = fixture.coordinator.run_cycle().await.unwrap();

    assert_eq!(report.completed_count(), Department::ALL.len());
    assert_eq!(report.failed_count(), 0);
    assert!(!report
        .issues
        .iter()
        .any(|i| i.kind == IssueKind::TaskFailed));
    let retried = report
        .completed
        .iter()
        .filter(|t| t.attempts == 1)
        .count();
    assert_eq!(retried, 1);
}

#[tokio::test]
async fn offline_department_is_skipped_and_reported() {
    let fixture = default_fixture(Arc::new(SteadyExecutor::default()));
    fixture
        .registry
        .shutdown_department(Department::Content)
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    for _ in 0..fixture.config.health_failure_limit {
        fixture.registry.health_sweep().await;
    }

    let report = fixture.coordinator.run_cycle().await.unwrap();

    assert_eq!(report.completed_count(), Department::ALL.len() - 1);
    assert!(!report
        .completed
        .iter()
        .any(|t| t.department == Department::Content));
    let offline = report
        .issues
        .iter()
        .find(|i| i.kind == IssueKind::DepartmentOffline)
        .expect("offline issue");
    assert_eq!(offline.department, Some(Department::Content));
}

#[tokio::test]
async fn dead_worker_channel_raises_one_offline_issue() {
    // a shut-down worker whose status never flipped to Offline: dispatch
    // still enqueues, and every assignment hits a closed channel
    let config = test_config().with_monitoring_window_secs(1);
    let fixture = engine_fixture(
        config,
        Arc::new(SteadyExecutor::default()),
        Arc::new(ApproveAll),
        Arc::new(StaticMetricsSource::default()),
    );
    fixture
        .registry
        .shutdown_department(Department::Content)
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(10)).await;

    let report = fixture.coordinator.run_cycle().await.unwrap();

    assert_eq!(report.completed_count(), Department::ALL.len() - 1);
    assert_eq!(report.failed_count(), 0);

    // the channel error repeats every poll; the issue is raised once
    let offline: Vec<_> = report
        .issues
        .iter()
        .filter(|i| i.kind == IssueKind::DepartmentOffline)
        .collect();
    assert_eq!(offline.len(), 1);
    assert_eq!(offline[0].department, Some(Department::Content));

    // the undeliverable task went back into its queue, not into the void
    assert_eq!(
        fixture.registry.queues().depth(Department::Content),
        1
    );
}

#[tokio::test]
async fn results_landing_after_reporting_never_leak_into_the_next_cycle() {
    // a zero-length monitoring window closes the cycle while every
    // execution is still running; their results arrive afterwards
    let config = test_config().with_monitoring_window_secs(0);
    let fixture = engine_fixture(
        config,
        Arc::new(SteadyExecutor::new(150)),
        Arc::new(ApproveAll),
        Arc::new(StaticMetricsSource::default()),
    );

    let first = fixture.coordinator.run_cycle().await.unwrap();
    assert_eq!(first.completed_count(), 0);

    // let the orphaned executions finish and park results on the channel
    tokio::time::sleep(std::time::Duration::from_millis(400)).await;

    // the next cycle must not claim the previous day's late completions
    let second = fixture.coordinator.run_cycle().await.unwrap();
    assert_ne!(first.cycle_id, second.cycle_id);
    assert_eq!(second.completed_count(), 0);
    assert!(second.completed.is_empty());
}

#[tokio::test]
async fn cancelled_cycle_loses_no_tasks() {
    let config = test_config().with_tasks_per_department(2);
    let fixture = engine_fixture(
        config,
        Arc::new(SteadyExecutor::new(200)),
        Arc::new(ApproveAll),
        Arc::new(StaticMetricsSource::default()),
    );

    let coordinator = Arc::clone(&fixture.coordinator);
    let cycle = tokio::spawn(async move { coordinator.run_cycle().await });
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    fixture.coordinator.cancel();
    let report = cycle.await.unwrap().unwrap();

    // one in-flight task per worker completed during wind-down; the rest
    // stayed queued as pending for the next cycle
    assert_eq!(report.completed_count(), Department::ALL.len());
    assert_eq!(report.failed_count(), 0);
    let queued: usize = fixture.registry.queues().depths().values().sum();
    assert_eq!(queued, Department::ALL.len());
    assert_eq!(fixture.registry.total_load(), 0);

    let total_planned = 2 * Department::ALL.len();
    assert_eq!(report.completed_count() + queued, total_planned);
}

#[tokio::test]
async fn low_success_rate_plans_remediation_and_raises_issue() {
    let fixture = default_fixture(Arc::new(SteadyExecutor::default()));

    // seed history: 9 successes, 1 failure => 0.9, under the 0.95 threshold
    for i in 0..10 {
        let task = Task::new(Department::Production, "yesterday's work");
        fixture.aggregator.record(&WorkerResult {
            task,
            worker: WorkerId::new(),
            outcome: if i == 0 {
                WorkOutcome::Failure("bad render".into())
            } else {
                WorkOutcome::Success(WorkMetrics::new(10))
            },
            duration_ms: 10,
        });
    }

    let plan = fixture.coordinator.trigger_planning().await.unwrap();
    let production = plan.tasks_for(Department::Production);
    assert_eq!(production.len(), 2);
    assert_eq!(production[0].priority, Priority::High);
    assert!(production[0].description.contains("remediate"));

    let report = fixture.coordinator.run_cycle().await.unwrap();
    let issue = report
        .issues
        .iter()
        .find(|i| i.kind == IssueKind::LowSuccessRate)
        .expect("success-rate issue");
    assert_eq!(issue.department, Some(Department::Production));
}

#[tokio::test]
async fn denied_approval_becomes_a_resolved_issue() {
    let fixture = engine_fixture(
        test_config(),
        Arc::new(SteadyExecutor::default()),
        Arc::new(DenyAll),
        Arc::new(StaticMetricsSource::default()),
    );
    let report = fixture.coordinator.run_cycle().await.unwrap();

    // the operations proposal mentions "contract" and is denied
    let denied = report
        .issues
        .iter()
        .find(|i| i.kind == IssueKind::ApprovalDenied)
        .expect("denial issue");
    assert_eq!(denied.department, Some(Department::Operations));

    // the denied spend was never debited
    assert!((report.budget.spent_today - 475.0).abs() < 1e-9);

    // the cycle itself still completed
    assert_eq!(report.completed_count(), Department::ALL.len());
}

#[tokio::test]
async fn gated_proposals_cover_every_department() {
    let fixture = default_fixture(Arc::new(SteadyExecutor::default()));
    let plan = fixture.coordinator.trigger_planning().await.unwrap();

    assert_eq!(plan.proposals.len(), Department::ALL.len());
    let operations = plan
        .proposals
        .iter()
        .find(|p| p.department == Department::Operations)
        .unwrap();
    assert_eq!(
        operations.classification,
        Classification::ApprovalRequired
    );
    let marketing = plan
        .proposals
        .iter()
        .find(|p| p.department == Department::Marketing)
        .unwrap();
    assert_eq!(marketing.classification, Classification::MustReport);
}

#[tokio::test]
async fn metrics_outage_degrades_to_an_issue() {
    let fixture = engine_fixture(
        test_config(),
        Arc::new(SteadyExecutor::default()),
        Arc::new(ApproveAll),
        Arc::new(UnavailableMetricsSource),
    );
    let report = fixture.coordinator.run_cycle().await.unwrap();

    assert_eq!(report.business, BusinessMetrics::default());
    assert!(report
        .issues
        .iter()
        .any(|i| i.kind == IssueKind::MetricsUnavailable));
    assert_eq!(report.completed_count(), Department::ALL.len());
}

#[tokio::test]
async fn planning_rerun_returns_the_open_plan() {
    let fixture = default_fixture(Arc::new(SteadyExecutor::default()));
    let first = fixture.coordinator.trigger_planning().await.unwrap();
    let second = fixture.coordinator.trigger_planning().await.unwrap();
    assert_eq!(first.cycle_id, second.cycle_id);
    assert_eq!(first.total_tasks(), second.total_tasks());
}

#[tokio::test]
async fn reporting_without_a_cycle_is_rejected() {
    let fixture = default_fixture(Arc::new(SteadyExecutor::default()));
    let err = fixture.coordinator.trigger_reporting().await.unwrap_err();
    assert!(matches!(err, EngineError::NoActiveCycle));
}
