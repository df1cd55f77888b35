//! Testing utilities for the Masthead workspace
//!
//! Shared scripted executors, approval handlers, metrics sources and a fully
//! wired engine fixture.

#![allow(missing_docs)]

use async_trait::async_trait;
use chrono::{Duration, Utc};
use masthead_core::gate::{ApprovalHandler, ApprovalVerdict, AutonomyDecision, AutonomyGate};
use masthead_core::types::{BusinessMetrics, Department, Priority, Task, WorkMetrics};
use masthead_core::{
    BudgetLedger, EngineConfig, EngineError, MetricsSource, StatusAggregator, StatusFeed,
    WorkExecutor, WorkFailure,
};
use masthead_engine::{Coordinator, DepartmentRegistry};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Executor replaying a programmed outcome sequence; succeeds once the
/// script is exhausted.
#[derive(Default)]
pub struct ScriptedExecutor {
    script: Mutex<VecDeque<Result<WorkMetrics, WorkFailure>>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then_ok(self, duration_ms: u64) -> Self {
        self.script.lock().push_back(Ok(WorkMetrics::new(duration_ms)));
        self
    }

    pub fn then_fail(self, message: &str) -> Self {
        self.script.lock().push_back(Err(WorkFailure::new(message)));
        self
    }
}

#[async_trait]
impl WorkExecutor for ScriptedExecutor {
    async fn execute(&self, _task: &Task) -> Result<WorkMetrics, WorkFailure> {
        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(WorkMetrics::new(5)))
    }
}

/// Fails the first `failures` executions, then succeeds forever
pub struct FlakyExecutor {
    failures_left: AtomicU32,
}

impl FlakyExecutor {
    pub fn new(failures: u32) -> Self {
        Self {
            failures_left: AtomicU32::new(failures),
        }
    }
}

#[async_trait]
impl WorkExecutor for FlakyExecutor {
    async fn execute(&self, _task: &Task) -> Result<WorkMetrics, WorkFailure> {
        let left = self.failures_left.load(Ordering::SeqCst);
        if left > 0 {
            self.failures_left.store(left - 1, Ordering::SeqCst);
            return Err(WorkFailure::new("flaky executor fault"));
        }
        Ok(WorkMetrics::new(5))
    }
}

/// Always succeeds after an optional delay
pub struct SteadyExecutor {
    delay_ms: u64,
}

impl SteadyExecutor {
    pub fn new(delay_ms: u64) -> Self {
        Self { delay_ms }
    }
}

impl Default for SteadyExecutor {
    fn default() -> Self {
        Self::new(0)
    }
}

#[async_trait]
impl WorkExecutor for SteadyExecutor {
    async fn execute(&self, _task: &Task) -> Result<WorkMetrics, WorkFailure> {
        if self.delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
        }
        Ok(WorkMetrics::new(self.delay_ms.max(1)))
    }
}

/// Always fails
pub struct FailingExecutor;

#[async_trait]
impl WorkExecutor for FailingExecutor {
    async fn execute(&self, task: &Task) -> Result<WorkMetrics, WorkFailure> {
        Err(WorkFailure::new(format!("cannot execute: {}", task.description)))
    }
}

/// Static business figures for reporting tests
pub struct StaticMetricsSource {
    pub metrics: BusinessMetrics,
}

impl StaticMetricsSource {
    pub fn new(metrics: BusinessMetrics) -> Self {
        Self { metrics }
    }
}

impl Default for StaticMetricsSource {
    fn default() -> Self {
        Self::new(BusinessMetrics {
            revenue: 10_000.0,
            content_published: 4,
            audience_reach: 50_000,
        })
    }
}

#[async_trait]
impl MetricsSource for StaticMetricsSource {
    async fn business_snapshot(&self) -> Result<BusinessMetrics, EngineError> {
        Ok(self.metrics)
    }
}

/// Metrics source that is always down
pub struct UnavailableMetricsSource;

#[async_trait]
impl MetricsSource for UnavailableMetricsSource {
    async fn business_snapshot(&self) -> Result<BusinessMetrics, EngineError> {
        Err(EngineError::AggregationUnavailable(
            "metrics source offline".into(),
        ))
    }
}

/// Approves every held decision
pub struct ApproveAll;

#[async_trait]
impl ApprovalHandler for ApproveAll {
    async fn resolve(&self, _decision: &AutonomyDecision) -> ApprovalVerdict {
        ApprovalVerdict::Approved
    }
}

/// Denies every held decision
pub struct DenyAll;

#[async_trait]
impl ApprovalHandler for DenyAll {
    async fn resolve(&self, _decision: &AutonomyDecision) -> ApprovalVerdict {
        ApprovalVerdict::Denied
    }
}

/// Fast configuration for tests: short polls, small batches, tight budget
pub fn test_config() -> EngineConfig {
    EngineConfig::new()
        .with_daily_limit(1_000.0)
        .with_tasks_per_department(1)
        .with_poll_interval_ms(10)
        .with_monitoring_window_secs(5)
        .with_task_deadline_secs(600)
}

/// A pending medium-priority task due in ten minutes
pub fn sample_task(department: Department) -> Task {
    Task::new(department, "sample department work")
        .with_priority(Priority::Medium)
        .with_deadline(Utc::now() + Duration::minutes(10))
}

/// A fully wired engine over one executor for every department
pub struct EngineFixture {
    pub config: EngineConfig,
    pub aggregator: Arc<StatusAggregator>,
    pub ledger: Arc<BudgetLedger>,
    pub gate: Arc<AutonomyGate>,
    pub registry: Arc<DepartmentRegistry>,
    pub coordinator: Arc<Coordinator>,
}

/// Wire aggregator, ledger, gate, registry and coordinator with the given
/// executor spawned for all five departments.
pub fn engine_fixture(
    config: EngineConfig,
    executor: Arc<dyn WorkExecutor>,
    approvals: Arc<dyn ApprovalHandler>,
    metrics: Arc<dyn MetricsSource>,
) -> EngineFixture {
    let aggregator = Arc::new(StatusAggregator::new(config.response_time_alpha));
    let feed: Arc<dyn StatusFeed> = Arc::clone(&aggregator) as Arc<dyn StatusFeed>;
    let ledger = Arc::new(BudgetLedger::new(&config.budget));
    let gate = Arc::new(AutonomyGate::new(
        &config.autonomy,
        Arc::clone(&ledger),
        approvals,
    ));

    let registry = Arc::new(DepartmentRegistry::new(&config, Arc::clone(&feed)));
    for department in Department::ALL {
        registry
            .spawn_department(department, Arc::clone(&executor))
            .expect("department spawn");
    }

    let coordinator = Arc::new(
        Coordinator::new(
            config.clone(),
            Arc::clone(&registry),
            Arc::clone(&gate),
            feed,
            metrics,
        )
        .expect("coordinator construction"),
    );

    EngineFixture {
        config,
        aggregator,
        ledger,
        gate,
        registry,
        coordinator,
    }
}

/// `engine_fixture` with approve-all and static metrics defaults
pub fn default_fixture(executor: Arc<dyn WorkExecutor>) -> EngineFixture {
    engine_fixture(
        test_config(),
        executor,
        Arc::new(ApproveAll),
        Arc::new(StaticMetricsSource::default()),
    )
}
