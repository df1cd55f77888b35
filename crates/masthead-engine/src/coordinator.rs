//! The coordinator (CEO)
//!
//! Drives the daily cycle through four phases in strict order:
//! planning -> dispatch -> monitoring -> reporting. Each phase is
//! idempotent-safe: re-running after a partial failure never duplicates tasks
//! already dispatched or completed. A failure inside one department's
//! processing becomes an issue against that department and never aborts the
//! cycle for the others; only an unavailable status feed ends the cycle
//! early, leaving the retry to the external schedule trigger.

use crate::audit::{AuditEvent, AuditLog};
use crate::planning::CyclePlanner;
use crate::queue::RequeueOutcome;
use crate::registry::DepartmentRegistry;
use crate::worker::AssignReply;
use chrono::{DateTime, Duration, Utc};
use masthead_core::gate::{ApprovalOutcome, AutonomyGate, Classification};
use masthead_core::types::{
    BusinessMetrics, CycleId, Department, Issue, IssueKind, IssueSeverity, Task, TaskId,
    TaskStatus, WorkOutcome, WorkerResult, WorkerStatus,
};
use masthead_core::{
    DailyPlan, DailyReport, EngineConfig, EngineError, MetricsSource, StatusFeed, StatusSnapshot,
};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Bookkeeping for the currently open cycle
#[derive(Debug)]
struct CycleState {
    plan: DailyPlan,
    started_at: DateTime<Utc>,
    dispatched: BTreeSet<TaskId>,
    /// Dispatched tasks that have not reached a terminal status
    in_flight: BTreeMap<TaskId, Task>,
    completed: Vec<Task>,
    issues: Vec<Issue>,
    offline_flagged: BTreeSet<Department>,
    deadline_flagged: BTreeSet<TaskId>,
    rate_flagged: BTreeSet<Department>,
}

impl CycleState {
    fn new(plan: DailyPlan, started_at: DateTime<Utc>) -> Self {
        Self {
            plan,
            started_at,
            dispatched: BTreeSet::new(),
            in_flight: BTreeMap::new(),
            completed: Vec::new(),
            issues: Vec::new(),
            offline_flagged: BTreeSet::new(),
            deadline_flagged: BTreeSet::new(),
            rate_flagged: BTreeSet::new(),
        }
    }
}

/// Owns the daily cycle over a registry of department workers
pub struct Coordinator {
    config: EngineConfig,
    registry: Arc<DepartmentRegistry>,
    gate: Arc<AutonomyGate>,
    status: Arc<dyn StatusFeed>,
    business: Arc<dyn MetricsSource>,
    planner: CyclePlanner,
    audit: AuditLog,
    cancelled: AtomicBool,
    cycle: Mutex<Option<CycleState>>,
}

impl Coordinator {
    /// Build a coordinator; rejects invalid configuration up front
    pub fn new(
        config: EngineConfig,
        registry: Arc<DepartmentRegistry>,
        gate: Arc<AutonomyGate>,
        status: Arc<dyn StatusFeed>,
        business: Arc<dyn MetricsSource>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let planner = CyclePlanner::new(config.clone());
        Ok(Self {
            config,
            registry,
            gate,
            status,
            business,
            planner,
            audit: AuditLog::new(),
            cancelled: AtomicBool::new(false),
            cycle: Mutex::new(None),
        })
    }

    /// The day's audit trail
    #[inline]
    #[must_use]
    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    /// The registry this coordinator dispatches through
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &Arc<DepartmentRegistry> {
        &self.registry
    }

    /// Request cancellation of the running cycle.
    ///
    /// Checked between work units; in-flight executions finish cooperatively
    /// and unfinished tasks return to pending for the next cycle.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        info!("cycle cancellation requested");
    }

    /// Cancel any running cycle and stop every worker
    pub async fn shutdown(&self) {
        self.cancel();
        self.registry.shutdown_all().await;
    }

    /// Current aggregated status, for an external transport
    pub fn get_status(&self) -> Result<StatusSnapshot, EngineError> {
        self.status.snapshot()
    }

    /// Run one full cycle and return its report
    pub async fn run_cycle(&self) -> Result<DailyReport, EngineError> {
        self.cancelled.store(false, Ordering::SeqCst);
        self.trigger_planning().await?;
        self.dispatch()?;
        self.monitoring().await?;
        self.trigger_reporting().await
    }

    /// Planning phase: snapshot status, allocate budget, generate tasks and
    /// gate the cycle's strategic proposals.
    ///
    /// Re-running while a cycle is open returns the existing plan unchanged.
    pub async fn trigger_planning(&self) -> Result<DailyPlan, EngineError> {
        if let Some(state) = self.cycle.lock().as_ref() {
            debug!(cycle_id = %state.plan.cycle_id, "planning re-run; returning open plan");
            return Ok(state.plan.clone());
        }
        if self.cancelled.load(Ordering::SeqCst) {
            return Err(EngineError::CycleCancelled {
                phase: "planning".into(),
            });
        }

        // results still on the channel belong to a closed cycle
        let stale = self.registry.drain_results().len();
        if stale > 0 {
            debug!(stale, "discarded results left over from a previous cycle");
        }

        self.audit.record(AuditEvent::PhaseStarted { phase: "planning" });
        let snapshot = self.status.snapshot().map_err(|e| {
            error!(error = %e, "planning aborted; status feed unavailable");
            e
        })?;

        let cycle_id = CycleId::new();
        let started_at = Utc::now();
        let allocations = self.planner.allocations();
        let tasks = self.planner.generate_tasks(&snapshot, started_at);

        let mut proposals = Vec::new();
        let mut issues = Vec::new();
        for proposal in self.planner.proposals() {
            let decision =
                self.gate
                    .evaluate(proposal.department, &proposal.action, proposal.cost);
            self.audit.record(AuditEvent::GateDecision {
                decision: decision.clone(),
            });

            if decision.classification == Classification::ApprovalRequired {
                match self.gate.resolve_approval(&decision).await {
                    Ok(ApprovalOutcome::Executed) => {
                        self.audit.record(AuditEvent::ApprovalResolved {
                            department: decision.department,
                            action: decision.action.clone(),
                            approved: true,
                        });
                    }
                    Ok(ApprovalOutcome::Denied) => {
                        self.audit.record(AuditEvent::ApprovalResolved {
                            department: decision.department,
                            action: decision.action.clone(),
                            approved: false,
                        });
                        issues.push(
                            Issue::new(
                                IssueKind::ApprovalDenied,
                                IssueSeverity::Medium,
                                format!("approval denied: {}", decision.action),
                            )
                            .with_department(decision.department),
                        );
                    }
                    Err(EngineError::BudgetExceeded { action, .. }) => {
                        issues.push(
                            Issue::new(
                                IssueKind::BudgetExceeded,
                                IssueSeverity::High,
                                format!("approved spend no longer affordable: {action}"),
                            )
                            .with_department(decision.department),
                        );
                    }
                    Err(e) => return Err(e),
                }
            }
            proposals.push(decision);
        }

        let plan = DailyPlan {
            cycle_id,
            created_at: started_at,
            allocations,
            tasks,
            proposals,
        };
        info!(
            cycle_id = %cycle_id,
            tasks = plan.total_tasks(),
            proposals = plan.proposals.len(),
            "planning complete"
        );
        self.audit.record(AuditEvent::PhaseEnded { phase: "planning" });

        let mut state = CycleState::new(plan.clone(), started_at);
        state.issues = issues;
        for issue in &state.issues {
            self.audit.record(AuditEvent::IssueRaised {
                issue: issue.clone(),
            });
        }
        *self.cycle.lock() = Some(state);
        Ok(plan)
    }

    /// Dispatch phase: enqueue the planned tasks per department.
    ///
    /// An offline department receives nothing; the deficit is an issue. A
    /// re-run skips tasks already dispatched.
    fn dispatch(&self) -> Result<(), EngineError> {
        self.audit.record(AuditEvent::PhaseStarted { phase: "dispatch" });
        let mut guard = self.cycle.lock();
        let state = guard.as_mut().ok_or(EngineError::NoActiveCycle)?;

        for (department, tasks) in state.plan.tasks.clone() {
            if self.cancelled.load(Ordering::SeqCst) {
                break;
            }

            match self.registry.worker_status(department) {
                Ok(WorkerStatus::Offline) => {
                    if state.offline_flagged.insert(department) {
                        let issue = Issue::new(
                            IssueKind::DepartmentOffline,
                            IssueSeverity::High,
                            format!("{} tasks withheld; department offline", tasks.len()),
                        )
                        .with_department(department);
                        warn!(department = %department, "department offline at dispatch");
                        self.audit.record(AuditEvent::IssueRaised {
                            issue: issue.clone(),
                        });
                        state.issues.push(issue);
                    }
                }
                Ok(_) => {
                    for task in tasks {
                        if state.dispatched.contains(&task.id) {
                            continue;
                        }
                        debug!(
                            department = %department,
                            task_id = %task.id,
                            "dispatching task"
                        );
                        state.dispatched.insert(task.id);
                        state.in_flight.insert(task.id, task.clone());
                        self.audit.record(AuditEvent::TaskDispatched {
                            task_id: task.id,
                            department,
                        });
                        self.registry.queues().enqueue(task);
                    }
                }
                // one department's failure never blocks the others
                Err(e) => {
                    if state.offline_flagged.insert(department) {
                        let issue = Issue::new(
                            IssueKind::DepartmentOffline,
                            IssueSeverity::High,
                            e.to_string(),
                        )
                        .with_department(department);
                        self.audit.record(AuditEvent::IssueRaised {
                            issue: issue.clone(),
                        });
                        state.issues.push(issue);
                    }
                }
            }
        }

        self.audit.record(AuditEvent::PhaseEnded { phase: "dispatch" });
        Ok(())
    }

    /// Monitoring phase: pump queues into workers, fold results, requeue
    /// transient failures and raise deadline / success-rate issues.
    ///
    /// Ends when every dispatched task is terminal, the monitoring window
    /// elapses, or the cycle is cancelled.
    async fn monitoring(&self) -> Result<(), EngineError> {
        self.audit
            .record(AuditEvent::PhaseStarted { phase: "monitoring" });
        {
            let guard = self.cycle.lock();
            guard.as_ref().ok_or(EngineError::NoActiveCycle)?;
        }

        let window_end =
            Utc::now() + Duration::seconds(self.config.monitoring_window_secs as i64);
        let poll = std::time::Duration::from_millis(self.config.poll_interval_ms);

        loop {
            if self.cancelled.load(Ordering::SeqCst) {
                break;
            }

            self.pump_queues().await;
            for result in self.registry.drain_results() {
                self.fold_result(result);
            }
            self.check_deadlines();
            self.check_success_rates()?;

            let all_terminal = {
                let guard = self.cycle.lock();
                guard
                    .as_ref()
                    .is_some_and(|state| state.in_flight.is_empty())
            };
            if all_terminal {
                debug!("all dispatched tasks terminal; monitoring done");
                break;
            }
            if Utc::now() >= window_end {
                info!("monitoring window elapsed with work still in flight");
                break;
            }
            tokio::time::sleep(poll).await;
        }

        if self.cancelled.load(Ordering::SeqCst) {
            self.wind_down().await;
        }

        self.audit
            .record(AuditEvent::PhaseEnded { phase: "monitoring" });
        Ok(())
    }

    /// Reporting phase: assemble the day's immutable report, then clear the
    /// ledger and audit trail for the next cycle.
    pub async fn trigger_reporting(&self) -> Result<DailyReport, EngineError> {
        self.audit
            .record(AuditEvent::PhaseStarted { phase: "reporting" });
        {
            let guard = self.cycle.lock();
            guard.as_ref().ok_or(EngineError::NoActiveCycle)?;
        }

        // late results that raced the end of monitoring
        for result in self.registry.drain_results() {
            self.fold_result(result);
        }

        let snapshot = self.status.snapshot()?;
        let business = match self.business.business_snapshot().await {
            Ok(business) => business,
            Err(e) => {
                let issue = Issue::new(
                    IssueKind::MetricsUnavailable,
                    IssueSeverity::Medium,
                    e.to_string(),
                );
                self.audit.record(AuditEvent::IssueRaised {
                    issue: issue.clone(),
                });
                if let Some(state) = self.cycle.lock().as_mut() {
                    state.issues.push(issue);
                }
                BusinessMetrics::default()
            }
        };

        let failed = self.registry.queues().drain_failed();
        let flagged_decisions = self.audit.flagged_decisions();
        let budget = self.gate.ledger().snapshot();

        let state = self
            .cycle
            .lock()
            .take()
            .ok_or(EngineError::NoActiveCycle)?;
        let report = DailyReport {
            cycle_id: state.plan.cycle_id,
            generated_at: Utc::now(),
            completed: state.completed,
            failed,
            departments: snapshot.departments,
            system: snapshot.system,
            business,
            budget,
            flagged_decisions,
            issues: state.issues,
        };

        self.gate.ledger().reset_day();
        self.audit.clear_day();
        info!(
            cycle_id = %report.cycle_id,
            completed = report.completed_count(),
            failed = report.failed_count(),
            issues = report.issues.len(),
            "reporting complete; day closed"
        );
        Ok(report)
    }

    /// Move queued tasks into workers with free capacity
    async fn pump_queues(&self) {
        for department in self.registry.departments() {
            while self.registry.can_accept(department) {
                let Some(task) = self.registry.queues().dequeue(department) else {
                    break;
                };
                match self.registry.assign(task.clone()).await {
                    Ok(AssignReply::Accepted) => {}
                    // raced the worker; put the task back and move on
                    Ok(AssignReply::RejectedBusy | AssignReply::RejectedOffline) => {
                        self.registry.queues().enqueue(task);
                        break;
                    }
                    Err(e) => {
                        self.registry.queues().enqueue(task);
                        self.raise_issue(
                            Issue::new(IssueKind::DepartmentOffline, IssueSeverity::High, e.to_string())
                                .with_department(department),
                        );
                        break;
                    }
                }
            }
        }
    }

    /// Record an issue against the open cycle; department-scoped issues are
    /// raised once per department
    fn raise_issue(&self, issue: Issue) {
        let mut guard = self.cycle.lock();
        let Some(state) = guard.as_mut() else {
            return;
        };
        if let Some(department) = issue.department {
            if !state.offline_flagged.insert(department) {
                return;
            }
        }
        self.audit.record(AuditEvent::IssueRaised {
            issue: issue.clone(),
        });
        state.issues.push(issue);
    }

    /// Fold one worker result into the cycle bookkeeping.
    ///
    /// Results for tasks the open cycle never dispatched (an execution that
    /// outlived a cancelled cycle's wind-down) are discarded, not folded.
    fn fold_result(&self, result: WorkerResult) {
        let mut guard = self.cycle.lock();
        let Some(state) = guard.as_mut() else {
            return;
        };
        if !state.in_flight.contains_key(&result.task.id) {
            debug!(task_id = %result.task.id, "discarded result from a closed cycle");
            return;
        }

        match result.outcome {
            WorkOutcome::Success(_) => {
                state.in_flight.remove(&result.task.id);
                state.completed.push(result.task);
            }
            WorkOutcome::Failure(reason) => {
                match self.registry.queues().requeue(result.task, &reason) {
                    Ok(RequeueOutcome::Requeued { attempts }) => {
                        debug!(attempts, "transient failure requeued");
                    }
                    Ok(RequeueOutcome::FailedPermanently(task)) => {
                        state.in_flight.remove(&task.id);
                        let issue = Issue::new(
                            IssueKind::TaskFailed,
                            IssueSeverity::High,
                            format!(
                                "task permanently failed after {} attempts: {}",
                                task.attempts, task.description
                            ),
                        )
                        .with_department(task.department);
                        self.audit.record(AuditEvent::IssueRaised {
                            issue: issue.clone(),
                        });
                        state.issues.push(issue);
                    }
                    Err(e) => {
                        warn!(error = %e, "requeue rejected");
                        let issue = Issue::new(
                            IssueKind::TaskFailed,
                            IssueSeverity::High,
                            e.to_string(),
                        );
                        self.audit.record(AuditEvent::IssueRaised {
                            issue: issue.clone(),
                        });
                        state.issues.push(issue);
                    }
                }
            }
        }
    }

    /// Flag overdue non-terminal tasks, once each
    fn check_deadlines(&self) {
        let now = Utc::now();
        let mut guard = self.cycle.lock();
        let Some(state) = guard.as_mut() else {
            return;
        };

        let mut raised = Vec::new();
        for task in state.in_flight.values() {
            if task.is_overdue(now) && !state.deadline_flagged.contains(&task.id) {
                let severity = deadline_severity(now - task.deadline);
                raised.push((
                    task.id,
                    Issue::new(
                        IssueKind::DeadlineMissed,
                        severity,
                        format!("deadline passed for: {}", task.description),
                    )
                    .with_department(task.department),
                ));
            }
        }
        for (task_id, issue) in raised {
            warn!(task_id = %task_id, severity = %issue.severity, "deadline missed");
            state.deadline_flagged.insert(task_id);
            self.audit.record(AuditEvent::IssueRaised {
                issue: issue.clone(),
            });
            state.issues.push(issue);
        }
    }

    /// Flag departments whose success rate fell under the threshold
    fn check_success_rates(&self) -> Result<(), EngineError> {
        let snapshot = self.status.snapshot()?;
        let threshold = self.config.success_rate_threshold;

        let mut guard = self.cycle.lock();
        let Some(state) = guard.as_mut() else {
            return Ok(());
        };

        for (department, metrics) in &snapshot.departments {
            if metrics.total == 0 || metrics.success_rate >= threshold {
                continue;
            }
            if !state.rate_flagged.insert(*department) {
                continue;
            }
            let issue = Issue::new(
                IssueKind::LowSuccessRate,
                rate_severity(threshold - metrics.success_rate),
                format!(
                    "success rate {:.2} under threshold {threshold:.2}",
                    metrics.success_rate
                ),
            )
            .with_department(*department);
            warn!(
                department = %department,
                success_rate = metrics.success_rate,
                "success rate under threshold"
            );
            self.audit.record(AuditEvent::IssueRaised {
                issue: issue.clone(),
            });
            state.issues.push(issue);
        }
        Ok(())
    }

    /// Cancelled-cycle wind-down: let in-flight executions finish
    /// cooperatively, then return anything unfinished to pending.
    async fn wind_down(&self) {
        let poll = std::time::Duration::from_millis(self.config.poll_interval_ms);
        let grace_end =
            Utc::now() + Duration::seconds(self.config.monitoring_window_secs as i64);

        while self.registry.total_load() > 0 && Utc::now() < grace_end {
            for result in self.registry.drain_results() {
                self.fold_result(result);
            }
            tokio::time::sleep(poll).await;
        }
        for result in self.registry.drain_results() {
            self.fold_result(result);
        }

        let mut guard = self.cycle.lock();
        if let Some(state) = guard.as_mut() {
            // whatever remains is either already queued as pending or was
            // never picked up; mark the bookkeeping copy accordingly
            let mut returned = 0usize;
            for task in state.in_flight.values_mut() {
                if task.status == TaskStatus::InProgress {
                    task.status = TaskStatus::Pending;
                }
                returned += 1;
            }
            info!(returned, "cancelled cycle; unfinished tasks stay pending");
        }
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("cycle_open", &self.cycle.lock().is_some())
            .field("cancelled", &self.cancelled.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

/// Severity scaled by how far past the deadline the task is
fn deadline_severity(past: Duration) -> IssueSeverity {
    if past > Duration::hours(1) {
        IssueSeverity::Critical
    } else if past > Duration::minutes(15) {
        IssueSeverity::High
    } else {
        IssueSeverity::Medium
    }
}

/// Severity scaled by how far under the threshold the rate fell
fn rate_severity(gap: f64) -> IssueSeverity {
    if gap >= 0.3 {
        IssueSeverity::Critical
    } else if gap >= 0.1 {
        IssueSeverity::High
    } else {
        IssueSeverity::Medium
    }
}
