//! Daily plan and report artifacts
//!
//! Both are assembled once per cycle and never mutated afterwards; a new
//! cycle emits new values. They serialize verbatim for any external store or
//! transport.

use crate::budget::BudgetSnapshot;
use crate::gate::AutonomyDecision;
use crate::metrics::SystemRollup;
use crate::types::{
    BusinessMetrics, CycleId, Department, Issue, IssueSeverity, PerformanceMetrics, Task,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The morning plan: allocations, generated tasks and gate decisions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyPlan {
    /// Cycle this plan belongs to
    pub cycle_id: CycleId,
    /// When planning finished
    pub created_at: DateTime<Utc>,
    /// Budget allocated per department
    pub allocations: BTreeMap<Department, f64>,
    /// Tasks generated per department
    pub tasks: BTreeMap<Department, Vec<Task>>,
    /// Every strategic proposal the gate classified
    pub proposals: Vec<AutonomyDecision>,
}

impl DailyPlan {
    /// Tasks planned for one department
    #[inline]
    #[must_use]
    pub fn tasks_for(&self, department: Department) -> &[Task] {
        self.tasks.get(&department).map_or(&[], Vec::as_slice)
    }

    /// Total tasks across all departments
    #[inline]
    #[must_use]
    pub fn total_tasks(&self) -> usize {
        self.tasks.values().map(Vec::len).sum()
    }
}

/// The evening report: outcomes, metrics, spend and issues
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyReport {
    /// Cycle this report closes
    pub cycle_id: CycleId,
    /// When reporting finished
    pub generated_at: DateTime<Utc>,
    /// Tasks that completed successfully
    pub completed: Vec<Task>,
    /// Tasks that failed permanently
    pub failed: Vec<Task>,
    /// Per-department performance at close
    pub departments: BTreeMap<Department, PerformanceMetrics>,
    /// System-wide rollup at close
    pub system: SystemRollup,
    /// Revenue and content figures from the external source
    pub business: BusinessMetrics,
    /// Ledger state before the day was cleared
    pub budget: BudgetSnapshot,
    /// Auto-approved actions flagged for visibility
    pub flagged_decisions: Vec<AutonomyDecision>,
    /// Everything that went wrong, attributed and graded
    pub issues: Vec<Issue>,
}

impl DailyReport {
    /// Number of successfully completed tasks
    #[inline]
    #[must_use]
    pub fn completed_count(&self) -> usize {
        self.completed.len()
    }

    /// Number of permanently failed tasks
    #[inline]
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    /// Whether any issue reached the given severity
    #[inline]
    #[must_use]
    pub fn has_issues_at(&self, severity: IssueSeverity) -> bool {
        self.issues.iter().any(|i| i.severity >= severity)
    }

    /// Issues attributed to one department
    #[must_use]
    pub fn issues_for(&self, department: Department) -> Vec<&Issue> {
        self.issues
            .iter()
            .filter(|i| i.department == Some(department))
            .collect()
    }
}
