//! Cycle planning
//!
//! Task generation extracted from the coordinator: given the latest status
//! snapshot and the budget split, the planner produces each department's
//! tasks for the cycle with deadlines relative to cycle start, plus the
//! strategic spend proposals the autonomy gate classifies before dispatch.

use chrono::{DateTime, Duration, Utc};
use masthead_core::types::{Department, Priority, Task};
use masthead_core::{EngineConfig, StatusSnapshot};
use std::collections::BTreeMap;
use tracing::debug;

/// A strategic spend the coordinator runs through the autonomy gate
#[derive(Debug, Clone, PartialEq)]
pub struct ProposedAction {
    /// Department the spend is attributed to
    pub department: Department,
    /// Action text, matched against the autonomy rule sets
    pub action: String,
    /// Proposed cost
    pub cost: f64,
}

/// Generates each cycle's tasks and proposals
#[derive(Debug, Clone)]
pub struct CyclePlanner {
    config: EngineConfig,
}

impl CyclePlanner {
    /// Create a planner over the engine configuration
    #[inline]
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// Budget allocated to each department by the configured split
    #[must_use]
    pub fn allocations(&self) -> BTreeMap<Department, f64> {
        Department::ALL
            .iter()
            .map(|d| (*d, self.config.budget.allocation_for(*d)))
            .collect()
    }

    /// Generate the cycle's tasks per department.
    ///
    /// Every department gets its configured batch with deadlines relative to
    /// `cycle_start`. A department whose recent success rate sits under the
    /// monitoring threshold additionally gets a high-priority remediation
    /// task ahead of its routine work.
    #[must_use]
    pub fn generate_tasks(
        &self,
        snapshot: &StatusSnapshot,
        cycle_start: DateTime<Utc>,
    ) -> BTreeMap<Department, Vec<Task>> {
        let deadline = cycle_start + Duration::seconds(self.config.task_deadline_secs as i64);
        let mut planned = BTreeMap::new();

        for department in Department::ALL {
            let mut tasks = Vec::new();

            let rate = snapshot.success_rate_for(department);
            if rate < self.config.success_rate_threshold {
                debug!(
                    department = %department,
                    success_rate = rate,
                    "planning remediation task"
                );
                tasks.push(
                    Task::new(department, remediation_description(department))
                        .with_priority(Priority::High)
                        .with_deadline(deadline),
                );
            }

            for batch in 0..self.config.tasks_per_department {
                tasks.push(
                    Task::new(department, routine_description(department, batch))
                        .with_priority(Priority::Medium)
                        .with_deadline(deadline),
                );
            }

            planned.insert(department, tasks);
        }

        planned
    }

    /// Derive the cycle's strategic spend proposals.
    ///
    /// One per department, costed at half the department's allocation so the
    /// ledger keeps headroom for approvals resolved later in the day.
    #[must_use]
    pub fn proposals(&self) -> Vec<ProposedAction> {
        Department::ALL
            .iter()
            .map(|d| ProposedAction {
                department: *d,
                action: proposal_description(*d).to_string(),
                cost: self.config.budget.allocation_for(*d) * 0.5,
            })
            .collect()
    }
}

fn routine_description(department: Department, batch: usize) -> String {
    let work = match department {
        Department::Content => "draft daily editorial batch",
        Department::Production => "produce scheduled episode segment",
        Department::Distribution => "syndicate fresh content to channels",
        Department::Marketing => "run audience growth push",
        Department::Operations => "reconcile vendor invoices",
    };
    format!("{work} {}", batch + 1)
}

fn remediation_description(department: Department) -> String {
    format!("remediate failing {department} pipeline")
}

fn proposal_description(department: Department) -> &'static str {
    match department {
        Department::Content => "commission freelance feature package",
        Department::Production => "book studio session block",
        Department::Distribution => "expand syndication slots",
        Department::Marketing => "refresh sponsorship inventory",
        Department::Operations => "renew vendor contract bundle",
    }
}
