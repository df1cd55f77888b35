//! Error types for the dispatch engine
//!
//! One taxonomy shared across the workspace:
//! - Transient vs. permanent task failures
//! - Budget and approval rejections
//! - Department availability
//! - Aggregation and lifecycle failures

use crate::types::{Department, TaskId};

/// Main engine error type
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A worker execution failed in a way that permits retry
    #[error("transient worker failure in {department}: {reason}")]
    TransientWorkerFailure {
        /// Department whose worker failed
        department: Department,
        /// Captured failure detail
        reason: String,
    },

    /// A task exhausted its retry budget
    #[error("task {task_id} permanently failed after {attempts} attempts")]
    PermanentTaskFailure {
        /// The failed task
        task_id: TaskId,
        /// Attempts consumed
        attempts: u32,
    },

    /// A proposed spend would push the ledger past its limit
    #[error("budget exceeded: {action} costs {cost:.2} with {remaining:.2} remaining")]
    BudgetExceeded {
        /// Proposed action
        action: String,
        /// Proposed cost
        cost: f64,
        /// Budget remaining before the proposal
        remaining: f64,
    },

    /// Department cannot take work this cycle
    #[error("department {department} unavailable: {reason}")]
    DepartmentUnavailable {
        /// The unavailable department
        department: Department,
        /// Why it is unavailable
        reason: String,
    },

    /// The status feed cannot produce a snapshot
    #[error("status aggregation unavailable: {0}")]
    AggregationUnavailable(String),

    /// Illegal status transition
    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition {
        /// Current status
        from: String,
        /// Requested status
        to: String,
    },

    /// Department was never registered with the engine
    #[error("department {0} is not registered")]
    UnknownDepartment(Department),

    /// Worker task is gone; its channel is closed
    #[error("worker channel closed for {department}")]
    WorkerChannelClosed {
        /// Department whose worker vanished
        department: Department,
    },

    /// Configuration rejected at validation
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A phase was triggered before planning opened a cycle
    #[error("no active cycle; planning has not run")]
    NoActiveCycle,

    /// Cycle was cancelled by an external signal
    #[error("cycle cancelled during {phase}")]
    CycleCancelled {
        /// Phase active when the cancel landed
        phase: String,
    },
}

impl EngineError {
    /// Whether the failed operation may be retried
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientWorkerFailure { .. })
    }

    /// Whether the error is attributable to a single department
    #[inline]
    #[must_use]
    pub fn is_department_scoped(&self) -> bool {
        matches!(
            self,
            Self::TransientWorkerFailure { .. }
                | Self::PermanentTaskFailure { .. }
                | Self::DepartmentUnavailable { .. }
                | Self::WorkerChannelClosed { .. }
        )
    }

    /// Whether the error ends the current cycle instead of becoming an issue
    #[inline]
    #[must_use]
    pub fn aborts_cycle(&self) -> bool {
        matches!(
            self,
            Self::AggregationUnavailable(_) | Self::InvalidConfig(_) | Self::CycleCancelled { .. }
        )
    }
}
