//! Masthead Core - dispatch vocabulary and governance
//!
//! The foundation the coordinator and workers are built on:
//! - Departments, tasks, priorities and lifecycle statuses
//! - Budget ledger with atomic check-then-debit
//! - Autonomy gate classifying proposals before execution
//! - Concurrent status aggregation with system rollups
//! - Immutable daily plan and report artifacts
//!
//! # Example
//!
//! ```rust,ignore
//! use masthead_core::{AutonomyGate, BudgetLedger, Department, EngineConfig};
//! use std::sync::Arc;
//!
//! let config = EngineConfig::new().with_daily_limit(1_000.0);
//! let ledger = Arc::new(BudgetLedger::new(&config.budget));
//! let gate = AutonomyGate::new(&config.autonomy, ledger, approvals);
//!
//! let decision = gate.evaluate(Department::Content, "commission explainer video", 200.0);
//! assert!(decision.classification.executes_immediately());
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

// Core modules
pub mod budget;
pub mod config;
pub mod error;
pub mod external;
pub mod gate;
pub mod metrics;
pub mod report;
pub mod state;
pub mod types;

// Re-exports for convenience
pub use budget::{BudgetLedger, BudgetSnapshot, DepartmentSpend};
pub use config::{AutonomyConfig, BudgetConfig, EngineConfig};
pub use error::EngineError;
pub use external::{MetricsSource, WorkExecutor, WorkFailure};
pub use gate::{
    ApprovalHandler, ApprovalOutcome, ApprovalVerdict, AutonomyDecision, AutonomyGate,
    Classification, RuleSet,
};
pub use metrics::{StatusAggregator, StatusFeed, StatusSnapshot, SystemRollup};
pub use report::{DailyPlan, DailyReport};
pub use types::{
    BusinessMetrics, CycleId, Department, Issue, IssueKind, IssueSeverity, PerformanceMetrics,
    Priority, Task, TaskId, TaskStatus, WorkMetrics, WorkOutcome, WorkerHandle, WorkerId,
    WorkerResult, WorkerStatus,
};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with Masthead Core
    pub use crate::{
        AutonomyDecision, AutonomyGate, BudgetLedger, Classification, DailyPlan, DailyReport,
        Department, EngineConfig, EngineError, Issue, IssueSeverity, Priority, StatusAggregator,
        StatusFeed, Task, TaskId, TaskStatus, WorkExecutor, WorkerHandle, WorkerResult,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod integration_tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct ApproveAll;

    #[async_trait]
    impl ApprovalHandler for ApproveAll {
        async fn resolve(&self, _decision: &AutonomyDecision) -> gate::ApprovalVerdict {
            gate::ApprovalVerdict::Approved
        }
    }

    #[test]
    fn gate_and_ledger_share_state() {
        let config = EngineConfig::new().with_daily_limit(1_000.0);
        let ledger = Arc::new(BudgetLedger::new(&config.budget));
        let gate = AutonomyGate::new(&config.autonomy, Arc::clone(&ledger), Arc::new(ApproveAll));

        let decision = gate.evaluate(Department::Content, "commission explainer video", 200.0);
        assert_eq!(decision.classification, Classification::Auto);
        assert!((ledger.spent_today() - 200.0).abs() < 1e-9);
    }

    #[test]
    fn aggregator_feeds_snapshot() {
        let agg = StatusAggregator::default();
        agg.ensure_department(Department::Distribution);
        let snap = agg.snapshot().unwrap();
        assert!(snap.departments.contains_key(&Department::Distribution));
    }
}
