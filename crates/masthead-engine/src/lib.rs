//! Masthead Engine - coordinator, department workers and task queues
//!
//! The runtime half of the workspace:
//! - Per-department priority queues with retry bookkeeping
//! - Spawned department workers executing injected work callbacks
//! - A registry owning workers and queues explicitly
//! - The cycle planner and the four-phase coordinator
//! - An in-memory audit trail drained into each daily report
//!
//! # Example
//!
//! ```rust,ignore
//! use masthead_engine::{Coordinator, DepartmentRegistry};
//! use masthead_core::{AutonomyGate, BudgetLedger, EngineConfig, StatusAggregator};
//! use std::sync::Arc;
//!
//! let config = EngineConfig::default();
//! let aggregator = Arc::new(StatusAggregator::new(config.response_time_alpha));
//! let registry = Arc::new(DepartmentRegistry::new(&config, aggregator.clone()));
//! for department in masthead_core::Department::ALL {
//!     registry.spawn_department(department, executor.clone())?;
//! }
//! let coordinator = Coordinator::new(config, registry, gate, aggregator, metrics)?;
//! let report = coordinator.run_cycle().await?;
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

// Engine modules
pub mod audit;
pub mod coordinator;
pub mod planning;
pub mod queue;
pub mod registry;
pub mod worker;

// Re-exports for convenience
pub use audit::{AuditEntry, AuditEvent, AuditLog};
pub use coordinator::Coordinator;
pub use planning::{CyclePlanner, ProposedAction};
pub use queue::{DispatchQueues, RequeueOutcome};
pub use registry::{DepartmentRegistry, RegistryStats};
pub use worker::{AssignReply, WorkerClient};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
