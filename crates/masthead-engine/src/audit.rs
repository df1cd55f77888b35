//! Cycle audit trail
//!
//! An in-memory, append-only record of what the coordinator did during the
//! current day: phase boundaries, gate decisions, approval resolutions,
//! dispatches and raised issues. Reporting drains the flagged decisions into
//! the daily report; the whole log is cleared with the budget ledger when the
//! day closes.

use chrono::{DateTime, Utc};
use masthead_core::gate::{AutonomyDecision, Classification};
use masthead_core::types::{Department, Issue, TaskId};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// One recorded coordinator action
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "kebab-case", tag = "event")]
pub enum AuditEvent {
    /// A cycle phase began
    PhaseStarted {
        /// Phase name
        phase: &'static str,
    },
    /// A cycle phase finished
    PhaseEnded {
        /// Phase name
        phase: &'static str,
    },
    /// The gate classified a proposal
    GateDecision {
        /// The full decision
        decision: AutonomyDecision,
    },
    /// An approval-required decision was resolved externally
    ApprovalResolved {
        /// Department the action was attributed to
        department: Department,
        /// Action text
        action: String,
        /// Whether the approver released the action
        approved: bool,
    },
    /// A task was enqueued for its department
    TaskDispatched {
        /// Dispatched task
        task_id: TaskId,
        /// Owning department
        department: Department,
    },
    /// An issue was raised during the cycle
    IssueRaised {
        /// The issue as it will appear in the report
        issue: Issue,
    },
}

/// An audit event with its position in the day's sequence
#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    /// Monotonic sequence number within the day
    pub seq: u64,
    /// When the event was recorded
    pub at: DateTime<Utc>,
    /// What happened
    pub event: AuditEvent,
}

/// Append-only in-memory audit log, bounded to the current day
#[derive(Debug, Default)]
pub struct AuditLog {
    entries: Mutex<Vec<AuditEntry>>,
    seq: AtomicU64,
}

impl AuditLog {
    /// Create an empty log
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one event; returns its sequence number
    pub fn record(&self, event: AuditEvent) -> u64 {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        self.entries.lock().push(AuditEntry {
            seq,
            at: Utc::now(),
            event,
        });
        seq
    }

    /// Copy of every entry recorded today
    #[must_use]
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().clone()
    }

    /// Number of entries recorded today
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether nothing has been recorded today
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Decisions flagged for the report: must-report classifications
    #[must_use]
    pub fn flagged_decisions(&self) -> Vec<AutonomyDecision> {
        self.entries
            .lock()
            .iter()
            .filter_map(|entry| match &entry.event {
                AuditEvent::GateDecision { decision }
                    if decision.classification == Classification::MustReport =>
                {
                    Some(decision.clone())
                }
                _ => None,
            })
            .collect()
    }

    /// Clear the day's trail for the next cycle
    pub fn clear_day(&self) {
        self.entries.lock().clear();
    }
}
