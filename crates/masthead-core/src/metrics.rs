//! Status aggregation
//!
//! Workers report outcomes concurrently; the aggregator folds them into
//! per-department performance counters and serves immutable snapshots with a
//! system-wide rollup. Department entries update under their shard lock, so
//! interleaved records never lose updates.

use crate::error::EngineError;
use crate::types::{Department, PerformanceMetrics, WorkerResult};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Source of department status for planning and monitoring.
///
/// The in-process [`StatusAggregator`] is the production implementation; the
/// seam exists so an unavailable feed can surface as
/// [`EngineError::AggregationUnavailable`].
pub trait StatusFeed: Send + Sync {
    /// Fold one worker result into the owning department's metrics
    fn record(&self, result: &WorkerResult);

    /// Immutable copy of all departments' metrics plus the system rollup
    fn snapshot(&self) -> Result<StatusSnapshot, EngineError>;

    /// Register a department so snapshots list it before its first result
    fn ensure_department(&self, department: Department);
}

/// System-wide rollup across departments
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SystemRollup {
    /// Sum of completed tasks
    pub completed: u64,
    /// Sum of recorded outcomes
    pub total: u64,
    /// Worst department success rate; 1.0 when nothing is recorded
    pub min_success_rate: f64,
}

impl Default for SystemRollup {
    fn default() -> Self {
        Self {
            completed: 0,
            total: 0,
            min_success_rate: 1.0,
        }
    }
}

/// Point-in-time view of every department's performance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    /// Per-department counters
    pub departments: BTreeMap<Department, PerformanceMetrics>,
    /// Cross-department rollup
    pub system: SystemRollup,
    /// When the snapshot was taken
    pub taken_at: DateTime<Utc>,
}

impl StatusSnapshot {
    /// Success rate for a department; 1.0 when it has no recorded outcomes
    #[inline]
    #[must_use]
    pub fn success_rate_for(&self, department: Department) -> f64 {
        self.departments
            .get(&department)
            .map_or(1.0, |m| m.success_rate)
    }
}

/// Concurrent per-department performance aggregator
#[derive(Debug)]
pub struct StatusAggregator {
    departments: DashMap<Department, PerformanceMetrics>,
    alpha: f64,
}

impl StatusAggregator {
    /// Create an aggregator with the given response-time smoothing factor
    #[must_use]
    pub fn new(alpha: f64) -> Self {
        Self {
            departments: DashMap::new(),
            alpha,
        }
    }
}

impl Default for StatusAggregator {
    fn default() -> Self {
        Self::new(0.2)
    }
}

impl StatusFeed for StatusAggregator {
    fn record(&self, result: &WorkerResult) {
        let department = result.task.department;
        let success = result.outcome.is_success();
        let sample = result.duration_ms as f64;

        let mut entry = self.departments.entry(department).or_default();
        entry.total += 1;
        if success {
            entry.completed += 1;
        }
        entry.success_rate = entry.completed as f64 / entry.total as f64;
        entry.avg_response_time_ms = if entry.total == 1 {
            sample
        } else {
            self.alpha * sample + (1.0 - self.alpha) * entry.avg_response_time_ms
        };

        debug!(
            department = %department,
            success,
            total = entry.total,
            success_rate = entry.success_rate,
            "recorded worker result"
        );
    }

    fn snapshot(&self) -> Result<StatusSnapshot, EngineError> {
        let departments: BTreeMap<Department, PerformanceMetrics> = self
            .departments
            .iter()
            .map(|entry| (*entry.key(), *entry.value()))
            .collect();

        let mut system = SystemRollup::default();
        for metrics in departments.values() {
            system.completed += metrics.completed;
            system.total += metrics.total;
            if metrics.success_rate < system.min_success_rate {
                system.min_success_rate = metrics.success_rate;
            }
        }

        Ok(StatusSnapshot {
            departments,
            system,
            taken_at: Utc::now(),
        })
    }

    fn ensure_department(&self, department: Department) {
        self.departments.entry(department).or_default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Task, WorkMetrics, WorkOutcome, WorkerId};

    fn result_for(department: Department, success: bool, duration_ms: u64) -> WorkerResult {
        let task = Task::new(department, "aggregation sample");
        WorkerResult {
            task,
            worker: WorkerId::new(),
            outcome: if success {
                WorkOutcome::Success(WorkMetrics::new(duration_ms))
            } else {
                WorkOutcome::Failure("simulated".into())
            },
            duration_ms,
        }
    }

    #[test]
    fn success_rate_is_completed_over_total() {
        let agg = StatusAggregator::default();
        for _ in 0..9 {
            agg.record(&result_for(Department::Content, true, 100));
        }
        agg.record(&result_for(Department::Content, false, 100));

        let snap = agg.snapshot().unwrap();
        let metrics = snap.departments[&Department::Content];
        assert_eq!(metrics.completed, 9);
        assert_eq!(metrics.total, 10);
        assert!((metrics.success_rate - 0.9).abs() < 1e-9);
    }

    #[test]
    fn first_sample_seeds_response_time() {
        let agg = StatusAggregator::new(0.2);
        agg.record(&result_for(Department::Production, true, 400));
        let snap = agg.snapshot().unwrap();
        let metrics = snap.departments[&Department::Production];
        assert!((metrics.avg_response_time_ms - 400.0).abs() < 1e-9);
    }

    #[test]
    fn response_time_is_exponentially_weighted() {
        let agg = StatusAggregator::new(0.5);
        agg.record(&result_for(Department::Production, true, 100));
        agg.record(&result_for(Department::Production, true, 300));

        let snap = agg.snapshot().unwrap();
        let metrics = snap.departments[&Department::Production];
        // 0.5 * 300 + 0.5 * 100
        assert!((metrics.avg_response_time_ms - 200.0).abs() < 1e-9);
    }

    #[test]
    fn rollup_takes_minimum_success_rate() {
        let agg = StatusAggregator::default();
        agg.record(&result_for(Department::Content, true, 10));
        agg.record(&result_for(Department::Marketing, true, 10));
        agg.record(&result_for(Department::Marketing, false, 10));

        let snap = agg.snapshot().unwrap();
        assert_eq!(snap.system.completed, 2);
        assert_eq!(snap.system.total, 3);
        assert!((snap.system.min_success_rate - 0.5).abs() < 1e-9);
    }

    #[test]
    fn empty_snapshot_reads_healthy() {
        let agg = StatusAggregator::default();
        let snap = agg.snapshot().unwrap();
        assert!(snap.departments.is_empty());
        assert!((snap.system.min_success_rate - 1.0).abs() < f64::EPSILON);
        assert!((snap.success_rate_for(Department::Content) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn ensure_department_lists_it_before_results() {
        let agg = StatusAggregator::default();
        agg.ensure_department(Department::Operations);
        let snap = agg.snapshot().unwrap();
        assert_eq!(snap.departments[&Department::Operations].total, 0);
        assert!((snap.system.min_success_rate - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn concurrent_records_lose_nothing() {
        use std::sync::Arc;
        use std::thread;

        let agg = Arc::new(StatusAggregator::default());
        let workers = 8;
        let per_worker = 250;

        let mut handles = Vec::new();
        for w in 0..workers {
            let agg = Arc::clone(&agg);
            handles.push(thread::spawn(move || {
                for i in 0..per_worker {
                    let dept = Department::ALL[(w + i) % Department::ALL.len()];
                    // every fourth record is a failure
                    agg.record(&result_for(dept, i % 4 != 0, 50));
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let snap = agg.snapshot().unwrap();
        let expected_total = (workers * per_worker) as u64;
        assert_eq!(snap.system.total, expected_total);

        let recomputed: u64 = snap.departments.values().map(|m| m.completed).sum();
        assert_eq!(snap.system.completed, recomputed);
        for metrics in snap.departments.values() {
            assert!(
                (metrics.success_rate - metrics.completed as f64 / metrics.total as f64).abs()
                    < 1e-9
            );
        }
    }
}
