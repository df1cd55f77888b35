//! Per-department dispatch queues
//!
//! Each department owns an independent priority queue; operations on one
//! department never block another. Ordering within a queue: high priority
//! before medium before low, ties broken by earliest deadline, then insertion
//! order. Retry bookkeeping lives here: a transiently failed task is requeued
//! until its attempts reach the configured limit, then it fails permanently
//! and lands in the failed-task drain exactly once.

use dashmap::DashMap;
use masthead_core::state::task_transition;
use masthead_core::types::{Department, Task, TaskStatus};
use masthead_core::EngineError;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BinaryHeap};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

/// A queued task plus its insertion sequence for stable tie-breaking
#[derive(Debug)]
struct QueuedTask {
    task: Task,
    seq: u64,
}

impl PartialEq for QueuedTask {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for QueuedTask {}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedTask {
    // BinaryHeap pops the greatest element, so "greater" means "dispatches
    // first": lower priority rank, then earlier deadline, then lower sequence.
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other
            .task
            .priority
            .rank()
            .cmp(&self.task.priority.rank())
            .then_with(|| other.task.deadline.cmp(&self.task.deadline))
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// What happened to a requeued task
#[derive(Debug)]
pub enum RequeueOutcome {
    /// Back in the queue for another attempt
    Requeued {
        /// Attempts consumed so far
        attempts: u32,
    },
    /// Retry budget exhausted; the task is in the failed drain
    FailedPermanently(Task),
}

/// Independent per-department priority queues with retry bookkeeping
#[derive(Debug)]
pub struct DispatchQueues {
    queues: DashMap<Department, BinaryHeap<QueuedTask>>,
    failed: Mutex<Vec<Task>>,
    seq: AtomicU64,
    max_attempts: u32,
}

impl DispatchQueues {
    /// Create queues with the given retry limit
    #[must_use]
    pub fn new(max_attempts: u32) -> Self {
        Self {
            queues: DashMap::new(),
            failed: Mutex::new(Vec::new()),
            seq: AtomicU64::new(0),
            max_attempts,
        }
    }

    /// Append a task, preserving priority ordering
    pub fn enqueue(&self, task: Task) {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        debug!(
            department = %task.department,
            task_id = %task.id,
            priority = %task.priority,
            "enqueued task"
        );
        self.queues
            .entry(task.department)
            .or_default()
            .push(QueuedTask { task, seq });
    }

    /// Remove and return the next eligible task, or `None` when drained
    pub fn dequeue(&self, department: Department) -> Option<Task> {
        self.queues
            .get_mut(&department)
            .and_then(|mut queue| queue.pop())
            .map(|entry| entry.task)
    }

    /// Return a transiently failed task for another attempt.
    ///
    /// Increments the attempt count; once it reaches the retry limit the task
    /// transitions to `Failed` and moves to the failed drain instead of being
    /// retried forever.
    pub fn requeue(&self, mut task: Task, reason: &str) -> Result<RequeueOutcome, EngineError> {
        task.attempts += 1;

        if task.attempts >= self.max_attempts {
            task_transition(task.status, TaskStatus::Failed)?;
            task.status = TaskStatus::Failed;
            task.assigned_worker = None;
            warn!(
                department = %task.department,
                task_id = %task.id,
                attempts = task.attempts,
                reason,
                "task failed permanently"
            );
            self.failed.lock().push(task.clone());
            return Ok(RequeueOutcome::FailedPermanently(task));
        }

        task_transition(task.status, TaskStatus::Pending)?;
        task.status = TaskStatus::Pending;
        task.assigned_worker = None;
        warn!(
            department = %task.department,
            task_id = %task.id,
            attempts = task.attempts,
            reason,
            "requeued task"
        );
        let attempts = task.attempts;
        self.enqueue(task);
        Ok(RequeueOutcome::Requeued { attempts })
    }

    /// Pending tasks for one department
    #[must_use]
    pub fn depth(&self, department: Department) -> usize {
        self.queues.get(&department).map_or(0, |queue| queue.len())
    }

    /// Pending tasks across all departments
    #[must_use]
    pub fn depths(&self) -> BTreeMap<Department, usize> {
        self.queues
            .iter()
            .map(|entry| (*entry.key(), entry.value().len()))
            .collect()
    }

    /// Whether every department's queue is drained
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queues.iter().all(|entry| entry.value().is_empty())
    }

    /// Permanently failed tasks, yielded exactly once
    #[must_use]
    pub fn drain_failed(&self) -> Vec<Task> {
        std::mem::take(&mut *self.failed.lock())
    }
}
