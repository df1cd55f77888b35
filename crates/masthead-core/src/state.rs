//! Status transition rules for tasks and workers
//!
//! Transitions not listed here are illegal and rejected with
//! [`EngineError::InvalidTransition`]. Terminal task statuses admit nothing.

use crate::error::EngineError;
use crate::types::{TaskStatus, WorkerStatus};

/// Validates a task status transition.
pub fn task_transition(from: TaskStatus, to: TaskStatus) -> Result<(), EngineError> {
    if allowed_task_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(EngineError::InvalidTransition {
            from: from.as_str().to_string(),
            to: to.as_str().to_string(),
        })
    }
}

/// Statuses a task may move to from `from`
#[must_use]
pub fn allowed_task_transitions(from: TaskStatus) -> Vec<TaskStatus> {
    use TaskStatus::*;
    match from {
        Pending => vec![InProgress, Blocked, Failed],
        InProgress => vec![Completed, Failed, Pending],
        Blocked => vec![Pending, Failed],
        Completed => vec![],
        Failed => vec![],
    }
}

/// Validates a worker status transition.
///
/// `Offline -> Online` is reserved for the external reset path.
pub fn worker_transition(from: WorkerStatus, to: WorkerStatus) -> Result<(), EngineError> {
    if allowed_worker_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(EngineError::InvalidTransition {
            from: from.as_str().to_string(),
            to: to.as_str().to_string(),
        })
    }
}

/// Statuses a worker may move to from `from`
#[must_use]
pub fn allowed_worker_transitions(from: WorkerStatus) -> Vec<WorkerStatus> {
    use WorkerStatus::*;
    match from {
        Online => vec![Busy, Offline],
        Busy => vec![Online, Offline],
        Offline => vec![Online],
    }
}
