//! External collaborator seams
//!
//! The engine consumes real content, production and revenue logic through
//! these traits. Implementations live outside the engine; tests use scripted
//! ones.

use crate::error::EngineError;
use crate::types::{BusinessMetrics, Task, WorkMetrics};
use async_trait::async_trait;

/// A failure captured from an external work executor.
///
/// Always treated as transient by the engine; the retry budget decides when
/// it becomes permanent.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct WorkFailure {
    /// Captured failure detail
    pub message: String,
}

impl WorkFailure {
    /// Capture a failure message
    #[inline]
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for WorkFailure {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for WorkFailure {
    fn from(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

/// Executes the real work behind a task.
///
/// One implementation per department, injected at worker spawn. The engine
/// never inspects what the executor did beyond success metrics or the
/// captured failure.
#[async_trait]
pub trait WorkExecutor: Send + Sync {
    /// Execute a task and report metrics or a captured failure
    async fn execute(&self, task: &Task) -> Result<WorkMetrics, WorkFailure>;
}

/// Read accessor for current revenue and content-production figures.
///
/// Consulted once per cycle during reporting; treated as an opaque provider.
#[async_trait]
pub trait MetricsSource: Send + Sync {
    /// Current business figures
    async fn business_snapshot(&self) -> Result<BusinessMetrics, EngineError>;
}
