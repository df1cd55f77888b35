//! Core types for the dispatch engine
//!
//! Defines the fundamental vocabulary shared by every component:
//! - Departments and their canonical ordering
//! - Tasks, priorities and lifecycle statuses
//! - Worker handles and performance snapshots
//! - Issues raised during a cycle

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unique task identifier (ULID for sortability)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskId(pub Ulid);

impl TaskId {
    /// Generate new task ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique worker identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WorkerId(pub Ulid);

impl WorkerId {
    /// Generate new worker ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for WorkerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for WorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique cycle identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CycleId(pub Ulid);

impl CycleId {
    /// Generate new cycle ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for CycleId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CycleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A named unit of work specialization
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Department {
    /// Editorial and content creation
    Content,
    /// Audio/video production
    Production,
    /// Syndication and channel distribution
    Distribution,
    /// Audience growth and campaigns
    Marketing,
    /// Back office and vendor management
    Operations,
}

impl Department {
    /// All departments in canonical order
    pub const ALL: [Department; 5] = [
        Department::Content,
        Department::Production,
        Department::Distribution,
        Department::Marketing,
        Department::Operations,
    ];

    /// Lowercase department name
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Department::Content => "content",
            Department::Production => "production",
            Department::Distribution => "distribution",
            Department::Marketing => "marketing",
            Department::Operations => "operations",
        }
    }

    /// Default share of the daily budget allocated to this department
    #[inline]
    #[must_use]
    pub fn default_share(&self) -> f64 {
        match self {
            Department::Content => 0.30,
            Department::Production => 0.25,
            Department::Distribution => 0.25,
            Department::Marketing => 0.15,
            Department::Operations => 0.05,
        }
    }
}

impl std::fmt::Display for Department {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Task priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Dispatched before everything else in the department
    High,
    /// Normal daily work
    Medium,
    /// Backfill when the queue is otherwise drained
    Low,
}

impl Priority {
    /// Numeric rank; lower dispatches first
    #[inline]
    #[must_use]
    pub fn rank(&self) -> u8 {
        match self {
            Priority::High => 0,
            Priority::Medium => 1,
            Priority::Low => 2,
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Medium
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        };
        write!(f, "{s}")
    }
}

/// Task lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    /// Queued, not yet owned by a worker
    Pending,
    /// Owned and executing on a worker
    InProgress,
    /// Finished successfully
    Completed,
    /// Held back (department offline)
    Blocked,
    /// Exhausted retries or rejected permanently
    Failed,
}

impl TaskStatus {
    /// Whether this status admits no further transitions
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// Status name
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in-progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Blocked => "blocked",
            TaskStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Worker availability status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    /// Idle and accepting assignments
    Online,
    /// At least one task in flight
    Busy,
    /// Failed health checks; requires external reset
    Offline,
}

impl WorkerStatus {
    /// Status name
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerStatus::Online => "online",
            WorkerStatus::Busy => "busy",
            WorkerStatus::Offline => "offline",
        }
    }
}

impl std::fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A dispatchable unit of department work
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Task identifier
    pub id: TaskId,
    /// Owning department
    pub department: Department,
    /// Human-readable description
    pub description: String,
    /// Dispatch priority
    pub priority: Priority,
    /// Completion deadline
    pub deadline: DateTime<Utc>,
    /// Worker currently owning the task, if any
    pub assigned_worker: Option<WorkerId>,
    /// Lifecycle status
    pub status: TaskStatus,
    /// Delivery attempts so far
    pub attempts: u32,
}

impl Task {
    /// Create a new pending task with a one-hour default deadline
    #[must_use]
    pub fn new(department: Department, description: impl Into<String>) -> Self {
        Self {
            id: TaskId::new(),
            department,
            description: description.into(),
            priority: Priority::default(),
            deadline: Utc::now() + chrono::Duration::hours(1),
            assigned_worker: None,
            status: TaskStatus::Pending,
            attempts: 0,
        }
    }

    /// With priority
    #[inline]
    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// With deadline
    #[inline]
    #[must_use]
    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Whether the deadline has passed while the task is non-terminal
    #[inline]
    #[must_use]
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        !self.status.is_terminal() && self.deadline < now
    }
}

/// Per-department performance counters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    /// Successfully completed tasks
    pub completed: u64,
    /// All recorded outcomes
    pub total: u64,
    /// completed / total; 1.0 when nothing has been recorded
    pub success_rate: f64,
    /// Exponentially weighted response time in milliseconds
    pub avg_response_time_ms: f64,
}

impl Default for PerformanceMetrics {
    fn default() -> Self {
        Self {
            completed: 0,
            total: 0,
            success_rate: 1.0,
            avg_response_time_ms: 0.0,
        }
    }
}

/// Read-only view of a department worker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerHandle {
    /// Worker identifier
    pub id: WorkerId,
    /// Worker name, unique per department
    pub name: String,
    /// Department served
    pub department: Department,
    /// Availability
    pub status: WorkerStatus,
    /// Tasks currently in flight
    pub current_load: usize,
    /// Running performance counters
    pub performance: PerformanceMetrics,
}

/// Metrics reported by a work executor on success
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkMetrics {
    /// Wall time the execution took
    pub duration_ms: u64,
    /// Optional executor-provided summary line
    pub output: Option<String>,
}

impl WorkMetrics {
    /// Create metrics with a duration
    #[inline]
    #[must_use]
    pub fn new(duration_ms: u64) -> Self {
        Self {
            duration_ms,
            output: None,
        }
    }

    /// With output summary
    #[inline]
    #[must_use]
    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = Some(output.into());
        self
    }
}

/// Outcome of one task execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WorkOutcome {
    /// Execution finished and produced metrics
    Success(WorkMetrics),
    /// Execution failed; the error is captured, never propagated
    Failure(String),
}

impl WorkOutcome {
    /// Whether the outcome is a success
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, WorkOutcome::Success(_))
    }
}

/// One finished task, as reported by its worker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerResult {
    /// The task in its final (or retry-eligible) state
    pub task: Task,
    /// Worker that executed it
    pub worker: WorkerId,
    /// Success or captured failure
    pub outcome: WorkOutcome,
    /// Execution wall time in milliseconds
    pub duration_ms: u64,
}

/// Revenue and content figures from the external metrics source
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BusinessMetrics {
    /// Revenue recognized today
    pub revenue: f64,
    /// Content pieces published today
    pub content_published: u32,
    /// Audience reached across channels
    pub audience_reach: u64,
}

/// Issue severity, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    /// Informational; no action expected
    Low,
    /// Worth a look during the next review
    Medium,
    /// Needs attention today
    High,
    /// Blocking the department or the day's plan
    Critical,
}

impl std::fmt::Display for IssueSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            IssueSeverity::Low => "low",
            IssueSeverity::Medium => "medium",
            IssueSeverity::High => "high",
            IssueSeverity::Critical => "critical",
        };
        write!(f, "{s}")
    }
}

/// What kind of anomaly an issue records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IssueKind {
    /// A task exhausted its retries
    TaskFailed,
    /// A task passed its deadline while non-terminal
    DeadlineMissed,
    /// Department success rate fell under the threshold
    LowSuccessRate,
    /// Department was offline at dispatch
    DepartmentOffline,
    /// An approval-required action was denied
    ApprovalDenied,
    /// An action was rejected because it would exceed the budget
    BudgetExceeded,
    /// The external metrics source could not be read
    MetricsUnavailable,
}

/// A recorded anomaly surfaced in reporting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    /// Department the issue is attributed to, if any
    pub department: Option<Department>,
    /// Anomaly category
    pub kind: IssueKind,
    /// Severity, scaled by the raiser
    pub severity: IssueSeverity,
    /// Human-readable detail
    pub message: String,
    /// When the issue was raised
    pub raised_at: DateTime<Utc>,
}

impl Issue {
    /// Create a new issue raised now
    #[must_use]
    pub fn new(kind: IssueKind, severity: IssueSeverity, message: impl Into<String>) -> Self {
        Self {
            department: None,
            kind,
            severity,
            message: message.into(),
            raised_at: Utc::now(),
        }
    }

    /// Attribute the issue to a department
    #[inline]
    #[must_use]
    pub fn with_department(mut self, department: Department) -> Self {
        self.department = Some(department);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_id_generation() {
        let id1 = TaskId::new();
        let id2 = TaskId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn department_shares_sum_to_one() {
        let sum: f64 = Department::ALL.iter().map(Department::default_share).sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn priority_rank_order() {
        assert!(Priority::High.rank() < Priority::Medium.rank());
        assert!(Priority::Medium.rank() < Priority::Low.rank());
    }

    #[test]
    fn terminal_statuses() {
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::InProgress.is_terminal());
        assert!(!TaskStatus::Blocked.is_terminal());
    }

    #[test]
    fn task_builder() {
        let deadline = Utc::now() + chrono::Duration::minutes(30);
        let task = Task::new(Department::Content, "draft morning briefing")
            .with_priority(Priority::High)
            .with_deadline(deadline);

        assert_eq!(task.department, Department::Content);
        assert_eq!(task.priority, Priority::High);
        assert_eq!(task.deadline, deadline);
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.attempts, 0);
    }

    #[test]
    fn overdue_only_when_non_terminal() {
        let now = Utc::now();
        let mut task = Task::new(Department::Marketing, "launch weekend push")
            .with_deadline(now - chrono::Duration::minutes(5));
        assert!(task.is_overdue(now));

        task.status = TaskStatus::Completed;
        assert!(!task.is_overdue(now));
    }

    #[test]
    fn issue_attribution() {
        let issue = Issue::new(IssueKind::DeadlineMissed, IssueSeverity::Medium, "late")
            .with_department(Department::Production);
        assert_eq!(issue.department, Some(Department::Production));
        assert_eq!(issue.severity, IssueSeverity::Medium);
    }

    #[test]
    fn severity_ordering() {
        assert!(IssueSeverity::Low < IssueSeverity::Medium);
        assert!(IssueSeverity::High < IssueSeverity::Critical);
    }
}
