//! Engine configuration
//!
//! Constructed in code by the integrator; the engine loads nothing from files
//! or the environment. All knobs carry workable defaults and are validated
//! before a coordinator will accept them.

use crate::error::EngineError;
use crate::types::Department;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Delivery attempts before a task fails permanently
    pub max_attempts: u32,
    /// Concurrent tasks a single worker may hold
    pub worker_concurrency: usize,
    /// Consecutive failed health checks before a worker goes offline
    pub health_failure_limit: u32,
    /// Health-check ping timeout in milliseconds
    pub health_check_timeout_ms: u64,
    /// Success rate under which monitoring raises an issue
    pub success_rate_threshold: f64,
    /// Monitoring poll interval in milliseconds
    pub poll_interval_ms: u64,
    /// Maximum time monitoring waits for in-flight work, in seconds
    pub monitoring_window_secs: u64,
    /// Smoothing factor for the response-time moving average
    pub response_time_alpha: f64,
    /// Tasks generated per department each cycle
    pub tasks_per_department: usize,
    /// Task deadline relative to cycle start, in seconds
    pub task_deadline_secs: u64,
    /// Budget limits and allocation split
    pub budget: BudgetConfig,
    /// Autonomy rule sets
    pub autonomy: AutonomyConfig,
}

impl EngineConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With retry limit
    #[inline]
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// With worker concurrency limit
    #[inline]
    #[must_use]
    pub fn with_worker_concurrency(mut self, limit: usize) -> Self {
        self.worker_concurrency = limit;
        self
    }

    /// With success-rate threshold
    #[inline]
    #[must_use]
    pub fn with_success_threshold(mut self, threshold: f64) -> Self {
        self.success_rate_threshold = threshold;
        self
    }

    /// With monitoring poll interval
    #[inline]
    #[must_use]
    pub fn with_poll_interval_ms(mut self, interval_ms: u64) -> Self {
        self.poll_interval_ms = interval_ms;
        self
    }

    /// With monitoring window
    #[inline]
    #[must_use]
    pub fn with_monitoring_window_secs(mut self, secs: u64) -> Self {
        self.monitoring_window_secs = secs;
        self
    }

    /// With tasks generated per department
    #[inline]
    #[must_use]
    pub fn with_tasks_per_department(mut self, count: usize) -> Self {
        self.tasks_per_department = count;
        self
    }

    /// With task deadline relative to cycle start
    #[inline]
    #[must_use]
    pub fn with_task_deadline_secs(mut self, secs: u64) -> Self {
        self.task_deadline_secs = secs;
        self
    }

    /// With daily budget limit
    #[inline]
    #[must_use]
    pub fn with_daily_limit(mut self, limit: f64) -> Self {
        self.budget.daily_limit = limit;
        self
    }

    /// With approval-required rules
    #[inline]
    #[must_use]
    pub fn with_requires_approval(mut self, rules: Vec<String>) -> Self {
        self.autonomy.requires_approval = rules;
        self
    }

    /// With must-report rules
    #[inline]
    #[must_use]
    pub fn with_must_report(mut self, rules: Vec<String>) -> Self {
        self.autonomy.must_report = rules;
        self
    }

    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.max_attempts == 0 {
            return Err(EngineError::InvalidConfig("max_attempts must be >= 1".into()));
        }
        if self.worker_concurrency == 0 {
            return Err(EngineError::InvalidConfig(
                "worker_concurrency must be >= 1".into(),
            ));
        }
        if self.tasks_per_department == 0 {
            return Err(EngineError::InvalidConfig(
                "tasks_per_department must be >= 1".into(),
            ));
        }
        if !(self.success_rate_threshold > 0.0 && self.success_rate_threshold <= 1.0) {
            return Err(EngineError::InvalidConfig(
                "success_rate_threshold must be in (0, 1]".into(),
            ));
        }
        if !(self.response_time_alpha > 0.0 && self.response_time_alpha <= 1.0) {
            return Err(EngineError::InvalidConfig(
                "response_time_alpha must be in (0, 1]".into(),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(EngineError::InvalidConfig(
                "poll_interval_ms must be >= 1".into(),
            ));
        }
        self.budget.validate()
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            worker_concurrency: 1,
            health_failure_limit: 3,
            health_check_timeout_ms: 250,
            success_rate_threshold: 0.95,
            poll_interval_ms: 250,
            monitoring_window_secs: 30,
            response_time_alpha: 0.2,
            tasks_per_department: 3,
            task_deadline_secs: 3600,
            budget: BudgetConfig::default(),
            autonomy: AutonomyConfig::default(),
        }
    }
}

/// Budget limits and per-department allocation split
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    /// Total spend permitted per day
    pub daily_limit: f64,
    /// Fraction of the daily limit allocated to each department
    pub split: BTreeMap<Department, f64>,
    /// Explicit per-department caps; departments absent here are capped at
    /// their allocation
    pub cap_overrides: BTreeMap<Department, f64>,
}

impl BudgetConfig {
    /// Budget allocated to a department for planning
    #[inline]
    #[must_use]
    pub fn allocation_for(&self, department: Department) -> f64 {
        self.split.get(&department).copied().unwrap_or(0.0) * self.daily_limit
    }

    /// Spend cap for a department
    #[inline]
    #[must_use]
    pub fn cap_for(&self, department: Department) -> f64 {
        self.cap_overrides
            .get(&department)
            .copied()
            .unwrap_or_else(|| self.allocation_for(department))
    }

    /// Override one department's cap
    #[inline]
    #[must_use]
    pub fn with_cap(mut self, department: Department, cap: f64) -> Self {
        self.cap_overrides.insert(department, cap);
        self
    }

    fn validate(&self) -> Result<(), EngineError> {
        if !(self.daily_limit.is_finite() && self.daily_limit > 0.0) {
            return Err(EngineError::InvalidConfig(
                "budget daily_limit must be positive".into(),
            ));
        }
        if self.split.is_empty() {
            return Err(EngineError::InvalidConfig("budget split is empty".into()));
        }
        if self.split.values().any(|s| !s.is_finite() || *s < 0.0) {
            return Err(EngineError::InvalidConfig(
                "budget split shares must be non-negative".into(),
            ));
        }
        let sum: f64 = self.split.values().sum();
        if (sum - 1.0).abs() > 1e-6 {
            return Err(EngineError::InvalidConfig(format!(
                "budget split shares sum to {sum:.6}, expected 1.0"
            )));
        }
        Ok(())
    }
}

impl Default for BudgetConfig {
    fn default() -> Self {
        let split = Department::ALL
            .iter()
            .map(|d| (*d, d.default_share()))
            .collect();
        Self {
            daily_limit: 10_000.0,
            split,
            cap_overrides: BTreeMap::new(),
        }
    }
}

/// Autonomy rule sets, matched case-insensitively against action text
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutonomyConfig {
    /// Keywords forcing approval regardless of cost
    pub requires_approval: Vec<String>,
    /// Keywords flagging an action for the next report
    pub must_report: Vec<String>,
}

impl Default for AutonomyConfig {
    fn default() -> Self {
        Self {
            requires_approval: vec![
                "hire".into(),
                "contract".into(),
                "acquisition".into(),
                "layoff".into(),
                "legal".into(),
            ],
            must_report: vec![
                "pricing".into(),
                "partnership".into(),
                "sponsorship".into(),
            ],
        }
    }
}
