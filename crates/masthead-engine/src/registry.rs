//! Department registry
//!
//! Explicit ownership in place of a global department map: the registry
//! spawns and owns the per-department workers and the dispatch queues. The
//! coordinator receives the registry at construction and reads snapshots; it
//! never touches worker internals.

use crate::queue::DispatchQueues;
use crate::worker::{AssignReply, WorkerClient};
use dashmap::DashMap;
use masthead_core::types::{Department, Task, WorkerHandle, WorkerResult, WorkerStatus};
use masthead_core::{EngineConfig, EngineError, StatusFeed, WorkExecutor};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::info;

const RESULTS_CAPACITY: usize = 256;

/// Registry-wide counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Registered departments
    pub departments: usize,
    /// Workers accepting assignments
    pub online: usize,
    /// Workers with work in flight
    pub busy: usize,
    /// Workers requiring an external reset
    pub offline: usize,
    /// Tasks queued across all departments
    pub queued: usize,
}

/// Owns the department workers and their queues
pub struct DepartmentRegistry {
    workers: DashMap<Department, WorkerClient>,
    queues: Arc<DispatchQueues>,
    aggregator: Arc<dyn StatusFeed>,
    worker_concurrency: usize,
    health_failure_limit: u32,
    health_check_timeout: Duration,
    results_tx: mpsc::Sender<WorkerResult>,
    results_rx: Mutex<mpsc::Receiver<WorkerResult>>,
}

impl DepartmentRegistry {
    /// Create an empty registry over the shared aggregator
    #[must_use]
    pub fn new(config: &EngineConfig, aggregator: Arc<dyn StatusFeed>) -> Self {
        let (results_tx, results_rx) = mpsc::channel(RESULTS_CAPACITY);
        Self {
            workers: DashMap::new(),
            queues: Arc::new(DispatchQueues::new(config.max_attempts)),
            aggregator,
            worker_concurrency: config.worker_concurrency,
            health_failure_limit: config.health_failure_limit,
            health_check_timeout: Duration::from_millis(config.health_check_timeout_ms),
            results_tx,
            results_rx: Mutex::new(results_rx),
        }
    }

    /// Spawn a worker for a department with its injected executor
    pub fn spawn_department(
        &self,
        department: Department,
        executor: Arc<dyn WorkExecutor>,
    ) -> Result<(), EngineError> {
        if self.workers.contains_key(&department) {
            return Err(EngineError::InvalidConfig(format!(
                "department {department} already registered"
            )));
        }
        let worker = WorkerClient::spawn(
            department,
            self.worker_concurrency,
            self.health_failure_limit,
            executor,
            Arc::clone(&self.aggregator),
            self.results_tx.clone(),
        );
        info!(department = %department, worker_id = %worker.id(), "spawned department worker");
        self.aggregator.ensure_department(department);
        self.workers.insert(department, worker);
        Ok(())
    }

    /// Registered departments in canonical order
    #[must_use]
    pub fn departments(&self) -> Vec<Department> {
        Department::ALL
            .into_iter()
            .filter(|d| self.workers.contains_key(d))
            .collect()
    }

    /// Dispatch queues shared with the coordinator
    #[inline]
    #[must_use]
    pub fn queues(&self) -> &Arc<DispatchQueues> {
        &self.queues
    }

    /// Whether the department's worker would accept a task right now
    #[must_use]
    pub fn can_accept(&self, department: Department) -> bool {
        self.workers
            .get(&department)
            .is_some_and(|worker| worker.can_accept())
    }

    /// Availability of one department's worker
    pub fn worker_status(&self, department: Department) -> Result<WorkerStatus, EngineError> {
        self.workers
            .get(&department)
            .map(|worker| worker.status())
            .ok_or(EngineError::UnknownDepartment(department))
    }

    /// Offer a task to its department's worker
    pub async fn assign(&self, task: Task) -> Result<AssignReply, EngineError> {
        let department = task.department;
        let worker = self
            .workers
            .get(&department)
            .map(|entry| entry.value().clone())
            .ok_or(EngineError::UnknownDepartment(department))?;
        worker.assign(task).await
    }

    /// Read-only snapshots of every worker, with current performance
    #[must_use]
    pub fn handles(&self) -> Vec<WorkerHandle> {
        let snapshot = self.aggregator.snapshot().ok();
        self.departments()
            .into_iter()
            .filter_map(|department| {
                let worker = self.workers.get(&department)?;
                let performance = snapshot
                    .as_ref()
                    .and_then(|s| s.departments.get(&department).copied())
                    .unwrap_or_default();
                Some(worker.handle(performance))
            })
            .collect()
    }

    /// Ping every worker once, concurrently; returns each department's
    /// resulting status
    pub async fn health_sweep(&self) -> Vec<(Department, WorkerStatus)> {
        let timeout = self.health_check_timeout;
        let workers: Vec<(Department, WorkerClient)> = self
            .departments()
            .into_iter()
            .filter_map(|department| {
                self.workers
                    .get(&department)
                    .map(|entry| (department, entry.value().clone()))
            })
            .collect();
        futures::future::join_all(workers.into_iter().map(|(department, worker)| async move {
            (department, worker.health_check(timeout).await)
        }))
        .await
    }

    /// External reset for an offline department
    pub fn reset(&self, department: Department) -> Result<(), EngineError> {
        let worker = self
            .workers
            .get(&department)
            .ok_or(EngineError::UnknownDepartment(department))?;
        worker.reset()
    }

    /// Tasks currently executing across all workers
    #[must_use]
    pub fn total_load(&self) -> usize {
        self.workers
            .iter()
            .map(|entry| entry.value().current_load())
            .sum()
    }

    /// Drain every result the workers have reported since the last call
    #[must_use]
    pub fn drain_results(&self) -> Vec<WorkerResult> {
        let mut rx = self.results_rx.lock();
        let mut results = Vec::new();
        while let Ok(result) = rx.try_recv() {
            results.push(result);
        }
        results
    }

    /// Stop one department's worker
    pub async fn shutdown_department(&self, department: Department) -> Result<(), EngineError> {
        let worker = self
            .workers
            .get(&department)
            .map(|entry| entry.value().clone())
            .ok_or(EngineError::UnknownDepartment(department))?;
        worker.shutdown().await;
        Ok(())
    }

    /// Stop every worker; queued tasks stay queued
    pub async fn shutdown_all(&self) {
        for department in self.departments() {
            if let Some(worker) = self.workers.get(&department).map(|e| e.value().clone()) {
                worker.shutdown().await;
            }
        }
        info!("all department workers shut down");
    }

    /// Registry-wide counters
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        let mut stats = RegistryStats {
            departments: self.workers.len(),
            queued: self.queues.depths().values().sum(),
            ..RegistryStats::default()
        };
        for entry in self.workers.iter() {
            match entry.value().status() {
                WorkerStatus::Online => stats.online += 1,
                WorkerStatus::Busy => stats.busy += 1,
                WorkerStatus::Offline => stats.offline += 1,
            }
        }
        stats
    }
}

impl std::fmt::Debug for DepartmentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DepartmentRegistry")
            .field("departments", &self.workers.len())
            .field("queued", &self.queues.depths())
            .finish_non_exhaustive()
    }
}
