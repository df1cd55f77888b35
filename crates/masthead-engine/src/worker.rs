//! Department worker runtime
//!
//! Each department worker is a spawned tokio task owning an mpsc receiver.
//! Assignments are accepted only while the current load is under the
//! concurrency limit; accepted tasks execute through the injected
//! [`WorkExecutor`] on their own tokio task, report into the status
//! aggregator, and land on the shared results channel. An executor failure or
//! panic is captured into the result, never propagated.
//!
//! Health is ping-based: repeated failed pings take the worker `Offline`,
//! and only an explicit [`WorkerClient::reset`] brings it back.

use futures::FutureExt;
use masthead_core::state::worker_transition;
use masthead_core::types::{
    Department, Task, TaskStatus, WorkOutcome, WorkerHandle, WorkerId, WorkerResult, WorkerStatus,
};
use masthead_core::{EngineError, PerformanceMetrics, StatusFeed, WorkExecutor};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

const MAILBOX_CAPACITY: usize = 64;

/// Reply to an assignment request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignReply {
    /// Task accepted; a result will arrive on the results channel
    Accepted,
    /// Worker is at its concurrency limit
    RejectedBusy,
    /// Worker is offline and needs an external reset
    RejectedOffline,
}

/// Messages handled by the worker task
enum WorkerMessage {
    Assign(Box<Task>, oneshot::Sender<AssignReply>),
    Ping(oneshot::Sender<()>),
    Shutdown,
}

/// Mutable worker state shared between the loop, executions and the client
#[derive(Debug)]
struct SharedState {
    status: WorkerStatus,
    current_load: usize,
    ping_failures: u32,
}

/// Handle to a spawned department worker
#[derive(Clone)]
pub struct WorkerClient {
    id: WorkerId,
    name: String,
    department: Department,
    concurrency_limit: usize,
    health_failure_limit: u32,
    sender: mpsc::Sender<WorkerMessage>,
    shared: Arc<Mutex<SharedState>>,
}

impl WorkerClient {
    /// Spawn a worker for a department.
    ///
    /// Results flow to `results`; every outcome is also recorded into the
    /// aggregator as it completes.
    #[must_use]
    pub fn spawn(
        department: Department,
        concurrency_limit: usize,
        health_failure_limit: u32,
        executor: Arc<dyn WorkExecutor>,
        aggregator: Arc<dyn StatusFeed>,
        results: mpsc::Sender<WorkerResult>,
    ) -> Self {
        let id = WorkerId::new();
        let shared = Arc::new(Mutex::new(SharedState {
            status: WorkerStatus::Online,
            current_load: 0,
            ping_failures: 0,
        }));
        let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);

        let runtime = WorkerRuntime {
            id,
            department,
            concurrency_limit,
            executor,
            aggregator,
            results,
            shared: Arc::clone(&shared),
        };
        tokio::spawn(runtime.run(rx));

        Self {
            id,
            name: format!("{department}-worker"),
            department,
            concurrency_limit,
            health_failure_limit,
            sender: tx,
            shared,
        }
    }

    /// Worker ID
    #[inline]
    #[must_use]
    pub fn id(&self) -> WorkerId {
        self.id
    }

    /// Department served
    #[inline]
    #[must_use]
    pub fn department(&self) -> Department {
        self.department
    }

    /// Current availability
    #[inline]
    #[must_use]
    pub fn status(&self) -> WorkerStatus {
        self.shared.lock().status
    }

    /// Tasks currently in flight
    #[inline]
    #[must_use]
    pub fn current_load(&self) -> usize {
        self.shared.lock().current_load
    }

    /// Whether an assignment would be accepted right now
    #[must_use]
    pub fn can_accept(&self) -> bool {
        let shared = self.shared.lock();
        shared.status != WorkerStatus::Offline && shared.current_load < self.concurrency_limit
    }

    /// Offer a task to the worker
    pub async fn assign(&self, task: Task) -> Result<AssignReply, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(WorkerMessage::Assign(Box::new(task), reply_tx))
            .await
            .map_err(|_| EngineError::WorkerChannelClosed {
                department: self.department,
            })?;
        reply_rx
            .await
            .map_err(|_| EngineError::WorkerChannelClosed {
                department: self.department,
            })
    }

    /// Ping the worker task.
    ///
    /// A failed or timed-out ping counts against the consecutive-failure
    /// limit; reaching the limit takes the worker `Offline`.
    pub async fn health_check(&self, timeout: Duration) -> WorkerStatus {
        let (reply_tx, reply_rx) = oneshot::channel();
        let sent = self.sender.send(WorkerMessage::Ping(reply_tx)).await.is_ok();
        let alive = if sent {
            tokio::time::timeout(timeout, reply_rx).await.is_ok_and(|r| r.is_ok())
        } else {
            false
        };

        let mut shared = self.shared.lock();
        if alive {
            shared.ping_failures = 0;
        } else {
            shared.ping_failures += 1;
            warn!(
                department = %self.department,
                failures = shared.ping_failures,
                "worker health check failed"
            );
            if shared.ping_failures >= self.health_failure_limit
                && shared.status != WorkerStatus::Offline
            {
                // Online -> Offline and Busy -> Offline are both legal
                shared.status = WorkerStatus::Offline;
                warn!(department = %self.department, "worker marked offline");
            }
        }
        shared.status
    }

    /// External reset: bring an offline worker back online
    pub fn reset(&self) -> Result<(), EngineError> {
        let mut shared = self.shared.lock();
        if shared.status == WorkerStatus::Offline {
            worker_transition(WorkerStatus::Offline, WorkerStatus::Online)?;
            shared.status = if shared.current_load > 0 {
                WorkerStatus::Busy
            } else {
                WorkerStatus::Online
            };
            shared.ping_failures = 0;
        }
        Ok(())
    }

    /// Read-only snapshot for aggregation
    #[must_use]
    pub fn handle(&self, performance: PerformanceMetrics) -> WorkerHandle {
        let shared = self.shared.lock();
        WorkerHandle {
            id: self.id,
            name: self.name.clone(),
            department: self.department,
            status: shared.status,
            current_load: shared.current_load,
            performance,
        }
    }

    /// Stop the worker task; in-flight executions finish on their own
    pub async fn shutdown(&self) {
        let _ = self.sender.send(WorkerMessage::Shutdown).await;
    }
}

impl std::fmt::Debug for WorkerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerClient")
            .field("id", &self.id)
            .field("department", &self.department)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

/// State moved into the spawned worker task
struct WorkerRuntime {
    id: WorkerId,
    department: Department,
    concurrency_limit: usize,
    executor: Arc<dyn WorkExecutor>,
    aggregator: Arc<dyn StatusFeed>,
    results: mpsc::Sender<WorkerResult>,
    shared: Arc<Mutex<SharedState>>,
}

impl WorkerRuntime {
    async fn run(self, mut rx: mpsc::Receiver<WorkerMessage>) {
        while let Some(message) = rx.recv().await {
            match message {
                WorkerMessage::Assign(task, reply) => {
                    let accepted = {
                        let mut shared = self.shared.lock();
                        if shared.status == WorkerStatus::Offline {
                            let _ = reply.send(AssignReply::RejectedOffline);
                            false
                        } else if shared.current_load >= self.concurrency_limit {
                            let _ = reply.send(AssignReply::RejectedBusy);
                            false
                        } else {
                            shared.current_load += 1;
                            shared.status = WorkerStatus::Busy;
                            let _ = reply.send(AssignReply::Accepted);
                            true
                        }
                    };
                    if accepted {
                        tokio::spawn(execute_one(
                            self.id,
                            *task,
                            Arc::clone(&self.executor),
                            Arc::clone(&self.aggregator),
                            self.results.clone(),
                            Arc::clone(&self.shared),
                        ));
                    }
                }
                WorkerMessage::Ping(reply) => {
                    let _ = reply.send(());
                }
                WorkerMessage::Shutdown => break,
            }
        }
        debug!(department = %self.department, "worker loop exited");
    }
}

/// Run one accepted task to completion and report the outcome
async fn execute_one(
    worker: WorkerId,
    mut task: Task,
    executor: Arc<dyn WorkExecutor>,
    aggregator: Arc<dyn StatusFeed>,
    results: mpsc::Sender<WorkerResult>,
    shared: Arc<Mutex<SharedState>>,
) {
    task.assigned_worker = Some(worker);
    task.status = TaskStatus::InProgress;

    let started = std::time::Instant::now();
    // a panicking executor must still report a failure and release capacity
    let executed = std::panic::AssertUnwindSafe(executor.execute(&task))
        .catch_unwind()
        .await;
    let outcome = match executed {
        Ok(Ok(metrics)) => {
            task.status = TaskStatus::Completed;
            WorkOutcome::Success(metrics)
        }
        Ok(Err(failure)) => {
            // status stays InProgress; the queue decides requeue vs. fail
            warn!(
                department = %task.department,
                task_id = %task.id,
                error = %failure,
                "executor failure captured"
            );
            WorkOutcome::Failure(failure.message)
        }
        Err(payload) => {
            let message = panic_message(payload);
            warn!(
                department = %task.department,
                task_id = %task.id,
                error = %message,
                "executor panic captured"
            );
            WorkOutcome::Failure(message)
        }
    };
    let duration_ms = started.elapsed().as_millis() as u64;

    let result = WorkerResult {
        task,
        worker,
        outcome,
        duration_ms,
    };
    aggregator.record(&result);
    let _ = results.send(result).await;

    let mut shared = shared.lock();
    shared.current_load = shared.current_load.saturating_sub(1);
    if shared.current_load == 0 && shared.status == WorkerStatus::Busy {
        shared.status = WorkerStatus::Online;
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("executor panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("executor panicked: {message}")
    } else {
        "executor panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use masthead_core::types::WorkMetrics;
    use masthead_core::{StatusAggregator, WorkFailure};

    struct SlowOk(u64);

    #[async_trait]
    impl WorkExecutor for SlowOk {
        async fn execute(&self, _task: &Task) -> Result<WorkMetrics, WorkFailure> {
            tokio::time::sleep(Duration::from_millis(self.0)).await;
            Ok(WorkMetrics::new(self.0))
        }
    }

    struct AlwaysFail;

    #[async_trait]
    impl WorkExecutor for AlwaysFail {
        async fn execute(&self, _task: &Task) -> Result<WorkMetrics, WorkFailure> {
            Err(WorkFailure::new("render farm unreachable"))
        }
    }

    struct AlwaysPanic;

    #[async_trait]
    impl WorkExecutor for AlwaysPanic {
        async fn execute(&self, _task: &Task) -> Result<WorkMetrics, WorkFailure> {
            panic!("template engine exploded");
        }
    }

    fn spawn_worker(
        executor: Arc<dyn WorkExecutor>,
        concurrency: usize,
    ) -> (WorkerClient, mpsc::Receiver<WorkerResult>) {
        let aggregator: Arc<dyn StatusFeed> = Arc::new(StatusAggregator::default());
        let (tx, rx) = mpsc::channel(16);
        let client = WorkerClient::spawn(Department::Content, concurrency, 3, executor, aggregator, tx);
        (client, rx)
    }

    #[tokio::test]
    async fn accepts_then_reports_success() {
        let (worker, mut rx) = spawn_worker(Arc::new(SlowOk(5)), 1);

        let reply = worker
            .assign(Task::new(Department::Content, "draft briefing"))
            .await
            .unwrap();
        assert_eq!(reply, AssignReply::Accepted);

        let result = rx.recv().await.unwrap();
        assert!(result.outcome.is_success());
        assert_eq!(result.task.status, TaskStatus::Completed);
        assert_eq!(result.task.assigned_worker, Some(worker.id()));
    }

    #[tokio::test]
    async fn rejects_when_at_concurrency_limit() {
        let (worker, mut rx) = spawn_worker(Arc::new(SlowOk(100)), 1);

        let first = worker
            .assign(Task::new(Department::Content, "long edit"))
            .await
            .unwrap();
        assert_eq!(first, AssignReply::Accepted);
        assert_eq!(worker.status(), WorkerStatus::Busy);

        let second = worker
            .assign(Task::new(Department::Content, "another edit"))
            .await
            .unwrap();
        assert_eq!(second, AssignReply::RejectedBusy);

        // first task finishes and the worker goes back online
        let _ = rx.recv().await.unwrap();
        assert_eq!(worker.status(), WorkerStatus::Online);
        assert_eq!(worker.current_load(), 0);
    }

    #[tokio::test]
    async fn concurrency_above_one_holds_multiple_tasks() {
        let (worker, mut rx) = spawn_worker(Arc::new(SlowOk(50)), 2);

        assert_eq!(
            worker.assign(Task::new(Department::Content, "a")).await.unwrap(),
            AssignReply::Accepted
        );
        assert_eq!(
            worker.assign(Task::new(Department::Content, "b")).await.unwrap(),
            AssignReply::Accepted
        );
        assert_eq!(
            worker.assign(Task::new(Department::Content, "c")).await.unwrap(),
            AssignReply::RejectedBusy
        );

        let _ = rx.recv().await.unwrap();
        let _ = rx.recv().await.unwrap();
        assert_eq!(worker.current_load(), 0);
    }

    #[tokio::test]
    async fn failure_is_captured_not_propagated() {
        let (worker, mut rx) = spawn_worker(Arc::new(AlwaysFail), 1);

        worker
            .assign(Task::new(Department::Content, "doomed render"))
            .await
            .unwrap();
        let result = rx.recv().await.unwrap();
        assert!(!result.outcome.is_success());
        // non-terminal so the queue can requeue it
        assert_eq!(result.task.status, TaskStatus::InProgress);
    }

    #[tokio::test]
    async fn panicking_executor_reports_failure_and_frees_capacity() {
        let (worker, mut rx) = spawn_worker(Arc::new(AlwaysPanic), 1);

        worker
            .assign(Task::new(Department::Content, "cursed render"))
            .await
            .unwrap();
        let result = rx.recv().await.unwrap();
        match &result.outcome {
            WorkOutcome::Failure(message) => assert!(message.contains("panicked")),
            WorkOutcome::Success(_) => panic!("expected a captured panic"),
        }

        // the panic released the slot; the worker is not bricked
        assert_eq!(worker.current_load(), 0);
        assert_eq!(worker.status(), WorkerStatus::Online);
        assert!(worker.can_accept());
    }

    #[tokio::test]
    async fn repeated_failed_pings_take_worker_offline() {
        let (worker, _rx) = spawn_worker(Arc::new(SlowOk(1)), 1);
        worker.shutdown().await;
        // give the loop a moment to exit
        tokio::time::sleep(Duration::from_millis(10)).await;

        for _ in 0..2 {
            let status = worker.health_check(Duration::from_millis(20)).await;
            assert_ne!(status, WorkerStatus::Offline);
        }
        let status = worker.health_check(Duration::from_millis(20)).await;
        assert_eq!(status, WorkerStatus::Offline);

        // offline workers reject assignments at the client seam too
        assert!(!worker.can_accept());
    }

    #[tokio::test]
    async fn reset_recovers_offline_worker() {
        let (worker, _rx) = spawn_worker(Arc::new(SlowOk(1)), 1);
        worker.shutdown().await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        for _ in 0..3 {
            worker.health_check(Duration::from_millis(20)).await;
        }
        assert_eq!(worker.status(), WorkerStatus::Offline);

        worker.reset().unwrap();
        assert_eq!(worker.status(), WorkerStatus::Online);
    }

    #[tokio::test]
    async fn healthy_pings_clear_failure_count() {
        let (worker, _rx) = spawn_worker(Arc::new(SlowOk(1)), 1);
        for _ in 0..5 {
            let status = worker.health_check(Duration::from_millis(50)).await;
            assert_eq!(status, WorkerStatus::Online);
        }
    }
}
