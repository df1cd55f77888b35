//! `masthead` simulator binary
//!
//! Development tooling, not a product surface: runs scripted daily cycles
//! against simulated executors, or soaks the status aggregator with
//! concurrent result recording.

use anyhow::Context;
use async_trait::async_trait;
use clap::{value_parser, Arg, ArgAction, Command};
use masthead_core::gate::{ApprovalHandler, ApprovalVerdict, AutonomyDecision, AutonomyGate};
use masthead_core::types::{
    BusinessMetrics, Department, Task, WorkMetrics, WorkOutcome, WorkerId, WorkerResult,
};
use masthead_core::{
    BudgetLedger, EngineConfig, EngineError, IssueSeverity, MetricsSource, StatusAggregator,
    StatusFeed, WorkExecutor, WorkFailure,
};
use masthead_engine::{Coordinator, DepartmentRegistry};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

/// Simulated work executor with deterministic jitter and a failure rate
struct SimulatedExecutor {
    rng: Mutex<StdRng>,
    fail_rate: f64,
}

impl SimulatedExecutor {
    fn new(seed: u64, fail_rate: f64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            fail_rate,
        }
    }
}

#[async_trait]
impl WorkExecutor for SimulatedExecutor {
    async fn execute(&self, task: &Task) -> Result<WorkMetrics, WorkFailure> {
        let (duration_ms, failed) = {
            let mut rng = self.rng.lock();
            (rng.random_range(20..80), rng.random::<f64>() < self.fail_rate)
        };
        if failed {
            return Err(WorkFailure::new(format!(
                "simulated fault while handling: {}",
                task.description
            )));
        }
        Ok(WorkMetrics::new(duration_ms).with_output(format!("simulated: {}", task.description)))
    }
}

/// Static business figures standing in for the real revenue pipeline
struct SimulatedMetrics;

#[async_trait]
impl MetricsSource for SimulatedMetrics {
    async fn business_snapshot(&self) -> Result<BusinessMetrics, EngineError> {
        Ok(BusinessMetrics {
            revenue: 42_500.0,
            content_published: 12,
            audience_reach: 180_000,
        })
    }
}

/// Approves everything, loudly
struct ConsoleApprovals;

#[async_trait]
impl ApprovalHandler for ConsoleApprovals {
    async fn resolve(&self, decision: &AutonomyDecision) -> ApprovalVerdict {
        println!(
            "  [approval] {} ({}, {:.2}) -> approved",
            decision.action, decision.department, decision.cost
        );
        ApprovalVerdict::Approved
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Command::new("masthead")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Masthead dispatch engine simulator")
        .arg_required_else_help(true)
        .subcommand(
            Command::new("simulate")
                .about("Run scripted daily cycles against simulated executors")
                .arg(
                    Arg::new("cycles")
                        .long("cycles")
                        .default_value("3")
                        .value_parser(value_parser!(u32))
                        .help("Number of full cycles to run"),
                )
                .arg(
                    Arg::new("seed")
                        .long("seed")
                        .default_value("42")
                        .value_parser(value_parser!(u64))
                        .help("Random seed for reproducibility"),
                )
                .arg(
                    Arg::new("fail-rate")
                        .long("fail-rate")
                        .default_value("0.1")
                        .value_parser(value_parser!(f64))
                        .help("Probability of one execution failing"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Print each daily report as JSON"),
                ),
        )
        .subcommand(
            Command::new("stress")
                .about("Soak the status aggregator with concurrent recording")
                .arg(
                    Arg::new("workers")
                        .long("workers")
                        .default_value("8")
                        .value_parser(value_parser!(usize))
                        .help("Concurrent recording tasks"),
                )
                .arg(
                    Arg::new("results")
                        .long("results")
                        .default_value("10000")
                        .value_parser(value_parser!(u64))
                        .help("Results recorded per task"),
                ),
        );

    let matches = cli.get_matches();
    let outcome = match matches.subcommand() {
        Some(("simulate", args)) => {
            let cycles = *args.get_one::<u32>("cycles").unwrap();
            let seed = *args.get_one::<u64>("seed").unwrap();
            let fail_rate = *args.get_one::<f64>("fail-rate").unwrap();
            let json = args.get_flag("json");
            run_simulate(cycles, seed, fail_rate, json).await
        }
        Some(("stress", args)) => {
            let workers = *args.get_one::<usize>("workers").unwrap();
            let results = *args.get_one::<u64>("results").unwrap();
            run_stress(workers, results).await
        }
        _ => unreachable!("subcommand required"),
    };

    match outcome {
        Ok(true) => std::process::exit(0),
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("error: {e:#}");
            std::process::exit(1);
        }
    }
}

async fn run_simulate(cycles: u32, seed: u64, fail_rate: f64, json: bool) -> anyhow::Result<bool> {
    println!("Running masthead simulator...");
    println!("Cycles: {cycles}");
    println!("Seed: {seed}");
    println!("Fail rate: {fail_rate}");
    println!();

    let config = EngineConfig::new()
        .with_poll_interval_ms(10)
        .with_monitoring_window_secs(10)
        .with_tasks_per_department(3);
    let aggregator = Arc::new(StatusAggregator::new(config.response_time_alpha));
    let feed: Arc<dyn StatusFeed> = Arc::clone(&aggregator) as Arc<dyn StatusFeed>;
    let ledger = Arc::new(BudgetLedger::new(&config.budget));
    let gate = Arc::new(AutonomyGate::new(
        &config.autonomy,
        ledger,
        Arc::new(ConsoleApprovals),
    ));

    let registry = Arc::new(DepartmentRegistry::new(&config, Arc::clone(&feed)));
    let executor = Arc::new(SimulatedExecutor::new(seed, fail_rate));
    for department in Department::ALL {
        registry
            .spawn_department(department, executor.clone())
            .context("spawning department worker")?;
    }

    let coordinator = Coordinator::new(
        config,
        Arc::clone(&registry),
        gate,
        feed,
        Arc::new(SimulatedMetrics),
    )
    .context("building coordinator")?;

    let mut clean = true;
    for cycle in 1..=cycles {
        let report = coordinator
            .run_cycle()
            .await
            .with_context(|| format!("cycle {cycle} failed"))?;

        if json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            println!("Cycle {cycle} ({}):", report.cycle_id);
            println!("  Completed: {}", report.completed_count());
            println!("  Failed: {}", report.failed_count());
            println!("  Issues: {}", report.issues.len());
            println!(
                "  Budget spent: {:.2} / {:.2}",
                report.budget.spent_today, report.budget.daily_limit
            );
            for issue in &report.issues {
                println!("    [{:>8}] {}", issue.severity.to_string(), issue.message);
            }
        }
        if report.has_issues_at(IssueSeverity::Critical) {
            clean = false;
        }
    }

    coordinator.shutdown().await;
    println!();
    println!("Simulation {}", if clean { "PASSED" } else { "FAILED" });
    Ok(clean)
}

async fn run_stress(workers: usize, results_per_worker: u64) -> anyhow::Result<bool> {
    println!("Running aggregator stress...");
    println!("Workers: {workers}");
    println!("Results per worker: {results_per_worker}");
    println!();

    let aggregator = Arc::new(StatusAggregator::default());
    let started = std::time::Instant::now();

    let mut handles = Vec::new();
    for w in 0..workers {
        let aggregator = Arc::clone(&aggregator);
        handles.push(tokio::spawn(async move {
            for i in 0..results_per_worker {
                let department = Department::ALL[(w as u64 + i) as usize % Department::ALL.len()];
                let task = Task::new(department, "stress sample");
                let outcome = if i % 10 == 0 {
                    WorkOutcome::Failure("stress fault".into())
                } else {
                    WorkOutcome::Success(WorkMetrics::new(5))
                };
                aggregator.record(&WorkerResult {
                    task,
                    worker: WorkerId::new(),
                    outcome,
                    duration_ms: 5,
                });
            }
        }));
    }
    for handle in handles {
        handle.await.context("stress task panicked")?;
    }

    let snapshot = aggregator.snapshot().context("snapshot failed")?;
    let expected = workers as u64 * results_per_worker;
    let consistent = snapshot.system.total == expected
        && snapshot.departments.values().all(|m| {
            (m.success_rate - m.completed as f64 / m.total.max(1) as f64).abs() < 1e-9
        });

    println!("Elapsed: {}ms", started.elapsed().as_millis());
    println!("Recorded: {} (expected {expected})", snapshot.system.total);
    println!("Min success rate: {:.4}", snapshot.system.min_success_rate);
    println!("Integrity: {}", if consistent { "PASSED" } else { "FAILED" });
    Ok(consistent)
}
