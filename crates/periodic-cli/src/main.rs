//! Demo binary: registers a couple of periodic jobs on a
//! [`periodic_core::PeriodicWorker`], runs it for a fixed duration, and
//! reports each job's watcher statistics in a table.

use std::io;
use std::process::ExitCode;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use comfy_table::{presets::UTF8_FULL, Table};
use tracing_subscriber::EnvFilter;

use periodic_core::executor::sync::SyncExecutor;
use periodic_core::executor::thread_pool::{ThreadPoolConfig, ThreadPoolExecutor};
use periodic_core::{PeriodicWorker, Registration, Strategy, WorkerConfig};

#[cfg(feature = "process-pool")]
use periodic_core::executor::process_pool::{self, ProcessPoolConfig, ProcessPoolExecutor};

/// Which built-in executor the demo worker dispatches through.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum ExecutorKind {
    Sync,
    ThreadPool,
    #[cfg(feature = "process-pool")]
    ProcessPool,
}

/// Registers a few periodic jobs and reports their watcher stats after running.
#[derive(Parser)]
#[command(name = "periodic-demo")]
#[command(author, version)]
#[command(about = "Demo CLI for the periodic task engine")]
struct Cli {
    /// How long to run the worker before stopping it, in seconds.
    #[arg(short, long, default_value_t = 5)]
    duration: u64,

    /// Which executor to dispatch jobs through.
    #[arg(short, long, value_enum, default_value = "sync")]
    executor: ExecutorKind,

    /// The next-run strategy every registered job uses.
    #[arg(short, long, default_value = "last_started")]
    strategy: String,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    #[cfg(feature = "process-pool")]
    process_pool::maybe_run_worker();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("Error: {error:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    setup_tracing(cli.verbose);

    let heartbeats = Arc::new(AtomicU64::new(0));
    let sweeps = Arc::new(AtomicU64::new(0));

    let heartbeat_counter = Arc::clone(&heartbeats);
    let heartbeat = Registration::new("heartbeat", 1.0, move || {
        heartbeat_counter.fetch_add(1, Ordering::Relaxed);
        Ok(())
    })
    .run_immediately();

    let sweep_counter = Arc::clone(&sweeps);
    let sweep = Registration::new("sweep", 2.0, move || {
        sweep_counter.fetch_add(1, Ordering::Relaxed);
        Ok(())
    });

    let strategy = Strategy::by_name(&cli.strategy)?;

    match cli.executor {
        ExecutorKind::Sync => {
            let config = WorkerConfig::new(SyncExecutor::new)?.with_strategy(strategy);
            run_worker(vec![heartbeat, sweep], config, cli.duration)?;
        }
        ExecutorKind::ThreadPool => {
            let config = WorkerConfig::new(|| {
                ThreadPoolExecutor::new(ThreadPoolConfig::new().with_max_workers(4))
                    .expect("thread pool config is always valid here")
            })?
            .with_strategy(strategy);
            run_worker(vec![heartbeat, sweep], config, cli.duration)?;
        }
        #[cfg(feature = "process-pool")]
        ExecutorKind::ProcessPool => {
            process_pool::register_callable("heartbeat", Arc::new(|| {
                heartbeats.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }));
            process_pool::register_callable("sweep", Arc::new(|| {
                sweeps.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }));
            let config = WorkerConfig::new(|| {
                ProcessPoolExecutor::spawn(ProcessPoolConfig::new().with_worker_count(2))
                    .expect("failed to spawn process-pool workers")
            })?
            .with_strategy(strategy);
            run_worker(vec![heartbeat, sweep], config, cli.duration)?;
        }
    }

    print_stats(&heartbeats, &sweeps);
    Ok(())
}

fn run_worker<E: periodic_core::executor::Executor + 'static>(
    registrations: Vec<Registration>,
    config: WorkerConfig<E>,
    duration_secs: u64,
) -> Result<()> {
    let worker = Arc::new(PeriodicWorker::new(registrations, config)?);
    let runner = Arc::clone(&worker);
    let handle = std::thread::spawn(move || runner.start(false));

    std::thread::sleep(Duration::from_secs(duration_secs));
    worker.stop();
    worker.wait(Some(Duration::from_secs(10)));

    let table = watcher_table(&worker);
    println!("{table}");

    handle
        .join()
        .expect("worker thread should not panic")?;
    Ok(())
}

fn watcher_table<E: periodic_core::executor::Executor>(worker: &PeriodicWorker<E>) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["callable", "runs", "successes", "failures", "avg elapsed (ms)"]);

    for watcher in worker.iter_watchers() {
        let snapshot = watcher.snapshot();
        let average_ms = if snapshot.runs > 0 {
            snapshot.elapsed() / snapshot.runs as f64 * 1000.0
        } else {
            0.0
        };
        table.add_row(vec![
            watcher.name().to_string(),
            snapshot.runs.to_string(),
            snapshot.successes.to_string(),
            snapshot.failures.to_string(),
            format!("{average_ms:.3}"),
        ]);
    }

    table
}

fn print_stats(heartbeats: &AtomicU64, sweeps: &AtomicU64) {
    tracing::info!(
        heartbeats = heartbeats.load(Ordering::Relaxed),
        sweeps = sweeps.load(Ordering::Relaxed),
        "demo run complete"
    );
}

fn setup_tracing(verbose: u8) {
    let filter = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with_writer(io::stderr)
        .init();
}
