//! taskwatch - Administrative CLI for the task monitor
//!
//! Read-only views over the task registry and signal ledger, plus the
//! maintenance operations (startup reconciliation, bulk purge).

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use taskwatch::{
    AppConfig, Database, ProgressCache, SignalTracker, TaskReporter,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// List main tasks with their sub-tasks, most recently updated first
    List {
        /// Maximum number of main tasks to show
        #[arg(long)]
        limit: Option<i64>,
    },
    /// Show one task: progress report plus full signal history
    Show {
        /// Task UUID
        id: Uuid,
    },
    /// Mark tasks left "executing" by a dead worker as "unknown"
    Reconcile,
    /// Delete all tasks and signal entries
    Purge {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Parser, Debug)]
#[command(name = "taskwatch")]
#[command(version = "0.1.0")]
#[command(about = "Lifecycle and progress monitor for background task queues", long_about = None)]
struct Args {
    /// Configuration file path (overrides defaults)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Database path (default: ~/.local/share/taskwatch/taskwatch.db)
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

fn init_logging(verbose: bool) {
    let filter = if verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(args.verbose);

    let mut config = AppConfig::load(args.config.as_deref())?;
    if let Some(db_path) = args.db_path {
        config.database_path = db_path;
    }

    tracing::debug!("Opening database at {:?}", config.database_path);
    let db = Arc::new(Database::new(&config.database_path).await?);
    let cache = ProgressCache::with_retention_secs(config.cache_retention_secs);

    match args.command {
        Command::List { limit } => {
            let reporter = TaskReporter::new(db.clone(), cache);
            let mains = db
                .main_tasks_with_children(limit.unwrap_or(config.list_limit))
                .await?;

            if mains.is_empty() {
                println!("No tasks recorded.");
            }
            for (main, children) in mains {
                println!("{}", reporter.report(&main).await?);
                for child in children {
                    println!("  {}", reporter.report(&child).await?);
                }
            }
        }
        Command::Show { id } => {
            let reporter = TaskReporter::new(db.clone(), cache);
            let report = reporter.report_by_id(id).await?;

            println!("{}", report);
            if let Some(elapsed) = report.elapsed_seconds {
                println!("elapsed: {:.1}s", elapsed);
            }

            println!("\nSignal history (newest first):");
            for signal in db.task_signals(id).await? {
                print!("  {}  {}", signal.create_dt, signal);
                if let Some(count) = signal.progress_count {
                    print!("  count={}", count);
                }
                println!(
                    "  [{} pid={} thread={}]",
                    signal.hostname, signal.pid, signal.thread_name
                );
            }
        }
        Command::Reconcile => {
            let tracker = SignalTracker::new(db.clone(), cache);
            let count = tracker.reconcile_stale_tasks().await?;
            println!("Reconciled {} stale task(s).", count);
        }
        Command::Purge { yes } => {
            if !yes {
                anyhow::bail!("Refusing to purge without --yes");
            }
            let (signals, tasks) = db.purge_all().await?;
            println!("Purged {} signal(s) and {} task(s).", signals, tasks);
        }
    }

    db.close().await;

    Ok(())
}
