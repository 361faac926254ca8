//! taskwatch - Lifecycle and progress monitor for background task queues
//!
//! Tracks every lifecycle transition of asynchronously executed tasks
//! (including parent/sub-task hierarchies) and exposes near-real-time
//! progress metrics without writing to durable storage on every progress
//! tick: per-iteration updates land in a cheap in-memory cache and are
//! reconciled into SQLite exactly once, at the terminal signal.
//!
//! # Arquitectura
//!
//! - **Signal ledger**: append-only record of every observed lifecycle
//!   signal, with host/process/thread provenance and captured exceptions
//! - **Task registry**: one durable row per task, whose state pointer
//!   always references the newest ledger entry
//! - **Progress cache**: shared in-memory counters absorbing the
//!   high-frequency `update(n)` calls from running task bodies
//! - **Reporter**: derived metrics (percentage, throughput, progress
//!   strings) that degrade gracefully when information is missing
//!
//! # Módulos Principales
//!
//! - [`tracker`] - Signal-driven lifecycle state machine and startup reconciler
//! - [`db`] - SQLite persistence for tasks and signals
//! - [`cache`] - Ephemeral progress counter store
//! - [`progress`] - `begin_progress` / `ProgressHandle` surface for task bodies
//! - [`report`] - Read-only progress queries and display formatting
//!
//! # Ejemplo de Uso
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use taskwatch::{
//!     begin_progress, Database, ProgressCache, ProgressOptions, SignalTracker, TaskIdentity,
//!     TaskSignal,
//! };
//! use uuid::Uuid;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let db = Arc::new(Database::in_memory().await?);
//! let cache = ProgressCache::new();
//! let tracker = SignalTracker::new(db.clone(), cache.clone());
//!
//! let task = TaskIdentity::new(Uuid::new_v4(), "import_feed");
//! tracker.record_signal(task.id, &task.name, TaskSignal::Executing, None).await?;
//!
//! let handle = begin_progress(db, cache, &task, ProgressOptions::default()).await?;
//! handle.update(1);
//!
//! tracker.record_signal(task.id, &task.name, TaskSignal::Complete, None).await?;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod db;
pub mod progress;
pub mod report;
pub mod signal;
pub mod tracker;

pub use cache::ProgressCache;
pub use config::AppConfig;
pub use db::{Database, DatabaseError, SignalRow, TaskRow};
pub use progress::{begin_progress, ProgressHandle, ProgressOptions, TaskIdentity};
pub use report::{ProgressReport, TaskReporter};
pub use signal::{ExceptionInfo, Provenance, TaskSignal};
pub use tracker::SignalTracker;
