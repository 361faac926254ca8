//! Signal-driven lifecycle state machine
//!
//! Consumes lifecycle signals from the task runtime and keeps the durable
//! registry, the signal ledger and the progress cache consistent. While a
//! task runs, the cache is authoritative for its count; the durable row
//! becomes authoritative exactly once, at the terminal transition.

use crate::cache::ProgressCache;
use crate::db::{Database, DatabaseError, NewSignal, SignalRow};
use crate::signal::{ExceptionInfo, Provenance, TaskSignal};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Records lifecycle signals into the registry and ledger.
///
/// One instance per process, constructed with an explicit database handle
/// and cache client. The runtime invokes `record_signal` synchronously from
/// its signal callbacks; signals for a single task id are expected to
/// arrive from one logical execution context at a time, cross-task calls
/// may run in parallel.
pub struct SignalTracker {
    db: Arc<Database>,
    cache: ProgressCache,
}

impl SignalTracker {
    pub fn new(db: Arc<Database>, cache: ProgressCache) -> Self {
        Self { db, cache }
    }

    pub fn db(&self) -> &Arc<Database> {
        &self.db
    }

    pub fn cache(&self) -> &ProgressCache {
        &self.cache
    }

    /// Record one observed lifecycle signal.
    ///
    /// Creates the task row on first contact, appends the ledger entry
    /// (with a progress cache snapshot taken at call time) and moves the
    /// state pointer, all in one transaction. On terminal signals the
    /// task is marked finished, its progress count finalized, and its
    /// cache entry evicted; the cache stops being the source of truth at
    /// that point.
    ///
    /// Durable-store failures propagate to the caller: losing lifecycle
    /// history is a correctness issue, not a display nicety.
    pub async fn record_signal(
        &self,
        task_id: Uuid,
        task_name: &str,
        signal: TaskSignal,
        exception: Option<ExceptionInfo>,
    ) -> Result<SignalRow, DatabaseError> {
        let finished = signal.is_terminal();

        info!(
            "Store Task {} signal {:?} (finished: {})",
            task_id, signal, finished
        );

        // Absent entry and a count of zero are different things; only a
        // live cache entry produces a snapshot.
        let cache_count = self
            .cache
            .contains(task_id)
            .then(|| self.cache.get(task_id));

        let row = self
            .db
            .apply_signal(NewSignal {
                task_id,
                task_name,
                signal,
                exception: exception.as_ref(),
                provenance: Provenance::capture(),
                cache_count,
            })
            .await?;

        if finished {
            // Reconciliation into the durable row already happened above.
            self.cache.evict(task_id);
        }

        Ok(row)
    }

    /// Force tasks left `executing` by a dead worker into `unknown`.
    ///
    /// A worker that dies (e.g. OOM-killed) never delivers a terminal
    /// signal, so its tasks would look permanently "executing". Call this
    /// once per logical deployment startup, not per worker: against a
    /// shared registry it will also mislabel tasks of other still-alive
    /// workers. Returns the number of tasks reconciled.
    pub async fn reconcile_stale_tasks(&self) -> Result<usize, DatabaseError> {
        debug!("Startup reconciler called");

        let stale = self.db.executing_tasks().await?;
        let count = stale.len();

        for task in stale {
            warn!("Mark \"executing\" task {} to \"unknown\"", task.task_id);
            self.record_signal(task.id(), &task.name, TaskSignal::Unknown, None)
                .await?;
        }

        Ok(count)
    }
}
