//! End-to-end lifecycle tests
//!
//! Drives the full path a real worker would: lifecycle signals from the
//! runtime, progress updates from task bodies, reporting queries, and the
//! startup reconciliation sweep. Everything runs against an in-memory
//! SQLite database and a fresh progress cache per test.

use std::sync::Arc;
use taskwatch::{
    begin_progress, Database, ExceptionInfo, ProgressCache, ProgressOptions, SignalTracker,
    TaskIdentity, TaskReporter, TaskSignal,
};
use uuid::Uuid;

struct Harness {
    db: Arc<Database>,
    cache: ProgressCache,
    tracker: SignalTracker,
    reporter: TaskReporter,
}

async fn harness() -> Harness {
    let db = Arc::new(Database::in_memory().await.unwrap());
    let cache = ProgressCache::new();
    Harness {
        tracker: SignalTracker::new(db.clone(), cache.clone()),
        reporter: TaskReporter::new(db.clone(), cache.clone()),
        db,
        cache,
    }
}

impl Harness {
    async fn signal(&self, task: &TaskIdentity, signal: TaskSignal) {
        self.tracker
            .record_signal(task.id, &task.name, signal, None)
            .await
            .unwrap();
    }
}

/// Scenario A: one task, ten sequential updates, then complete.
#[tokio::test]
async fn test_single_task_progress_finalization() {
    let h = harness().await;
    let task = TaskIdentity::new(Uuid::new_v4(), "import_feed");

    h.signal(&task, TaskSignal::Enqueued).await;
    h.signal(&task, TaskSignal::Executing).await;

    let handle = begin_progress(
        h.db.clone(),
        h.cache.clone(),
        &task,
        ProgressOptions::default(),
    )
    .await
    .unwrap();
    for _ in 0..10 {
        handle.update(1);
    }

    // While running, the cache is authoritative
    let row = h.db.require_task(task.id).await.unwrap();
    assert_eq!(h.reporter.current_count(&row).await.unwrap(), Some(10));

    h.signal(&task, TaskSignal::Complete).await;

    let row = h.db.require_task(task.id).await.unwrap();
    assert!(row.is_finished());
    assert_eq!(row.progress_count, Some(10));
    assert!(!h.cache.contains(task.id));

    // Three ledger entries, stored in creation order
    let history = h.db.task_signals(task.id).await.unwrap();
    let mut names: Vec<_> = history.iter().map(|s| s.signal_name.clone()).collect();
    names.reverse();
    assert_eq!(names, ["enqueued", "executing", "complete"]);

    // Finished task reports from the durable row
    assert_eq!(h.reporter.current_count(&row).await.unwrap(), Some(10));
}

/// Scenario B: cumulating main task collects its children's finalized
/// counts even though it never reported progress itself.
#[tokio::test]
async fn test_main_task_cumulates_children() {
    let h = harness().await;
    let main = TaskIdentity::new(Uuid::new_v4(), "batch");
    let sub_a = TaskIdentity::new(Uuid::new_v4(), "batch_part");
    let sub_b = TaskIdentity::new(Uuid::new_v4(), "batch_part");

    h.signal(&main, TaskSignal::Enqueued).await;
    h.signal(&main, TaskSignal::Executing).await;

    for sub in [&sub_a, &sub_b] {
        h.signal(sub, TaskSignal::Enqueued).await;
        h.signal(sub, TaskSignal::Executing).await;

        let options = ProgressOptions {
            parent_task_id: Some(main.id),
            ..Default::default()
        };
        let handle = begin_progress(h.db.clone(), h.cache.clone(), sub, options)
            .await
            .unwrap();
        handle.update(5);

        h.signal(sub, TaskSignal::Complete).await;
    }

    // Main task still running: read-time aggregation covers the tree
    let row = h.db.require_task(main.id).await.unwrap();
    let ids = h.reporter.aggregation_ids(&row).await.unwrap();
    assert_eq!(ids.len(), 3);

    h.signal(&main, TaskSignal::Complete).await;

    let row = h.db.require_task(main.id).await.unwrap();
    assert!(row.is_finished());
    assert_eq!(row.progress_count, Some(10));
    assert!(!h.cache.contains(main.id));
    assert!(!h.cache.contains(sub_a.id));
    assert!(!h.cache.contains(sub_b.id));
}

/// Scenario C: startup reconciler forces stale "executing" tasks to
/// "unknown" and leaves finished tasks alone.
#[tokio::test]
async fn test_startup_reconciliation() {
    let h = harness().await;
    let stale = TaskIdentity::new(Uuid::new_v4(), "crashed_job");
    let done = TaskIdentity::new(Uuid::new_v4(), "finished_job");

    h.signal(&stale, TaskSignal::Enqueued).await;
    h.signal(&stale, TaskSignal::Executing).await;
    h.cache.increment(stale.id, 3);

    h.signal(&done, TaskSignal::Enqueued).await;
    h.signal(&done, TaskSignal::Executing).await;
    h.signal(&done, TaskSignal::Complete).await;

    let reconciled = h.tracker.reconcile_stale_tasks().await.unwrap();
    assert_eq!(reconciled, 1);

    let stale_row = h.db.require_task(stale.id).await.unwrap();
    assert!(stale_row.is_finished());
    assert!(!h.cache.contains(stale.id));
    let latest = &h.db.task_signals(stale.id).await.unwrap()[0];
    assert_eq!(latest.signal_name, "unknown");
    assert!(latest.exception_line.is_none());

    // The finished task is untouched
    let done_latest = &h.db.task_signals(done.id).await.unwrap()[0];
    assert_eq!(done_latest.signal_name, "complete");
    assert_eq!(h.db.task_signals(done.id).await.unwrap().len(), 3);

    // Running again finds nothing left to fix
    assert_eq!(h.tracker.reconcile_stale_tasks().await.unwrap(), 0);
}

/// The state pointer always resolves to the newest ledger entry.
#[tokio::test]
async fn test_state_pointer_tracks_latest_signal() {
    let h = harness().await;
    let task = TaskIdentity::new(Uuid::new_v4(), "stateful");

    for signal in [
        TaskSignal::Enqueued,
        TaskSignal::Executing,
        TaskSignal::Error,
    ] {
        h.tracker
            .record_signal(
                task.id,
                &task.name,
                signal,
                (signal == TaskSignal::Error).then(|| ExceptionInfo::new("boom")),
            )
            .await
            .unwrap();

        let row = h.db.require_task(task.id).await.unwrap();
        let newest = &h.db.task_signals(task.id).await.unwrap()[0];
        assert_eq!(row.state_id.as_deref(), Some(newest.id.as_str()));
        assert_eq!(newest.signal_name, signal.to_string());
    }

    let row = h.db.require_task(task.id).await.unwrap();
    assert!(row.is_finished());
}

/// An errored task keeps its exception in the ledger and still reports.
#[tokio::test]
async fn test_error_signal_end_to_end() {
    let h = harness().await;
    let task = TaskIdentity::new(Uuid::new_v4(), "fragile");

    h.signal(&task, TaskSignal::Executing).await;
    let handle = begin_progress(
        h.db.clone(),
        h.cache.clone(),
        &task,
        ProgressOptions::default(),
    )
    .await
    .unwrap();
    handle.update(4);

    h.tracker
        .record_signal(
            task.id,
            &task.name,
            TaskSignal::Error,
            Some(ExceptionInfo::new("IndexError: out of range").with_detail("Traceback ...")),
        )
        .await
        .unwrap();

    let row = h.db.require_task(task.id).await.unwrap();
    assert!(row.is_finished());
    // Finished does not mean successful, but the count still finalizes
    assert_eq!(row.progress_count, Some(4));

    let latest = &h.db.task_signals(task.id).await.unwrap()[0];
    assert_eq!(latest.signal_name, "error");
    assert_eq!(
        latest.exception_line.as_deref(),
        Some("IndexError: out of range")
    );
    assert_eq!(latest.progress_count, Some(4));
}

/// Reporter output for a live task tree.
#[tokio::test]
async fn test_reporting_over_running_tree() {
    let h = harness().await;
    let main = TaskIdentity::new(Uuid::new_v4(), "crawl");
    let sub = TaskIdentity::new(Uuid::new_v4(), "crawl_page");

    h.signal(&main, TaskSignal::Executing).await;
    h.signal(&sub, TaskSignal::Executing).await;

    begin_progress(
        h.db.clone(),
        h.cache.clone(),
        &main,
        ProgressOptions {
            total: Some(100),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    let handle = begin_progress(
        h.db.clone(),
        h.cache.clone(),
        &sub,
        ProgressOptions {
            parent_task_id: Some(main.id),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    handle.update(25);

    let main_row = h.db.require_task(main.id).await.unwrap();
    let report = h.reporter.report(&main_row).await.unwrap();

    assert_eq!(report.count, Some(25));
    assert_eq!(report.total, Some(100));
    assert_eq!(report.percentage().unwrap(), "25%");
    assert!(report.elapsed_seconds.is_some());
    assert!(!report.finished);

    // A task that never reported progress has no count, not a zero count
    let quiet = TaskIdentity::new(Uuid::new_v4(), "quiet");
    h.signal(&quiet, TaskSignal::Executing).await;
    let quiet_row = h.db.require_task(quiet.id).await.unwrap();
    assert_eq!(h.reporter.current_count(&quiet_row).await.unwrap(), None);
    assert_eq!(h.reporter.elapsed_seconds(&quiet_row).await.unwrap(), None);
}

/// Purge removes every task and signal in one sweep.
#[tokio::test]
async fn test_bulk_purge() {
    let h = harness().await;

    for _ in 0..3 {
        let task = TaskIdentity::new(Uuid::new_v4(), "ephemeral");
        h.signal(&task, TaskSignal::Enqueued).await;
        h.signal(&task, TaskSignal::Complete).await;
    }

    let (signals, tasks) = h.db.purge_all().await.unwrap();
    assert_eq!(signals, 6);
    assert_eq!(tasks, 3);
    assert!(h.db.main_tasks_with_children(10).await.unwrap().is_empty());
}
