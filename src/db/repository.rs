//! Database repository for the task registry and signal ledger

use super::migrations::INIT_SCHEMA;
use super::models::{SignalRow, TaskRow};
use crate::signal::{ExceptionInfo, Provenance, TaskSignal};
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("Migration error: {0}")]
    Migration(String),
    #[error("Not found: {0}")]
    NotFound(String),
}

/// Everything needed to append one signal ledger entry.
///
/// `cache_count` is the progress cache value snapshotted by the caller at
/// signal time, `None` when the cache holds no entry for the task.
#[derive(Debug)]
pub struct NewSignal<'a> {
    pub task_id: Uuid,
    pub task_name: &'a str,
    pub signal: TaskSignal,
    pub exception: Option<&'a ExceptionInfo>,
    pub provenance: Provenance,
    pub cache_count: Option<u64>,
}

/// Database connection and operations
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database connection
    pub async fn new(path: &Path) -> Result<Self, DatabaseError> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.ok();
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.run_migrations().await?;

        Ok(db)
    }

    /// Create an in-memory database (for testing)
    pub async fn in_memory() -> Result<Self, DatabaseError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.run_migrations().await?;

        Ok(db)
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Run database migrations
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        sqlx::query(INIT_SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| DatabaseError::Migration(e.to_string()))?;

        Ok(())
    }

    // ========================================================================
    // Signal recording
    // ========================================================================

    /// Append one signal ledger entry and move the task's state pointer.
    ///
    /// Runs as a single transaction: get-or-create the task row, insert the
    /// immutable signal entry, point `state_id` at it, and on terminal
    /// signals mark the task finished and finalize its progress count (the
    /// cache snapshot when present, else the finished-children sum for
    /// cumulating main tasks). Any failure rolls the whole call back.
    pub async fn apply_signal(&self, entry: NewSignal<'_>) -> Result<SignalRow, DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let task_id = entry.task_id.to_string();
        let finished = entry.signal.is_terminal();

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT OR IGNORE INTO tasks (task_id, name, create_dt, update_dt) VALUES (?, ?, ?, ?)",
        )
        .bind(&task_id)
        .bind(entry.task_name)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        let task = sqlx::query_as::<_, TaskRow>("SELECT * FROM tasks WHERE task_id = ?")
            .bind(&task_id)
            .fetch_one(&mut *tx)
            .await?;

        // Snapshot at signal time: live cache value, or the last finalized
        // count (the reconciler re-signals finished-count-carrying tasks).
        let snapshot = entry.cache_count.map(|c| c as i64).or(task.progress_count);

        let signal_row = SignalRow {
            id: Uuid::new_v4().to_string(),
            task_id: task_id.clone(),
            signal_name: entry.signal.to_string(),
            progress_count: snapshot,
            exception_line: entry.exception.map(|e| e.summary.clone()),
            exception: entry.exception.and_then(|e| e.detail.clone()),
            hostname: entry.provenance.hostname,
            pid: entry.provenance.pid as i64,
            thread_name: entry.provenance.thread_name,
            create_dt: now.clone(),
        };

        sqlx::query(
            r#"
            INSERT INTO task_signals
            (id, task_id, signal_name, progress_count, exception_line, exception,
             hostname, pid, thread_name, create_dt)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&signal_row.id)
        .bind(&signal_row.task_id)
        .bind(&signal_row.signal_name)
        .bind(signal_row.progress_count)
        .bind(&signal_row.exception_line)
        .bind(&signal_row.exception)
        .bind(&signal_row.hostname)
        .bind(signal_row.pid)
        .bind(&signal_row.thread_name)
        .bind(&signal_row.create_dt)
        .execute(&mut *tx)
        .await?;

        let finalized = if finished {
            match entry.cache_count {
                Some(count) => Some(count as i64),
                None if task.is_main_task() && task.cumulates() => {
                    let (sum,): (Option<i64>,) = sqlx::query_as(
                        "SELECT SUM(progress_count) FROM tasks WHERE parent_task_id = ? AND finished = 1",
                    )
                    .bind(&task_id)
                    .fetch_one(&mut *tx)
                    .await?;
                    sum
                }
                None => None,
            }
        } else {
            None
        };

        match (finished, finalized) {
            (true, Some(count)) => {
                sqlx::query(
                    "UPDATE tasks SET state_id = ?, finished = 1, progress_count = ?, update_dt = ? WHERE task_id = ?",
                )
                .bind(&signal_row.id)
                .bind(count)
                .bind(&now)
                .bind(&task_id)
                .execute(&mut *tx)
                .await?;
            }
            (true, None) => {
                sqlx::query(
                    "UPDATE tasks SET state_id = ?, finished = 1, update_dt = ? WHERE task_id = ?",
                )
                .bind(&signal_row.id)
                .bind(&now)
                .bind(&task_id)
                .execute(&mut *tx)
                .await?;
            }
            (false, _) => {
                sqlx::query("UPDATE tasks SET state_id = ?, update_dt = ? WHERE task_id = ?")
                    .bind(&signal_row.id)
                    .bind(&now)
                    .bind(&task_id)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        tx.commit().await?;

        Ok(signal_row)
    }

    // ========================================================================
    // Task operations
    // ========================================================================

    /// Get a task by ID
    pub async fn get_task(&self, task_id: Uuid) -> Result<Option<TaskRow>, DatabaseError> {
        Ok(
            sqlx::query_as::<_, TaskRow>("SELECT * FROM tasks WHERE task_id = ?")
                .bind(task_id.to_string())
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    /// Get a task by ID, failing when it does not exist
    pub async fn require_task(&self, task_id: Uuid) -> Result<TaskRow, DatabaseError> {
        self.get_task(task_id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Task not found: {}", task_id)))
    }

    /// Save the relationship between a task and the task that called it.
    ///
    /// Idempotent: repeating the call with the same pair is a no-op.
    pub async fn set_parent_task(
        &self,
        main_task_id: Uuid,
        sub_task_id: Uuid,
    ) -> Result<(), DatabaseError> {
        info!("Set {} as sub task of {}", sub_task_id, main_task_id);

        let result = sqlx::query(
            "UPDATE tasks SET parent_task_id = ?, update_dt = ? WHERE task_id = ?",
        )
        .bind(main_task_id.to_string())
        .bind(Utc::now().to_rfc3339())
        .bind(sub_task_id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!(
                "Task not found: {}",
                sub_task_id
            )));
        }

        Ok(())
    }

    /// Set the display metadata a task body declared via `begin_progress`
    pub async fn init_progress_meta(
        &self,
        task_id: Uuid,
        name: &str,
        description: &str,
        total: Option<i64>,
        unit: &str,
        unit_divisor: i64,
        cumulate_progress: bool,
    ) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let task_id = task_id.to_string();

        let mut tx = self.pool.begin().await?;

        // The row normally exists already (created by the enqueued signal),
        // but a task body may start progress before any signal lands.
        sqlx::query(
            "INSERT OR IGNORE INTO tasks (task_id, name, create_dt, update_dt) VALUES (?, ?, ?, ?)",
        )
        .bind(&task_id)
        .bind(name)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE tasks
            SET description = ?, total = ?, unit = ?, unit_divisor = ?,
                cumulate_progress = ?, update_dt = ?
            WHERE task_id = ?
            "#,
        )
        .bind(description)
        .bind(total)
        .bind(unit)
        .bind(unit_divisor)
        .bind(if cumulate_progress { 1 } else { 0 })
        .bind(&now)
        .bind(&task_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(())
    }

    /// Correct a task's expected total (e.g. once a recursive sub-task
    /// chain knows its real length)
    pub async fn update_total(&self, task_id: Uuid, total: i64) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE tasks SET total = ?, update_dt = ? WHERE task_id = ?")
            .bind(total)
            .bind(Utc::now().to_rfc3339())
            .bind(task_id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Direct children of a task
    pub async fn children(&self, task_id: Uuid) -> Result<Vec<TaskRow>, DatabaseError> {
        Ok(sqlx::query_as::<_, TaskRow>(
            "SELECT * FROM tasks WHERE parent_task_id = ? ORDER BY create_dt ASC, rowid ASC",
        )
        .bind(task_id.to_string())
        .fetch_all(&self.pool)
        .await?)
    }

    /// Main tasks with their direct children prefetched, most recently
    /// updated first
    pub async fn main_tasks_with_children(
        &self,
        limit: i64,
    ) -> Result<Vec<(TaskRow, Vec<TaskRow>)>, DatabaseError> {
        let mains = sqlx::query_as::<_, TaskRow>(
            "SELECT * FROM tasks WHERE parent_task_id IS NULL ORDER BY update_dt DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(mains.len());
        for main in mains {
            let children = self.children(main.id()).await?;
            out.push((main, children));
        }

        Ok(out)
    }

    /// Tasks whose latest signal is `executing` (candidates for the
    /// startup reconciler)
    pub async fn executing_tasks(&self) -> Result<Vec<TaskRow>, DatabaseError> {
        Ok(sqlx::query_as::<_, TaskRow>(
            r#"
            SELECT t.* FROM tasks t
            JOIN task_signals s ON s.id = t.state_id
            WHERE s.signal_name = 'executing'
            "#,
        )
        .fetch_all(&self.pool)
        .await?)
    }

    // ========================================================================
    // Signal ledger queries
    // ========================================================================

    /// Full signal history for a task, newest first (ties broken by
    /// insertion order)
    pub async fn task_signals(&self, task_id: Uuid) -> Result<Vec<SignalRow>, DatabaseError> {
        Ok(sqlx::query_as::<_, SignalRow>(
            "SELECT * FROM task_signals WHERE task_id = ? ORDER BY create_dt DESC, rowid DESC",
        )
        .bind(task_id.to_string())
        .fetch_all(&self.pool)
        .await?)
    }

    /// A single ledger entry by its ID (used to resolve a task's state
    /// pointer)
    pub async fn signal_by_id(&self, id: &str) -> Result<Option<SignalRow>, DatabaseError> {
        Ok(
            sqlx::query_as::<_, SignalRow>("SELECT * FROM task_signals WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    /// Earliest occurrence of a given signal for a task
    pub async fn first_signal(
        &self,
        task_id: Uuid,
        signal: TaskSignal,
    ) -> Result<Option<SignalRow>, DatabaseError> {
        Ok(sqlx::query_as::<_, SignalRow>(
            r#"
            SELECT * FROM task_signals
            WHERE task_id = ? AND signal_name = ?
            ORDER BY create_dt ASC, rowid ASC LIMIT 1
            "#,
        )
        .bind(task_id.to_string())
        .bind(signal.as_str())
        .fetch_optional(&self.pool)
        .await?)
    }

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Delete all signal entries and task rows. Returns (signals, tasks)
    /// removed.
    pub async fn purge_all(&self) -> Result<(u64, u64), DatabaseError> {
        let mut tx = self.pool.begin().await?;

        let signals = sqlx::query("DELETE FROM task_signals")
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let tasks = sqlx::query("DELETE FROM tasks")
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;

        Ok((signals, tasks))
    }

    /// Close the database connection
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
