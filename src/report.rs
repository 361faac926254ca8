//! Progress reporting and human-readable display
//!
//! Reads the cache for in-flight tasks and the registry for finished ones,
//! and derives display metrics (percentage, throughput, progress string)
//! as pure functions. Every undefined metric (missing total, zero elapsed,
//! no count) is omitted rather than raised; partial information is the
//! expected degraded mode.

use crate::cache::ProgressCache;
use crate::db::{Database, DatabaseError, TaskRow};
use crate::signal::TaskSignal;
use std::sync::Arc;
use uuid::Uuid;

// ============================================================================
// Pure display helpers (number formatting borrowed from tqdm)
// ============================================================================

/// Format a number with SI order-of-magnitude prefixes.
///
/// `format_sizeof(10.0, "", 1000.0)` is `"10.0"`, `format_sizeof(2000.0,
/// "", 1000.0)` is `"2.00k"`, `format_sizeof(3.5 * 1024.0 * 1024.0,
/// "Bytes", 1024.0)` is `"3.50MBytes"`.
pub fn format_sizeof(num: f64, suffix: &str, divisor: f64) -> String {
    let mut num = num;
    for unit in ["", "k", "M", "G", "T", "P", "E", "Z"] {
        if num.abs() < 999.5 {
            if num.abs() < 99.95 {
                if num.abs() < 9.995 {
                    return format!("{:.2}{}{}", num, unit, suffix);
                }
                return format!("{:.1}{}{}", num, unit, suffix);
            }
            return format!("{:.0}{}{}", num, unit, suffix);
        }
        num /= divisor;
    }
    format!("{:.1}Y{}", num, suffix)
}

/// Whole-number percentage, defined only for a positive total.
pub fn percentage(num: f64, total: f64) -> Option<String> {
    if total <= 0.0 {
        return None;
    }
    Some(format!("{:.0}%", num / total * 100.0))
}

/// Processing rate display.
///
/// Rates above one unit per second format as `<scaled count><unit>/s`;
/// slower rates flip to seconds-per-unit (`"2.00s/it"`) so a slow task
/// never shows a useless `0.00/s`. `None` when the rate is undefined
/// (nothing processed yet, or no elapsed time).
pub fn throughput(num: f64, elapsed_sec: f64, suffix: &str, divisor: f64) -> Option<String> {
    if num <= 0.0 || elapsed_sec <= 0.0 {
        return None;
    }
    let rate = num / elapsed_sec;
    if rate > 1.0 {
        Some(format!("{}/s", format_sizeof(rate, suffix, divisor)))
    } else {
        Some(format!("{:.2}s/{}", elapsed_sec / num, suffix))
    }
}

// ============================================================================
// Reporter
// ============================================================================

/// Snapshot of everything needed to render one task's progress.
#[derive(Debug, Clone)]
pub struct ProgressReport {
    pub task_id: Uuid,
    pub name: String,
    pub description: String,
    /// Name of the latest observed signal, if any.
    pub state: Option<String>,
    pub finished: bool,
    pub is_main_task: bool,
    /// Name of the parent task, for sub-tasks.
    pub parent_name: Option<String>,
    pub count: Option<u64>,
    pub total: Option<u64>,
    pub elapsed_seconds: Option<f64>,
    pub unit: String,
    pub unit_divisor: u64,
}

impl ProgressReport {
    pub fn percentage(&self) -> Option<String> {
        match (self.count, self.total) {
            (Some(count), Some(total)) => percentage(count as f64, total as f64),
            _ => None,
        }
    }

    /// Scaled count with unit, e.g. `"2.00kit"`.
    pub fn human_progress(&self) -> Option<String> {
        self.count
            .map(|count| format_sizeof(count as f64, &self.unit, self.unit_divisor as f64))
    }

    pub fn human_throughput(&self) -> Option<String> {
        match (self.count, self.elapsed_seconds) {
            (Some(count), Some(elapsed)) => {
                throughput(count as f64, elapsed, &self.unit, self.unit_divisor as f64)
            }
            _ => None,
        }
    }

    /// Combined progress line: `"{count}/{total}{unit} {percentage}
    /// {throughput}"`, or without total/percentage when the total is
    /// unknown. Empty when the task never reported a count.
    pub fn progress_string(&self) -> String {
        let count = match self.count {
            Some(count) => count,
            None => return String::new(),
        };

        let mut parts = Vec::new();
        match self.total {
            Some(total) => {
                parts.push(format!("{}/{}{}", count, total, self.unit));
                if let Some(pct) = self.percentage() {
                    parts.push(pct);
                }
            }
            None => parts.push(format!("{}{}", count, self.unit)),
        }
        if let Some(tput) = self.human_throughput() {
            parts.push(tput);
        }
        if self.finished {
            parts.push("(finished)".to_string());
        }

        parts.join(" ")
    }
}

impl std::fmt::Display for ProgressReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.description.is_empty() {
            write!(f, "{}:", self.name)?;
        } else {
            write!(f, "{}:", self.description)?;
        }

        let progress = self.progress_string();
        if progress.is_empty() {
            // Waiting for execution, or a task without progress info
            write!(f, " {}", self.state.as_deref().unwrap_or("unseen"))?;
        } else {
            write!(f, " {}", progress)?;
        }

        if self.is_main_task {
            write!(f, " (Main task)")
        } else {
            match &self.parent_name {
                Some(parent) => write!(f, " (Sub task of {})", parent),
                None => write!(f, " (Sub task)"),
            }
        }
    }
}

/// Read-only progress queries over the registry and cache.
pub struct TaskReporter {
    db: Arc<Database>,
    cache: ProgressCache,
}

impl TaskReporter {
    pub fn new(db: Arc<Database>, cache: ProgressCache) -> Self {
        Self { db, cache }
    }

    /// The cache keys a task's progress aggregates over: just itself for
    /// sub-tasks, itself plus all direct children for main tasks.
    pub async fn aggregation_ids(&self, task: &TaskRow) -> Result<Vec<Uuid>, DatabaseError> {
        if !task.is_main_task() {
            return Ok(vec![task.id()]);
        }

        let mut ids = vec![task.id()];
        for child in self.db.children(task.id()).await? {
            ids.push(child.id());
        }
        Ok(ids)
    }

    /// Best-known processed-unit count.
    ///
    /// Finished tasks report their finalized durable count; running tasks
    /// report the cache sum over their aggregation set. `None` means the
    /// task never reported progress, which is different from a count of
    /// zero.
    pub async fn current_count(&self, task: &TaskRow) -> Result<Option<u64>, DatabaseError> {
        if task.is_finished() {
            return Ok(task.progress_count.map(|count| count as u64));
        }

        let ids = self.aggregation_ids(task).await?;
        if self.cache.last_update_many(&ids).is_none() {
            return Ok(None);
        }
        Ok(Some(self.cache.get_many(&ids)))
    }

    /// Seconds between the task's `executing` signal and its last progress
    /// activity. `None` when the task never reached `executing` or never
    /// reported progress.
    pub async fn elapsed_seconds(&self, task: &TaskRow) -> Result<Option<f64>, DatabaseError> {
        let executing = self
            .db
            .first_signal(task.id(), TaskSignal::Executing)
            .await?;
        let started = match executing.and_then(|signal| signal.created_at()) {
            Some(started) => started,
            None => return Ok(None),
        };

        let last_seen = if task.is_finished() {
            match &task.state_id {
                Some(state_id) => self
                    .db
                    .signal_by_id(state_id)
                    .await?
                    .and_then(|signal| signal.created_at()),
                None => None,
            }
        } else {
            let ids = self.aggregation_ids(task).await?;
            self.cache.last_update_many(&ids)
        };

        Ok(last_seen.map(|end| (end - started).num_milliseconds() as f64 / 1000.0))
    }

    /// Full progress snapshot for one task.
    pub async fn report(&self, task: &TaskRow) -> Result<ProgressReport, DatabaseError> {
        let state = match &task.state_id {
            Some(state_id) => self
                .db
                .signal_by_id(state_id)
                .await?
                .map(|signal| signal.signal_name),
            None => None,
        };

        let parent_name = match task.parent_id() {
            Some(parent_id) => self.db.get_task(parent_id).await?.map(|parent| parent.name),
            None => None,
        };

        Ok(ProgressReport {
            task_id: task.id(),
            name: task.name.clone(),
            description: task.description.clone(),
            state,
            finished: task.is_finished(),
            is_main_task: task.is_main_task(),
            parent_name,
            count: self.current_count(task).await?,
            total: task.total.map(|total| total as u64),
            elapsed_seconds: self.elapsed_seconds(task).await?,
            unit: task.unit.clone(),
            unit_divisor: task.unit_divisor as u64,
        })
    }

    /// Report a task by id.
    pub async fn report_by_id(&self, task_id: Uuid) -> Result<ProgressReport, DatabaseError> {
        let task = self.db.require_task(task_id).await?;
        self.report(&task).await
    }
}
