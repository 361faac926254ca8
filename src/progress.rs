//! Progress reporting surface for task bodies
//!
//! The code doing the actual work calls [`begin_progress`] once, then
//! `update(n)` per processed unit. Updates only touch the in-memory
//! progress cache; the durable row is written once, when the lifecycle
//! tracker sees the terminal signal. A main task's displayed count is
//! aggregated from its children at read time, so `update` never writes to
//! the parent's counter.

use crate::cache::ProgressCache;
use crate::db::{Database, DatabaseError};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// Maximum stored description length; longer input is truncated.
pub const MAX_DESCRIPTION_LEN: usize = 128;

/// The task identity the runtime hands to code running inside a task body.
#[derive(Debug, Clone)]
pub struct TaskIdentity {
    pub id: Uuid,
    pub name: String,
}

impl TaskIdentity {
    pub fn new(id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// Display metadata declared when a task starts reporting progress.
#[derive(Debug, Clone)]
pub struct ProgressOptions {
    /// Prefix for progress display.
    pub description: Option<String>,
    /// The number of expected iterations, when known up front.
    pub total: Option<u64>,
    /// Unit label for each iteration.
    pub unit: String,
    /// Divisor between SI prefixes (1000, or 1024 for bytes).
    pub unit_divisor: u64,
    /// Main task to register this task under, if any.
    pub parent_task_id: Option<Uuid>,
    /// Whether the main task's finalized progress sums its children.
    pub cumulate_progress: bool,
}

impl Default for ProgressOptions {
    fn default() -> Self {
        Self {
            description: None,
            total: None,
            unit: "it".to_string(),
            unit_divisor: 1000,
            parent_task_id: None,
            cumulate_progress: true,
        }
    }
}

/// Handle bound to one task's progress counter.
#[derive(Clone)]
pub struct ProgressHandle {
    task_id: Uuid,
    db: Arc<Database>,
    cache: ProgressCache,
}

impl ProgressHandle {
    pub fn task_id(&self) -> Uuid {
        self.task_id
    }

    /// Atomically add `n` processed units, returning the new cache total.
    ///
    /// Cheap enough to call per iteration; nothing durable is written.
    pub fn update(&self, n: u64) -> u64 {
        self.cache.increment(self.task_id, n)
    }

    /// Correct the expected total.
    ///
    /// Meant for tasks that only learn their real length while running
    /// (e.g. a chain that keeps spawning "the next step"): leave `total`
    /// unset at start and set the corrected value before finishing.
    pub async fn set_total(&self, total: u64) -> Result<(), DatabaseError> {
        self.db.update_total(self.task_id, total as i64).await
    }
}

/// Initialize progress display metadata for a task and get back an update
/// handle.
///
/// Overlong descriptions are truncated (with a logged warning) rather than
/// rejected; failing the task over a display string would be the wrong
/// trade. When `parent_task_id` is given, the parent/sub relationship is
/// recorded too.
pub async fn begin_progress(
    db: Arc<Database>,
    cache: ProgressCache,
    task: &TaskIdentity,
    options: ProgressOptions,
) -> Result<ProgressHandle, DatabaseError> {
    let mut description = options.description.unwrap_or_default();
    if description.chars().count() > MAX_DESCRIPTION_LEN {
        warn!(
            "Progress description for task {} overlong ({} chars), truncating to {}",
            task.id,
            description.chars().count(),
            MAX_DESCRIPTION_LEN
        );
        description = description.chars().take(MAX_DESCRIPTION_LEN).collect();
    }

    db.init_progress_meta(
        task.id,
        &task.name,
        &description,
        options.total.map(|t| t as i64),
        &options.unit,
        options.unit_divisor as i64,
        options.cumulate_progress,
    )
    .await?;

    if let Some(parent_task_id) = options.parent_task_id {
        db.set_parent_task(parent_task_id, task.id).await?;
    }

    Ok(ProgressHandle {
        task_id: task.id,
        db,
        cache,
    })
}
