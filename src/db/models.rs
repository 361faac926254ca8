//! Database models

use crate::signal::TaskSignal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Task registry record
///
/// `state_id` always points at the newest signal ledger entry for this
/// task, or is NULL before the first signal arrives. `progress_count` is
/// authoritative only once `finished` is set; while the task runs, the
/// live count sits in the progress cache.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TaskRow {
    pub task_id: String,
    pub parent_task_id: Option<String>,
    pub name: String,
    pub state_id: Option<String>,
    pub description: String,
    pub finished: i32,
    pub total: Option<i64>,
    pub progress_count: Option<i64>,
    pub cumulate_progress: i32,
    pub unit: String,
    pub unit_divisor: i64,
    pub create_dt: String,
    pub update_dt: String,
}

impl TaskRow {
    pub fn id(&self) -> Uuid {
        Uuid::parse_str(&self.task_id).unwrap_or(Uuid::nil())
    }

    pub fn parent_id(&self) -> Option<Uuid> {
        self.parent_task_id
            .as_deref()
            .and_then(|id| Uuid::parse_str(id).ok())
    }

    /// True for top-level tasks (no parent).
    pub fn is_main_task(&self) -> bool {
        self.parent_task_id.is_none()
    }

    pub fn is_finished(&self) -> bool {
        self.finished == 1
    }

    /// Whether this main task's displayed progress sums its children.
    pub fn cumulates(&self) -> bool {
        self.cumulate_progress == 1
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        parse_dt(&self.update_dt)
    }
}

/// Signal ledger record, immutable once written
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SignalRow {
    pub id: String,
    pub task_id: String,
    pub signal_name: String,
    pub progress_count: Option<i64>,
    pub exception_line: Option<String>,
    pub exception: Option<String>,
    pub hostname: String,
    pub pid: i64,
    pub thread_name: String,
    pub create_dt: String,
}

impl SignalRow {
    pub fn signal(&self) -> Option<TaskSignal> {
        TaskSignal::from_str(&self.signal_name).ok()
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        parse_dt(&self.create_dt)
    }
}

impl std::fmt::Display for SignalRow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.exception_line {
            Some(line) => write!(f, "{} - {}", self.signal_name, line),
            None => write!(f, "{}", self.signal_name),
        }
    }
}

fn parse_dt(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
