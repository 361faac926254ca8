//! Database module for SQLite persistence
//!
//! Holds the durable half of the system: the task registry (`tasks`) and
//! the append-only signal ledger (`task_signals`).

mod migrations;
mod models;
mod repository;

pub use models::{SignalRow, TaskRow};
pub use repository::{Database, DatabaseError, NewSignal};
