//! Database migrations

/// SQL for creating the database schema
pub const INIT_SCHEMA: &str = r#"
-- Task registry: one row per task known to the runtime
CREATE TABLE IF NOT EXISTS tasks (
    task_id TEXT PRIMARY KEY,
    parent_task_id TEXT,
    name TEXT NOT NULL,
    state_id TEXT,
    description TEXT NOT NULL DEFAULT '',
    finished INTEGER NOT NULL DEFAULT 0,
    total INTEGER,
    progress_count INTEGER,
    cumulate_progress INTEGER NOT NULL DEFAULT 1,
    unit TEXT NOT NULL DEFAULT 'it',
    unit_divisor INTEGER NOT NULL DEFAULT 1000,
    create_dt TEXT NOT NULL,
    update_dt TEXT NOT NULL,

    FOREIGN KEY (parent_task_id) REFERENCES tasks(task_id) ON DELETE CASCADE
);

-- Signal ledger: append-only record of every observed lifecycle signal
CREATE TABLE IF NOT EXISTS task_signals (
    id TEXT PRIMARY KEY,
    task_id TEXT NOT NULL,
    signal_name TEXT NOT NULL,
    progress_count INTEGER,
    exception_line TEXT,
    exception TEXT,
    hostname TEXT NOT NULL,
    pid INTEGER NOT NULL,
    thread_name TEXT NOT NULL,
    create_dt TEXT NOT NULL,

    FOREIGN KEY (task_id) REFERENCES tasks(task_id) ON DELETE CASCADE
);

-- Create indexes for better query performance
CREATE INDEX IF NOT EXISTS idx_tasks_parent ON tasks(parent_task_id);
CREATE INDEX IF NOT EXISTS idx_tasks_updated ON tasks(update_dt DESC);
CREATE INDEX IF NOT EXISTS idx_signals_task ON task_signals(task_id, create_dt DESC);
CREATE INDEX IF NOT EXISTS idx_signals_name ON task_signals(signal_name);
"#;
