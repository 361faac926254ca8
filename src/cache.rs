//! Ephemeral progress counter cache
//!
//! Absorbs high-frequency per-iteration updates from running task bodies so
//! the durable store only sees progress once, at the terminal signal. Keyed
//! by task id; every entry carries the running count plus the last-update
//! timestamp. Entries expire after a retention window even when never
//! explicitly evicted, so tasks that die without a terminal signal cannot
//! leak entries forever.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::warn;
use uuid::Uuid;

/// Default retention for cache entries: 7 days.
pub const DEFAULT_RETENTION_SECS: u64 = 7 * 24 * 60 * 60;

#[derive(Debug, Clone, Copy)]
struct Slot {
    count: u64,
    updated_at: DateTime<Utc>,
}

/// Shared progress counter store.
///
/// Cheap to clone; every clone points at the same underlying map. One
/// instance is created at process start and handed to the tracker, the
/// reporter and task-body progress handles. Progress tracking is
/// best-effort: a poisoned lock degrades reads to "no progress known"
/// rather than failing the owning task.
#[derive(Clone)]
pub struct ProgressCache {
    slots: Arc<Mutex<HashMap<Uuid, Slot>>>,
    retention: Duration,
}

impl Default for ProgressCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressCache {
    pub fn new() -> Self {
        Self::with_retention_secs(DEFAULT_RETENTION_SECS)
    }

    pub fn with_retention_secs(retention_secs: u64) -> Self {
        Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
            retention: Duration::seconds(retention_secs as i64),
        }
    }

    fn is_expired(&self, slot: &Slot, now: DateTime<Utc>) -> bool {
        now - slot.updated_at > self.retention
    }

    /// Atomically increment the counter for `task_id` by `delta`.
    ///
    /// Initializes the counter to `delta` when no live entry exists, and
    /// refreshes the last-update timestamp either way. Returns the new
    /// total. Safe to call from any number of concurrent tasks or threads.
    pub fn increment(&self, task_id: Uuid, delta: u64) -> u64 {
        let now = Utc::now();
        match self.slots.lock() {
            Ok(mut slots) => {
                let slot = slots.entry(task_id).or_insert(Slot {
                    count: 0,
                    updated_at: now,
                });
                if self.is_expired(slot, now) {
                    slot.count = 0;
                }
                slot.count += delta;
                slot.updated_at = now;
                slot.count
            }
            Err(_) => {
                warn!("Progress cache lock poisoned, dropping increment for {task_id}");
                delta
            }
        }
    }

    /// Current counter for one task, 0 when absent or expired.
    pub fn get(&self, task_id: Uuid) -> u64 {
        self.get_many(&[task_id])
    }

    /// Sum of the counters for all given task ids.
    ///
    /// Used to aggregate a main task's progress across its sub-tasks.
    pub fn get_many(&self, task_ids: &[Uuid]) -> u64 {
        let now = Utc::now();
        match self.slots.lock() {
            Ok(slots) => task_ids
                .iter()
                .filter_map(|id| slots.get(id))
                .filter(|slot| !self.is_expired(slot, now))
                .map(|slot| slot.count)
                .sum(),
            Err(_) => 0,
        }
    }

    /// Last update timestamp for one task, if it ever reported progress.
    pub fn last_update(&self, task_id: Uuid) -> Option<DateTime<Utc>> {
        self.last_update_many(&[task_id])
    }

    /// Most recent update timestamp across all given task ids.
    pub fn last_update_many(&self, task_ids: &[Uuid]) -> Option<DateTime<Utc>> {
        let now = Utc::now();
        match self.slots.lock() {
            Ok(slots) => task_ids
                .iter()
                .filter_map(|id| slots.get(id))
                .filter(|slot| !self.is_expired(slot, now))
                .map(|slot| slot.updated_at)
                .max(),
            Err(_) => None,
        }
    }

    /// True when a live (non-expired) entry exists for the task.
    pub fn contains(&self, task_id: Uuid) -> bool {
        self.last_update(task_id).is_some()
    }

    /// Drop the entry for `task_id`. Evicting an absent key is a no-op.
    pub fn evict(&self, task_id: Uuid) {
        if let Ok(mut slots) = self.slots.lock() {
            slots.remove(&task_id);
        }
    }

    /// Sweep out entries past the retention window, returning how many
    /// were removed. Expiry also happens lazily on every read, so calling
    /// this is optional housekeeping.
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        match self.slots.lock() {
            Ok(mut slots) => {
                let before = slots.len();
                slots.retain(|_, slot| now - slot.updated_at <= self.retention);
                before - slots.len()
            }
            Err(_) => 0,
        }
    }

    /// Number of live entries, for diagnostics and tests.
    pub fn len(&self) -> usize {
        self.slots.lock().map(|slots| slots.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_increment_initializes_missing_key() {
        let cache = ProgressCache::new();
        let task_id = Uuid::new_v4();

        assert_eq!(cache.get(task_id), 0);
        assert_eq!(cache.increment(task_id, 5), 5);
        assert_eq!(cache.increment(task_id, 3), 8);
        assert_eq!(cache.get(task_id), 8);
    }

    #[test]
    fn test_increment_records_timestamp() {
        let cache = ProgressCache::new();
        let task_id = Uuid::new_v4();

        assert!(cache.last_update(task_id).is_none());
        cache.increment(task_id, 1);
        assert!(cache.last_update(task_id).is_some());
    }

    #[test]
    fn test_get_many_sums_across_tasks() {
        let cache = ProgressCache::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        cache.increment(a, 5);
        cache.increment(b, 7);

        assert_eq!(cache.get_many(&[a, b]), 12);
        assert_eq!(cache.get_many(&[a, b, Uuid::new_v4()]), 12);
    }

    #[test]
    fn test_last_update_many_takes_max() {
        let cache = ProgressCache::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        cache.increment(a, 1);
        cache.increment(b, 1);

        let latest = cache.last_update_many(&[a, b]).unwrap();
        assert_eq!(latest, cache.last_update(b).unwrap());
        assert!(cache.last_update_many(&[Uuid::new_v4()]).is_none());
    }

    #[test]
    fn test_evict_is_idempotent() {
        let cache = ProgressCache::new();
        let task_id = Uuid::new_v4();

        cache.increment(task_id, 10);
        cache.evict(task_id);
        assert_eq!(cache.get(task_id), 0);
        assert!(!cache.contains(task_id));

        // Absent key: still a no-op
        cache.evict(task_id);
    }

    #[test]
    fn test_expired_entries_are_invisible() {
        let cache = ProgressCache::with_retention_secs(0);
        let task_id = Uuid::new_v4();

        cache.increment(task_id, 4);
        std::thread::sleep(std::time::Duration::from_millis(1100));

        assert_eq!(cache.get(task_id), 0);
        assert!(cache.last_update(task_id).is_none());
        assert_eq!(cache.purge_expired(), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_concurrent_increments_sum_exactly() {
        let cache = ProgressCache::new();
        let task_id = Uuid::new_v4();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            handles.push(std::thread::spawn(move || {
                for _ in 0..1000 {
                    cache.increment(task_id, 1);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(cache.get(task_id), 8000);
    }
}
