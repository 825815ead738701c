use crate::infrastructure::error::InfraError;
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

/// Tracks task ids under local optimistic mutation. While any id is tracked
/// the auto-refresh scheduler skips its whole next tick; a drag or resize is
/// short-lived enough that one missed refresh is immaterial.
#[derive(Debug, Default)]
pub struct PendingEditTracker {
    editing: Mutex<HashSet<String>>,
}

impl PendingEditTracker {
    fn editing(&self) -> Result<MutexGuard<'_, HashSet<String>>, InfraError> {
        self.editing.lock().map_err(|error| {
            InfraError::InvalidConfig(format!("pending edit lock poisoned: {error}"))
        })
    }

    pub fn begin_edit(&self, task_id: &str) -> Result<(), InfraError> {
        let task_id = task_id.trim();
        if task_id.is_empty() {
            return Ok(());
        }
        self.editing()?.insert(task_id.to_string());
        Ok(())
    }

    pub fn end_edit(&self, task_id: &str) -> Result<(), InfraError> {
        self.editing()?.remove(task_id.trim());
        Ok(())
    }

    pub fn is_editing(&self, task_id: &str) -> Result<bool, InfraError> {
        Ok(self.editing()?.contains(task_id.trim()))
    }

    pub fn is_blocking(&self) -> Result<bool, InfraError> {
        Ok(!self.editing()?.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_tracked_edit_blocks_globally() {
        let tracker = PendingEditTracker::default();
        assert!(!tracker.is_blocking().expect("is_blocking"));

        tracker.begin_edit("blk-1").expect("begin_edit");
        tracker.begin_edit("blk-2").expect("begin_edit");
        assert!(tracker.is_blocking().expect("is_blocking"));
        assert!(tracker.is_editing("blk-1").expect("is_editing"));

        tracker.end_edit("blk-1").expect("end_edit");
        assert!(tracker.is_blocking().expect("is_blocking"));

        tracker.end_edit("blk-2").expect("end_edit");
        assert!(!tracker.is_blocking().expect("is_blocking"));
    }

    #[test]
    fn begin_edit_is_idempotent_per_task() {
        let tracker = PendingEditTracker::default();
        tracker.begin_edit("blk-1").expect("begin_edit");
        tracker.begin_edit("blk-1").expect("begin_edit");
        tracker.end_edit("blk-1").expect("end_edit");
        assert!(!tracker.is_blocking().expect("is_blocking"));
    }

    #[test]
    fn blank_ids_are_ignored() {
        let tracker = PendingEditTracker::default();
        tracker.begin_edit("   ").expect("begin_edit");
        assert!(!tracker.is_blocking().expect("is_blocking"));
    }
}
