use crate::domain::reconcile::SkipOverlay;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::record_store::SkipRecord;
use std::sync::{Mutex, MutexGuard};

/// In-memory overlay of skipped task ids with optional free-text reasons.
/// Mutations take effect immediately; the agenda service persists them to
/// the remote store in the background, and a persistence failure never rolls
/// the overlay back.
#[derive(Debug, Default)]
pub struct SkipRegistry {
    entries: Mutex<SkipOverlay>,
}

impl SkipRegistry {
    fn entries(&self) -> Result<MutexGuard<'_, SkipOverlay>, InfraError> {
        self.entries.lock().map_err(|error| {
            InfraError::InvalidConfig(format!("skip registry lock poisoned: {error}"))
        })
    }

    pub fn skip(&self, task_id: &str, reason: Option<String>) -> Result<(), InfraError> {
        let task_id = task_id.trim();
        if task_id.is_empty() {
            return Ok(());
        }
        self.entries()?.insert(task_id.to_string(), reason);
        Ok(())
    }

    pub fn unskip(&self, task_id: &str) -> Result<bool, InfraError> {
        Ok(self.entries()?.remove(task_id.trim()).is_some())
    }

    pub fn is_skipped(&self, task_id: &str) -> Result<bool, InfraError> {
        Ok(self.entries()?.contains_key(task_id.trim()))
    }

    pub fn reason_of(&self, task_id: &str) -> Result<Option<String>, InfraError> {
        Ok(self.entries()?.get(task_id.trim()).cloned().flatten())
    }

    /// Snapshot of the overlay for one reconciliation pass.
    pub fn overlay(&self) -> Result<SkipOverlay, InfraError> {
        Ok(self.entries()?.clone())
    }

    /// Folds remotely persisted skip records into the overlay. Local entries
    /// win: an id skipped here stays authoritative until its own write lands.
    pub fn absorb(&self, records: Vec<SkipRecord>) -> Result<(), InfraError> {
        let mut entries = self.entries()?;
        for record in records {
            entries.entry(record.task_id).or_insert(record.reason);
        }
        Ok(())
    }
}
