use crate::infrastructure::error::InfraError;
use chrono::NaiveDateTime;
use std::collections::HashMap;
use std::sync::Mutex;

/// One reminder the scheduler decided to fire. `reminder_id` is namespaced
/// so a cancellation sweep can target exactly this scheduler's reminders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderRequest {
    pub reminder_id: String,
    pub task_id: String,
    pub title: String,
    pub trigger_at: NaiveDateTime,
    pub lead_minutes: u32,
    pub category: Option<String>,
}

/// Platform reminder collaborator owned by the presentation layer. Both
/// operations are idempotent: re-scheduling an existing id replaces it and
/// cancelling an absent namespace is a no-op.
pub trait ReminderSink: Send + Sync {
    fn schedule(&self, request: &ReminderRequest) -> Result<(), InfraError>;
    fn cancel_namespace(&self, namespace: &str) -> Result<(), InfraError>;
}

#[derive(Debug, Default)]
pub struct InMemoryReminderSink {
    reminders: Mutex<HashMap<String, ReminderRequest>>,
}

impl InMemoryReminderSink {
    pub fn scheduled(&self) -> Vec<ReminderRequest> {
        let reminders = self.reminders.lock().expect("reminder sink lock poisoned");
        let mut listed: Vec<ReminderRequest> = reminders.values().cloned().collect();
        listed.sort_by(|a, b| a.reminder_id.cmp(&b.reminder_id));
        listed
    }
}

impl ReminderSink for InMemoryReminderSink {
    fn schedule(&self, request: &ReminderRequest) -> Result<(), InfraError> {
        if request.reminder_id.trim().is_empty() {
            return Err(InfraError::InvalidRecord(
                "reminder id must not be empty".to_string(),
            ));
        }
        let mut reminders = self.reminders.lock().map_err(|error| {
            InfraError::InvalidConfig(format!("reminder sink lock poisoned: {error}"))
        })?;
        reminders.insert(request.reminder_id.clone(), request.clone());
        Ok(())
    }

    fn cancel_namespace(&self, namespace: &str) -> Result<(), InfraError> {
        let mut reminders = self.reminders.lock().map_err(|error| {
            InfraError::InvalidConfig(format!("reminder sink lock poisoned: {error}"))
        })?;
        reminders.retain(|reminder_id, _| !reminder_id.starts_with(namespace));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample_request(reminder_id: &str) -> ReminderRequest {
        ReminderRequest {
            reminder_id: reminder_id.to_string(),
            task_id: "blk-1".to_string(),
            title: "Deep work".to_string(),
            trigger_at: NaiveDate::from_ymd_opt(2026, 2, 16)
                .expect("valid date")
                .and_hms_opt(8, 50, 0)
                .expect("valid time"),
            lead_minutes: 10,
            category: Some("work".to_string()),
        }
    }

    #[test]
    fn scheduling_same_id_twice_replaces_instead_of_duplicating() {
        let sink = InMemoryReminderSink::default();
        sink.schedule(&sample_request("ns:blk-1")).expect("first schedule");
        let mut replacement = sample_request("ns:blk-1");
        replacement.lead_minutes = 5;
        sink.schedule(&replacement).expect("second schedule");

        let scheduled = sink.scheduled();
        assert_eq!(scheduled.len(), 1);
        assert_eq!(scheduled[0].lead_minutes, 5);
    }

    #[test]
    fn cancel_namespace_only_touches_matching_ids() {
        let sink = InMemoryReminderSink::default();
        sink.schedule(&sample_request("ns:blk-1")).expect("schedule");
        sink.schedule(&sample_request("other:blk-2")).expect("schedule");

        sink.cancel_namespace("ns:").expect("cancel");

        let scheduled = sink.scheduled();
        assert_eq!(scheduled.len(), 1);
        assert_eq!(scheduled[0].reminder_id, "other:blk-2");
    }

    #[test]
    fn cancel_on_empty_sink_is_a_no_op() {
        let sink = InMemoryReminderSink::default();
        assert!(sink.cancel_namespace("ns:").is_ok());
        assert!(sink.scheduled().is_empty());
    }
}
