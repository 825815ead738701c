use crate::domain::models::Task;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::reminder_sink::{ReminderRequest, ReminderSink};
use chrono::{Duration, NaiveDateTime};
use log::debug;
use std::collections::HashSet;
use std::sync::Arc;

/// Prefix of every reminder id this scheduler owns; cancellation sweeps are
/// scoped to it so foreign reminders on the same sink are never touched.
pub const REMINDER_NAMESPACE: &str = "dayweave-reminder:";
pub const DEFAULT_LEAD_MINUTES: u32 = 10;

/// Decides what and when to remind; how reminders are displayed belongs to
/// the sink's implementor.
pub struct NotificationScheduler {
    sink: Arc<dyn ReminderSink>,
}

impl NotificationScheduler {
    pub fn new(sink: Arc<dyn ReminderSink>) -> Self {
        Self { sink }
    }

    /// Cancels this scheduler's namespace and schedules the plan for the
    /// given tasks, so the sink reflects exactly the latest reconciliation
    /// and never accumulates stale reminders from a previous snapshot.
    pub fn schedule(
        &self,
        tasks: &[Task],
        lead_minutes: u32,
        reference: NaiveDateTime,
    ) -> Result<Vec<ReminderRequest>, InfraError> {
        self.sink.cancel_namespace(REMINDER_NAMESPACE)?;
        let planned = plan(tasks, lead_minutes, reference);
        for request in &planned {
            self.sink.schedule(request)?;
        }
        debug!("scheduled {} reminders", planned.len());
        Ok(planned)
    }
}

/// Pure planning rule: one reminder per open, unskipped task that starts
/// strictly in the future, triggered `lead_minutes` ahead. Tasks already due
/// within the lead window get no reminder, and a task id is never planned
/// twice in one pass.
pub fn plan(tasks: &[Task], lead_minutes: u32, reference: NaiveDateTime) -> Vec<ReminderRequest> {
    let mut planned = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();

    for task in tasks {
        if task.completed || task.skipped || !task.starts_after(reference) {
            continue;
        }
        let trigger_at = task.start_moment() - Duration::minutes(i64::from(lead_minutes));
        if trigger_at <= reference {
            continue;
        }
        if !seen.insert(task.id.as_str()) {
            continue;
        }
        planned.push(ReminderRequest {
            reminder_id: format!("{REMINDER_NAMESPACE}{}", task.id),
            task_id: task.id.clone(),
            title: task.title.clone(),
            trigger_at,
            lead_minutes,
            category: task.category.clone(),
        });
    }

    planned
}
