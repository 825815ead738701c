use crate::domain::models::{
    MeetingRecord, Task, TaskSnapshot, TimeBlockRecord, TodoRecord,
};
use crate::domain::normalize::{normalize_block, normalize_meeting, normalize_todo};
use crate::domain::recurrence::{expand, ExpansionWindow};
use chrono::{Days, NaiveDate, NaiveDateTime};
use std::collections::HashMap;

/// Meetings are reconciled over a wider window than blocks so past minutes
/// and far-out invites stay reachable.
pub const MEETING_WINDOW_PAST_DAYS: u64 = 30;
pub const MEETING_WINDOW_FUTURE_DAYS: u64 = 90;

/// Skipped task ids with their optional free-text reasons.
pub type SkipOverlay = HashMap<String, Option<String>>;

/// Raw per-source fetch results, each already degraded to empty if its fetch
/// failed.
#[derive(Debug, Clone, Default)]
pub struct ReconcileInput {
    pub recurring_blocks: Vec<TimeBlockRecord>,
    pub dated_blocks: Vec<TimeBlockRecord>,
    pub meetings: Vec<MeetingRecord>,
    pub todos: Vec<TodoRecord>,
}

/// One full reconciliation pass: expand, merge, filter, normalize, overlay,
/// sort, partition. Pure; the surrounding service owns fetching and the
/// snapshot swap.
pub fn reconcile(
    input: &ReconcileInput,
    skips: &SkipOverlay,
    user_id: &str,
    reference: NaiveDateTime,
) -> TaskSnapshot {
    let window = ExpansionWindow::around(reference.date());

    let expanded: Vec<TimeBlockRecord> = input
        .recurring_blocks
        .iter()
        .flat_map(|definition| expand(definition, window))
        .collect();
    let blocks = merge_blocks(expanded, input.dated_blocks.clone());

    let mut tasks: Vec<Task> = blocks.iter().filter_map(normalize_block).collect();
    tasks.extend(
        input
            .meetings
            .iter()
            .filter(|meeting| is_meeting_visible(meeting, user_id, reference.date()))
            .filter_map(normalize_meeting),
    );
    tasks.extend(
        input
            .todos
            .iter()
            .filter_map(|todo| normalize_todo(todo, reference.date())),
    );

    for task in &mut tasks {
        if let Some(reason) = skips.get(&task.id) {
            task.skipped = true;
            task.skip_reason = reason.clone();
        }
    }

    // Ids are unique within a snapshot, so the trailing id key only breaks
    // same-moment ties and keeps repeated passes byte-identical.
    tasks.sort_by(|a, b| {
        (a.date, a.start, &a.id).cmp(&(b.date, b.start, &b.id))
    });

    snapshot_from(tasks, reference)
}

/// Builds the partitioned snapshot from an already-sorted task list. Also
/// used by the agenda service to re-partition after an optimistic in-place
/// patch.
pub fn snapshot_from(tasks: Vec<Task>, reference: NaiveDateTime) -> TaskSnapshot {
    let completed: Vec<Task> = tasks.iter().filter(|task| task.completed).cloned().collect();
    let upcoming: Vec<Task> = tasks
        .iter()
        .filter(|task| !task.completed && !task.skipped && task.starts_after(reference))
        .cloned()
        .collect();

    TaskSnapshot {
        all: tasks,
        upcoming,
        completed,
    }
}

/// Merges expanded recurring instances with specific-date blocks. Specific
/// blocks are inserted second and therefore win any key collision: a one-off
/// edit of a normally-recurring day takes precedence over the expansion.
///
/// The key is `(date, title, start_time)`, kept from the original behavior
/// even though two distinct same-titled blocks starting together will
/// collide.
pub fn merge_blocks(
    expanded: Vec<TimeBlockRecord>,
    specific: Vec<TimeBlockRecord>,
) -> Vec<TimeBlockRecord> {
    let mut merged: HashMap<(NaiveDate, String, String), TimeBlockRecord> = HashMap::new();
    for block in expanded.into_iter().chain(specific) {
        merged.insert(block_merge_key(&block), block);
    }
    merged.into_values().collect()
}

fn block_merge_key(block: &TimeBlockRecord) -> (NaiveDate, String, String) {
    (
        block.date,
        block.title.trim().to_string(),
        block.start_time.trim().to_string(),
    )
}

/// Access window plus the owner-or-attendee re-check. Failing the check is a
/// silent exclusion, not an error.
fn is_meeting_visible(meeting: &MeetingRecord, user_id: &str, reference: NaiveDate) -> bool {
    let window_start = reference - Days::new(MEETING_WINDOW_PAST_DAYS);
    let window_end = reference + Days::new(MEETING_WINDOW_FUTURE_DAYS);
    meeting.date >= window_start
        && meeting.date <= window_end
        && meeting.is_accessible_by(user_id)
}
