use crate::domain::models::{
    ClockTime, MeetingRecord, Priority, RecordKind, Resolved, Task, TaskKind, TimeBlockRecord,
    TodoRecord,
};
use chrono::NaiveDate;
use log::warn;

pub const DEFAULT_MEETING_START: ClockTime = ClockTime { hour: 9, minute: 0 };
pub const DEFAULT_MEETING_DURATION_MINUTES: u32 = 60;
pub const DEFAULT_TODO_START: ClockTime = ClockTime { hour: 9, minute: 0 };
/// Display-only synthetic length of a todo; it carries no duration semantic.
pub const TODO_DISPLAY_MINUTES: u32 = 60;

/// Converts a (possibly expanded) block record into a task. Returns `None`
/// and logs when a time field fails to parse or the interval is reversed;
/// the rest of the batch is unaffected.
pub fn normalize_block(record: &TimeBlockRecord) -> Option<Task> {
    let start = match ClockTime::parse(&record.start_time) {
        Ok(start) => start,
        Err(error) => {
            warn!("dropping block '{}': {error}", record.id);
            return None;
        }
    };
    let end = match ClockTime::parse(&record.end_time) {
        Ok(end) => end,
        Err(error) => {
            warn!("dropping block '{}': {error}", record.id);
            return None;
        }
    };
    if end < start {
        warn!(
            "dropping block '{}': end {end} precedes start {start}",
            record.id
        );
        return None;
    }

    Some(Task {
        id: record.id.clone(),
        title: record.title.clone(),
        description: record.description.clone(),
        date: record.date,
        start,
        end,
        kind: TaskKind::Block,
        category: Some(record.category.clone()),
        priority: Priority::Normal,
        completed: record.completed,
        skipped: false,
        skip_reason: None,
        meeting_link: record.meeting_link.clone(),
        source_id: record.id.clone(),
        source_kind: RecordKind::TimeBlock,
        is_recurring: record.is_recurring,
    })
}

/// Converts a meeting record into a task. A missing start time resolves to
/// 09:00 and a missing duration to 60 minutes; end-of-day arithmetic wraps
/// modulo 24 hours and the task stays on its start date for sorting.
pub fn normalize_meeting(record: &MeetingRecord) -> Option<Task> {
    let start = match resolve_meeting_start(record) {
        Ok(start) => start.value(),
        Err(error) => {
            warn!("dropping meeting {}: {error}", record.id);
            return None;
        }
    };
    let duration = match resolve_meeting_duration(record) {
        Ok(duration) => duration.value(),
        Err(error) => {
            warn!("dropping meeting {}: {error}", record.id);
            return None;
        }
    };
    let end = start.add_minutes(duration);

    Some(Task {
        id: format!("meeting-{}", record.id),
        title: record.title.clone(),
        description: None,
        date: record.date,
        start,
        end,
        kind: TaskKind::Meeting,
        category: None,
        priority: Priority::Normal,
        completed: record.completed.unwrap_or(false),
        skipped: false,
        skip_reason: None,
        meeting_link: record.link.clone(),
        source_id: record.id.to_string(),
        source_kind: RecordKind::Meeting,
        is_recurring: false,
    })
}

/// Converts a todo record into a task. A missing start date resolves to the
/// reconciliation's reference day and a missing start time to 09:00; the end
/// is a display-only 60 minutes after the start.
pub fn normalize_todo(record: &TodoRecord, reference: NaiveDate) -> Option<Task> {
    let start = match resolve_todo_start_time(record) {
        Ok(start) => start.value(),
        Err(error) => {
            warn!("dropping todo '{}': {error}", record.id);
            return None;
        }
    };
    let date = resolve_todo_start_date(record, reference).value();

    Some(Task {
        id: record.id.clone(),
        title: record.name.clone(),
        description: record.description.clone(),
        date,
        start,
        end: start.add_minutes(TODO_DISPLAY_MINUTES),
        kind: TaskKind::Todo,
        category: None,
        priority: record.priority,
        completed: record.completed,
        skipped: false,
        skip_reason: None,
        meeting_link: None,
        source_id: record.id.clone(),
        source_kind: RecordKind::Todo,
        is_recurring: false,
    })
}

/// A specified-but-unparseable time is an error (the record is dropped, not
/// defaulted); only an absent time resolves to the default.
pub fn resolve_meeting_start(record: &MeetingRecord) -> Result<Resolved<ClockTime>, String> {
    match record.time.as_deref() {
        Some(raw) => ClockTime::parse(raw).map(Resolved::Specified),
        None => Ok(Resolved::Defaulted(DEFAULT_MEETING_START)),
    }
}

/// A specified duration must be a positive minute count that fits u32;
/// anything else is an error, not a fallback to the default.
pub fn resolve_meeting_duration(record: &MeetingRecord) -> Result<Resolved<u32>, String> {
    match record.duration_minutes {
        None => Ok(Resolved::Defaulted(DEFAULT_MEETING_DURATION_MINUTES)),
        Some(minutes) => match u32::try_from(minutes) {
            Ok(value) if value > 0 => Ok(Resolved::Specified(value)),
            _ => Err(format!(
                "meeting.duration_minutes {minutes} must be a positive minute count"
            )),
        },
    }
}

pub fn resolve_todo_start_time(record: &TodoRecord) -> Result<Resolved<ClockTime>, String> {
    match record.start_time.as_deref() {
        Some(raw) => ClockTime::parse(raw).map(Resolved::Specified),
        None => Ok(Resolved::Defaulted(DEFAULT_TODO_START)),
    }
}

pub fn resolve_todo_start_date(record: &TodoRecord, reference: NaiveDate) -> Resolved<NaiveDate> {
    match record.start_date {
        Some(date) => Resolved::Specified(date),
        None => Resolved::Defaulted(reference),
    }
}
