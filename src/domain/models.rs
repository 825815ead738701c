use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

pub const MINUTES_PER_DAY: u32 = 24 * 60;

/// Wall-clock hour and minute, deliberately kept apart from any absolute
/// timestamp so the core never has to reason about timezones.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClockTime {
    pub hour: u8,
    pub minute: u8,
}

impl ClockTime {
    pub fn new(hour: u8, minute: u8) -> Result<Self, String> {
        if hour > 23 || minute > 59 {
            return Err(format!("invalid wall-clock time {hour:02}:{minute:02}"));
        }
        Ok(Self { hour, minute })
    }

    /// Accepts `H:MM`, `HH:MM` and `HH:MM:SS`; seconds are discarded.
    pub fn parse(value: &str) -> Result<Self, String> {
        let parts: Vec<&str> = value.trim().split(':').collect();
        if parts.len() != 2 && parts.len() != 3 {
            return Err(format!("time '{value}' must be HH:MM or HH:MM:SS"));
        }
        let hour = parts[0]
            .parse::<u8>()
            .map_err(|_| format!("time '{value}' has an invalid hour"))?;
        let minute = parts[1]
            .parse::<u8>()
            .map_err(|_| format!("time '{value}' has an invalid minute"))?;
        if parts.len() == 3 {
            parts[2]
                .parse::<u8>()
                .map_err(|_| format!("time '{value}' has an invalid second"))?;
        }
        Self::new(hour, minute)
    }

    pub fn minutes_of_day(&self) -> u32 {
        u32::from(self.hour) * 60 + u32::from(self.minute)
    }

    /// Advances by `minutes`, wrapping modulo 24 hours. A 23:30 start plus
    /// 90 minutes yields 01:00 in wall-clock terms.
    pub fn add_minutes(&self, minutes: u32) -> ClockTime {
        let total = (self.minutes_of_day() + minutes) % MINUTES_PER_DAY;
        ClockTime {
            hour: (total / 60) as u8,
            minute: (total % 60) as u8,
        }
    }

    pub fn as_naive_time(&self) -> NaiveTime {
        NaiveTime::from_hms_opt(u32::from(self.hour), u32::from(self.minute), 0)
            .expect("ClockTime fields are range-checked on construction")
    }
}

impl std::fmt::Display for ClockTime {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// Resolution outcome for optional fields that carry a documented default,
/// so callers can tell "record specified 09:00" from "record omitted the
/// field and 09:00 was filled in".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolved<T> {
    Specified(T),
    Defaulted(T),
}

impl<T> Resolved<T> {
    pub fn value(self) -> T {
        match self {
            Resolved::Specified(value) | Resolved::Defaulted(value) => value,
        }
    }

    pub fn is_defaulted(&self) -> bool {
        matches!(self, Resolved::Defaulted(_))
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

/// Backing collection a task's mutations are routed to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    TimeBlock,
    Meeting,
    Todo,
}

impl RecordKind {
    pub fn collection(&self) -> &'static str {
        match self {
            RecordKind::TimeBlock => "timeblock",
            RecordKind::Meeting => "meeting",
            RecordKind::Todo => "todo",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Block,
    Meeting,
    Todo,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeBlockRecord {
    pub id: String,
    pub owner_id: String,
    pub date: NaiveDate,
    pub start_time: String,
    pub end_time: String,
    pub title: String,
    pub description: Option<String>,
    pub category: String,
    pub completed: bool,
    pub is_recurring: bool,
    /// Weekday indices, 0 = Sunday .. 6 = Saturday. Ignored unless
    /// `is_recurring` is set, as are the two fields below.
    pub weekdays: Option<Vec<u8>>,
    pub excluded_dates: Option<Vec<NaiveDate>>,
    pub recurrence_end: Option<NaiveDate>,
    pub checklist: Option<Vec<String>>,
    pub meeting_link: Option<String>,
    pub color: Option<String>,
}

impl TimeBlockRecord {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "block.id")?;
        validate_non_empty(&self.owner_id, "block.owner_id")?;
        validate_non_empty(&self.title, "block.title")?;
        let start = ClockTime::parse(&self.start_time)
            .map_err(|error| format!("block.start_time: {error}"))?;
        let end = ClockTime::parse(&self.end_time)
            .map_err(|error| format!("block.end_time: {error}"))?;
        if end < start {
            return Err("block.end_time must not precede block.start_time".to_string());
        }
        if let Some(weekdays) = &self.weekdays {
            if weekdays.iter().any(|index| *index > 6) {
                return Err("block.weekdays indices must be 0..=6".to_string());
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MeetingRecord {
    pub id: i64,
    pub title: String,
    pub date: NaiveDate,
    /// Missing start time defaults to 09:00 at normalization.
    pub time: Option<String>,
    /// Missing duration defaults to 60 minutes at normalization.
    pub duration_minutes: Option<i64>,
    pub owner_id: String,
    pub attendee_ids: Option<Vec<String>>,
    pub link: Option<String>,
    pub completed: Option<bool>,
}

impl MeetingRecord {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.title, "meeting.title")?;
        validate_non_empty(&self.owner_id, "meeting.owner_id")?;
        if let Some(duration) = self.duration_minutes {
            if duration <= 0 {
                return Err("meeting.duration_minutes must be > 0".to_string());
            }
        }
        Ok(())
    }

    /// Owner-or-attendee access rule. The gateway filters server-side with
    /// the same predicate; the reconciler re-checks it here.
    pub fn is_accessible_by(&self, user_id: &str) -> bool {
        if self.owner_id == user_id {
            return true;
        }
        self.attendee_ids
            .as_deref()
            .map(|attendees| attendees.iter().any(|attendee| attendee == user_id))
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TodoRecord {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub description: Option<String>,
    pub deadline: Option<NaiveDate>,
    pub priority: Priority,
    pub completed: bool,
    /// Missing start date defaults to the reconciliation's reference day.
    pub start_date: Option<NaiveDate>,
    /// Missing start time defaults to 09:00.
    pub start_time: Option<String>,
}

impl TodoRecord {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "todo.id")?;
        validate_non_empty(&self.owner_id, "todo.owner_id")?;
        validate_non_empty(&self.name, "todo.name")?;
        if let Some(start_time) = &self.start_time {
            ClockTime::parse(start_time).map_err(|error| format!("todo.start_time: {error}"))?;
        }
        Ok(())
    }
}

/// Unified, display-ready projection of a block, meeting or todo. Rebuilt on
/// every reconciliation pass; only `completed` and the skip pair are patched
/// in place by optimistic local edits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub date: NaiveDate,
    pub start: ClockTime,
    pub end: ClockTime,
    pub kind: TaskKind,
    pub category: Option<String>,
    pub priority: Priority,
    pub completed: bool,
    pub skipped: bool,
    pub skip_reason: Option<String>,
    pub meeting_link: Option<String>,
    pub source_id: String,
    pub source_kind: RecordKind,
    pub is_recurring: bool,
}

impl Task {
    pub fn start_moment(&self) -> NaiveDateTime {
        self.date.and_time(self.start.as_naive_time())
    }

    pub fn starts_after(&self, reference: NaiveDateTime) -> bool {
        self.start_moment() > reference
    }

    /// Interval containment uses the same-day convention: a wrapped end
    /// (end < start) is treated as running until end of day.
    pub fn contains_moment(&self, reference: NaiveDateTime) -> bool {
        if reference.date() != self.date {
            return false;
        }
        let moment = ClockTime {
            hour: reference.time().hour() as u8,
            minute: reference.time().minute() as u8,
        };
        if self.end < self.start {
            moment >= self.start
        } else {
            moment >= self.start && moment < self.end
        }
    }
}

/// One reconciled snapshot: the full sorted list plus its partitions.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskSnapshot {
    pub all: Vec<Task>,
    pub upcoming: Vec<Task>,
    pub completed: Vec<Task>,
}

impl TaskSnapshot {
    pub fn today(&self, reference: NaiveDate) -> Vec<Task> {
        self.all
            .iter()
            .filter(|task| task.date == reference)
            .cloned()
            .collect()
    }
}

fn validate_non_empty(value: &str, field_name: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field_name} must not be empty"));
    }
    Ok(())
}
