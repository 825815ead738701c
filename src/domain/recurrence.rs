use crate::domain::models::TimeBlockRecord;
use chrono::{Datelike, Days, NaiveDate};

/// Default expansion reach around "today", sized to tolerate client clock
/// drift and to let a week view render without extra round trips.
pub const DEFAULT_WINDOW_PAST_DAYS: u64 = 7;
pub const DEFAULT_WINDOW_FUTURE_DAYS: u64 = 7;

/// Inclusive calendar-day window over which recurring definitions are
/// materialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpansionWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl ExpansionWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, String> {
        if end < start {
            return Err("expansion window end must not precede its start".to_string());
        }
        Ok(Self { start, end })
    }

    pub fn around(reference: NaiveDate) -> Self {
        Self {
            start: reference - Days::new(DEFAULT_WINDOW_PAST_DAYS),
            end: reference + Days::new(DEFAULT_WINDOW_FUTURE_DAYS),
        }
    }

    pub fn days(&self) -> impl Iterator<Item = NaiveDate> + use<> {
        self.start.iter_days().take_while({
            let end = self.end;
            move |day| *day <= end
        })
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        day >= self.start && day <= self.end
    }
}

/// Materializes a recurring definition into concrete per-day instances.
///
/// A day yields an instance when its weekday index (0 = Sunday) is in the
/// definition's weekday set, the day is not excluded, and the day does not
/// fall past the recurrence end. Instances copy every field of the
/// definition except `date` and `id`; the id is the deterministic composite
/// `{definition_id}-{date}` so the same instance maps to the same id on
/// every refresh.
pub fn expand(definition: &TimeBlockRecord, window: ExpansionWindow) -> Vec<TimeBlockRecord> {
    if !definition.is_recurring {
        return Vec::new();
    }
    let Some(weekdays) = definition.weekdays.as_deref() else {
        return Vec::new();
    };

    window
        .days()
        .filter(|day| weekdays.contains(&weekday_index(*day)))
        .filter(|day| !is_excluded(definition, *day))
        .filter(|day| {
            definition
                .recurrence_end
                .map(|end| *day <= end)
                .unwrap_or(true)
        })
        .map(|day| instantiate(definition, day))
        .collect()
}

pub fn instance_id(definition_id: &str, date: NaiveDate) -> String {
    format!("{definition_id}-{date}")
}

/// Weekday index in the record convention: 0 = Sunday .. 6 = Saturday.
pub fn weekday_index(date: NaiveDate) -> u8 {
    date.weekday().num_days_from_sunday() as u8
}

fn is_excluded(definition: &TimeBlockRecord, day: NaiveDate) -> bool {
    definition
        .excluded_dates
        .as_deref()
        .map(|excluded| excluded.contains(&day))
        .unwrap_or(false)
}

fn instantiate(definition: &TimeBlockRecord, day: NaiveDate) -> TimeBlockRecord {
    let mut instance = definition.clone();
    instance.id = instance_id(&definition.id, day);
    instance.date = day;
    instance
}
