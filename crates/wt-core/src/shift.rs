//! Shift scheduling: recurring weekly windows and date-ranged assignments.
//!
//! All queries operate on wall-clock instants (`NaiveDateTime`); no timezone
//! conversion happens here. Membership is evaluated at minute granularity,
//! matching how shift start/end times are authored.

use std::collections::{HashMap, HashSet};
use std::str::FromStr;

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Weekday};
use thiserror::Error;

/// Errors from parsing shift fields.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ShiftError {
    /// A time-of-day string did not parse as `HH:MM` or `HH:MM:SS`.
    #[error("invalid time of day: {value:?}")]
    InvalidTimeOfDay { value: String },

    /// A weekday name was not recognized.
    #[error("invalid weekday: {value:?}")]
    InvalidWeekday { value: String },
}

/// Parses a wall-clock time of day, accepting `HH:MM` and `HH:MM:SS`.
pub fn parse_time_of_day(value: &str) -> Result<NaiveTime, ShiftError> {
    NaiveTime::parse_from_str(value, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
        .map_err(|_| ShiftError::InvalidTimeOfDay {
            value: value.to_string(),
        })
}

/// Parses a weekday name (`"Monday"`, `"mon"`, ...).
pub fn parse_weekday(value: &str) -> Result<Weekday, ShiftError> {
    Weekday::from_str(value).map_err(|_| ShiftError::InvalidWeekday {
        value: value.to_string(),
    })
}

/// The full week, used when a shift arrives without a day list.
pub fn all_working_days() -> HashSet<Weekday> {
    [
        Weekday::Mon,
        Weekday::Tue,
        Weekday::Wed,
        Weekday::Thu,
        Weekday::Fri,
        Weekday::Sat,
        Weekday::Sun,
    ]
    .into_iter()
    .collect()
}

/// A recurring weekly work window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShiftDefinition {
    pub id: i64,
    /// Weekdays on which the shift applies.
    pub working_days: HashSet<Weekday>,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub break_minutes: u32,
}

/// Binds a user to a shift definition over an inclusive calendar-date range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShiftAssignment {
    pub user_id: Option<String>,
    pub shift_id: i64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

/// The concrete wall-clock window of one shift occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShiftWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

/// Refreshable cache of shift assignments and definitions.
///
/// Assignments are kept in fetch order; overlapping assignments resolve by
/// first match. Replacement is wholesale: a refresh builds a complete new
/// schedule and swaps it in, never leaving the cache half-populated.
#[derive(Debug, Clone, Default)]
pub struct ShiftSchedule {
    assignments: Vec<ShiftAssignment>,
    definitions: HashMap<i64, ShiftDefinition>,
}

impl ShiftSchedule {
    pub fn new(assignments: Vec<ShiftAssignment>, definitions: Vec<ShiftDefinition>) -> Self {
        let definitions = definitions
            .into_iter()
            .map(|definition| (definition.id, definition))
            .collect();
        Self {
            assignments,
            definitions,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    pub fn assignment_count(&self) -> usize {
        self.assignments.len()
    }

    /// Returns whether `now` falls inside an active shift.
    pub fn is_in_active_shift(&self, now: NaiveDateTime) -> bool {
        self.active_window_at(now).is_some()
    }

    /// Returns the concrete window of the first shift containing `now`.
    ///
    /// An assignment is considered when `now`'s calendar date falls inside
    /// its inclusive date range, the definition covers `now`'s weekday, and
    /// the minutes-since-midnight of `now` lie within the definition's
    /// start/end window (both ends inclusive).
    pub fn active_window_at(&self, now: NaiveDateTime) -> Option<ShiftWindow> {
        let today = now.date();
        let now_minutes = minutes_since_midnight(now.time());

        for assignment in &self.assignments {
            if today < assignment.start_date || today > assignment.end_date {
                continue;
            }
            let Some(definition) = self.definitions.get(&assignment.shift_id) else {
                tracing::debug!(
                    shift_id = assignment.shift_id,
                    "no definition cached for assignment"
                );
                continue;
            };
            if !definition.working_days.contains(&today.weekday()) {
                continue;
            }
            let start_minutes = minutes_since_midnight(definition.start_time);
            let end_minutes = minutes_since_midnight(definition.end_time);
            if now_minutes < start_minutes || now_minutes > end_minutes {
                continue;
            }
            return Some(ShiftWindow {
                start: today.and_time(truncate_to_minute(definition.start_time)),
                end: today.and_time(truncate_to_minute(definition.end_time)),
            });
        }
        None
    }

    /// Clips an idle interval to the active shift it overlaps.
    ///
    /// Membership is evaluated at both endpoints. Both outside any shift
    /// drops the interval; both inside keeps it whole (covering endpoints in
    /// two different shifts); exactly one inside clips the outside endpoint
    /// to the matched window's edge. Degenerate results drop the interval.
    pub fn clip_to_active_shift(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Option<(NaiveDateTime, NaiveDateTime)> {
        match (self.active_window_at(start), self.active_window_at(end)) {
            (Some(_), Some(_)) => Some((start, end)),
            (Some(window), None) => {
                let clipped_end = window.end.min(end);
                (start < clipped_end).then_some((start, clipped_end))
            }
            (None, Some(window)) => {
                let clipped_start = window.start.max(start);
                (clipped_start < end).then_some((clipped_start, end))
            }
            (None, None) => None,
        }
    }
}

fn minutes_since_midnight(time: NaiveTime) -> u32 {
    time.hour() * 60 + time.minute()
}

fn truncate_to_minute(time: NaiveTime) -> NaiveTime {
    NaiveTime::from_hms_opt(time.hour(), time.minute(), 0).unwrap_or(time)
}
