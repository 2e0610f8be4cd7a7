//! Work-time windows: parsing clock ranges and expanding them per duty day.
//!
//! # Overview
//!
//! A time spec carries either a list of `HH:MM--HH:MM` clock ranges (applied
//! to every valid day, crossing midnight when `start >= end`) or a single
//! `DD HH:MM--DD HH:MM` range anchored to week or month days. This module
//! owns both shapes and turns a concrete date into [`WorkWindow`]s.
//!
//! Windows are half-open `[start, end)` at minute precision; the plan layer
//! renders the finish as `HH:MM:59`.

#![allow(clippy::module_name_repetitions)]

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use serde::{Deserialize, Serialize};

use crate::calendar::days_in_month;
use crate::error::DutyError;

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse `HH:MM` (single-digit hours accepted).
///
/// # Errors
///
/// Returns [`DutyError::InvalidTimeFormat`] if the string is not a valid
/// clock time.
pub fn parse_clock(raw: &str) -> Result<NaiveTime, DutyError> {
    let trimmed = raw.trim();
    let (hour, minute) = trimmed.split_once(':').ok_or_else(|| DutyError::time(raw))?;
    let hour: u32 = hour.trim().parse().map_err(|_| DutyError::time(raw))?;
    let minute: u32 = minute.trim().parse().map_err(|_| DutyError::time(raw))?;
    NaiveTime::from_hms_opt(hour, minute, 0).ok_or_else(|| DutyError::time(raw))
}

/// A daily clock range such as `09:00--18:00` or `20:00--08:00`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeRange {
    /// # Errors
    ///
    /// Returns [`DutyError::InvalidTimeFormat`] when either side is malformed.
    pub fn parse(raw: &str) -> Result<Self, DutyError> {
        let (start, end) = raw.split_once("--").ok_or_else(|| DutyError::time(raw))?;
        Ok(Self {
            start: parse_clock(start)?,
            end: parse_clock(end)?,
        })
    }

    /// An equal or earlier end means the window finishes the next day.
    #[must_use]
    pub fn crosses_midnight(&self) -> bool {
        self.start >= self.end
    }
}

/// A range anchored to week or month days, e.g. `01 09:00--05 18:00`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayTimeRange {
    pub start_day: u32,
    pub start: NaiveTime,
    pub end_day: u32,
    pub end: NaiveTime,
}

impl DayTimeRange {
    /// # Errors
    ///
    /// Returns [`DutyError::InvalidTimeFormat`] when a side is not `DD HH:MM`.
    pub fn parse(raw: &str) -> Result<Self, DutyError> {
        let (start, end) = raw.split_once("--").ok_or_else(|| DutyError::time(raw))?;
        let (start_day, start) = parse_day_clock(start, raw)?;
        let (end_day, end) = parse_day_clock(end, raw)?;
        Ok(Self {
            start_day,
            start,
            end_day,
            end,
        })
    }

    /// Same start and end day with a non-increasing clock covers a whole
    /// cycle and finishes on the start day of the next one.
    #[must_use]
    pub fn wraps_whole_cycle(&self) -> bool {
        self.start_day == self.end_day && self.start >= self.end
    }

    pub(crate) fn validate(&self, max_day: u32) -> Result<(), DutyError> {
        for day in [self.start_day, self.end_day] {
            if day == 0 || day > max_day {
                return Err(DutyError::InvalidWorkDay { day, max: max_day });
            }
        }
        Ok(())
    }
}

fn parse_day_clock(part: &str, raw: &str) -> Result<(u32, NaiveTime), DutyError> {
    let mut pieces = part.split_whitespace();
    let day = pieces
        .next()
        .and_then(|d| d.parse::<u32>().ok())
        .ok_or_else(|| DutyError::time(raw))?;
    let clock = pieces.next().ok_or_else(|| DutyError::time(raw))?;
    if pieces.next().is_some() {
        return Err(DutyError::time(raw));
    }
    Ok((day, parse_clock(clock)?))
}

/// The window configuration of one time spec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkTime {
    TimeRange(Vec<TimeRange>),
    DatetimeRange(DayTimeRange),
}

// ---------------------------------------------------------------------------
// Windows
// ---------------------------------------------------------------------------

/// One concrete on-duty interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WorkWindow {
    #[serde(rename = "start_time")]
    pub start: NaiveDateTime,
    #[serde(rename = "end_time")]
    pub end: NaiveDateTime,
}

impl WorkWindow {
    #[must_use]
    pub fn duration(&self) -> TimeDelta {
        self.end - self.start
    }
}

/// Expand every clock range on `work_date`.
#[must_use]
pub fn time_range_work_time(work_date: NaiveDate, ranges: &[TimeRange]) -> Vec<WorkWindow> {
    ranges
        .iter()
        .map(|range| {
            let end_date = if range.crosses_midnight() {
                work_date + TimeDelta::days(1)
            } else {
                work_date
            };
            WorkWindow {
                start: work_date.and_time(range.start),
                end: end_date.and_time(range.end),
            }
        })
        .collect()
}

/// Window for one day covered by a day-anchored range.
///
/// The first day starts at the configured start clock, the last day ends at
/// the configured end clock, and days in between run `00:00` to `23:59`. A
/// whole-cycle range ends on the following calendar day.
#[must_use]
pub fn datetime_range_work_time(
    work_date: NaiveDate,
    range: &DayTimeRange,
    week_mode: bool,
) -> WorkWindow {
    let cross_day = range.wraps_whole_cycle();
    let (current, max_day) = if week_mode {
        (work_date.weekday().number_from_monday(), 7)
    } else {
        (work_date.day(), days_in_month(work_date.year(), work_date.month()))
    };

    let mut end_day = range.end_day;
    if cross_day {
        end_day -= 1;
    }
    if end_day == 0 {
        end_day = max_day;
    }

    let begin = if current == range.start_day {
        range.start
    } else {
        NaiveTime::MIN
    };
    let is_last_day = current == end_day;
    let end = if is_last_day {
        range.end
    } else {
        NaiveTime::from_hms_opt(23, 59, 0).unwrap_or(NaiveTime::MIN)
    };
    let end_date = if cross_day && is_last_day {
        work_date + TimeDelta::days(1)
    } else {
        work_date
    };

    WorkWindow {
        start: work_date.and_time(begin),
        end: end_date.and_time(end),
    }
}

/// Work days covered by a day-anchored range.
///
/// An end day before the start wraps across the cycle boundary
/// (`start..=max` then `1..=end`). The first entry is the handoff day.
#[must_use]
pub fn get_work_days(range: &DayTimeRange, week_mode: bool) -> Vec<u32> {
    let max_day = if week_mode { 7 } else { 31 };
    if range.start_day < range.end_day
        || (range.start_day == range.end_day && !range.wraps_whole_cycle())
    {
        return (range.start_day..=range.end_day).collect();
    }

    let mut days: Vec<u32> = (range.start_day..=max_day).collect();
    for day in 1..=range.end_day {
        if !days.contains(&day) {
            days.push(day);
        }
    }
    days
}
