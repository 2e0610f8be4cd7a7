//! Day-by-day enumeration of valid duty dates and rotation periods.
//!
//! # Overview
//!
//! [`get_duty_dates`] walks one day at a time from a start instant up to the
//! day before the window end, keeping days the [`WorkPattern`] accepts. How
//! those days are grouped depends on the [`PeriodMode`]:
//!
//! - [`PeriodMode::Flat`]: one list, no grouping (regular rules).
//! - [`PeriodMode::Handoff`]: a period closes when the following day is a
//!   handoff boundary for the pattern (see [`is_new_period`]).
//! - [`PeriodMode::Interval`]: one flat list whose length is padded up to a
//!   multiple of the interval so the caller can chunk it evenly.
//!
//! When the window ends mid-period the walk keeps going until the period is
//! complete, so a shift never gets cut by the preview window. The returned
//! cursor (one day past the last day walked) is where the next pass resumes.
//!
//! # Termination
//!
//! Extension past the window is bounded: date-range patterns close a period
//! as soon as the next day leaves every configured range and never extend
//! past their last configured date, and a pattern without a handoff day
//! treats every day as a boundary.

use std::num::NonZeroU32;

use chrono::{Datelike, NaiveDate, NaiveDateTime, TimeDelta};

use crate::calendar::days_in_month;
use crate::model::WorkPattern;

/// How valid days are grouped into periods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodMode {
    Flat,
    Handoff,
    Interval(NonZeroU32),
}

/// Result of one enumeration pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DutyDates {
    /// Valid dates grouped by period. `Flat` and `Interval` passes yield at
    /// most one group.
    pub periods: Vec<Vec<NaiveDate>>,
    /// Where the next pass over the same spec should start.
    pub next_cursor: NaiveDateTime,
}

impl DutyDates {
    /// Every valid date in order, ignoring period boundaries.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.periods.iter().flatten().copied()
    }
}

/// Whether `next_day` starts a new rotation period.
#[must_use]
pub fn is_new_period(pattern: &WorkPattern, handoff_day: Option<u32>, next_day: NaiveDate) -> bool {
    match pattern {
        WorkPattern::Daily => true,
        WorkPattern::Weekly { .. } => {
            handoff_day.is_none_or(|day| next_day.weekday().number_from_monday() == day)
        }
        WorkPattern::Monthly { .. } => handoff_day.is_none_or(|day| {
            next_day.day() == day.min(days_in_month(next_day.year(), next_day.month()))
        }),
        WorkPattern::DateRange { ranges } => !ranges.iter().any(|span| span.contains(next_day)),
    }
}

/// Enumerate valid dates for `pattern` from `begin` until `end - 1 day`.
#[must_use]
pub fn get_duty_dates(
    pattern: &WorkPattern,
    begin: NaiveDateTime,
    end: NaiveDateTime,
    mode: PeriodMode,
) -> DutyDates {
    let one_day = TimeDelta::days(1);
    let handoff_day = pattern.handoff_day();
    let extension_limit = pattern.last_valid_date();

    let mut last_handoff = end - one_day;
    let mut cursor = begin;
    let mut periods = Vec::new();
    let mut current: Vec<NaiveDate> = Vec::new();

    while cursor <= last_handoff {
        let next_day = cursor + one_day;
        let mut new_period = match mode {
            PeriodMode::Handoff => is_new_period(pattern, handoff_day, next_day.date()),
            PeriodMode::Flat | PeriodMode::Interval(_) => true,
        };

        if pattern.is_valid_day(cursor.date()) {
            current.push(cursor.date());
        }

        if let PeriodMode::Interval(interval) = mode {
            if current.len() % interval.get() as usize != 0 {
                new_period = false;
            }
        }

        if mode == PeriodMode::Handoff && new_period && !current.is_empty() {
            periods.push(std::mem::take(&mut current));
        }

        let may_extend = extension_limit.is_none_or(|limit| next_day.date() <= limit);
        if !new_period && last_handoff < next_day && may_extend {
            last_handoff = next_day;
        }
        cursor = next_day;
    }

    if !current.is_empty() {
        periods.push(current);
    }

    DutyDates {
        periods,
        next_cursor: last_handoff + one_day,
    }
}

/// Interleave per-spec period lists column by column: period 0 of every
/// spec, then period 1 of every spec, and so on. Specs that run out of
/// periods are skipped in later columns.
#[must_use]
pub fn flat_rotation_duty_dates<T: Clone>(rows: &[Vec<T>]) -> Vec<T> {
    let columns = rows.iter().map(Vec::len).max().unwrap_or(0);
    let mut flat = Vec::with_capacity(rows.iter().map(Vec::len).sum());
    for column in 0..columns {
        for row in rows {
            if let Some(item) = row.get(column) {
                flat.push(item.clone());
            }
        }
    }
    flat
}
