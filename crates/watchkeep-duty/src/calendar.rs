//! Handover arithmetic for daily, weekly and monthly rotations.
//!
//! # Overview
//!
//! [`DutyCalendar`] answers "when does the shift that started at `begin`
//! hand over?" for a configured handoff `(day, HH:MM)` pair. All arithmetic
//! happens in the configured local offset; results are UTC instants.
//!
//! # Boundary rules
//!
//! - **Daily**: same day when the handoff clock is strictly after the begin
//!   clock, otherwise the next day.
//! - **Weekly / monthly**: a handoff day later in the current period wins;
//!   the same day wins when the handoff clock is at or after the begin clock
//!   (a shift beginning exactly at handover hands over immediately); anything
//!   else rolls into the next period.
//! - Monthly handoff days are clamped to the length of whichever month they
//!   land in.
//! - Out-of-range days are clamped: weekly into `1..=7`, monthly into
//!   `1..=31`.
//!
//! Malformed handoff clocks never fail: they are logged and treated as
//! `00:00`.

use chrono::{
    DateTime, Datelike, FixedOffset, Months, NaiveDate, NaiveTime, TimeDelta, Timelike, Utc,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::worktime::parse_clock;

/// Number of days in `month` of `year`.
#[must_use]
pub fn days_in_month(year: i32, month: u32) -> u32 {
    let first = NaiveDate::from_ymd_opt(year, month, 1);
    let next = first.and_then(|d| d.checked_add_months(Months::new(1)));
    match (first, next) {
        (Some(first), Some(next)) => {
            u32::try_from((next - first).num_days()).unwrap_or(31)
        }
        _ => 31,
    }
}

/// A handoff point: day of week (1 = Monday) or day of month, plus clock.
///
/// `day` is not range-checked here; [`DutyCalendar`] clamps it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handoff {
    #[serde(rename = "date", default)]
    pub day: u32,
    pub time: String,
}

/// Handover calculator bound to one local offset.
#[derive(Debug, Clone, Copy)]
pub struct DutyCalendar {
    offset: FixedOffset,
}

impl DutyCalendar {
    #[must_use]
    pub const fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    #[must_use]
    pub const fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Combine a local date with an `HH:MM` clock into a UTC instant.
    ///
    /// A clock that cannot be parsed is logged and replaced by `00:00`.
    #[must_use]
    pub fn end_time(&self, end_date: NaiveDate, handover_time: &str) -> DateTime<Utc> {
        let clock = recover_clock(handover_time);
        let local = end_date.and_time(clock);
        (local - TimeDelta::seconds(i64::from(self.offset.local_minus_utc()))).and_utc()
    }

    #[must_use]
    pub fn daily_rotation_end(&self, begin: DateTime<Utc>, handover_time: &str) -> DateTime<Utc> {
        let local = begin.with_timezone(&self.offset);
        let clock = recover_clock(handover_time);
        let end_date = if clock > minute_of(local.time()) {
            local.date_naive()
        } else {
            local.date_naive() + TimeDelta::days(1)
        };
        self.end_time(end_date, handover_time)
    }

    #[must_use]
    pub fn weekly_rotation_end(&self, begin: DateTime<Utc>, handoff: &Handoff) -> DateTime<Utc> {
        let local = begin.with_timezone(&self.offset);
        let begin_day = local.weekday().number_from_monday();
        let clock = recover_clock(&handoff.time);
        let today = local.date_naive();
        let day = handoff.day.clamp(1, 7);

        let end_date = if day > begin_day {
            today + TimeDelta::days(i64::from(day - begin_day))
        } else if day == begin_day && clock >= minute_of(local.time()) {
            today
        } else {
            today + TimeDelta::days(i64::from(day + 7) - i64::from(begin_day))
        };
        self.end_time(end_date, &handoff.time)
    }

    #[must_use]
    pub fn monthly_rotation_end(&self, begin: DateTime<Utc>, handoff: &Handoff) -> DateTime<Utc> {
        let local = begin.with_timezone(&self.offset);
        let today = local.date_naive();
        let clock = recover_clock(&handoff.time);
        let day = handoff.day.clamp(1, 31);
        let current_max = days_in_month(today.year(), today.month());
        let this_month_day = day.min(current_max);

        let end_date = if this_month_day > today.day() {
            today.with_day(this_month_day)
        } else if this_month_day == today.day() && clock >= minute_of(local.time()) {
            Some(today)
        } else {
            today
                .with_day(1)
                .and_then(|first| first.checked_add_months(Months::new(1)))
                .and_then(|next| {
                    let max = days_in_month(next.year(), next.month());
                    next.with_day(day.min(max))
                })
        };

        // Only unreachable for dates at the very end of chrono's range.
        let end_date = end_date.unwrap_or(today);
        self.end_time(end_date, &handoff.time)
    }
}

fn recover_clock(raw: &str) -> NaiveTime {
    parse_clock(raw).unwrap_or_else(|err| {
        warn!(handover_time = raw, error = %err, "malformed handover time, using 00:00");
        NaiveTime::MIN
    })
}

fn minute_of(time: NaiveTime) -> NaiveTime {
    NaiveTime::from_hms_opt(time.hour(), time.minute(), 0).unwrap_or(time)
}
