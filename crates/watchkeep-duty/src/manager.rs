//! Plan generation for a single duty rule.
//!
//! # Overview
//!
//! [`DutyRuleManager`] turns a validated [`DutyRule`] and a time window into
//! concrete [`DutyShift`]s:
//!
//! - **Regular** rules: every arrangement runs independently with its first
//!   user list; no rotation.
//! - **Rotation** rules: only the first arrangement is used. Its time specs
//!   are enumerated into periods (calendar handoffs, or fixed intervals when
//!   a spec carries `period_settings`), interleaved across specs, and each
//!   period is handed to the next group of users.
//!
//! The manager never mutates its rule. Everything a later pass needs to
//! resume (the next user index and one cursor per enumerated time spec) is
//! returned in [`PlanOutcome`].

#![allow(clippy::module_name_repetitions)]

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::dates::{DutyDates, PeriodMode, flat_rotation_duty_dates, get_duty_dates};
use crate::groups::get_group_duty_users;
use crate::model::{DutyRule, DutyTimeSpec, DutyUser, RuleCategory, SpecCursor};
use crate::worktime::{WorkTime, WorkWindow, datetime_range_work_time, time_range_work_time};

/// Window length used when a rule has no end date and none was requested.
pub const DEFAULT_PREVIEW_DAYS: u32 = 30;

// ---------------------------------------------------------------------------
// Options and results
// ---------------------------------------------------------------------------

/// How a [`DutyRuleManager`] picks its window and where it resumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagerOptions {
    /// Start no earlier than this (the rule's effective time still applies).
    pub begin_time: Option<NaiveDateTime>,
    /// Explicit preview length in days.
    pub days: Option<u32>,
    /// Explicit window end; wins over `days` and the rule's end.
    pub end_time: Option<NaiveDateTime>,
    /// Rotation position to resume from.
    pub last_user_index: usize,
    /// Preview length used when the rule has no end and `days` is unset.
    pub default_days: u32,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            begin_time: None,
            days: None,
            end_time: None,
            last_user_index: 0,
            default_days: DEFAULT_PREVIEW_DAYS,
        }
    }
}

/// One generated shift.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DutyShift {
    pub users: Vec<DutyUser>,
    /// Rotation index the users were drawn from.
    pub order: usize,
    pub work_times: Vec<WorkWindow>,
}

impl DutyShift {
    #[must_use]
    pub fn start_time(&self) -> Option<NaiveDateTime> {
        self.work_times.iter().map(|w| w.start).min()
    }

    /// Latest window end, rendered as the last second of that minute.
    #[must_use]
    pub fn finished_time(&self) -> Option<NaiveDateTime> {
        self.work_times
            .iter()
            .map(|w| w.end)
            .max()
            .map(|end| end + TimeDelta::seconds(59))
    }
}

/// Everything one planning pass produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanOutcome {
    pub shifts: Vec<DutyShift>,
    pub next_user_index: usize,
    /// How far the plan is materialized: the window end, or later when a
    /// running period was completed past it.
    pub end_time: NaiveDateTime,
    pub cursors: Vec<SpecCursor>,
}

impl PlanOutcome {
    fn settle_end_time(mut self) -> Self {
        if let Some(latest) = self.cursors.iter().map(|c| c.begin_time).max() {
            self.end_time = self.end_time.max(latest);
        }
        self
    }
}

// ---------------------------------------------------------------------------
// DutyRuleManager
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct DutyRuleManager<'a> {
    rule: &'a DutyRule,
    begin_time: NaiveDateTime,
    end_time: NaiveDateTime,
    last_user_index: usize,
}

impl<'a> DutyRuleManager<'a> {
    #[must_use]
    pub fn new(rule: &'a DutyRule, options: ManagerOptions) -> Self {
        let begin_time = options
            .begin_time
            .map_or(rule.effective_time, |begin| begin.max(rule.effective_time));

        let days = options.days.filter(|days| *days > 0);
        let end_time = match (options.end_time, days, rule.end_time) {
            (Some(end), _, _) => end,
            (None, Some(days), _) => begin_time + TimeDelta::days(i64::from(days)),
            (None, None, Some(end)) => end,
            (None, None, None) => begin_time + TimeDelta::days(i64::from(options.default_days)),
        };

        Self {
            rule,
            begin_time,
            end_time,
            last_user_index: options.last_user_index,
        }
    }

    #[must_use]
    pub const fn begin_time(&self) -> NaiveDateTime {
        self.begin_time
    }

    #[must_use]
    pub const fn end_time(&self) -> NaiveDateTime {
        self.end_time
    }

    /// Generate shifts for the window, dispatching on the rule category.
    #[instrument(skip_all, fields(rule_id = self.rule.id))]
    pub fn get_duty_plan(&self) -> PlanOutcome {
        let outcome = match self.rule.category {
            RuleCategory::Regular => self.get_regular_duty_plan(),
            RuleCategory::Rotation => self.get_rotation_duty_plan(),
        }
        .settle_end_time();
        debug!(
            shifts = outcome.shifts.len(),
            next_user_index = outcome.next_user_index,
            "generated duty plan"
        );
        outcome
    }

    /// Enumerate one spec's dates, resuming from its cursor if it has one.
    #[must_use]
    pub fn get_duty_dates(&self, spec: &DutyTimeSpec, mode: PeriodMode) -> DutyDates {
        let begin = spec.begin_time.unwrap_or(self.begin_time);
        get_duty_dates(&spec.pattern, begin, self.end_time, mode)
    }

    /// Every arrangement on its own, staffed by its first user list.
    #[must_use]
    pub fn get_regular_duty_plan(&self) -> PlanOutcome {
        let mut shifts = Vec::new();
        let mut cursors = Vec::new();

        for (arrange_index, arrange) in self.rule.arrangements.iter().enumerate() {
            let mut work_times = Vec::new();
            for (spec_index, spec) in arrange.specs.iter().enumerate() {
                let dates = self.get_duty_dates(spec, PeriodMode::Flat);
                cursors.push(SpecCursor {
                    arrange_index,
                    spec_index,
                    begin_time: dates.next_cursor,
                });
                for day in dates.days() {
                    work_times.extend(expand_day(spec, day));
                }
            }

            if !work_times.is_empty() {
                shifts.push(DutyShift {
                    users: arrange.group.first_users(),
                    order: arrange_index,
                    work_times,
                });
            }
        }

        PlanOutcome {
            shifts,
            next_user_index: self.last_user_index,
            end_time: self.end_time,
            cursors,
        }
    }

    /// Rotate the first arrangement's users across its periods.
    #[must_use]
    pub fn get_rotation_duty_plan(&self) -> PlanOutcome {
        let mut outcome = PlanOutcome {
            shifts: Vec::new(),
            next_user_index: self.last_user_index,
            end_time: self.end_time,
            cursors: Vec::new(),
        };
        let Some(arrange) = self.rule.arrangements.first() else {
            return outcome;
        };

        let interval_spec = arrange
            .specs
            .iter()
            .enumerate()
            .find_map(|(index, spec)| spec.period_days.map(|days| (index, spec, days)));

        let periods: Vec<Vec<(usize, NaiveDate)>> = if let Some((spec_index, spec, days)) =
            interval_spec
        {
            if arrange.specs.len() > 1 {
                warn!(
                    rule_id = self.rule.id,
                    spec_index, "fixed-interval rotation uses a single time spec; ignoring the rest"
                );
            }
            let dates = self.get_duty_dates(spec, PeriodMode::Interval(days));
            outcome.cursors.push(SpecCursor {
                arrange_index: 0,
                spec_index,
                begin_time: dates.next_cursor,
            });
            let tagged: Vec<(usize, NaiveDate)> =
                dates.days().map(|day| (spec_index, day)).collect();
            tagged
                .chunks(days.get() as usize)
                .map(<[_]>::to_vec)
                .collect()
        } else {
            let mut rows = Vec::with_capacity(arrange.specs.len());
            for (spec_index, spec) in arrange.specs.iter().enumerate() {
                let dates = self.get_duty_dates(spec, PeriodMode::Handoff);
                outcome.cursors.push(SpecCursor {
                    arrange_index: 0,
                    spec_index,
                    begin_time: dates.next_cursor,
                });
                let row: Vec<Vec<(usize, NaiveDate)>> = dates
                    .periods
                    .into_iter()
                    .map(|period| period.into_iter().map(|day| (spec_index, day)).collect())
                    .collect();
                rows.push(row);
            }
            flat_rotation_duty_dates(&rows)
        };

        let mut user_index = self.last_user_index;
        for period in periods {
            let order = user_index;
            let (users, next_index) = get_group_duty_users(&arrange.group, user_index);
            user_index = next_index;

            let work_times = period
                .iter()
                .flat_map(|&(spec_index, day)| expand_day(&arrange.specs[spec_index], day))
                .collect();
            outcome.shifts.push(DutyShift {
                users,
                order,
                work_times,
            });
        }

        outcome.next_user_index = user_index;
        outcome
    }
}

fn expand_day(spec: &DutyTimeSpec, day: NaiveDate) -> Vec<WorkWindow> {
    match &spec.work_time {
        WorkTime::TimeRange(ranges) => time_range_work_time(day, ranges),
        WorkTime::DatetimeRange(range) => {
            vec![datetime_range_work_time(day, range, spec.pattern.is_week_mode())]
        }
    }
}
