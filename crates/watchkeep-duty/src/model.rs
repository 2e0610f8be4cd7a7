//! Duty rule model: the stored JSON shape and its validated, typed form.
//!
//! # Overview
//!
//! Rules arrive in the shape they are stored in ([`DutyRuleConfig`] and
//! friends): loosely typed, string timestamps, string enums. Before any
//! scheduling they are converted with `TryFrom` into [`DutyRule`], where the
//! rotation type is a tagged [`WorkPattern`], membership is a tagged
//! [`DutyGroup`], and every clock string has been parsed.
//!
//! The stored shape is kept around because snapshots freeze it verbatim and
//! hash it (see [`crate::hash`]).

#![allow(clippy::module_name_repetitions)]

use std::num::{NonZeroU32, NonZeroUsize};

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::DutyError;
use crate::worktime::{DayTimeRange, TimeRange, WorkTime, get_work_days};

/// Timestamp format used by the stored rule shape.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parse a stored timestamp. Accepts `YYYY-MM-DD HH:MM:SS`,
/// `YYYY-MM-DD HH:MM`, the `T`-separated variants, and a bare date.
///
/// # Errors
///
/// Returns [`DutyError::InvalidTimeFormat`] when none of the shapes match.
pub fn parse_datetime(raw: &str) -> Result<NaiveDateTime, DutyError> {
    let raw_trimmed = raw.trim();
    for format in [
        DATETIME_FORMAT,
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M",
    ] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(raw_trimmed, format) {
            return Ok(parsed);
        }
    }
    NaiveDate::parse_from_str(raw_trimmed, "%Y-%m-%d")
        .map(|date| date.and_time(chrono::NaiveTime::MIN))
        .map_err(|_| DutyError::time(raw))
}

#[must_use]
pub fn format_datetime(value: NaiveDateTime) -> String {
    value.format(DATETIME_FORMAT).to_string()
}

fn non_empty(raw: Option<&String>) -> Option<&str> {
    raw.map(String::as_str).filter(|s| !s.trim().is_empty())
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserType {
    #[default]
    User,
    Group,
}

/// A person (or user group) that can be put on duty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DutyUser {
    pub id: String,
    #[serde(rename = "type", default)]
    pub user_type: UserType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl DutyUser {
    #[must_use]
    pub fn user(id: &str) -> Self {
        Self {
            id: id.to_string(),
            user_type: UserType::User,
            display_name: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Stored shape
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleCategory {
    Regular,
    #[default]
    Rotation,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupType {
    #[default]
    Specified,
    Auto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkType {
    Daily,
    Weekly,
    WorkDay,
    Weekend,
    Monthly,
    DateRange,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkTimeType {
    #[default]
    TimeRange,
    DatetimeRange,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodUnit {
    #[default]
    Day,
}

/// Fixed-length rotation: hand over every `duration` valid days.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodSettings {
    pub duration: u32,
    #[serde(default)]
    pub unit: PeriodUnit,
}

/// One time spec as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DutyTimeConfig {
    pub work_type: WorkType,
    #[serde(default)]
    pub work_days: Vec<u32>,
    #[serde(default)]
    pub work_time_type: WorkTimeType,
    #[serde(default)]
    pub work_time: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub work_date_range: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period_settings: Option<PeriodSettings>,
    /// Resume cursor written back after each planning pass.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub begin_time: Option<String>,
}

/// One arrangement as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DutyArrangeConfig {
    #[serde(default)]
    pub duty_users: Vec<Vec<DutyUser>>,
    #[serde(default)]
    pub group_type: GroupType,
    #[serde(default)]
    pub group_number: usize,
    #[serde(default)]
    pub duty_time: Vec<DutyTimeConfig>,
}

/// A duty rule as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DutyRuleConfig {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub category: RuleCategory,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub effective_time: String,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default)]
    pub duty_arranges: Vec<DutyArrangeConfig>,
}

const fn default_enabled() -> bool {
    true
}

/// Where a planning pass left one time spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecCursor {
    pub arrange_index: usize,
    pub spec_index: usize,
    pub begin_time: NaiveDateTime,
}

impl DutyRuleConfig {
    /// Copy of this rule with the given resume cursors written into its
    /// time specs.
    #[must_use]
    pub fn with_cursors(&self, cursors: &[SpecCursor]) -> Self {
        let mut updated = self.clone();
        for cursor in cursors {
            if let Some(spec) = updated
                .duty_arranges
                .get_mut(cursor.arrange_index)
                .and_then(|arrange| arrange.duty_time.get_mut(cursor.spec_index))
            {
                spec.begin_time = Some(format_datetime(cursor.begin_time));
            }
        }
        updated
    }

    /// Copy of this rule with every resume cursor cleared.
    #[must_use]
    pub fn without_cursors(&self) -> Self {
        let mut cleared = self.clone();
        for spec in cleared
            .duty_arranges
            .iter_mut()
            .flat_map(|arrange| arrange.duty_time.iter_mut())
        {
            spec.begin_time = None;
        }
        cleared
    }
}

// ---------------------------------------------------------------------------
// Typed model
// ---------------------------------------------------------------------------

/// An inclusive span of calendar dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateSpan {
    pub begin: NaiveDate,
    pub end: NaiveDate,
}

impl DateSpan {
    /// # Errors
    ///
    /// Returns [`DutyError::InvalidDateRange`] when the range is malformed or
    /// `begin > end`.
    pub fn parse(raw: &str) -> Result<Self, DutyError> {
        let invalid = || DutyError::InvalidDateRange {
            value: raw.to_string(),
        };
        let (begin, end) = raw.split_once("--").ok_or_else(invalid)?;
        let begin = NaiveDate::parse_from_str(begin.trim(), "%Y-%m-%d").map_err(|_| invalid())?;
        let end = NaiveDate::parse_from_str(end.trim(), "%Y-%m-%d").map_err(|_| invalid())?;
        if begin > end {
            return Err(invalid());
        }
        Ok(Self { begin, end })
    }

    #[must_use]
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.begin <= date && date <= self.end
    }
}

/// Which days a time spec is on duty, and where its handoffs fall.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkPattern {
    Daily,
    /// ISO weekdays, 1 = Monday. The first entry is the handoff day.
    Weekly { days: Vec<u32> },
    /// Days of month. The first entry is the handoff day.
    Monthly { days: Vec<u32> },
    DateRange { ranges: Vec<DateSpan> },
}

impl WorkPattern {
    #[must_use]
    pub fn is_valid_day(&self, date: NaiveDate) -> bool {
        match self {
            Self::Daily => true,
            Self::Weekly { days } => days.contains(&date.weekday().number_from_monday()),
            Self::Monthly { days } => days.contains(&date.day()),
            Self::DateRange { ranges } => ranges.iter().any(|span| span.contains(date)),
        }
    }

    #[must_use]
    pub fn handoff_day(&self) -> Option<u32> {
        match self {
            Self::Weekly { days } | Self::Monthly { days } => days.first().copied(),
            Self::Daily | Self::DateRange { .. } => None,
        }
    }

    #[must_use]
    pub fn work_days(&self) -> &[u32] {
        match self {
            Self::Weekly { days } | Self::Monthly { days } => days,
            Self::Daily | Self::DateRange { .. } => &[],
        }
    }

    #[must_use]
    pub const fn is_week_mode(&self) -> bool {
        matches!(self, Self::Weekly { .. })
    }

    /// Last date that can ever be valid, when the pattern is bounded.
    #[must_use]
    pub fn last_valid_date(&self) -> Option<NaiveDate> {
        match self {
            Self::DateRange { ranges } => ranges.iter().map(|span| span.end).max(),
            Self::Daily | Self::Weekly { .. } | Self::Monthly { .. } => None,
        }
    }
}

/// One validated time spec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DutyTimeSpec {
    pub pattern: WorkPattern,
    pub work_time: WorkTime,
    /// Hand over every N valid days instead of on calendar boundaries.
    pub period_days: Option<NonZeroU32>,
    pub begin_time: Option<NaiveDateTime>,
}

/// Who is on duty for an arrangement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DutyGroup {
    /// Each entry is one shift's user list, taken in turn.
    Specified { shifts: Vec<Vec<DutyUser>> },
    /// Consecutive slices of `group_number` users from one pool.
    Auto {
        pool: Vec<DutyUser>,
        group_number: NonZeroUsize,
    },
}

impl DutyGroup {
    /// Users of a non-rotating arrangement.
    #[must_use]
    pub fn first_users(&self) -> Vec<DutyUser> {
        match self {
            Self::Specified { shifts } => shifts.first().cloned().unwrap_or_default(),
            Self::Auto { pool, .. } => pool.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DutyArrangement {
    pub group: DutyGroup,
    pub specs: Vec<DutyTimeSpec>,
}

/// A validated duty rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DutyRule {
    pub id: u64,
    pub name: String,
    pub category: RuleCategory,
    pub enabled: bool,
    pub effective_time: NaiveDateTime,
    pub end_time: Option<NaiveDateTime>,
    pub arrangements: Vec<DutyArrangement>,
}

// ---------------------------------------------------------------------------
// Conversion
// ---------------------------------------------------------------------------

fn checked_days(days: &[u32], max: u32) -> Result<Vec<u32>, DutyError> {
    for &day in days {
        if day == 0 || day > max {
            return Err(DutyError::InvalidWorkDay { day, max });
        }
    }
    Ok(days.to_vec())
}

impl TryFrom<&DutyTimeConfig> for DutyTimeSpec {
    type Error = DutyError;

    fn try_from(raw: &DutyTimeConfig) -> Result<Self, Self::Error> {
        let week_mode = matches!(
            raw.work_type,
            WorkType::Weekly | WorkType::WorkDay | WorkType::Weekend
        );
        let max_day = if week_mode { 7 } else { 31 };

        let work_time = match raw.work_time_type {
            WorkTimeType::TimeRange => WorkTime::TimeRange(
                raw.work_time
                    .iter()
                    .map(|range| TimeRange::parse(range))
                    .collect::<Result<_, _>>()?,
            ),
            WorkTimeType::DatetimeRange => {
                let first = raw.work_time.first().ok_or_else(|| DutyError::time(""))?;
                let range = DayTimeRange::parse(first)?;
                range.validate(max_day)?;
                WorkTime::DatetimeRange(range)
            }
        };

        let days = match &work_time {
            WorkTime::DatetimeRange(range) => get_work_days(range, week_mode),
            WorkTime::TimeRange(_) => checked_days(&raw.work_days, max_day)?,
        };

        let pattern = match raw.work_type {
            WorkType::Daily => WorkPattern::Daily,
            WorkType::Weekly => WorkPattern::Weekly { days },
            WorkType::WorkDay if days.is_empty() => WorkPattern::Weekly {
                days: vec![1, 2, 3, 4, 5],
            },
            WorkType::Weekend if days.is_empty() => WorkPattern::Weekly { days: vec![6, 7] },
            WorkType::WorkDay | WorkType::Weekend => WorkPattern::Weekly { days },
            WorkType::Monthly => WorkPattern::Monthly { days },
            WorkType::DateRange => WorkPattern::DateRange {
                ranges: raw
                    .work_date_range
                    .iter()
                    .map(|range| DateSpan::parse(range))
                    .collect::<Result<_, _>>()?,
            },
        };

        let begin_time = non_empty(raw.begin_time.as_ref())
            .map(parse_datetime)
            .transpose()?;

        Ok(Self {
            pattern,
            work_time,
            period_days: raw
                .period_settings
                .as_ref()
                .and_then(|settings| NonZeroU32::new(settings.duration)),
            begin_time,
        })
    }
}

impl TryFrom<&DutyArrangeConfig> for DutyArrangement {
    type Error = DutyError;

    fn try_from(raw: &DutyArrangeConfig) -> Result<Self, Self::Error> {
        let group = match raw.group_type {
            GroupType::Specified => DutyGroup::Specified {
                shifts: raw.duty_users.clone(),
            },
            GroupType::Auto => {
                let group_number = NonZeroUsize::new(raw.group_number).ok_or_else(|| {
                    DutyError::InvalidDutyGroup {
                        reason: "auto groups need group_number >= 1".to_string(),
                    }
                })?;
                let pool = match raw.duty_users.as_slice() {
                    [pool] => pool.clone(),
                    _ => {
                        return Err(DutyError::InvalidDutyGroup {
                            reason: format!(
                                "auto groups take exactly one user pool, got {}",
                                raw.duty_users.len()
                            ),
                        });
                    }
                };
                DutyGroup::Auto { pool, group_number }
            }
        };

        Ok(Self {
            group,
            specs: raw
                .duty_time
                .iter()
                .map(DutyTimeSpec::try_from)
                .collect::<Result<_, _>>()?,
        })
    }
}

impl TryFrom<&DutyRuleConfig> for DutyRule {
    type Error = DutyError;

    fn try_from(raw: &DutyRuleConfig) -> Result<Self, Self::Error> {
        Ok(Self {
            id: raw.id,
            name: raw.name.clone(),
            category: raw.category,
            enabled: raw.enabled,
            effective_time: parse_datetime(&raw.effective_time)?,
            end_time: non_empty(raw.end_time.as_ref())
                .map(parse_datetime)
                .transpose()?,
            arrangements: raw
                .duty_arranges
                .iter()
                .map(DutyArrangement::try_from)
                .collect::<Result<_, _>>()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weekly_rule_json() -> &'static str {
        r#"{
            "id": 7,
            "name": "platform",
            "category": "rotation",
            "effective_time": "2024-01-01 00:00:00",
            "end_time": "",
            "duty_arranges": [{
                "duty_users": [[{"id": "alice", "type": "user"}], [{"id": "bob", "type": "user"}]],
                "group_type": "specified",
                "duty_time": [{
                    "work_type": "weekly",
                    "work_days": [1, 3, 5],
                    "work_time": ["09:00--18:00"]
                }]
            }]
        }"#
    }

    #[test]
    fn parses_stored_rule_into_typed_rule() {
        let raw: DutyRuleConfig = serde_json::from_str(weekly_rule_json()).expect("valid json");
        let rule = DutyRule::try_from(&raw).expect("valid rule");
        assert_eq!(rule.id, 7);
        assert!(rule.enabled);
        assert_eq!(rule.end_time, None);
        let spec = &rule.arrangements[0].specs[0];
        assert_eq!(spec.pattern, WorkPattern::Weekly { days: vec![1, 3, 5] });
        assert_eq!(spec.pattern.handoff_day(), Some(1));
        assert!(matches!(
            &rule.arrangements[0].group,
            DutyGroup::Specified { shifts } if shifts.len() == 2
        ));
    }

    #[test]
    fn rejects_out_of_range_weekdays() {
        let mut raw: DutyRuleConfig = serde_json::from_str(weekly_rule_json()).expect("valid json");
        raw.duty_arranges[0].duty_time[0].work_days = vec![1, 8];
        assert_eq!(
            DutyRule::try_from(&raw).expect_err("must fail"),
            DutyError::InvalidWorkDay { day: 8, max: 7 }
        );
    }

    #[test]
    fn auto_group_requires_positive_group_number() {
        let mut raw: DutyRuleConfig = serde_json::from_str(weekly_rule_json()).expect("valid json");
        raw.duty_arranges[0].group_type = GroupType::Auto;
        raw.duty_arranges[0].duty_users.truncate(1);
        raw.duty_arranges[0].group_number = 0;
        assert!(matches!(
            DutyRule::try_from(&raw),
            Err(DutyError::InvalidDutyGroup { .. })
        ));
    }

    #[test]
    fn work_day_and_weekend_default_their_days() {
        let raw = DutyTimeConfig {
            work_type: WorkType::Weekend,
            work_days: vec![],
            work_time_type: WorkTimeType::TimeRange,
            work_time: vec!["00:00--23:59".to_string()],
            work_date_range: vec![],
            period_settings: None,
            begin_time: None,
        };
        let spec = DutyTimeSpec::try_from(&raw).expect("valid spec");
        assert_eq!(spec.pattern, WorkPattern::Weekly { days: vec![6, 7] });
    }

    #[test]
    fn datetime_range_derives_work_days() {
        let raw = DutyTimeConfig {
            work_type: WorkType::Weekly,
            work_days: vec![],
            work_time_type: WorkTimeType::DatetimeRange,
            work_time: vec!["06 20:00--02 08:00".to_string()],
            work_date_range: vec![],
            period_settings: None,
            begin_time: None,
        };
        let spec = DutyTimeSpec::try_from(&raw).expect("valid spec");
        assert_eq!(spec.pattern.work_days(), &[6, 7, 1, 2]);
        assert_eq!(spec.pattern.handoff_day(), Some(6));
    }

    #[test]
    fn date_span_rejects_reversed_ranges() {
        assert!(DateSpan::parse("2024-01-05--2024-01-01").is_err());
        let span = DateSpan::parse("2024-01-01--2024-01-05").expect("valid");
        assert!(span.contains(NaiveDate::from_ymd_opt(2024, 1, 5).expect("date")));
    }

    #[test]
    fn cursors_are_written_and_cleared() {
        let raw: DutyRuleConfig = serde_json::from_str(weekly_rule_json()).expect("valid json");
        let at = parse_datetime("2024-02-01 00:00:00").expect("valid");
        let with = raw.with_cursors(&[SpecCursor {
            arrange_index: 0,
            spec_index: 0,
            begin_time: at,
        }]);
        assert_eq!(
            with.duty_arranges[0].duty_time[0].begin_time.as_deref(),
            Some("2024-02-01 00:00:00")
        );
        assert_eq!(with.without_cursors(), raw);
    }

    #[test]
    fn parse_datetime_accepts_common_shapes() {
        assert!(parse_datetime("2024-01-01 09:00").is_ok());
        assert!(parse_datetime("2024-01-01T09:00:00").is_ok());
        assert!(parse_datetime("2024-01-01").is_ok());
        assert!(parse_datetime("yesterday").is_err());
    }
}
