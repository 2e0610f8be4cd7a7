//! `wk handoff`: when does a shift that started at `--begin` hand over?

use crate::cmd::parse_local_time;
use crate::output::{CliError, OutputMode, pretty_kv, pretty_section, render_error, render_mode};
use anyhow::Context;
use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use clap::{Args, ValueEnum};
use serde::Serialize;
use std::io::Write;
use watchkeep_core::config::ProjectConfig;
use watchkeep_core::error::ErrorCode;
use watchkeep_duty::calendar::{DutyCalendar, Handoff};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RotationKind {
    Daily,
    Weekly,
    Monthly,
}

#[derive(Args, Debug)]
pub struct HandoffArgs {
    /// Rotation period.
    #[arg(value_enum)]
    pub kind: RotationKind,

    /// Shift start: RFC 3339, or local time in the configured offset.
    /// Defaults to now.
    #[arg(long)]
    pub begin: Option<String>,

    /// Handover clock, `HH:MM`.
    #[arg(long)]
    pub at: String,

    /// Handover day: 1-7 (Monday first) for weekly, 1-31 for monthly.
    #[arg(long)]
    pub day: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct HandoffReport {
    pub kind: RotationKind,
    pub utc_offset: String,
    pub begin: DateTime<FixedOffset>,
    pub handoff: DateTime<FixedOffset>,
    pub handoff_utc: DateTime<Utc>,
}

fn resolve_begin(
    raw: Option<&str>,
    offset: FixedOffset,
    output: OutputMode,
) -> anyhow::Result<DateTime<Utc>> {
    let Some(raw) = raw else {
        return Ok(Utc::now());
    };
    if let Ok(instant) = DateTime::parse_from_rfc3339(raw) {
        return Ok(instant.with_timezone(&Utc));
    }
    let local = parse_local_time(output, "--begin", raw)?;
    offset
        .from_local_datetime(&local)
        .single()
        .map(|instant| instant.with_timezone(&Utc))
        .with_context(|| format!("{raw:?} has no single instant at {offset}"))
}

fn checked_day(kind: RotationKind, day: Option<u32>, output: OutputMode) -> anyhow::Result<u32> {
    let max = match kind {
        RotationKind::Daily => return Ok(0),
        RotationKind::Weekly => 7,
        RotationKind::Monthly => 31,
    };
    match day {
        Some(day) if (1..=max).contains(&day) => Ok(day),
        Some(day) => {
            render_error(
                output,
                &CliError::coded(
                    format!("work day {day} is outside 1..={max}"),
                    ErrorCode::InvalidWorkDay,
                ),
            )?;
            anyhow::bail!("invalid --day {day}")
        }
        None => {
            render_error(
                output,
                &CliError::with_details(
                    "--day is required for weekly and monthly handoffs",
                    format!("pass --day 1..={max}"),
                    ErrorCode::InvalidWorkDay,
                ),
            )?;
            anyhow::bail!("missing --day")
        }
    }
}

fn render_text(report: &HandoffReport, w: &mut dyn Write) -> std::io::Result<()> {
    writeln!(w, "{}", report.handoff.to_rfc3339())
}

fn render_pretty(report: &HandoffReport, w: &mut dyn Write) -> std::io::Result<()> {
    let kind = match report.kind {
        RotationKind::Daily => "Daily",
        RotationKind::Weekly => "Weekly",
        RotationKind::Monthly => "Monthly",
    };
    pretty_section(w, &format!("{kind} handoff"))?;
    pretty_kv(w, "offset", &report.utc_offset)?;
    pretty_kv(w, "begin", report.begin.format("%Y-%m-%d %H:%M (%a)").to_string())?;
    pretty_kv(w, "handoff", report.handoff.format("%Y-%m-%d %H:%M (%a)").to_string())?;
    pretty_kv(w, "handoff utc", report.handoff_utc.to_rfc3339())
}

/// Execute `wk handoff`.
///
/// # Errors
///
/// Returns an error if the configured offset, `--begin` or `--day` is
/// invalid.
pub fn run_handoff(
    args: &HandoffArgs,
    output: OutputMode,
    config: &ProjectConfig,
) -> anyhow::Result<()> {
    let offset = config.duty.offset()?;
    let calendar = DutyCalendar::new(offset);
    let begin = resolve_begin(args.begin.as_deref(), offset, output)?;
    let day = checked_day(args.kind, args.day, output)?;

    let handoff = Handoff {
        day,
        time: args.at.clone(),
    };
    let end = match args.kind {
        RotationKind::Daily => calendar.daily_rotation_end(begin, &args.at),
        RotationKind::Weekly => calendar.weekly_rotation_end(begin, &handoff),
        RotationKind::Monthly => calendar.monthly_rotation_end(begin, &handoff),
    };

    let report = HandoffReport {
        kind: args.kind,
        utc_offset: offset.to_string(),
        begin: begin.with_timezone(&offset),
        handoff: end.with_timezone(&offset),
        handoff_utc: end,
    };
    render_mode(output, &report, render_text, render_pretty)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn east8() -> FixedOffset {
        FixedOffset::east_opt(8 * 3600).expect("valid offset")
    }

    #[test]
    fn local_begin_is_read_in_the_configured_offset() {
        let begin = resolve_begin(Some("2024-03-06 09:00"), east8(), OutputMode::Json)
            .expect("parse");
        assert_eq!(begin.to_rfc3339(), "2024-03-06T01:00:00+00:00");
    }

    #[test]
    fn rfc3339_begin_keeps_its_own_offset() {
        let begin = resolve_begin(Some("2024-03-06T09:00:00-05:00"), east8(), OutputMode::Json)
            .expect("parse");
        assert_eq!(begin.to_rfc3339(), "2024-03-06T14:00:00+00:00");
    }

    #[test]
    fn day_bounds_follow_the_rotation_kind() {
        assert_eq!(checked_day(RotationKind::Daily, None, OutputMode::Json).expect("daily"), 0);
        assert_eq!(checked_day(RotationKind::Monthly, Some(31), OutputMode::Json).expect("ok"), 31);
        assert!(checked_day(RotationKind::Weekly, Some(8), OutputMode::Json).is_err());
        assert!(checked_day(RotationKind::Weekly, None, OutputMode::Json).is_err());
    }
}
