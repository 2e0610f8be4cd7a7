//! `wk preview`: generate a rule's shifts over a window without writing state.

use crate::cmd::parse_local_time;
use crate::output::{
    CliError, OutputMode, pretty_kv, pretty_rule, pretty_section, render_error, render_mode,
};
use crate::rules;
use clap::Args;
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use tracing::info;
use watchkeep_core::config::ProjectConfig;
use watchkeep_duty::coverage::{CoverageReport, analyze};
use watchkeep_duty::model::format_datetime;
use watchkeep_duty::{DutyRule, DutyRuleManager, DutyShift, ManagerOptions, PlanOutcome};

#[derive(Args, Debug)]
pub struct PreviewArgs {
    /// Rule file (.json, .yaml or .toml).
    #[arg(long)]
    pub rule: PathBuf,

    /// Pick one rule when the file holds several.
    #[arg(long)]
    pub rule_id: Option<u64>,

    /// Start of the window in local time (defaults to the rule's effective time).
    #[arg(long)]
    pub begin: Option<String>,

    /// Window length in days.
    #[arg(long, conflicts_with = "end")]
    pub days: Option<u32>,

    /// End of the window in local time.
    #[arg(long)]
    pub end: Option<String>,

    /// Rotation index to resume from.
    #[arg(long, default_value_t = 0)]
    pub last_user_index: usize,

    /// Also report gaps and overlaps across the window.
    #[arg(long)]
    pub coverage: bool,
}

#[derive(Debug, Serialize)]
pub struct PreviewReport {
    pub rule_id: u64,
    pub rule_name: String,
    pub window_begin: String,
    pub window_end: String,
    #[serde(flatten)]
    pub plan: PlanOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coverage: Option<CoverageReport>,
}

fn users_of(shift: &DutyShift) -> String {
    shift
        .users
        .iter()
        .map(|user| user.display_name.as_deref().unwrap_or(&user.id))
        .collect::<Vec<_>>()
        .join(",")
}

fn span_of(shift: &DutyShift) -> (String, String) {
    let fmt = |value: Option<chrono::NaiveDateTime>| {
        value.map_or_else(|| "-".to_string(), format_datetime)
    };
    (fmt(shift.start_time()), fmt(shift.finished_time()))
}

fn render_text(report: &PreviewReport, w: &mut dyn Write) -> std::io::Result<()> {
    for shift in &report.plan.shifts {
        let (start, finish) = span_of(shift);
        writeln!(w, "{}\t{}\t{start}\t{finish}", shift.order, users_of(shift))?;
    }
    if let Some(ref coverage) = report.coverage {
        for gap in &coverage.gaps {
            writeln!(w, "gap\t{}\t{}", format_datetime(gap.start), format_datetime(gap.end))?;
        }
        for overlap in &coverage.overlaps {
            writeln!(
                w,
                "overlap\t{}\t{}",
                format_datetime(overlap.start),
                format_datetime(overlap.end)
            )?;
        }
    }
    Ok(())
}

fn render_pretty(report: &PreviewReport, w: &mut dyn Write) -> std::io::Result<()> {
    pretty_section(w, &format!("Rule {} {}", report.rule_id, report.rule_name))?;
    pretty_kv(w, "window", format!("{} .. {}", report.window_begin, report.window_end))?;
    pretty_kv(w, "shifts", report.plan.shifts.len().to_string())?;
    pretty_kv(w, "next index", report.plan.next_user_index.to_string())?;
    pretty_kv(w, "planned to", format_datetime(report.plan.end_time))?;
    writeln!(w)?;
    for shift in &report.plan.shifts {
        let (start, finish) = span_of(shift);
        writeln!(w, "  #{:<3} {start}  ->  {finish}  {}", shift.order, users_of(shift))?;
    }
    if let Some(ref coverage) = report.coverage {
        writeln!(w)?;
        pretty_rule(w)?;
        let verdict = if coverage.is_fully_covered() {
            "fully covered"
        } else {
            "has gaps"
        };
        pretty_kv(w, "coverage", verdict)?;
        pretty_kv(w, "gaps", coverage.gaps.len().to_string())?;
        pretty_kv(w, "overlaps", coverage.overlaps.len().to_string())?;
    }
    Ok(())
}

/// Execute `wk preview`.
///
/// # Errors
///
/// Returns an error if the rule cannot be loaded or validated, or a window
/// bound does not parse.
pub fn run_preview(
    args: &PreviewArgs,
    output: OutputMode,
    config: &ProjectConfig,
) -> anyhow::Result<()> {
    let raw = rules::load_rule(&args.rule, args.rule_id)?;
    let rule = match DutyRule::try_from(&raw) {
        Ok(rule) => rule,
        Err(err) => {
            render_error(output, &CliError::from(&err))?;
            anyhow::bail!("rule {} is invalid", raw.id);
        }
    };

    let begin_time = args
        .begin
        .as_deref()
        .map(|raw| parse_local_time(output, "--begin", raw))
        .transpose()?;
    let end_time = args
        .end
        .as_deref()
        .map(|raw| parse_local_time(output, "--end", raw))
        .transpose()?;

    let manager = DutyRuleManager::new(
        &rule,
        ManagerOptions {
            begin_time,
            days: args.days,
            end_time,
            last_user_index: args.last_user_index,
            default_days: config.duty.preview_days,
        },
    );
    let plan = manager.get_duty_plan();
    info!(rule_id = rule.id, shifts = plan.shifts.len(), "previewed duty rule");

    let coverage = args
        .coverage
        .then(|| analyze(&plan.shifts, manager.begin_time(), manager.end_time()));
    let report = PreviewReport {
        rule_id: rule.id,
        rule_name: rule.name.clone(),
        window_begin: format_datetime(manager.begin_time()),
        window_end: format_datetime(manager.end_time()),
        plan,
        coverage,
    };

    render_mode(output, &report, render_text, render_pretty)
}
