//! `wk reconcile`: run one reconciliation pass against a JSON state file.
//!
//! The state file is an [`InMemoryDutyStore`] serialized as JSON. A missing
//! file starts from an empty store. The file is rewritten through a
//! temporary sibling and a rename, so an interrupted run leaves the previous
//! state intact. Failures reading, updating or writing the state surface as
//! `E5001`.

use crate::cmd::parse_local_time;
use crate::output::{CliError, OutputMode, pretty_kv, pretty_section, render_error, render_mode};
use crate::rules;
use anyhow::Context;
use chrono::{NaiveDateTime, Utc};
use clap::Args;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use watchkeep_core::config::ProjectConfig;
use watchkeep_core::error::ErrorCode;
use watchkeep_duty::model::format_datetime;
use watchkeep_duty::store::StoreOp;
use watchkeep_duty::{DutyPlan, GroupDutyRuleManager, InMemoryDutyStore, ReconcileReport};

#[derive(Args, Debug)]
pub struct ReconcileArgs {
    /// Rule file holding the group's current rules.
    #[arg(long)]
    pub rules: PathBuf,

    /// JSON state file; created when missing.
    #[arg(long)]
    pub state: PathBuf,

    /// User group the rules belong to.
    #[arg(long)]
    pub group: u64,

    /// Task time in local time (defaults to now in the configured offset).
    #[arg(long)]
    pub at: Option<String>,

    /// Compute the pass without writing the state file.
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug, Serialize)]
pub struct PlanRow {
    pub duty_rule_id: u64,
    pub order: usize,
    pub users: Vec<String>,
    pub start_time: String,
    pub finished_time: Option<String>,
}

impl From<&DutyPlan> for PlanRow {
    fn from(plan: &DutyPlan) -> Self {
        Self {
            duty_rule_id: plan.duty_rule_id,
            order: plan.order,
            users: plan.users.iter().map(|user| user.id.clone()).collect(),
            start_time: format_datetime(plan.start_time),
            finished_time: plan.finished_time.map(format_datetime),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReconcileOutput {
    pub group: u64,
    pub task_time: String,
    pub dry_run: bool,
    pub report: ReconcileReport,
    /// Kinds of writes issued, in order.
    pub writes: Vec<StoreOp>,
    pub effective_plans: Vec<PlanRow>,
}

fn load_state(path: &Path) -> anyhow::Result<InMemoryDutyStore> {
    if !path.exists() {
        debug!(path = %path.display(), "state file missing, starting empty");
        return Ok(InMemoryDutyStore::new());
    }
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Failed to parse {}", path.display()))
}

fn save_state(path: &Path, store: &InMemoryDutyStore) -> anyhow::Result<()> {
    let tmp = path.with_extension("json.tmp");
    let body = serde_json::to_vec_pretty(store).context("serializing duty state")?;
    fs::write(&tmp, body).with_context(|| format!("Failed to write {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| {
        format!("Failed to move {} to {}", tmp.display(), path.display())
    })
}

/// Render a state failure as `E5001` before propagating it.
fn stored<T>(output: OutputMode, result: anyhow::Result<T>) -> anyhow::Result<T> {
    result.or_else(|err| {
        render_error(output, &CliError::coded(format!("{err:#}"), ErrorCode::StoreFailure))?;
        Err(err)
    })
}

fn render_text(out: &ReconcileOutput, w: &mut dyn Write) -> std::io::Result<()> {
    let r = &out.report;
    writeln!(
        w,
        "created={} updated={} expired={} purged={} planned={} retired={}",
        r.created, r.updated, r.expired, r.purged, r.snapshots_planned, r.snapshots_retired
    )?;
    writeln!(
        w,
        "plans invalidated={} clipped={} inserted={}",
        r.plans_invalidated, r.plans_clipped, r.plans_inserted
    )
}

fn render_pretty(out: &ReconcileOutput, w: &mut dyn Write) -> std::io::Result<()> {
    let r = &out.report;
    let heading = if out.dry_run {
        format!("Group {} (dry run)", out.group)
    } else {
        format!("Group {}", out.group)
    };
    pretty_section(w, &heading)?;
    pretty_kv(w, "task time", &out.task_time)?;
    pretty_kv(
        w,
        "snapshots",
        format!(
            "+{} ~{} -{} purged {} planned {} retired {}",
            r.created, r.updated, r.expired, r.purged, r.snapshots_planned, r.snapshots_retired
        ),
    )?;
    pretty_kv(
        w,
        "plans",
        format!(
            "invalidated {} clipped {} inserted {}",
            r.plans_invalidated, r.plans_clipped, r.plans_inserted
        ),
    )?;
    pretty_kv(w, "effective", out.effective_plans.len().to_string())?;
    writeln!(w)?;
    for plan in &out.effective_plans {
        writeln!(
            w,
            "  rule {:<4} #{:<3} {}  ->  {}  {}",
            plan.duty_rule_id,
            plan.order,
            plan.start_time,
            plan.finished_time.as_deref().unwrap_or("open"),
            plan.users.join(",")
        )?;
    }
    Ok(())
}

fn task_time(
    raw: Option<&str>,
    config: &ProjectConfig,
    output: OutputMode,
) -> anyhow::Result<NaiveDateTime> {
    match raw {
        Some(raw) => parse_local_time(output, "--at", raw),
        None => Ok(Utc::now().with_timezone(&config.duty.offset()?).naive_local()),
    }
}

/// Execute `wk reconcile`.
///
/// # Errors
///
/// Returns an error if the rules or state cannot be loaded, the pass fails,
/// or the state file cannot be written.
pub fn run_reconcile(
    args: &ReconcileArgs,
    output: OutputMode,
    config: &ProjectConfig,
) -> anyhow::Result<()> {
    let rules = rules::load_rules(&args.rules)?;
    let mut store = stored(output, load_state(&args.state))?;
    let at = task_time(args.at.as_deref(), config, output)?;

    let manager = GroupDutyRuleManager::new(args.group, rules)
        .with_plan_ahead_days(config.duty.plan_ahead_days)
        .with_preview_days(config.duty.preview_days);
    let report = stored(
        output,
        manager
            .manage_duty_rule_snap(&mut store, at)
            .with_context(|| format!("reconciling group {}", args.group)),
    )?;

    if args.dry_run {
        info!(group = args.group, "dry run, state file left untouched");
    } else {
        stored(output, save_state(&args.state, &store))?;
    }

    let payload = ReconcileOutput {
        group: args.group,
        task_time: format_datetime(at),
        dry_run: args.dry_run,
        report,
        writes: store.journal.clone(),
        effective_plans: store
            .effective_plans(args.group)
            .into_iter()
            .map(PlanRow::from)
            .collect(),
    };
    render_mode(output, &payload, render_text, render_pretty)
}
