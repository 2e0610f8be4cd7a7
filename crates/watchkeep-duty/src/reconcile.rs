//! Snapshot reconciliation and rolling plan materialization for one group.
//!
//! # Overview
//!
//! [`GroupDutyRuleManager::manage_duty_rule_snap`] compares the group's
//! configured rules against the snapshots already persisted:
//!
//! | situation | action |
//! |---|---|
//! | hash unchanged | nothing |
//! | rule disabled | purge its snapshots, invalidate its effective plans |
//! | hash changed, old cursor already at/after the new start | delete old |
//! | hash changed, old cursor before the new start | end old at the new start |
//! | no snapshot for the current hash | create one |
//!
//! Writes go out as create, then update, then delete. Afterwards every
//! snapshot due within the planning horizon is planned, earliest first, by
//! [`GroupDutyRuleManager::manage_duty_plan`].
//!
//! Rules absent from the configured list are left alone: disabling and
//! deleting a rule are independent actions.

#![allow(clippy::module_name_repetitions)]

use std::collections::{BTreeMap, BTreeSet};
use std::ops::AddAssign;

use anyhow::{Context, Result};
use chrono::{NaiveDateTime, TimeDelta};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::hash::rule_hash;
use crate::manager::{DEFAULT_PREVIEW_DAYS, DutyRuleManager, ManagerOptions};
use crate::model::{DutyRule, DutyRuleConfig};
use crate::store::{DutyPlan, DutyRuleSnapshot, DutyStore};

/// Default planning horizon in days.
pub const DEFAULT_PLAN_AHEAD_DAYS: u32 = 7;

/// Row counts of every write one reconciliation issued.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub created: usize,
    pub updated: usize,
    pub expired: usize,
    pub purged: usize,
    pub snapshots_planned: usize,
    pub snapshots_retired: usize,
    pub plans_invalidated: usize,
    pub plans_clipped: usize,
    pub plans_inserted: usize,
}

impl ReconcileReport {
    /// Snapshot rows created, changed or removed.
    #[must_use]
    pub const fn snapshot_writes(&self) -> usize {
        self.created + self.updated + self.expired + self.purged + self.snapshots_planned
            + self.snapshots_retired
    }

    #[must_use]
    pub const fn plan_writes(&self) -> usize {
        self.plans_invalidated + self.plans_clipped + self.plans_inserted
    }
}

impl AddAssign for ReconcileReport {
    fn add_assign(&mut self, other: Self) {
        self.created += other.created;
        self.updated += other.updated;
        self.expired += other.expired;
        self.purged += other.purged;
        self.snapshots_planned += other.snapshots_planned;
        self.snapshots_retired += other.snapshots_retired;
        self.plans_invalidated += other.plans_invalidated;
        self.plans_clipped += other.plans_clipped;
        self.plans_inserted += other.plans_inserted;
    }
}

/// Reconciles one user group's rules against its persisted snapshots.
#[derive(Debug, Clone)]
pub struct GroupDutyRuleManager {
    user_group_id: u64,
    rules: Vec<DutyRuleConfig>,
    plan_ahead_days: u32,
    preview_days: u32,
}

impl GroupDutyRuleManager {
    #[must_use]
    pub const fn new(user_group_id: u64, rules: Vec<DutyRuleConfig>) -> Self {
        Self {
            user_group_id,
            rules,
            plan_ahead_days: DEFAULT_PLAN_AHEAD_DAYS,
            preview_days: DEFAULT_PREVIEW_DAYS,
        }
    }

    #[must_use]
    pub const fn with_plan_ahead_days(mut self, days: u32) -> Self {
        self.plan_ahead_days = days;
        self
    }

    #[must_use]
    pub const fn with_preview_days(mut self, days: u32) -> Self {
        self.preview_days = days;
        self
    }

    #[must_use]
    pub const fn user_group_id(&self) -> u64 {
        self.user_group_id
    }

    /// Fresh snapshots for every enabled, valid rule, keyed by rule id.
    fn candidates(&self, task_time: NaiveDateTime) -> Result<BTreeMap<u64, DutyRuleSnapshot>> {
        let mut candidates = BTreeMap::new();
        for raw in self.rules.iter().filter(|rule| rule.enabled) {
            let rule = match DutyRule::try_from(raw) {
                Ok(rule) => rule,
                Err(err) => {
                    warn!(
                        rule_id = raw.id,
                        error = %err,
                        code = %err.code(),
                        "skipping invalid duty rule"
                    );
                    continue;
                }
            };
            let next_plan_time = rule.effective_time.max(task_time);
            let hash = rule_hash(raw).with_context(|| format!("hashing duty rule {}", raw.id))?;
            candidates.insert(
                raw.id,
                DutyRuleSnapshot {
                    id: 0,
                    user_group_id: self.user_group_id,
                    duty_rule_id: raw.id,
                    rule_snapshot: raw.without_cursors(),
                    hash,
                    next_plan_time,
                    next_user_index: 0,
                    enabled: true,
                    first_effective_time: next_plan_time,
                    // The rule's own end stays on `rule_snapshot`.
                    end_time: None,
                },
            );
        }
        Ok(candidates)
    }

    /// Bring persisted snapshots in line with the configured rules, then
    /// plan every snapshot due before `task_time + plan_ahead_days`.
    ///
    /// # Errors
    ///
    /// Returns an error if a store operation fails or a persisted snapshot
    /// holds a rule that no longer validates.
    #[instrument(skip(self, store), fields(group = self.user_group_id))]
    pub fn manage_duty_rule_snap<S: DutyStore>(
        &self,
        store: &mut S,
        task_time: NaiveDateTime,
    ) -> Result<ReconcileReport> {
        info!(%task_time, rules = self.rules.len(), "reconciling duty snapshots");
        let mut report = ReconcileReport::default();
        let candidates = self.candidates(task_time)?;

        let existing = store
            .enabled_snapshots(self.user_group_id)
            .context("loading enabled snapshots")?;

        // Start time of the snapshot already holding each rule's current hash.
        let mut current_versions: BTreeMap<u64, NaiveDateTime> = BTreeMap::new();
        let mut changed = Vec::new();
        for snapshot in existing {
            let Some(candidate) = candidates.get(&snapshot.duty_rule_id) else {
                continue;
            };
            if snapshot.hash == candidate.hash {
                current_versions.insert(snapshot.duty_rule_id, snapshot.first_effective_time);
            } else {
                changed.push(snapshot);
            }
        }

        let disabled: Vec<u64> = self
            .rules
            .iter()
            .filter(|rule| !rule.enabled)
            .map(|rule| rule.id)
            .collect();
        if !disabled.is_empty() {
            report.purged = store.delete_rule_snapshots(self.user_group_id, &disabled)?;
            report.plans_invalidated = store.invalidate_plans(self.user_group_id, &disabled, None)?;
            if report.purged > 0 || report.plans_invalidated > 0 {
                info!(
                    rules = ?disabled,
                    purged = report.purged,
                    invalidated = report.plans_invalidated,
                    "disabled rules removed"
                );
            }
        }

        let new_snapshots: Vec<DutyRuleSnapshot> = candidates
            .values()
            .filter(|candidate| !current_versions.contains_key(&candidate.duty_rule_id))
            .cloned()
            .collect();

        let mut expired = Vec::new();
        let mut updated = Vec::new();
        for mut snapshot in changed {
            let Some(candidate) = candidates.get(&snapshot.duty_rule_id) else {
                continue;
            };
            let cutoff = current_versions
                .get(&snapshot.duty_rule_id)
                .copied()
                .unwrap_or(candidate.next_plan_time);

            if snapshot.next_plan_time >= cutoff {
                expired.push(snapshot.id);
                continue;
            }
            let end = snapshot.end_time.map_or(cutoff, |end| end.min(cutoff));
            if snapshot.end_time != Some(end) {
                snapshot.end_time = Some(end);
                updated.push(snapshot);
            }
        }

        if !new_snapshots.is_empty() {
            report.created = store.create_snapshots(new_snapshots)?.len();
        }
        if !updated.is_empty() {
            store.update_snapshots(&updated)?;
            report.updated = updated.len();
        }
        if !expired.is_empty() {
            report.expired = store.delete_snapshots(&expired)?;
        }
        debug!(
            created = report.created,
            updated = report.updated,
            expired = report.expired,
            "snapshot writes applied"
        );

        let horizon = task_time + TimeDelta::days(i64::from(self.plan_ahead_days));
        let configured: BTreeSet<u64> = candidates.keys().copied().collect();
        let mut due: Vec<DutyRuleSnapshot> = store
            .enabled_snapshots(self.user_group_id)?
            .into_iter()
            .filter(|snap| {
                configured.contains(&snap.duty_rule_id) && snap.next_plan_time <= horizon
            })
            .collect();
        due.sort_by_key(|snap| (snap.next_plan_time, snap.id));

        for snapshot in &due {
            report += self.manage_duty_plan(store, snapshot)?;
        }

        info!(
            snapshot_writes = report.snapshot_writes(),
            plan_writes = report.plan_writes(),
            "reconciliation finished"
        );
        Ok(report)
    }

    /// Regenerate plans for one snapshot from its cursor and advance it.
    ///
    /// Effective plans starting at or after the cursor are invalidated and
    /// still-open ones are clipped to it, so the new batch joins the old one
    /// without gap or overlap. A superseded snapshot (one with an
    /// `end_time`) stops at its end and is removed once exhausted.
    ///
    /// # Errors
    ///
    /// Returns an error if a store operation fails or the frozen rule no
    /// longer validates.
    #[instrument(
        skip(self, store, snapshot),
        fields(group = self.user_group_id, snapshot = snapshot.id)
    )]
    pub fn manage_duty_plan<S: DutyStore>(
        &self,
        store: &mut S,
        snapshot: &DutyRuleSnapshot,
    ) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::default();
        let begin = snapshot.next_plan_time;

        if snapshot.end_time.is_some_and(|end| begin >= end) {
            report.snapshots_retired = store.delete_snapshots(&[snapshot.id])?;
            info!(rule_id = snapshot.duty_rule_id, "superseded snapshot exhausted");
            return Ok(report);
        }

        let rule = DutyRule::try_from(&snapshot.rule_snapshot)
            .with_context(|| format!("snapshot {} holds an invalid rule", snapshot.id))?;
        let manager = DutyRuleManager::new(
            &rule,
            ManagerOptions {
                begin_time: Some(begin),
                days: None,
                end_time: snapshot.end_time,
                last_user_index: snapshot.next_user_index,
                default_days: self.preview_days,
            },
        );
        if manager.end_time() <= begin {
            debug!(rule_id = snapshot.duty_rule_id, "nothing left to plan");
            return Ok(report);
        }

        report.plans_invalidated =
            store.invalidate_plans(self.user_group_id, &[snapshot.duty_rule_id], Some(begin))?;
        report.plans_clipped = store.clip_plans(self.user_group_id, snapshot.duty_rule_id, begin)?;

        let outcome = manager.get_duty_plan();
        let plans: Vec<DutyPlan> = outcome
            .shifts
            .iter()
            .filter_map(|shift| {
                let start_time = shift.start_time()?;
                let mut finished_time = shift.finished_time()?;
                if let Some(end) = snapshot.end_time {
                    if start_time >= end {
                        return None;
                    }
                    finished_time = finished_time.min(end);
                }
                Some(DutyPlan {
                    id: 0,
                    user_group_id: self.user_group_id,
                    duty_rule_id: snapshot.duty_rule_id,
                    start_time,
                    finished_time: Some(finished_time),
                    users: shift.users.clone(),
                    work_times: shift.work_times.clone(),
                    order: shift.order,
                    is_effective: true,
                })
            })
            .collect();
        report.plans_inserted = plans.len();
        store.insert_plans(plans)?;

        let mut advanced = snapshot.clone();
        advanced.next_plan_time = outcome.end_time;
        advanced.next_user_index = outcome.next_user_index;
        advanced.rule_snapshot = snapshot.rule_snapshot.with_cursors(&outcome.cursors);
        store.save_snapshot(&advanced)?;
        report.snapshots_planned = 1;

        debug!(
            rule_id = snapshot.duty_rule_id,
            plans = report.plans_inserted,
            next_plan_time = %advanced.next_plan_time,
            "planned snapshot"
        );

        if advanced
            .end_time
            .is_some_and(|end| advanced.next_plan_time >= end)
        {
            report.snapshots_retired = store.delete_snapshots(&[advanced.id])?;
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::parse_datetime;
    use crate::store::{InMemoryDutyStore, StoreOp};

    fn at(raw: &str) -> NaiveDateTime {
        parse_datetime(raw).expect("valid datetime")
    }

    fn rule(id: u64, effective: &str, work_time: &str) -> DutyRuleConfig {
        serde_json::from_str(&format!(
            r#"{{
                "id": {id},
                "effective_time": "{effective}",
                "duty_arranges": [{{
                    "duty_users": [[{{"id": "a"}}], [{{"id": "b"}}]],
                    "duty_time": [{{"work_type": "daily", "work_time": ["{work_time}"]}}]
                }}]
            }}"#
        ))
        .expect("valid json")
    }

    #[test]
    fn first_pass_creates_and_plans() {
        let mut store = InMemoryDutyStore::new();
        let manager =
            GroupDutyRuleManager::new(1, vec![rule(10, "2024-01-01 00:00:00", "09:00--18:00")]);
        let report = manager
            .manage_duty_rule_snap(&mut store, at("2024-01-01 00:00:00"))
            .expect("reconcile");

        assert_eq!(report.created, 1);
        assert_eq!(report.snapshots_planned, 1);
        assert_eq!(report.plans_inserted, 30);
        assert_eq!(store.snapshots[0].next_plan_time, at("2024-01-31 00:00:00"));
        assert_eq!(store.snapshots[0].next_user_index, 0);
    }

    #[test]
    fn writes_go_out_create_update_delete() {
        let mut store = InMemoryDutyStore::new();
        let task = at("2024-01-01 00:00:00");
        GroupDutyRuleManager::new(
            1,
            vec![
                rule(10, "2024-01-01 00:00:00", "09:00--18:00"),
                rule(11, "2024-01-01 00:00:00", "09:00--18:00"),
            ],
        )
            .manage_duty_rule_snap(&mut store, task)
            .expect("first pass");
        store.journal.clear();

        // Rule 10 changes from the future (old snapshot is clipped); rule 11
        // changes from now (old snapshot has planned past it and expires).
        let edited = vec![
            rule(10, "2024-03-01 00:00:00", "10:00--18:00"),
            rule(11, "2024-01-01 00:00:00", "10:00--18:00"),
        ];
        let report = GroupDutyRuleManager::new(1, edited)
            .manage_duty_rule_snap(&mut store, task)
            .expect("second pass");

        assert_eq!((report.created, report.updated, report.expired), (2, 1, 1));
        let order: Vec<StoreOp> = store
            .journal
            .iter()
            .copied()
            .filter(|op| {
                matches!(
                    op,
                    StoreOp::CreateSnapshots | StoreOp::UpdateSnapshots | StoreOp::DeleteSnapshots
                )
            })
            .take(3)
            .collect();
        assert_eq!(
            order,
            [StoreOp::CreateSnapshots, StoreOp::UpdateSnapshots, StoreOp::DeleteSnapshots]
        );
    }

    #[test]
    fn disabled_rule_without_snapshots_is_a_no_op() {
        let mut store = InMemoryDutyStore::new();
        let mut disabled = rule(10, "2024-01-01 00:00:00", "09:00--18:00");
        disabled.enabled = false;
        let report = GroupDutyRuleManager::new(1, vec![disabled])
            .manage_duty_rule_snap(&mut store, at("2024-01-01 00:00:00"))
            .expect("reconcile");
        assert_eq!(report, ReconcileReport::default());
        assert!(store.journal.is_empty());
    }

    #[test]
    fn disabling_purges_snapshots_and_plans() {
        let mut store = InMemoryDutyStore::new();
        let task = at("2024-01-01 00:00:00");
        let mut config = rule(10, "2024-01-01 00:00:00", "09:00--18:00");
        GroupDutyRuleManager::new(1, vec![config.clone()])
            .manage_duty_rule_snap(&mut store, task)
            .expect("first pass");

        config.enabled = false;
        let report = GroupDutyRuleManager::new(1, vec![config])
            .manage_duty_rule_snap(&mut store, task)
            .expect("second pass");
        assert_eq!(report.purged, 1);
        assert_eq!(report.plans_invalidated, 30);
        assert!(store.snapshots.is_empty());
        assert!(store.effective_plans(1).is_empty());
    }

    #[test]
    fn invalid_rules_are_skipped() {
        let mut store = InMemoryDutyStore::new();
        let report = GroupDutyRuleManager::new(1, vec![rule(10, "not a date", "09:00--18:00")])
            .manage_duty_rule_snap(&mut store, at("2024-01-01 00:00:00"))
            .expect("reconcile");
        assert_eq!(report.created, 0);
    }
}
