//! Persistence seam for snapshots and plans.
//!
//! # Overview
//!
//! Reconciliation never talks to a database directly. It issues a small set
//! of bulk operations through [`DutyStore`]; implementations own
//! transactionality. [`InMemoryDutyStore`] is the reference implementation:
//! serde-serializable so it can double as a JSON state file, and it keeps a
//! journal of the operations applied to it.

#![allow(clippy::module_name_repetitions)]

use anyhow::{Result, bail};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::model::{DutyRuleConfig, DutyUser};
use crate::worktime::WorkWindow;

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// A frozen rule plus the cursor that says how far it has been planned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DutyRuleSnapshot {
    /// Assigned by the store on creation.
    #[serde(default)]
    pub id: u64,
    pub user_group_id: u64,
    pub duty_rule_id: u64,
    pub rule_snapshot: DutyRuleConfig,
    pub hash: String,
    pub next_plan_time: NaiveDateTime,
    pub next_user_index: usize,
    pub enabled: bool,
    pub first_effective_time: NaiveDateTime,
    /// Set only when a newer version of the rule supersedes this one. The
    /// rule's configured `end_time` is read from `rule_snapshot` instead.
    #[serde(default)]
    pub end_time: Option<NaiveDateTime>,
}

/// One persisted shift.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DutyPlan {
    #[serde(default)]
    pub id: u64,
    pub user_group_id: u64,
    pub duty_rule_id: u64,
    pub start_time: NaiveDateTime,
    pub finished_time: Option<NaiveDateTime>,
    pub users: Vec<DutyUser>,
    pub work_times: Vec<WorkWindow>,
    pub order: usize,
    pub is_effective: bool,
}

// ---------------------------------------------------------------------------
// DutyStore
// ---------------------------------------------------------------------------

/// Bulk operations used by reconciliation.
pub trait DutyStore {
    /// Enabled snapshots of one user group.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be read.
    fn enabled_snapshots(&self, user_group_id: u64) -> Result<Vec<DutyRuleSnapshot>>;

    /// Insert snapshots, returning the ids assigned to them in order.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn create_snapshots(&mut self, snapshots: Vec<DutyRuleSnapshot>) -> Result<Vec<u64>>;

    /// Replace snapshots by id.
    ///
    /// # Errors
    ///
    /// Returns an error if any id is unknown or the write fails.
    fn update_snapshots(&mut self, snapshots: &[DutyRuleSnapshot]) -> Result<()>;

    /// Delete snapshots by id, returning how many existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn delete_snapshots(&mut self, ids: &[u64]) -> Result<usize>;

    /// Delete every snapshot of the given rules for one group.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn delete_rule_snapshots(&mut self, user_group_id: u64, rule_ids: &[u64]) -> Result<usize>;

    /// Mark effective plans of the given rules ineffective. With
    /// `starting_at`, only plans starting at or after it are touched.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn invalidate_plans(
        &mut self,
        user_group_id: u64,
        rule_ids: &[u64],
        starting_at: Option<NaiveDateTime>,
    ) -> Result<usize>;

    /// Set the finish of effective plans that are open or finish after `at`
    /// to `at`.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn clip_plans(&mut self, user_group_id: u64, rule_id: u64, at: NaiveDateTime) -> Result<usize>;

    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn insert_plans(&mut self, plans: Vec<DutyPlan>) -> Result<()>;

    /// Persist a snapshot's advanced cursor.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot is unknown or the write fails.
    fn save_snapshot(&mut self, snapshot: &DutyRuleSnapshot) -> Result<()>;
}

// ---------------------------------------------------------------------------
// InMemoryDutyStore
// ---------------------------------------------------------------------------

/// Kind of write applied to an [`InMemoryDutyStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreOp {
    CreateSnapshots,
    UpdateSnapshots,
    DeleteSnapshots,
    DeleteRuleSnapshots,
    InvalidatePlans,
    ClipPlans,
    InsertPlans,
    SaveSnapshot,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InMemoryDutyStore {
    #[serde(default)]
    next_snapshot_id: u64,
    #[serde(default)]
    next_plan_id: u64,
    #[serde(default)]
    pub snapshots: Vec<DutyRuleSnapshot>,
    #[serde(default)]
    pub plans: Vec<DutyPlan>,
    /// Non-empty writes in the order they were applied.
    #[serde(skip)]
    pub journal: Vec<StoreOp>,
}

impl InMemoryDutyStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Effective plans of one group, ordered by start.
    #[must_use]
    pub fn effective_plans(&self, user_group_id: u64) -> Vec<&DutyPlan> {
        let mut plans: Vec<&DutyPlan> = self
            .plans
            .iter()
            .filter(|plan| plan.user_group_id == user_group_id && plan.is_effective)
            .collect();
        plans.sort_by_key(|plan| (plan.start_time, plan.duty_rule_id, plan.id));
        plans
    }

    fn record(&mut self, op: StoreOp, rows: usize) {
        if rows > 0 {
            self.journal.push(op);
        }
    }

    fn effective_plans_mut(
        &mut self,
        user_group_id: u64,
        rule_ids: &[u64],
    ) -> impl Iterator<Item = &mut DutyPlan> + '_ {
        let rule_ids = rule_ids.to_vec();
        self.plans.iter_mut().filter(move |plan| {
            plan.user_group_id == user_group_id
                && plan.is_effective
                && rule_ids.contains(&plan.duty_rule_id)
        })
    }
}

impl DutyStore for InMemoryDutyStore {
    fn enabled_snapshots(&self, user_group_id: u64) -> Result<Vec<DutyRuleSnapshot>> {
        Ok(self
            .snapshots
            .iter()
            .filter(|snap| snap.user_group_id == user_group_id && snap.enabled)
            .cloned()
            .collect())
    }

    fn create_snapshots(&mut self, snapshots: Vec<DutyRuleSnapshot>) -> Result<Vec<u64>> {
        let mut ids = Vec::with_capacity(snapshots.len());
        let count = snapshots.len();
        for mut snapshot in snapshots {
            self.next_snapshot_id += 1;
            snapshot.id = self.next_snapshot_id;
            ids.push(snapshot.id);
            self.snapshots.push(snapshot);
        }
        self.record(StoreOp::CreateSnapshots, count);
        Ok(ids)
    }

    fn update_snapshots(&mut self, snapshots: &[DutyRuleSnapshot]) -> Result<()> {
        for snapshot in snapshots {
            let Some(slot) = self.snapshots.iter_mut().find(|s| s.id == snapshot.id) else {
                bail!("snapshot {} does not exist", snapshot.id);
            };
            *slot = snapshot.clone();
        }
        self.record(StoreOp::UpdateSnapshots, snapshots.len());
        Ok(())
    }

    fn delete_snapshots(&mut self, ids: &[u64]) -> Result<usize> {
        let before = self.snapshots.len();
        self.snapshots.retain(|snap| !ids.contains(&snap.id));
        let removed = before - self.snapshots.len();
        self.record(StoreOp::DeleteSnapshots, removed);
        Ok(removed)
    }

    fn delete_rule_snapshots(&mut self, user_group_id: u64, rule_ids: &[u64]) -> Result<usize> {
        let before = self.snapshots.len();
        self.snapshots.retain(|snap| {
            !(snap.user_group_id == user_group_id && rule_ids.contains(&snap.duty_rule_id))
        });
        let removed = before - self.snapshots.len();
        self.record(StoreOp::DeleteRuleSnapshots, removed);
        Ok(removed)
    }

    fn invalidate_plans(
        &mut self,
        user_group_id: u64,
        rule_ids: &[u64],
        starting_at: Option<NaiveDateTime>,
    ) -> Result<usize> {
        let mut touched = 0;
        for plan in self.effective_plans_mut(user_group_id, rule_ids) {
            if starting_at.is_none_or(|at| plan.start_time >= at) {
                plan.is_effective = false;
                touched += 1;
            }
        }
        self.record(StoreOp::InvalidatePlans, touched);
        Ok(touched)
    }

    fn clip_plans(&mut self, user_group_id: u64, rule_id: u64, at: NaiveDateTime) -> Result<usize> {
        let mut touched = 0;
        for plan in self.effective_plans_mut(user_group_id, &[rule_id]) {
            if plan.finished_time.is_none_or(|finished| finished > at) {
                plan.finished_time = Some(at);
                touched += 1;
            }
        }
        self.record(StoreOp::ClipPlans, touched);
        Ok(touched)
    }

    fn insert_plans(&mut self, plans: Vec<DutyPlan>) -> Result<()> {
        let count = plans.len();
        for mut plan in plans {
            self.next_plan_id += 1;
            plan.id = self.next_plan_id;
            self.plans.push(plan);
        }
        self.record(StoreOp::InsertPlans, count);
        Ok(())
    }

    fn save_snapshot(&mut self, snapshot: &DutyRuleSnapshot) -> Result<()> {
        let Some(slot) = self.snapshots.iter_mut().find(|s| s.id == snapshot.id) else {
            bail!("snapshot {} does not exist", snapshot.id);
        };
        *slot = snapshot.clone();
        self.record(StoreOp::SaveSnapshot, 1);
        Ok(())
    }
}
