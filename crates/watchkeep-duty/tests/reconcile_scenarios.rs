//! Multi-pass reconciliation scenarios against the in-memory store.

use chrono::NaiveDateTime;
use watchkeep_duty::coverage::analyze;
use watchkeep_duty::model::parse_datetime;
use watchkeep_duty::store::StoreOp;
use watchkeep_duty::{DutyPlan, DutyRuleConfig, DutyShift, GroupDutyRuleManager, InMemoryDutyStore};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn at(raw: &str) -> NaiveDateTime {
    parse_datetime(raw).expect("valid datetime")
}

fn weekly_rule(id: u64, effective: &str, work_time: &str) -> DutyRuleConfig {
    serde_json::from_str(&format!(
        r#"{{
            "id": {id},
            "category": "rotation",
            "effective_time": "{effective}",
            "duty_arranges": [{{
                "duty_users": [[{{"id": "a"}}], [{{"id": "b"}}]],
                "duty_time": [{{
                    "work_type": "weekly",
                    "work_days": [1, 2, 3, 4, 5, 6, 7],
                    "work_time": ["{work_time}"]
                }}]
            }}]
        }}"#
    ))
    .expect("valid json")
}

fn regular_rule(id: u64) -> DutyRuleConfig {
    serde_json::from_str(&format!(
        r#"{{
            "id": {id},
            "category": "regular",
            "effective_time": "2024-01-01 00:00:00",
            "duty_arranges": [{{
                "duty_users": [[{{"id": "ops"}}]],
                "duty_time": [{{"work_type": "work_day", "work_time": ["09:00--18:00"]}}]
            }}]
        }}"#
    ))
    .expect("valid json")
}

fn as_shifts(plans: &[&DutyPlan]) -> Vec<DutyShift> {
    plans
        .iter()
        .map(|plan| DutyShift {
            users: plan.users.clone(),
            order: plan.order,
            work_times: plan.work_times.clone(),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Idempotence
// ---------------------------------------------------------------------------

#[test]
fn second_pass_with_same_rules_writes_nothing() {
    let mut store = InMemoryDutyStore::new();
    let manager = GroupDutyRuleManager::new(
        7,
        vec![weekly_rule(1, "2024-01-01 00:00:00", "00:00--00:00"), regular_rule(2)],
    );
    let task = at("2024-01-01 00:00:00");

    let first = manager.manage_duty_rule_snap(&mut store, task).expect("first pass");
    assert_eq!(first.created, 2);
    assert!(first.plans_inserted > 0);

    store.journal.clear();
    let second = manager.manage_duty_rule_snap(&mut store, task).expect("second pass");
    assert_eq!(second.snapshot_writes(), 0);
    assert_eq!(second.plan_writes(), 0);
    assert!(store.journal.is_empty(), "unexpected writes: {:?}", store.journal);
}

#[test]
fn rule_with_end_date_stays_idempotent_after_exhaustion() {
    let mut store = InMemoryDutyStore::new();
    let mut rule = weekly_rule(1, "2024-01-01 00:00:00", "09:00--18:00");
    rule.end_time = Some("2024-01-15 00:00:00".to_string());
    let manager = GroupDutyRuleManager::new(7, vec![rule]);

    manager
        .manage_duty_rule_snap(&mut store, at("2024-01-01 00:00:00"))
        .expect("first pass");
    assert_eq!(store.snapshots[0].next_plan_time, at("2024-01-15 00:00:00"));

    store.journal.clear();
    let later = at("2024-01-20 00:00:00");
    manager.manage_duty_rule_snap(&mut store, later).expect("second pass");
    manager.manage_duty_rule_snap(&mut store, later).expect("third pass");
    assert!(store.journal.is_empty(), "unexpected writes: {:?}", store.journal);
    assert_eq!(store.effective_plans(7).len(), 2);
}

#[test]
fn rule_end_lives_on_the_rule_not_the_snapshot() {
    let mut store = InMemoryDutyStore::new();
    let mut rule = weekly_rule(1, "2024-01-01 00:00:00", "09:00--18:00");
    rule.end_time = Some("2024-01-15 00:00:00".to_string());
    let manager = GroupDutyRuleManager::new(7, vec![rule]);

    manager
        .manage_duty_rule_snap(&mut store, at("2024-01-01 00:00:00"))
        .expect("first pass");

    let snapshot = &store.snapshots[0];
    assert_eq!(snapshot.end_time, None);
    assert_eq!(
        snapshot.rule_snapshot.end_time.as_deref(),
        Some("2024-01-15 00:00:00")
    );
}

// ---------------------------------------------------------------------------
// Rolling continuation
// ---------------------------------------------------------------------------

#[test]
fn rolling_passes_leave_no_gaps_and_keep_rotating() {
    let mut store = InMemoryDutyStore::new();
    let manager = GroupDutyRuleManager::new(7, vec![weekly_rule(1, "2024-01-01 00:00:00", "00:00--00:00")]);

    manager
        .manage_duty_rule_snap(&mut store, at("2024-01-01 00:00:00"))
        .expect("first pass");
    // The 30-day window ends on a Wednesday; the last week runs to Sunday.
    assert_eq!(store.snapshots[0].next_plan_time, at("2024-02-05 00:00:00"));
    assert_eq!(store.effective_plans(7).len(), 5);

    let report = manager
        .manage_duty_rule_snap(&mut store, at("2024-01-29 00:00:00"))
        .expect("second pass");
    assert_eq!(report.created, 0);
    assert_eq!(report.snapshots_planned, 1);

    let plans = store.effective_plans(7);
    let who: Vec<&str> = plans.iter().map(|p| p.users[0].id.as_str()).collect();
    assert_eq!(&who[..7], ["a", "b", "a", "b", "a", "b", "a"]);

    let coverage = analyze(&as_shifts(&plans), at("2024-01-01 00:00:00"), at("2024-03-01 00:00:00"));
    assert!(coverage.is_fully_covered(), "gaps: {:?}", coverage.gaps);
    assert!(coverage.overlaps.is_empty(), "overlaps: {:?}", coverage.overlaps);
}

// ---------------------------------------------------------------------------
// Rule edits
// ---------------------------------------------------------------------------

#[test]
fn future_edit_clips_the_old_version_at_the_new_start() {
    let mut store = InMemoryDutyStore::new();
    GroupDutyRuleManager::new(7, vec![weekly_rule(1, "2024-01-01 00:00:00", "09:00--18:00")])
        .manage_duty_rule_snap(&mut store, at("2024-01-01 00:00:00"))
        .expect("first pass");

    let edited = GroupDutyRuleManager::new(7, vec![weekly_rule(1, "2024-03-04 00:00:00", "10:00--18:00")]);
    let report = edited
        .manage_duty_rule_snap(&mut store, at("2024-01-02 00:00:00"))
        .expect("edit pass");
    assert_eq!((report.created, report.updated, report.expired), (1, 1, 0));

    let old = store
        .snapshots
        .iter()
        .find(|snap| snap.end_time.is_some())
        .expect("old version kept");
    assert_eq!(old.end_time, Some(at("2024-03-04 00:00:00")));

    // Re-running the edit is a no-op.
    store.journal.clear();
    edited
        .manage_duty_rule_snap(&mut store, at("2024-01-02 00:00:00"))
        .expect("repeat pass");
    assert!(store.journal.is_empty(), "unexpected writes: {:?}", store.journal);

    // The old version plans up to the new start and is then retired.
    let report = edited
        .manage_duty_rule_snap(&mut store, at("2024-02-01 00:00:00"))
        .expect("catch-up pass");
    assert_eq!(report.snapshots_retired, 1);
    assert!(store.snapshots.iter().all(|snap| snap.end_time.is_none()));
    let last_old = store
        .effective_plans(7)
        .into_iter()
        .filter(|plan| plan.work_times[0].start.format("%H:%M").to_string() == "09:00")
        .filter_map(|plan| plan.finished_time)
        .max()
        .expect("old plans exist");
    assert!(last_old <= at("2024-03-04 00:00:00"));
}

#[test]
fn immediate_edit_replaces_future_plans() {
    let mut store = InMemoryDutyStore::new();
    GroupDutyRuleManager::new(7, vec![weekly_rule(1, "2024-01-01 00:00:00", "09:00--18:00")])
        .manage_duty_rule_snap(&mut store, at("2024-01-01 00:00:00"))
        .expect("first pass");

    let report = GroupDutyRuleManager::new(7, vec![weekly_rule(1, "2024-01-01 00:00:00", "10:00--18:00")])
        .manage_duty_rule_snap(&mut store, at("2024-01-08 00:00:00"))
        .expect("edit pass");
    assert_eq!((report.created, report.expired), (1, 1));
    assert!(report.plans_invalidated > 0);
    assert!(store.journal.contains(&StoreOp::InvalidatePlans));

    for plan in store.effective_plans(7) {
        if plan.start_time >= at("2024-01-08 00:00:00") {
            assert_eq!(plan.work_times[0].start.format("%H:%M").to_string(), "10:00");
        }
    }
}
