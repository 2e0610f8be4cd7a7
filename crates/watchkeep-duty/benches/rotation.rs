use chrono::{NaiveDateTime, TimeDelta};
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use watchkeep_duty::dates::{PeriodMode, get_duty_dates};
use watchkeep_duty::model::{WorkPattern, parse_datetime};
use watchkeep_duty::{
    DutyRule, DutyRuleConfig, DutyRuleManager, GroupDutyRuleManager, InMemoryDutyStore,
    ManagerOptions,
};

const WINDOWS: [u32; 3] = [30, 180, 730];

fn begin() -> NaiveDateTime {
    parse_datetime("2024-01-01 00:00:00").unwrap_or_default()
}

fn rotation_rule(users: usize) -> DutyRuleConfig {
    let shifts: Vec<String> = (0..users)
        .map(|i| format!(r#"[{{"id": "user-{i}"}}]"#))
        .collect();
    let raw = format!(
        r#"{{
            "id": 1,
            "category": "rotation",
            "effective_time": "2024-01-01 00:00:00",
            "duty_arranges": [{{
                "duty_users": [{}],
                "duty_time": [
                    {{"work_type": "weekly", "work_days": [1, 2, 3, 4, 5], "work_time": ["09:00--18:00"]}},
                    {{"work_type": "weekend", "work_time": ["10:00--16:00"]}}
                ]
            }}]
        }}"#,
        shifts.join(", ")
    );
    serde_json::from_str(&raw).unwrap_or_else(|err| panic!("bench rule: {err}"))
}

fn bench_duty_dates(c: &mut Criterion) {
    let mut group = c.benchmark_group("dates.weekly");
    let pattern = WorkPattern::Weekly {
        days: vec![1, 3, 5],
    };

    for days in WINDOWS {
        group.throughput(Throughput::Elements(u64::from(days)));
        group.bench_with_input(BenchmarkId::from_parameter(days), &days, |b, days| {
            let end = begin() + TimeDelta::days(i64::from(*days));
            b.iter(|| {
                let dates = get_duty_dates(&pattern, begin(), end, PeriodMode::Handoff);
                black_box(dates.periods.len())
            });
        });
    }

    group.finish();
}

fn bench_rotation_plan(c: &mut Criterion) {
    let mut group = c.benchmark_group("manager.rotation");
    let raw = rotation_rule(8);
    let rule = DutyRule::try_from(&raw).unwrap_or_else(|err| panic!("bench rule: {err}"));

    for days in WINDOWS {
        group.throughput(Throughput::Elements(u64::from(days)));
        group.bench_with_input(BenchmarkId::from_parameter(days), &days, |b, days| {
            b.iter(|| {
                let manager = DutyRuleManager::new(
                    &rule,
                    ManagerOptions {
                        days: Some(*days),
                        ..ManagerOptions::default()
                    },
                );
                black_box(manager.get_duty_plan().shifts.len())
            });
        });
    }

    group.finish();
}

fn bench_reconcile(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconcile.first_pass");

    for rules in [1_u64, 10, 50] {
        group.throughput(Throughput::Elements(rules));
        group.bench_with_input(BenchmarkId::from_parameter(rules), &rules, |b, rules| {
            let configs: Vec<DutyRuleConfig> = (1..=*rules)
                .map(|id| {
                    let mut rule = rotation_rule(4);
                    rule.id = id;
                    rule
                })
                .collect();
            let manager = GroupDutyRuleManager::new(1, configs);
            b.iter(|| {
                let mut store = InMemoryDutyStore::new();
                let report = manager.manage_duty_rule_snap(&mut store, begin());
                black_box(report.map(|r| r.plans_inserted).unwrap_or_default())
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_duty_dates, bench_rotation_plan, bench_reconcile);
criterion_main!(benches);
