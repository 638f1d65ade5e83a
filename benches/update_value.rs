use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use sensewatch::expr::{ConditionRef, NodeId};
use sensewatch::hub::{Outbox, ValueNode};
use sensewatch::schedule::{Bound, Schedules};
use sensewatch_sdk::{AdminStatus, Callback, Delivery};
use sensewatch_types::{Metric, MetricValue, MonitorId};

fn quiet_callback() -> Callback {
    Arc::new(|_: &Delivery| Ok(()))
}

/// A node with `monitors` periodic monitors of mixed periods.
fn populated(monitors: u64) -> (ValueNode, Schedules) {
    let mut node = ValueNode::new(Metric::CPU_USAGE, usize::MAX);
    let mut schedules = Schedules::new();
    for i in 0..monitors {
        let period = [1_000, 2_000, 5_000][(i % 3) as usize];
        node.insert_timed(MonitorId(i), period, quiet_callback(), 0, 0, &mut schedules);
    }
    (node, schedules)
}

/// Benchmark a full acquisition cycle: every timer due at once
fn bench_timer_walk(c: &mut Criterion) {
    let mut group = c.benchmark_group("update_value_timers");
    let admin = AdminStatus::new();

    for monitors in [1u64, 10, 100, 1000] {
        group.bench_with_input(BenchmarkId::from_parameter(monitors), &monitors, |b, &n| {
            let (mut node, mut schedules) = populated(n);
            let mut now = 0;
            b.iter(|| {
                now += 10_000;
                let mut outbox = Outbox::default();
                black_box(node.update_value(
                    MetricValue::Byte(42),
                    now,
                    &mut schedules,
                    &admin,
                    &mut outbox,
                ));
            });
        });
    }
    group.finish();
}

/// Benchmark threshold checks when nothing crosses
fn bench_threshold_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("update_value_thresholds");
    let admin = AdminStatus::new();

    for watches in [10usize, 100, 1000] {
        let mut node = ValueNode::new(Metric::CPU_USAGE, usize::MAX);
        for i in 0..watches {
            let owner = ConditionRef {
                tree: MonitorId(i as u64),
                node: NodeId(0),
            };
            node.insert_threshold(Bound::Max, owner.tree, MetricValue::Byte(100), 1_000, owner);
            node.insert_threshold(Bound::Min, owner.tree, MetricValue::Byte(0), 1_000, owner);
        }
        let mut schedules = Schedules::new();

        group.bench_function(BenchmarkId::from_parameter(watches), |b| {
            b.iter(|| {
                let mut outbox = Outbox::default();
                black_box(node.update_value(
                    MetricValue::Byte(50),
                    1_000,
                    &mut schedules,
                    &admin,
                    &mut outbox,
                ));
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_timer_walk, bench_threshold_scan);
criterion_main!(benches);
