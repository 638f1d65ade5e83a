//! Metric services: one per metric group.
//!
//! A service owns the hubs of every metric in its group, the group-wide
//! schedule table used for phase alignment, and the acquisition source that
//! produces readings. It decides when the group next needs to wake and goes
//! dormant when nobody is subscribed.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use sensewatch_sdk::{AdminStatus, Callback, Target};
use sensewatch_types::{
    Metric, MetricGroup, MetricKind, MetricValue, Millis, MonitorId, SampleValue, Timestamp,
};
use tracing::{debug, info};

use crate::expr::ConditionRef;
use crate::hub::{CoordValNode, Fence, Hub, LocalProximity, Outbox, Proximity, ValueNode};
use crate::schedule::{Bound, Schedules};
use crate::source::AcquisitionSource;

/// Delay before retrying a source that left due monitors unserved.
pub const IDLE_RETRY_MS: Millis = 100;

/// Latest value of every metric, written by the metric task only.
///
/// Expression parsing reads it to snapshot insertion values.
#[derive(Debug, Clone, Default)]
pub struct LatestValues {
    values: Arc<RwLock<HashMap<Metric, SampleValue>>>,
}

impl LatestValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, metric: Metric) -> Option<SampleValue> {
        self.values.read().get(&metric).copied()
    }

    pub fn scalar(&self, metric: Metric) -> Option<MetricValue> {
        self.get(metric).and_then(|v| v.as_scalar())
    }

    pub fn set(&self, metric: Metric, value: SampleValue) {
        self.values.write().insert(metric, value);
    }
}

/// Acquisition and subscriber state of one metric group.
#[derive(Debug)]
pub struct MetricService {
    group: MetricGroup,
    source: Box<dyn AcquisitionSource>,
    hubs: HashMap<Metric, Hub>,
    schedules: Schedules,
    batch_limit: usize,
    admin: Arc<AdminStatus>,
    latest: LatestValues,
    wake: Option<Timestamp>,
}

impl MetricService {
    pub fn new(
        source: Box<dyn AcquisitionSource>,
        batch_limit: usize,
        admin: Arc<AdminStatus>,
        latest: LatestValues,
    ) -> Self {
        let group = source.group();
        info!(%group, source = source.description(), "metric service created");
        Self {
            group,
            source,
            hubs: HashMap::new(),
            schedules: Schedules::new(),
            batch_limit,
            admin,
            latest,
            wake: None,
        }
    }

    pub fn group(&self) -> MetricGroup {
        self.group
    }

    /// When the group next wants a reading, `None` while dormant.
    pub fn next_wake(&self) -> Option<Timestamp> {
        self.wake
    }

    pub fn hub(&self, metric: Metric) -> Option<&Hub> {
        self.hubs.get(&metric)
    }

    pub fn hub_count(&self) -> usize {
        self.hubs.len()
    }

    pub fn schedules(&self) -> &Schedules {
        &self.schedules
    }

    /// Hub of `metric`, created on first use.
    fn hub_mut(&mut self, metric: Metric) -> Option<&mut Hub> {
        let kind = metric.kind()?;
        let batch_limit = self.batch_limit;
        let admin = &self.admin;
        Some(self.hubs.entry(metric).or_insert_with(|| {
            admin.set_active(Target::Metric(metric));
            match kind {
                MetricKind::Coordinate => Hub::Coord(CoordValNode::new(
                    metric,
                    batch_limit,
                    Box::new(LocalProximity::new()),
                )),
                _ => Hub::Value(ValueNode::new(metric, batch_limit)),
            }
        }))
    }

    /// Add a periodic or opportunistic monitor.
    #[allow(clippy::too_many_arguments)]
    pub fn register(
        &mut self,
        metric: Metric,
        monitor: MonitorId,
        period: Millis,
        duration: Millis,
        opportunistic: bool,
        callback: Callback,
        now: Timestamp,
    ) {
        let mut schedules = std::mem::take(&mut self.schedules);
        if let Some(hub) = self.hub_mut(metric) {
            if opportunistic {
                hub.insert_opportunistic(monitor, period, callback, duration, now);
            } else {
                let key = hub.insert_timed(monitor, period, callback, duration, now, &mut schedules);
                debug!(%metric, %monitor, period, key, "timer registered");
            }
            self.admin.set_active(Target::Monitor(monitor));
            self.admin.notify_change(self.group);
        }
        self.schedules = schedules;
        self.reschedule(now);
    }

    /// Remove a periodic or opportunistic monitor; its pending batch is
    /// flushed into `outbox`.
    pub fn unregister(
        &mut self,
        metric: Metric,
        monitor: MonitorId,
        now: Timestamp,
        outbox: &mut Outbox,
    ) -> bool {
        let removed = match self.hubs.get_mut(&metric) {
            Some(hub) => hub.remove_timer(monitor, &mut self.schedules, outbox),
            None => false,
        };
        if removed {
            self.admin.set_inactive(Target::Monitor(monitor));
            self.admin.notify_change(self.group);
        } else {
            debug!(%metric, %monitor, "unregister of unknown monitor");
        }
        self.reap();
        self.reschedule(now);
        removed
    }

    pub fn insert_threshold(
        &mut self,
        metric: Metric,
        bound: Bound,
        threshold: MetricValue,
        period: Millis,
        owner: ConditionRef,
        now: Timestamp,
    ) {
        match self.hub_mut(metric) {
            Some(Hub::Value(node)) => {
                node.insert_threshold(bound, owner.tree, threshold, period, owner);
            }
            _ => info!(%metric, %owner, "threshold on a metric without scalar hub ignored"),
        }
        self.reap();
        self.reschedule(now);
    }

    pub fn remove_threshold(
        &mut self,
        metric: Metric,
        bound: Bound,
        owner: ConditionRef,
        now: Timestamp,
    ) -> bool {
        let removed = match self.hubs.get_mut(&metric) {
            Some(Hub::Value(node)) => node.remove_threshold(owner, bound),
            _ => false,
        };
        self.reap();
        self.reschedule(now);
        removed
    }

    pub fn insert_fence(
        &mut self,
        metric: Metric,
        fence: Fence,
        period: Millis,
        owner: ConditionRef,
        now: Timestamp,
    ) {
        match self.hub_mut(metric) {
            Some(Hub::Coord(node)) => node.insert_fence(fence, period, owner),
            _ => info!(%metric, %owner, "fence on a metric without coordinate hub ignored"),
        }
        self.reap();
        self.reschedule(now);
    }

    pub fn remove_fence(
        &mut self,
        metric: Metric,
        proximity: Proximity,
        owner: ConditionRef,
        now: Timestamp,
    ) -> bool {
        let removed = match self.hubs.get_mut(&metric) {
            Some(Hub::Coord(node)) => node.remove_fence(owner, proximity),
            _ => false,
        };
        self.reap();
        self.reschedule(now);
        removed
    }

    /// Feed fresh readings to the hubs.
    ///
    /// Every reading updates the latest-value map, whether or not anyone is
    /// subscribed to its metric.
    pub fn update(&mut self, readings: Vec<(Metric, SampleValue)>, timestamp: Timestamp) -> Outbox {
        let mut outbox = Outbox::default();
        for (metric, value) in readings {
            if metric.group() != Some(self.group) {
                debug!(%metric, group = %self.group, "reading for foreign group dropped");
                continue;
            }
            self.latest.set(metric, value);
            self.admin.set_value(metric, value);
            if let Some(hub) = self.hubs.get_mut(&metric) {
                hub.update_value(
                    value,
                    timestamp,
                    &mut self.schedules,
                    &self.admin,
                    &mut outbox,
                );
            }
        }
        if !outbox.evicted.is_empty() {
            self.admin.notify_change(self.group);
        }
        self.reap();
        self.reschedule(timestamp);
        outbox
    }

    /// Poll the source and feed what it returns.
    pub fn acquire(&mut self, now: Timestamp) -> Outbox {
        let readings = self.source.sample(now);
        let outbox = self.update(readings, now);
        if self.wake.is_some_and(|wake| wake <= now) {
            debug!(group = %self.group, "source left due monitors unserved");
            self.wake = Some(now + IDLE_RETRY_MS);
        }
        outbox
    }

    /// Recompute the next wake from every hub.
    pub fn reschedule(&mut self, now: Timestamp) {
        let delay = self.hubs.values().filter_map(|hub| hub.min_period(now)).min();
        self.wake = delay.map(|delay| now + delay);
        self.admin.set_period(self.group, delay);
    }

    /// Drop hubs that have no subscribers left.
    fn reap(&mut self) {
        let admin = &self.admin;
        self.hubs.retain(|metric, hub| {
            let keep = !hub.is_empty();
            if !keep {
                debug!(%metric, "hub reaped");
                admin.set_inactive(Target::Metric(*metric));
            }
            keep
        });
    }

    /// Flush every pending batch, for shutdown.
    pub fn flush_all(&mut self, outbox: &mut Outbox) {
        for hub in self.hubs.values_mut() {
            hub.feed_mut().flush_all(outbox);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::NodeId;
    use crate::hub::Watch;
    use crate::source::ScriptedSource;
    use sensewatch_sdk::{ChannelClosed, Delivery};
    use sensewatch_types::Coordinate;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Callback, Arc<AtomicUsize>) {
        let seen = Arc::new(AtomicUsize::new(0));
        let count = seen.clone();
        let callback: Callback = Arc::new(move |_: &Delivery| {
            count.fetch_add(1, Ordering::Relaxed);
            Ok(())
        });
        (callback, seen)
    }

    fn service(group: MetricGroup) -> (MetricService, ScriptedSource, Arc<AdminStatus>) {
        let source = ScriptedSource::new(group);
        let admin = Arc::new(AdminStatus::new());
        let service = MetricService::new(
            Box::new(source.clone()),
            1_000,
            admin.clone(),
            LatestValues::new(),
        );
        (service, source, admin)
    }

    fn owner(tree: u64) -> ConditionRef {
        ConditionRef {
            tree: MonitorId(tree),
            node: NodeId(0),
        }
    }

    #[test]
    fn dormant_until_registration() {
        let (mut service, _, admin) = service(MetricGroup::Battery);
        assert_eq!(service.next_wake(), None);

        let (callback, _) = counter();
        service.register(
            Metric::BATTERY_PERCENT,
            MonitorId(1),
            1_000,
            0,
            false,
            callback,
            0,
        );
        assert_eq!(service.next_wake(), Some(1_000));
        assert_eq!(admin.group(MetricGroup::Battery).period_ms, Some(1_000));
        assert!(admin.is_active(Target::Monitor(MonitorId(1))));
        assert!(admin.is_active(Target::Metric(Metric::BATTERY_PERCENT)));
    }

    #[test]
    fn scenario_a_service_level() {
        let (mut service, source, _) = service(MetricGroup::Battery);
        let (callback, seen) = counter();
        service.register(
            Metric::BATTERY_PERCENT,
            MonitorId(1),
            1_000,
            5_000,
            false,
            callback,
            0,
        );

        let mut now = 0;
        let mut batches = Vec::new();
        while let Some(wake) = service.next_wake() {
            now = wake;
            source.push_value(Metric::BATTERY_PERCENT, MetricValue::Byte(80));
            batches.extend(service.acquire(now).batches);
            assert!(now <= 10_000, "service never went dormant");
        }

        assert_eq!(seen.load(Ordering::Relaxed), 5);
        assert_eq!(now, 5_000);
        assert_eq!(service.hub_count(), 0);
        assert!(service.schedules().is_empty());
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 5);
    }

    #[test]
    fn unregister_flushes_and_reaps() {
        let (mut service, _, admin) = service(MetricGroup::Cpu);
        let (callback, _) = counter();
        service.register(Metric::CPU_USAGE, MonitorId(4), 500, 0, false, callback, 0);
        let outbox = service.update(vec![(Metric::CPU_USAGE, MetricValue::Byte(20).into())], 500);
        assert!(outbox.batches.is_empty());

        let mut outbox = Outbox::default();
        assert!(service.unregister(Metric::CPU_USAGE, MonitorId(4), 600, &mut outbox));
        assert_eq!(outbox.batches.len(), 1);
        assert_eq!(service.hub_count(), 0);
        assert_eq!(service.next_wake(), None);
        assert!(!admin.is_active(Target::Monitor(MonitorId(4))));
        assert!(!admin.is_active(Target::Metric(Metric::CPU_USAGE)));

        let mut outbox = Outbox::default();
        assert!(!service.unregister(Metric::CPU_USAGE, MonitorId(4), 700, &mut outbox));
    }

    #[test]
    fn thresholds_keep_group_awake_and_report_crossings() {
        let (mut service, _, _) = service(MetricGroup::Battery);
        service.insert_threshold(
            Metric::BATTERY_PERCENT,
            Bound::Min,
            MetricValue::Byte(20),
            2_000,
            owner(7),
            0,
        );
        assert_eq!(service.next_wake(), Some(2_000));

        let outbox = service.update(
            vec![(Metric::BATTERY_PERCENT, MetricValue::Byte(50).into())],
            2_000,
        );
        assert!(outbox.crossings.is_empty());

        let outbox = service.update(
            vec![(Metric::BATTERY_PERCENT, MetricValue::Byte(20).into())],
            4_000,
        );
        assert_eq!(outbox.crossings.len(), 1);
        assert_eq!(outbox.crossings[0].owner, owner(7));
        assert_eq!(outbox.crossings[0].watch, Watch::Threshold(Bound::Min));
        assert_eq!(service.hub_count(), 0);
        assert_eq!(service.next_wake(), None);
    }

    #[test]
    fn threshold_on_coordinate_metric_is_ignored() {
        let (mut service, _, _) = service(MetricGroup::Location);
        service.insert_threshold(
            Metric::COORDINATES,
            Bound::Max,
            MetricValue::Byte(1),
            1_000,
            owner(1),
            0,
        );
        assert_eq!(service.hub_count(), 0);
        assert_eq!(service.next_wake(), None);
    }

    #[test]
    fn fences_are_served_by_coordinate_hub() {
        let (mut service, _, _) = service(MetricGroup::Location);
        let center = Coordinate::new(10.0, 10.0);
        service.insert_fence(
            Metric::COORDINATES,
            Fence {
                center,
                radius_m: 100.0,
                proximity: Proximity::Enter,
            },
            1_000,
            owner(2),
            0,
        );
        assert_eq!(service.next_wake(), Some(1_000));

        let outbox = service.update(vec![(Metric::COORDINATES, center.into())], 1_000);
        assert_eq!(outbox.crossings.len(), 1);
        assert_eq!(outbox.crossings[0].watch, Watch::Fence(Proximity::Enter));
        assert_eq!(service.hub_count(), 0);
    }

    #[test]
    fn latest_values_track_unsubscribed_metrics() {
        let (mut service, _, admin) = service(MetricGroup::Memory);
        let latest = service.latest.clone();
        service.update(
            vec![
                (Metric::MEMORY_AVAIL, MetricValue::Long(1_024).into()),
                (Metric::CPU_USAGE, MetricValue::Byte(3).into()),
            ],
            10,
        );
        assert_eq!(latest.scalar(Metric::MEMORY_AVAIL), Some(MetricValue::Long(1_024)));
        assert_eq!(latest.get(Metric::CPU_USAGE), None);
        assert!(admin.value(Metric::MEMORY_AVAIL).is_some());
    }

    #[test]
    fn dead_listener_is_evicted_and_counted() {
        let (mut service, _, admin) = service(MetricGroup::Cpu);
        let dead: Callback = Arc::new(|_: &Delivery| Err(ChannelClosed));
        service.register(Metric::CPU_USAGE, MonitorId(9), 100, 0, false, dead, 0);
        let before = admin.group(MetricGroup::Cpu).changes;

        let outbox = service.update(vec![(Metric::CPU_USAGE, MetricValue::Byte(1).into())], 100);
        assert_eq!(outbox.evicted, vec![MonitorId(9)]);
        assert_eq!(service.hub_count(), 0);
        assert!(admin.group(MetricGroup::Cpu).changes > before);
    }

    #[test]
    fn empty_source_backs_off() {
        let (mut service, _, _) = service(MetricGroup::Cpu);
        let (callback, seen) = counter();
        service.register(Metric::CPU_USAGE, MonitorId(1), 1_000, 0, false, callback, 0);

        service.acquire(1_000);
        assert_eq!(seen.load(Ordering::Relaxed), 0);
        assert_eq!(service.next_wake(), Some(1_000 + IDLE_RETRY_MS));
    }
}
