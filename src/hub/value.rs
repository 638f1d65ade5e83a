//! Per-metric hub for scalar metrics.

use sensewatch_sdk::{AdminStatus, Callback};
use sensewatch_types::{Metric, MetricValue, Millis, MonitorId, Timestamp};

use crate::expr::ConditionRef;
use crate::schedule::{Bound, Schedules, ThresholdList};

use super::{Crossing, Feed, Outbox};

/// Live state of one scalar metric.
///
/// Every subscriber of the metric hangs off this node: periodic and
/// opportunistic monitors through its [`Feed`], condition leaves through the
/// max and min threshold lists.
#[derive(Debug)]
pub struct ValueNode {
    current: Option<MetricValue>,
    feed: Feed,
    max: ThresholdList,
    min: ThresholdList,
}

impl ValueNode {
    pub fn new(metric: Metric, batch_limit: usize) -> Self {
        Self {
            current: None,
            feed: Feed::new(metric, batch_limit),
            max: ThresholdList::new(Bound::Max),
            min: ThresholdList::new(Bound::Min),
        }
    }

    pub fn metric(&self) -> Metric {
        self.feed.metric()
    }

    pub fn current(&self) -> Option<MetricValue> {
        self.current
    }

    pub fn feed(&self) -> &Feed {
        &self.feed
    }

    pub fn feed_mut(&mut self) -> &mut Feed {
        &mut self.feed
    }

    pub fn thresholds(&self, bound: Bound) -> &ThresholdList {
        match bound {
            Bound::Max => &self.max,
            Bound::Min => &self.min,
        }
    }

    fn thresholds_mut(&mut self, bound: Bound) -> &mut ThresholdList {
        match bound {
            Bound::Max => &mut self.max,
            Bound::Min => &mut self.min,
        }
    }

    /// Take in a fresh reading.
    ///
    /// Opportunistic monitors are served first, then due periodic monitors,
    /// then max thresholds, then min thresholds. Crossed watches are removed
    /// and reported through `outbox`. Returns the delay until the next value
    /// is needed, or `None` when nothing is subscribed any more.
    pub fn update_value(
        &mut self,
        value: MetricValue,
        timestamp: Timestamp,
        schedules: &mut Schedules,
        admin: &AdminStatus,
        outbox: &mut Outbox,
    ) -> Option<Millis> {
        self.current = Some(value);

        self.feed
            .deliver(value.into(), timestamp, schedules, admin, outbox);

        for bound in [Bound::Max, Bound::Min] {
            let list = self.thresholds_mut(bound);
            while list.threshold_passed(&value) {
                let Some(node) = list.pop_head() else { break };
                outbox
                    .crossings
                    .push(Crossing::threshold(node.owner, bound, node.threshold));
            }
        }

        self.min_period(timestamp)
    }

    pub fn insert_timed(
        &mut self,
        monitor: MonitorId,
        period: Millis,
        callback: Callback,
        duration: Millis,
        now: Timestamp,
        schedules: &mut Schedules,
    ) -> Timestamp {
        self.feed
            .insert_timed(monitor, period, callback, duration, now, schedules)
    }

    pub fn insert_opportunistic(
        &mut self,
        monitor: MonitorId,
        period: Millis,
        callback: Callback,
        duration: Millis,
        now: Timestamp,
    ) {
        self.feed
            .insert_opportunistic(monitor, period, callback, duration, now);
    }

    pub fn insert_threshold(
        &mut self,
        bound: Bound,
        monitor: MonitorId,
        threshold: MetricValue,
        period: Millis,
        owner: ConditionRef,
    ) {
        self.thresholds_mut(bound)
            .insert(monitor, threshold, period, owner);
    }

    pub fn remove_timer(
        &mut self,
        monitor: MonitorId,
        schedules: &mut Schedules,
        outbox: &mut Outbox,
    ) -> bool {
        self.feed.remove(monitor, schedules, outbox)
    }

    pub fn remove_threshold(&mut self, owner: ConditionRef, bound: Bound) -> bool {
        self.thresholds_mut(bound).remove(owner).is_some()
    }

    /// Smallest delay demanded by any subscriber list.
    pub fn min_period(&self, now: Timestamp) -> Option<Millis> {
        [
            self.feed.min_period(now),
            self.max.min_period(),
            self.min.min_period(),
        ]
        .into_iter()
        .flatten()
        .min()
    }

    pub fn is_empty(&self) -> bool {
        self.feed.is_empty() && self.max.is_empty() && self.min.is_empty()
    }
}
