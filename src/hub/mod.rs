//! Per-metric fan-in/fan-out hubs.
//!
//! A hub is the single authoritative state of one metric: the latest value
//! and everyone subscribed to it. Hubs never call into other domains
//! directly; anything that has to leave the metric task (crossed conditions,
//! batches to persist) is collected in an [`Outbox`].

mod coord;
mod feed;
mod value;

pub use coord::{CoordValNode, Fence, LocalProximity, Proximity, ProximityService};
pub use feed::{Feed, DEFAULT_BATCH_LIMIT};
pub use value::ValueNode;

use sensewatch_sdk::{AdminStatus, Callback};
use sensewatch_types::{Batch, Metric, MetricValue, Millis, MonitorId, SampleValue, Timestamp};
use tracing::warn;

use crate::expr::ConditionRef;
use crate::schedule::{Bound, Schedules};

/// What kind of watch was crossed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Watch {
    Threshold(Bound),
    Fence(Proximity),
}

/// A condition watch that fired and has been removed from its hub.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Crossing {
    pub owner: ConditionRef,
    pub watch: Watch,
    /// Level of a threshold watch; `None` for fences.
    pub level: Option<MetricValue>,
}

impl Crossing {
    pub fn threshold(owner: ConditionRef, bound: Bound, level: MetricValue) -> Self {
        Self {
            owner,
            watch: Watch::Threshold(bound),
            level: Some(level),
        }
    }

    pub fn fence(owner: ConditionRef, proximity: Proximity) -> Self {
        Self {
            owner,
            watch: Watch::Fence(proximity),
            level: None,
        }
    }
}

/// Side effects of a hub operation, to be posted to other tasks.
#[derive(Debug, Default)]
pub struct Outbox {
    pub crossings: Vec<Crossing>,
    pub batches: Vec<Batch>,
    pub evicted: Vec<MonitorId>,
}

impl Outbox {
    pub fn is_empty(&self) -> bool {
        self.crossings.is_empty() && self.batches.is_empty() && self.evicted.is_empty()
    }

    pub fn append(&mut self, other: &mut Outbox) {
        self.crossings.append(&mut other.crossings);
        self.batches.append(&mut other.batches);
        self.evicted.append(&mut other.evicted);
    }
}

/// A hub of either flavour.
#[derive(Debug)]
pub enum Hub {
    Value(ValueNode),
    Coord(CoordValNode),
}

impl Hub {
    pub fn feed_mut(&mut self) -> &mut Feed {
        match self {
            Hub::Value(node) => node.feed_mut(),
            Hub::Coord(node) => node.feed_mut(),
        }
    }

    /// Route a reading to the hub, ignoring values of the wrong shape.
    pub fn update_value(
        &mut self,
        value: SampleValue,
        timestamp: Timestamp,
        schedules: &mut Schedules,
        admin: &AdminStatus,
        outbox: &mut Outbox,
    ) -> Option<Millis> {
        match (self, value) {
            (Hub::Value(node), SampleValue::Scalar(v)) => {
                node.update_value(v, timestamp, schedules, admin, outbox)
            }
            (Hub::Coord(node), SampleValue::Coordinate(c)) => {
                node.update_value(c, timestamp, schedules, admin, outbox)
            }
            (hub, value) => {
                warn!(metric = %hub.metric(), %value, "reading does not match metric kind");
                hub.min_period(timestamp)
            }
        }
    }

    pub fn metric(&self) -> Metric {
        match self {
            Hub::Value(node) => node.metric(),
            Hub::Coord(node) => node.metric(),
        }
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
        self.feed_mut()
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
        self.feed_mut()
            .insert_opportunistic(monitor, period, callback, duration, now);
    }

    pub fn remove_timer(
        &mut self,
        monitor: MonitorId,
        schedules: &mut Schedules,
        outbox: &mut Outbox,
    ) -> bool {
        self.feed_mut().remove(monitor, schedules, outbox)
    }

    pub fn min_period(&self, now: Timestamp) -> Option<Millis> {
        match self {
            Hub::Value(node) => node.min_period(now),
            Hub::Coord(node) => node.min_period(now),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Hub::Value(node) => node.is_empty(),
            Hub::Coord(node) => node.is_empty(),
        }
    }
}
