//! Messages exchanged between the scheduling domains.

use sensewatch_sdk::Callback;
use sensewatch_types::{
    Metric, MetricGroup, MetricValue, Millis, MonitorId, SampleValue, Timestamp,
};

use crate::expr::{ConditionRef, ConditionTree};
use crate::hub::{Crossing, Fence, Proximity};
use crate::schedule::Bound;

/// Work for the metric task.
pub enum MetricCommand {
    Register {
        metric: Metric,
        monitor: MonitorId,
        period: Millis,
        duration: Millis,
        opportunistic: bool,
        callback: Callback,
    },
    Unregister {
        metric: Metric,
        monitor: MonitorId,
    },
    InsertThreshold {
        metric: Metric,
        bound: Bound,
        threshold: MetricValue,
        period: Millis,
        owner: ConditionRef,
    },
    RemoveThreshold {
        metric: Metric,
        bound: Bound,
        owner: ConditionRef,
    },
    InsertFence {
        metric: Metric,
        fence: Fence,
        period: Millis,
        owner: ConditionRef,
    },
    RemoveFence {
        metric: Metric,
        proximity: Proximity,
        owner: ConditionRef,
    },
    /// Readings pushed by the host instead of polled from a source.
    Publish {
        group: MetricGroup,
        readings: Vec<(Metric, SampleValue)>,
        timestamp: Option<Timestamp>,
    },
}

impl MetricCommand {
    /// Short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            MetricCommand::Register { .. } => "register",
            MetricCommand::Unregister { .. } => "unregister",
            MetricCommand::InsertThreshold { .. } => "insert_threshold",
            MetricCommand::RemoveThreshold { .. } => "remove_threshold",
            MetricCommand::InsertFence { .. } => "insert_fence",
            MetricCommand::RemoveFence { .. } => "remove_fence",
            MetricCommand::Publish { .. } => "publish",
        }
    }
}

/// Work for the event task.
#[derive(Debug)]
pub enum EventCommand {
    /// Activate a freshly parsed tree.
    Add(ConditionTree),
    Remove(MonitorId),
    Crossing(Crossing),
}
