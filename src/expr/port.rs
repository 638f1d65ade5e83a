//! What expression trees need from the metric side.

use sensewatch_sdk::Callback;
use sensewatch_types::{Metric, MetricValue, Millis, MonitorId};

use crate::hub::{Fence, Proximity};
use crate::schedule::Bound;

use super::ConditionRef;

/// Requests an expression tree makes against the metric services.
///
/// Every call is fire-and-forget. Inside the middleware the implementation
/// posts a command to the metric task; a metric whose group has no service
/// treats the request as a no-op.
pub trait ConditionPort {
    fn insert_threshold(
        &mut self,
        metric: Metric,
        bound: Bound,
        threshold: MetricValue,
        period: Millis,
        owner: ConditionRef,
    );

    fn remove_threshold(&mut self, metric: Metric, bound: Bound, owner: ConditionRef);

    fn insert_fence(&mut self, metric: Metric, fence: Fence, period: Millis, owner: ConditionRef);

    fn remove_fence(&mut self, metric: Metric, proximity: Proximity, owner: ConditionRef);

    /// Start the periodic feed of a conditional tree.
    fn start_periodic(
        &mut self,
        metric: Metric,
        monitor: MonitorId,
        period: Millis,
        duration: Millis,
        callback: Callback,
    );

    fn stop_periodic(&mut self, metric: Metric, monitor: MonitorId);
}

#[cfg(test)]
pub(crate) mod recording {
    use super::*;

    /// A port call, as recorded by [`RecordingPort`].
    #[derive(Debug, Clone, PartialEq)]
    pub enum PortCall {
        InsertThreshold(Metric, Bound, MetricValue, ConditionRef),
        RemoveThreshold(Metric, Bound, ConditionRef),
        InsertFence(Metric, Fence, ConditionRef),
        RemoveFence(Metric, Proximity, ConditionRef),
        StartPeriodic(Metric, MonitorId),
        StopPeriodic(Metric, MonitorId),
    }

    /// Port that records calls for assertions.
    #[derive(Debug, Default)]
    pub struct RecordingPort {
        pub calls: Vec<PortCall>,
    }

    impl RecordingPort {
        pub fn take(&mut self) -> Vec<PortCall> {
            std::mem::take(&mut self.calls)
        }

        pub fn inserted_thresholds(&self) -> Vec<(Bound, MetricValue)> {
            self.calls
                .iter()
                .filter_map(|c| match c {
                    PortCall::InsertThreshold(_, bound, value, _) => Some((*bound, *value)),
                    _ => None,
                })
                .collect()
        }
    }

    impl ConditionPort for RecordingPort {
        fn insert_threshold(
            &mut self,
            metric: Metric,
            bound: Bound,
            threshold: MetricValue,
            _period: Millis,
            owner: ConditionRef,
        ) {
            self.calls
                .push(PortCall::InsertThreshold(metric, bound, threshold, owner));
        }

        fn remove_threshold(&mut self, metric: Metric, bound: Bound, owner: ConditionRef) {
            self.calls.push(PortCall::RemoveThreshold(metric, bound, owner));
        }

        fn insert_fence(&mut self, metric: Metric, fence: Fence, _period: Millis, owner: ConditionRef) {
            self.calls.push(PortCall::InsertFence(metric, fence, owner));
        }

        fn remove_fence(&mut self, metric: Metric, proximity: Proximity, owner: ConditionRef) {
            self.calls.push(PortCall::RemoveFence(metric, proximity, owner));
        }

        fn start_periodic(
            &mut self,
            metric: Metric,
            monitor: MonitorId,
            _period: Millis,
            _duration: Millis,
            _callback: Callback,
        ) {
            self.calls.push(PortCall::StartPeriodic(metric, monitor));
        }

        fn stop_periodic(&mut self, metric: Metric, monitor: MonitorId) {
            self.calls.push(PortCall::StopPeriodic(metric, monitor));
        }
    }
}
