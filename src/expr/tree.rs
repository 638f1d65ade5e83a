//! Condition trees: one registered expression and its root action.

use std::fmt;

use sensewatch_sdk::{Callback, NotifyHandle};
use sensewatch_types::{EventNotice, Metric, MetricValue, Millis, MonitorId, Timestamp};
use tracing::{debug, warn};

use crate::error::ParseError;
use crate::hub::{Crossing, Watch};

use super::parser::{self, Parsed};
use super::{ConditionPort, ConditionRef, ExprKind, ExprNode, NodeId};

/// What happens when the whole expression becomes true.
#[derive(Clone)]
pub enum Flavor {
    /// Notify once, then tear the tree down.
    Event { notifier: NotifyHandle },
    /// Feed `metric` periodically for as long as the expression holds.
    Conditional { metric: Metric, callback: Callback },
}

impl fmt::Debug for Flavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Flavor::Event { .. } => f.write_str("Event"),
            Flavor::Conditional { metric, .. } => write!(f, "Conditional({})", metric),
        }
    }
}

/// Change of the root's truth value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootSignal {
    Trigger,
    Untrigger,
}

/// Whether a tree stays registered after handling a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Keep,
    Remove,
}

/// A parsed, registered condition expression.
#[derive(Debug)]
pub struct ConditionTree {
    monitor: MonitorId,
    period: Millis,
    duration: Millis,
    flavor: Flavor,
    nodes: Vec<ExprNode>,
    root: NodeId,
    triggered: bool,
    removed: bool,
}

impl ConditionTree {
    /// Parse `expr` into an inactive tree.
    ///
    /// `insertion` is asked for the current value of each metric a relative
    /// condition refers to.
    pub fn construct<F>(
        expr: &str,
        monitor: MonitorId,
        period: Millis,
        duration: Millis,
        flavor: Flavor,
        insertion: F,
    ) -> Result<Self, ParseError>
    where
        F: Fn(Metric) -> Option<MetricValue>,
    {
        let Parsed { nodes, root } = parser::parse(expr, insertion)?;
        Ok(Self {
            monitor,
            period,
            duration,
            flavor,
            nodes,
            root,
            triggered: false,
            removed: false,
        })
    }

    pub fn monitor(&self) -> MonitorId {
        self.monitor
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> Option<&ExprNode> {
        self.nodes.get(id.0)
    }

    pub fn flavor(&self) -> &Flavor {
        &self.flavor
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered
    }

    pub fn is_removed(&self) -> bool {
        self.removed
    }

    pub fn leaf_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_leaf()).count()
    }

    fn owner(&self, node: NodeId) -> ConditionRef {
        ConditionRef {
            tree: self.monitor,
            node,
        }
    }

    /// Activate every node and arm every leaf's primary watch.
    pub fn activate(&mut self, port: &mut dyn ConditionPort) {
        if self.removed {
            return;
        }
        for index in 0..self.nodes.len() {
            let owner = self.owner(NodeId(index));
            let node = &mut self.nodes[index];
            node.active = true;
            node.state = false;
            node.fired = None;
            match &mut node.kind {
                ExprKind::Condition(leaf) => leaf.arm_primary(port, self.period, owner),
                ExprKind::Coordinate(leaf) => leaf.arm_primary(port, self.period, owner),
                ExprKind::Combinator(comb) => comb.reset(),
            }
        }
        debug!(monitor = %self.monitor, leaves = self.leaf_count(), "condition tree active");
    }

    fn deactivate(&mut self, port: &mut dyn ConditionPort) {
        for index in 0..self.nodes.len() {
            let owner = self.owner(NodeId(index));
            let node = &mut self.nodes[index];
            if node.active {
                match &mut node.kind {
                    ExprKind::Condition(leaf) => leaf.disarm(port, owner),
                    ExprKind::Coordinate(leaf) => leaf.disarm(port, owner),
                    ExprKind::Combinator(comb) => comb.reset(),
                }
            }
            node.active = false;
            node.state = false;
            node.fired = None;
        }
    }

    /// Handle a watch of this tree firing.
    ///
    /// Flips the leaf, arms its next watch and climbs towards the root for as
    /// long as combinators flip. Returns the root's change, if any.
    ///
    /// A crossing of a watch the leaf no longer has armed (one that fired
    /// before its removal reached the metric task) is dropped.
    pub fn on_crossing(
        &mut self,
        crossing: Crossing,
        port: &mut dyn ConditionPort,
    ) -> Option<RootSignal> {
        let id = crossing.owner.node;
        let owner = self.owner(id);
        let period = self.period;
        let Some(node) = self.nodes.get_mut(id.0) else {
            warn!(%owner, "crossing for unknown node");
            return None;
        };
        if !node.active {
            debug!(%owner, "crossing for inactive node ignored");
            return None;
        }

        let triggered = !node.state;
        match (&node.kind, crossing.watch, crossing.level) {
            (ExprKind::Condition(leaf), Watch::Threshold(bound), Some(level)) => {
                if !leaf.expects(node.fired, bound, level) {
                    debug!(%owner, ?bound, %level, "crossing of disarmed watch ignored");
                    return None;
                }
                if triggered {
                    leaf.on_trigger(bound, port, period, owner);
                    node.fired = Some(bound);
                } else {
                    leaf.arm_primary(port, period, owner);
                    node.fired = None;
                }
            }
            (ExprKind::Coordinate(leaf), Watch::Fence(proximity), _) => {
                if !leaf.expects(node.state, proximity) {
                    debug!(%owner, ?proximity, "crossing of disarmed fence ignored");
                    return None;
                }
                if triggered {
                    leaf.on_trigger(port, period, owner);
                } else {
                    leaf.arm_primary(port, period, owner);
                }
            }
            (kind, watch, _) => {
                warn!(%owner, ?watch, "crossing does not match node {:?}", kind);
                return None;
            }
        }
        node.state = triggered;

        self.propagate(id, triggered)
    }

    fn propagate(&mut self, mut child: NodeId, mut triggered: bool) -> Option<RootSignal> {
        loop {
            let Some(parent) = self.nodes[child.0].parent else {
                return Some(if triggered {
                    RootSignal::Trigger
                } else {
                    RootSignal::Untrigger
                });
            };
            let node = &mut self.nodes[parent.0];
            let ExprKind::Combinator(comb) = &mut node.kind else {
                warn!(%parent, "parent is not a combinator");
                return None;
            };
            let flipped = comb.child_changed(child, triggered)?;
            node.state = flipped;
            child = parent;
            triggered = flipped;
        }
    }

    /// The root became true.
    pub fn trigger(&mut self, port: &mut dyn ConditionPort, now: Timestamp) -> Disposition {
        if self.removed {
            return Disposition::Remove;
        }
        match &self.flavor {
            Flavor::Event { notifier } => {
                let notice = EventNotice {
                    monitor: self.monitor,
                    timestamp_ms: now,
                };
                if notifier.notify(&notice).is_err() {
                    debug!(monitor = %self.monitor, "event client gone before notification");
                }
                self.triggered = true;
                self.remove_event(port);
                Disposition::Remove
            }
            Flavor::Conditional { metric, callback } => {
                if !self.triggered {
                    self.triggered = true;
                    port.start_periodic(
                        *metric,
                        self.monitor,
                        self.period,
                        self.duration,
                        callback.clone(),
                    );
                }
                Disposition::Keep
            }
        }
    }

    /// The root became false.
    pub fn untrigger(&mut self, port: &mut dyn ConditionPort) -> Disposition {
        if self.removed {
            return Disposition::Remove;
        }
        if let Flavor::Conditional { metric, .. } = &self.flavor {
            if self.triggered {
                port.stop_periodic(*metric, self.monitor);
            }
        }
        self.triggered = false;
        Disposition::Keep
    }

    /// Tear the tree down: disarm every watch and stop any running feed.
    ///
    /// Calling it again does nothing.
    pub fn remove_event(&mut self, port: &mut dyn ConditionPort) {
        if self.removed {
            return;
        }
        self.deactivate(port);
        if let Flavor::Conditional { metric, .. } = &self.flavor {
            if self.triggered {
                port.stop_periodic(*metric, self.monitor);
            }
        }
        self.triggered = false;
        self.removed = true;
        debug!(monitor = %self.monitor, "condition tree removed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::builder::{and_with, condition, or_with};
    use crate::expr::port::recording::{PortCall, RecordingPort};
    use crate::expr::ConditionKind;
    use crate::schedule::Bound;
    use sensewatch_sdk::ChannelNotifier;

    fn conditional(expr: &str) -> ConditionTree {
        let callback: Callback = std::sync::Arc::new(|_: &sensewatch_types::Delivery| Ok(()));
        ConditionTree::construct(
            expr,
            MonitorId(7),
            1_000,
            0,
            Flavor::Conditional {
                metric: Metric::BATTERY_PERCENT,
                callback,
            },
            |_| None,
        )
        .unwrap()
    }

    fn owner(node: usize) -> ConditionRef {
        ConditionRef {
            tree: MonitorId(7),
            node: NodeId(node),
        }
    }

    fn crossing(node: usize, bound: Bound, level: MetricValue) -> Crossing {
        Crossing::threshold(owner(node), bound, level)
    }

    #[test]
    fn activation_arms_every_leaf() {
        let mut tree = conditional("(AND:[4:CPU_LOAD1:125]:[4:MEMORY_AVAIL:2000000])");
        let mut port = RecordingPort::default();
        tree.activate(&mut port);
        assert_eq!(
            port.inserted_thresholds(),
            vec![
                (Bound::Max, MetricValue::Float(125.0)),
                (Bound::Max, MetricValue::Long(2_000_000))
            ]
        );
    }

    #[test]
    fn and_root_triggers_after_both_leaves() {
        let mut tree = conditional("(AND:[4:CPU_LOAD1:125]:[4:MEMORY_AVAIL:2000000])");
        let mut port = RecordingPort::default();
        tree.activate(&mut port);

        let cpu = crossing(0, Bound::Max, MetricValue::Float(125.0));
        assert_eq!(tree.on_crossing(cpu, &mut port), None);
        assert!(!tree.node(tree.root()).unwrap().state);
        assert_eq!(
            tree.on_crossing(crossing(1, Bound::Max, MetricValue::Long(2_000_000)), &mut port),
            Some(RootSignal::Trigger)
        );
        assert!(tree.node(tree.root()).unwrap().state);
    }

    #[test]
    fn hysteresis_round_trip() {
        let mut tree = conditional("[5:BATTERY_PERCENT:20]");
        let mut port = RecordingPort::default();
        tree.activate(&mut port);
        port.take();

        // Primary fires: anti-condition at 20 + 2
        assert_eq!(
            tree.on_crossing(crossing(0, Bound::Min, MetricValue::Byte(20)), &mut port),
            Some(RootSignal::Trigger)
        );
        assert_eq!(port.inserted_thresholds(), vec![(Bound::Max, MetricValue::Byte(22))]);
        port.take();

        // Anti fires: primary re-armed
        assert_eq!(
            tree.on_crossing(crossing(0, Bound::Max, MetricValue::Byte(22)), &mut port),
            Some(RootSignal::Untrigger)
        );
        assert_eq!(port.inserted_thresholds(), vec![(Bound::Min, MetricValue::Byte(20))]);
    }

    #[test]
    fn conditional_root_starts_and_stops_feed() {
        let mut tree = conditional("[4:CPU_USAGE:90]");
        let mut port = RecordingPort::default();
        tree.activate(&mut port);
        port.take();

        assert_eq!(tree.trigger(&mut port, 0), Disposition::Keep);
        assert_eq!(tree.trigger(&mut port, 0), Disposition::Keep);
        assert_eq!(
            port.take(),
            vec![PortCall::StartPeriodic(Metric::BATTERY_PERCENT, MonitorId(7))]
        );

        tree.untrigger(&mut port);
        assert_eq!(
            port.take(),
            vec![PortCall::StopPeriodic(Metric::BATTERY_PERCENT, MonitorId(7))]
        );
    }

    #[test]
    fn event_root_notifies_once_and_tears_down() {
        let (notifier, mut rx) = ChannelNotifier::pair();
        let mut tree = ConditionTree::construct(
            "[4:CPU_USAGE:90]",
            MonitorId(3),
            500,
            0,
            Flavor::Event { notifier },
            |_| None,
        )
        .unwrap();
        let mut port = RecordingPort::default();
        tree.activate(&mut port);

        assert_eq!(tree.trigger(&mut port, 1_234), Disposition::Remove);
        assert_eq!(
            rx.try_recv().unwrap(),
            EventNotice {
                monitor: MonitorId(3),
                timestamp_ms: 1_234
            }
        );
        assert!(tree.is_removed());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn remove_event_is_idempotent() {
        let mut tree = conditional("(OR:[4:CPU_USAGE:90]:[5:BATTERY_PERCENT:10])");
        let mut port = RecordingPort::default();
        tree.activate(&mut port);
        tree.trigger(&mut port, 0);
        port.take();

        tree.remove_event(&mut port);
        let calls = port.take();
        assert!(calls.contains(&PortCall::StopPeriodic(Metric::BATTERY_PERCENT, MonitorId(7))));
        assert_eq!(
            calls
                .iter()
                .filter(|c| matches!(c, PortCall::RemoveThreshold(..)))
                .count(),
            4
        );

        tree.remove_event(&mut port);
        assert!(port.calls.is_empty());
        let cpu = crossing(0, Bound::Max, MetricValue::Byte(90));
        assert_eq!(tree.on_crossing(cpu, &mut port), None);
    }

    #[test]
    fn stale_and_foreign_crossings_are_ignored() {
        let mut tree = conditional("[4:CPU_USAGE:90]");
        let mut port = RecordingPort::default();
        tree.activate(&mut port);
        port.take();

        let unknown = crossing(5, Bound::Max, MetricValue::Byte(90));
        assert_eq!(tree.on_crossing(unknown, &mut port), None);
        let fence = Crossing::fence(owner(0), crate::hub::Proximity::Enter);
        assert_eq!(tree.on_crossing(fence, &mut port), None);
        assert!(!tree.node(NodeId(0)).unwrap().state);
        assert!(port.calls.is_empty());
    }

    #[test]
    fn crossing_of_disarmed_watch_keeps_state() {
        // Change by 100 around 0 on battery voltage (oscillation 50)
        let mut tree = conditional("[1:BATTERY_VOLTAGE:100]");
        let mut port = RecordingPort::default();
        tree.activate(&mut port);
        port.take();

        let up = crossing(0, Bound::Max, MetricValue::Int(100));
        assert_eq!(tree.on_crossing(up, &mut port), Some(RootSignal::Trigger));
        port.take();

        // The lower primary fired before its removal reached the hub
        let late = crossing(0, Bound::Min, MetricValue::Int(-100));
        assert_eq!(tree.on_crossing(late, &mut port), None);
        assert!(tree.node(NodeId(0)).unwrap().state);
        assert!(port.calls.is_empty());

        // The anti-condition at 100 - 50 still clears it
        let back = crossing(0, Bound::Min, MetricValue::Int(50));
        assert_eq!(tree.on_crossing(back, &mut port), Some(RootSignal::Untrigger));
        assert_eq!(
            port.inserted_thresholds(),
            vec![
                (Bound::Min, MetricValue::Int(-100)),
                (Bound::Max, MetricValue::Int(100))
            ]
        );
    }

    #[test]
    fn fence_crossing_must_match_armed_side() {
        let mut tree = conditional("[4:COORDINATES:48.8584:2.2945:300]");
        let mut port = RecordingPort::default();
        tree.activate(&mut port);
        port.take();

        let exit = Crossing::fence(owner(0), crate::hub::Proximity::Exit);
        assert_eq!(tree.on_crossing(exit, &mut port), None);
        assert!(port.calls.is_empty());

        let enter = Crossing::fence(owner(0), crate::hub::Proximity::Enter);
        assert_eq!(tree.on_crossing(enter, &mut port), Some(RootSignal::Trigger));
        assert_eq!(tree.on_crossing(enter, &mut port), None);
        assert_eq!(tree.on_crossing(exit, &mut port), Some(RootSignal::Untrigger));
    }

    #[test]
    fn leaf_count_matches_built_expression() {
        let a = condition(ConditionKind::MaxThresh, Metric::CPU_LOAD1, 1.5);
        let b = condition(ConditionKind::MinThresh, Metric::BATTERY_PERCENT, 15);
        let c = condition(ConditionKind::Change, Metric::NET_RX_BYTES, 4096);
        let d = condition(ConditionKind::UpThresh, Metric::CPU_USAGE, 10);

        let expr = or_with(&and_with(&a, &b), &and_with(&c, &or_with(&d, &a)));
        let tree = conditional(&expr);
        assert_eq!(tree.leaf_count(), 5);
    }

    #[test]
    fn or_of_ands_propagates_through_levels() {
        // nodes: 0,1 -> AND 2; 3,4 -> AND 5; OR 6
        let expr = "(OR:(AND:[4:CPU_USAGE:90]:[4:CPU_LOAD1:2]):(AND:[5:BATTERY_PERCENT:10]:[4:SCREEN_ON:1]))";
        let mut tree = conditional(expr);
        let mut port = RecordingPort::default();
        tree.activate(&mut port);

        let usage_up = crossing(0, Bound::Max, MetricValue::Byte(90));
        let battery_down = crossing(3, Bound::Min, MetricValue::Byte(10));
        assert_eq!(tree.on_crossing(usage_up, &mut port), None);
        assert_eq!(tree.on_crossing(battery_down, &mut port), None);
        assert_eq!(
            tree.on_crossing(crossing(1, Bound::Max, MetricValue::Float(2.0)), &mut port),
            Some(RootSignal::Trigger)
        );
        // Second AND becoming true does not re-notify
        let screen_on = crossing(4, Bound::Max, MetricValue::Byte(1));
        assert_eq!(tree.on_crossing(screen_on, &mut port), None);
        // First AND drops (90 - 5): OR still true through the second
        let usage_down = crossing(0, Bound::Min, MetricValue::Byte(85));
        assert_eq!(tree.on_crossing(usage_down, &mut port), None);
        // Battery back above 10 + 2
        assert_eq!(
            tree.on_crossing(crossing(3, Bound::Max, MetricValue::Byte(12)), &mut port),
            Some(RootSignal::Untrigger)
        );
    }
}
