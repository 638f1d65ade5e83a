//! The event task: owns every registered condition tree.

use std::collections::HashMap;
use std::sync::Arc;

use sensewatch_sdk::{AdminStatus, Callback, Target};
use sensewatch_types::{Metric, MetricValue, Millis, MonitorId, Timestamp};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::expr::{ConditionPort, ConditionRef, ConditionTree, Disposition, RootSignal};
use crate::hub::{Crossing, Fence, Proximity};
use crate::schedule::Bound;

use super::clock::Clock;
use super::command::{EventCommand, MetricCommand};

/// Registered condition trees, keyed by monitor id.
#[derive(Debug, Default)]
pub struct EventList {
    trees: HashMap<MonitorId, ConditionTree>,
}

impl EventList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Activate `tree` and keep it. A tree with the same id is torn down
    /// first.
    pub fn insert(&mut self, mut tree: ConditionTree, port: &mut dyn ConditionPort) {
        let monitor = tree.monitor();
        if let Some(mut old) = self.trees.remove(&monitor) {
            warn!(%monitor, "replacing registered condition tree");
            old.remove_event(port);
        }
        tree.activate(port);
        self.trees.insert(monitor, tree);
    }

    /// Tear down and forget a tree.
    pub fn remove(&mut self, monitor: MonitorId, port: &mut dyn ConditionPort) -> bool {
        match self.trees.remove(&monitor) {
            Some(mut tree) => {
                tree.remove_event(port);
                true
            }
            None => false,
        }
    }

    /// Route a crossing to its tree and act on the root's change.
    ///
    /// Returns the id of a tree that finished and was dropped.
    pub fn on_crossing(
        &mut self,
        crossing: Crossing,
        port: &mut dyn ConditionPort,
        now: Timestamp,
    ) -> Option<MonitorId> {
        let monitor = crossing.owner.tree;
        let Some(tree) = self.trees.get_mut(&monitor) else {
            warn!(owner = %crossing.owner, "crossing for unknown tree");
            return None;
        };

        let disposition = match tree.on_crossing(crossing, port)? {
            RootSignal::Trigger => {
                debug!(%monitor, "condition tree triggered");
                tree.trigger(port, now)
            }
            RootSignal::Untrigger => {
                debug!(%monitor, "condition tree untriggered");
                tree.untrigger(port)
            }
        };

        match disposition {
            Disposition::Keep => None,
            Disposition::Remove => {
                self.trees.remove(&monitor);
                Some(monitor)
            }
        }
    }

    pub fn get(&self, monitor: MonitorId) -> Option<&ConditionTree> {
        self.trees.get(&monitor)
    }

    pub fn contains(&self, monitor: MonitorId) -> bool {
        self.trees.contains_key(&monitor)
    }

    pub fn len(&self) -> usize {
        self.trees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trees.is_empty()
    }
}

/// [`ConditionPort`] that posts every request to the metric task.
#[derive(Debug, Clone)]
pub(crate) struct MetricPort {
    tx: mpsc::UnboundedSender<MetricCommand>,
}

impl MetricPort {
    pub fn new(tx: mpsc::UnboundedSender<MetricCommand>) -> Self {
        Self { tx }
    }

    fn post(&self, command: MetricCommand) {
        let name = command.name();
        if self.tx.send(command).is_err() {
            debug!(command = name, "metric task gone, request dropped");
        }
    }
}

impl ConditionPort for MetricPort {
    fn insert_threshold(
        &mut self,
        metric: Metric,
        bound: Bound,
        threshold: MetricValue,
        period: Millis,
        owner: ConditionRef,
    ) {
        self.post(MetricCommand::InsertThreshold {
            metric,
            bound,
            threshold,
            period,
            owner,
        });
    }

    fn remove_threshold(&mut self, metric: Metric, bound: Bound, owner: ConditionRef) {
        self.post(MetricCommand::RemoveThreshold {
            metric,
            bound,
            owner,
        });
    }

    fn insert_fence(&mut self, metric: Metric, fence: Fence, period: Millis, owner: ConditionRef) {
        self.post(MetricCommand::InsertFence {
            metric,
            fence,
            period,
            owner,
        });
    }

    fn remove_fence(&mut self, metric: Metric, proximity: Proximity, owner: ConditionRef) {
        self.post(MetricCommand::RemoveFence {
            metric,
            proximity,
            owner,
        });
    }

    fn start_periodic(
        &mut self,
        metric: Metric,
        monitor: MonitorId,
        period: Millis,
        duration: Millis,
        callback: Callback,
    ) {
        self.post(MetricCommand::Register {
            metric,
            monitor,
            period,
            duration,
            opportunistic: false,
            callback,
        });
    }

    fn stop_periodic(&mut self, metric: Metric, monitor: MonitorId) {
        self.post(MetricCommand::Unregister { metric, monitor });
    }
}

/// Single consumer of [`EventCommand`]s.
pub(crate) struct EventTask {
    list: EventList,
    port: MetricPort,
    rx: mpsc::UnboundedReceiver<EventCommand>,
    admin: Arc<AdminStatus>,
    clock: Clock,
}

impl EventTask {
    pub fn new(
        port: MetricPort,
        rx: mpsc::UnboundedReceiver<EventCommand>,
        admin: Arc<AdminStatus>,
        clock: Clock,
    ) -> Self {
        Self {
            list: EventList::new(),
            port,
            rx,
            admin,
            clock,
        }
    }

    pub async fn run(mut self, mut stop: watch::Receiver<bool>) {
        info!("event task starting");

        loop {
            tokio::select! {
                biased;

                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }

                command = self.rx.recv() => match command {
                    Some(command) => self.handle(command),
                    None => break,
                },
            }
        }

        info!(trees = self.list.len(), "event task stopped");
    }

    fn handle(&mut self, command: EventCommand) {
        match command {
            EventCommand::Add(tree) => {
                debug!(monitor = %tree.monitor(), leaves = tree.leaf_count(), "condition tree added");
                self.list.insert(tree, &mut self.port);
            }
            EventCommand::Remove(monitor) => {
                if self.list.remove(monitor, &mut self.port) {
                    self.admin.set_inactive(Target::Monitor(monitor));
                } else {
                    debug!(%monitor, "removal of unknown condition tree");
                }
            }
            EventCommand::Crossing(crossing) => {
                let now = self.clock.now();
                if let Some(done) = self.list.on_crossing(crossing, &mut self.port, now) {
                    self.admin.set_inactive(Target::Monitor(done));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::builder::{and_with, condition};
    use crate::expr::{ConditionKind, Flavor, NodeId};
    use sensewatch_sdk::{ChannelNotifier, NotifyHandle};

    fn tree(expr: &str, monitor: u64, notifier: NotifyHandle) -> ConditionTree {
        ConditionTree::construct(
            expr,
            MonitorId(monitor),
            1_000,
            0,
            Flavor::Event { notifier },
            |_| None,
        )
        .unwrap()
    }

    fn port() -> (MetricPort, mpsc::UnboundedReceiver<MetricCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (MetricPort::new(tx), rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<MetricCommand>) -> Vec<&'static str> {
        let mut names = Vec::new();
        while let Ok(command) = rx.try_recv() {
            names.push(command.name());
        }
        names
    }

    #[test]
    fn insert_arms_every_leaf() {
        let (mut port, mut rx) = port();
        let (notifier, _) = ChannelNotifier::pair();
        let expr = and_with(
            &condition(ConditionKind::MaxThresh, Metric::CPU_USAGE, 80),
            &condition(ConditionKind::MinThresh, Metric::BATTERY_PERCENT, 20),
        );

        let mut list = EventList::new();
        list.insert(tree(&expr, 1, notifier), &mut port);
        assert!(list.contains(MonitorId(1)));
        assert_eq!(drain(&mut rx), vec!["insert_threshold", "insert_threshold"]);
    }

    #[test]
    fn event_fires_once_and_is_dropped() {
        let (mut port, mut rx) = port();
        let (notifier, mut notices) = ChannelNotifier::pair();
        let expr = condition(ConditionKind::MaxThresh, Metric::CPU_USAGE, 80);

        let mut list = EventList::new();
        list.insert(tree(&expr, 3, notifier), &mut port);
        drain(&mut rx);

        let leaf = list.get(MonitorId(3)).unwrap().root();
        let crossing = Crossing::threshold(
            ConditionRef {
                tree: MonitorId(3),
                node: leaf,
            },
            Bound::Max,
            MetricValue::Byte(80),
        );
        assert_eq!(list.on_crossing(crossing, &mut port, 42), Some(MonitorId(3)));
        assert!(list.is_empty());

        let notice = notices.try_recv().unwrap();
        assert_eq!(notice.monitor, MonitorId(3));
        assert_eq!(notice.timestamp_ms, 42);
        assert!(notices.try_recv().is_err());

        assert_eq!(list.on_crossing(crossing, &mut port, 43), None);
    }

    #[test]
    fn remove_disarms_both_sides() {
        let (mut port, mut rx) = port();
        let (notifier, _) = ChannelNotifier::pair();
        let expr = condition(ConditionKind::MinThresh, Metric::BATTERY_PERCENT, 15);

        let mut list = EventList::new();
        list.insert(tree(&expr, 5, notifier), &mut port);
        drain(&mut rx);

        assert!(list.remove(MonitorId(5), &mut port));
        assert_eq!(drain(&mut rx), vec!["remove_threshold", "remove_threshold"]);
        assert!(!list.remove(MonitorId(5), &mut port));
    }

    #[test]
    fn unknown_tree_is_ignored() {
        let (mut port, mut rx) = port();
        let mut list = EventList::new();
        let crossing = Crossing::threshold(
            ConditionRef {
                tree: MonitorId(99),
                node: NodeId(0),
            },
            Bound::Min,
            MetricValue::Byte(0),
        );
        assert_eq!(list.on_crossing(crossing, &mut port, 0), None);
        assert!(drain(&mut rx).is_empty());
    }
}
