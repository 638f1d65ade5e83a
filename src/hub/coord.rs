//! Per-metric hub for geolocation.
//!
//! Coordinates have no total order, so instead of threshold lists the hub
//! keeps enter/exit fence tables and leaves crossing detection to a
//! [`ProximityService`].

use std::collections::HashMap;
use std::fmt::Debug;

use sensewatch_sdk::{AdminStatus, Callback};
use sensewatch_types::{Coordinate, Metric, Millis, MonitorId, Timestamp};

use crate::expr::ConditionRef;
use crate::schedule::Schedules;

use super::{Crossing, Feed, Outbox};

/// Direction of a fence crossing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Proximity {
    /// Fires once the position is within the radius.
    Enter,
    /// Fires once the position is at or beyond the radius.
    Exit,
}

impl Proximity {
    pub fn opposite(self) -> Self {
        match self {
            Proximity::Enter => Proximity::Exit,
            Proximity::Exit => Proximity::Enter,
        }
    }
}

/// A circular geofence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fence {
    pub center: Coordinate,
    pub radius_m: f64,
    pub proximity: Proximity,
}

impl Fence {
    pub fn is_crossed(&self, position: &Coordinate) -> bool {
        let distance = self.center.distance_m(position);
        match self.proximity {
            Proximity::Enter => distance <= self.radius_m,
            Proximity::Exit => distance >= self.radius_m,
        }
    }
}

/// Location service that watches fences on the hub's behalf.
///
/// An alert fires at most once: `check` returns it and forgets it.
pub trait ProximityService: Send + Debug {
    fn add_alert(&mut self, owner: ConditionRef, fence: Fence);

    fn remove_alert(&mut self, owner: ConditionRef, proximity: Proximity);

    /// Feed a fresh position and collect the alerts it fired.
    fn check(&mut self, position: &Coordinate) -> Vec<(ConditionRef, Proximity)>;
}

/// In-process proximity service using great-circle distance.
#[derive(Debug, Default)]
pub struct LocalProximity {
    alerts: Vec<(ConditionRef, Fence)>,
}

impl LocalProximity {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProximityService for LocalProximity {
    fn add_alert(&mut self, owner: ConditionRef, fence: Fence) {
        self.alerts.push((owner, fence));
    }

    fn remove_alert(&mut self, owner: ConditionRef, proximity: Proximity) {
        self.alerts
            .retain(|(o, fence)| !(*o == owner && fence.proximity == proximity));
    }

    fn check(&mut self, position: &Coordinate) -> Vec<(ConditionRef, Proximity)> {
        let mut fired = Vec::new();
        self.alerts.retain(|(owner, fence)| {
            if fence.is_crossed(position) {
                fired.push((*owner, fence.proximity));
                false
            } else {
                true
            }
        });
        fired
    }
}

/// Live state of the coordinate metric.
#[derive(Debug)]
pub struct CoordValNode {
    current: Option<Coordinate>,
    feed: Feed,
    /// Staleness bound of every registered fence, per direction.
    enter: HashMap<ConditionRef, Millis>,
    exit: HashMap<ConditionRef, Millis>,
    proximity: Box<dyn ProximityService>,
}

impl CoordValNode {
    pub fn new(metric: Metric, batch_limit: usize, proximity: Box<dyn ProximityService>) -> Self {
        Self {
            current: None,
            feed: Feed::new(metric, batch_limit),
            enter: HashMap::new(),
            exit: HashMap::new(),
            proximity,
        }
    }

    pub fn metric(&self) -> Metric {
        self.feed.metric()
    }

    pub fn current(&self) -> Option<Coordinate> {
        self.current
    }

    pub fn feed(&self) -> &Feed {
        &self.feed
    }

    pub fn feed_mut(&mut self) -> &mut Feed {
        &mut self.feed
    }

    fn table(&mut self, proximity: Proximity) -> &mut HashMap<ConditionRef, Millis> {
        match proximity {
            Proximity::Enter => &mut self.enter,
            Proximity::Exit => &mut self.exit,
        }
    }

    /// Take in a fresh position; same contract as
    /// [`ValueNode::update_value`](super::ValueNode::update_value).
    pub fn update_value(
        &mut self,
        position: Coordinate,
        timestamp: Timestamp,
        schedules: &mut Schedules,
        admin: &AdminStatus,
        outbox: &mut Outbox,
    ) -> Option<Millis> {
        self.current = Some(position);

        self.feed
            .deliver(position.into(), timestamp, schedules, admin, outbox);

        for (owner, proximity) in self.proximity.check(&position) {
            if self.table(proximity).remove(&owner).is_some() {
                outbox.crossings.push(Crossing::fence(owner, proximity));
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

    /// Register a fence on behalf of `owner`.
    ///
    /// A second fence in the same direction for the same owner replaces the
    /// first.
    pub fn insert_fence(&mut self, fence: Fence, period: Millis, owner: ConditionRef) {
        if self.table(fence.proximity).insert(owner, period).is_some() {
            self.proximity.remove_alert(owner, fence.proximity);
        }
        self.proximity.add_alert(owner, fence);
    }

    pub fn remove_timer(
        &mut self,
        monitor: MonitorId,
        schedules: &mut Schedules,
        outbox: &mut Outbox,
    ) -> bool {
        self.feed.remove(monitor, schedules, outbox)
    }

    pub fn remove_fence(&mut self, owner: ConditionRef, proximity: Proximity) -> bool {
        let found = self.table(proximity).remove(&owner).is_some();
        if found {
            self.proximity.remove_alert(owner, proximity);
        }
        found
    }

    pub fn fence_count(&self, proximity: Proximity) -> usize {
        match proximity {
            Proximity::Enter => self.enter.len(),
            Proximity::Exit => self.exit.len(),
        }
    }

    pub fn min_period(&self, now: Timestamp) -> Option<Millis> {
        let fences = self.enter.values().chain(self.exit.values()).copied().min();
        [self.feed.min_period(now), fences].into_iter().flatten().min()
    }

    pub fn is_empty(&self) -> bool {
        self.feed.is_empty() && self.enter.is_empty() && self.exit.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::NodeId;
    use sensewatch_sdk::Delivery;
    use std::sync::Arc;

    const CENTER: Coordinate = Coordinate {
        lat: 51.5007,
        lon: -0.1246,
    };

    fn owner(n: usize) -> ConditionRef {
        ConditionRef {
            tree: MonitorId(42),
            node: NodeId(n),
        }
    }

    /// Roughly `meters` north of the centre.
    fn north(meters: f64) -> Coordinate {
        Coordinate {
            lat: CENTER.lat + meters / 111_195.0,
            lon: CENTER.lon,
        }
    }

    fn hub() -> CoordValNode {
        CoordValNode::new(Metric::COORDINATES, 1_000, Box::new(LocalProximity::new()))
    }

    #[test]
    fn fence_edges_count_as_crossed() {
        let enter = Fence {
            center: CENTER,
            radius_m: 100.0,
            proximity: Proximity::Enter,
        };
        assert!(enter.is_crossed(&CENTER));
        assert!(enter.is_crossed(&north(99.0)));
        assert!(!enter.is_crossed(&north(101.0)));

        let exit = Fence {
            proximity: Proximity::Exit,
            ..enter
        };
        assert!(exit.is_crossed(&north(101.0)));
        assert!(!exit.is_crossed(&north(99.0)));
    }

    #[test]
    fn exit_fence_fires_once() {
        let mut hub = hub();
        let mut schedules = Schedules::new();
        let admin = AdminStatus::new();
        let mut outbox = Outbox::default();

        let fence = Fence {
            center: CENTER,
            radius_m: 200.0,
            proximity: Proximity::Exit,
        };
        hub.insert_fence(fence, 5_000, owner(0));
        assert_eq!(hub.min_period(0), Some(5_000));

        hub.update_value(north(50.0), 0, &mut schedules, &admin, &mut outbox);
        assert!(outbox.crossings.is_empty());

        hub.update_value(north(500.0), 1_000, &mut schedules, &admin, &mut outbox);
        hub.update_value(north(600.0), 2_000, &mut schedules, &admin, &mut outbox);
        assert_eq!(
            outbox.crossings,
            vec![Crossing::fence(owner(0), Proximity::Exit)]
        );
        assert!(hub.is_empty());
    }

    #[test]
    fn removed_fence_never_fires() {
        let mut hub = hub();
        let mut schedules = Schedules::new();
        let admin = AdminStatus::new();
        let mut outbox = Outbox::default();

        let fence = Fence {
            center: CENTER,
            radius_m: 200.0,
            proximity: Proximity::Enter,
        };
        hub.insert_fence(fence, 1_000, owner(3));
        assert!(hub.remove_fence(owner(3), Proximity::Enter));
        assert!(!hub.remove_fence(owner(3), Proximity::Enter));

        hub.update_value(CENTER, 0, &mut schedules, &admin, &mut outbox);
        assert!(outbox.crossings.is_empty());
    }

    #[test]
    fn positions_reach_periodic_monitors() {
        let mut hub = hub();
        let mut schedules = Schedules::new();
        let admin = AdminStatus::new();
        let mut outbox = Outbox::default();

        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = seen.clone();
        let callback: Callback = Arc::new(move |d: &Delivery| {
            sink.lock().push(d.value);
            Ok(())
        });
        hub.insert_timed(MonitorId(1), 1_000, callback, 0, 0, &mut schedules);

        hub.update_value(north(10.0), 1_000, &mut schedules, &admin, &mut outbox);
        assert_eq!(seen.lock().len(), 1);
        assert_eq!(seen.lock()[0].as_coordinate(), Some(north(10.0)));
        assert_eq!(hub.current(), Some(north(10.0)));
    }
}
