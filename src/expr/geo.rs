//! Geofence condition leaves.

use sensewatch_types::{Coordinate, Metric, Millis};

use crate::hub::{Fence, Proximity};

use super::{ConditionKind, ConditionPort, ConditionRef};

/// Hysteresis margin applied to the anti-condition radius, in meters.
pub const FENCE_MARGIN_M: f64 = 50.0;

/// A position condition relative to a circle.
///
/// `MaxThresh` holds while inside the radius, `MinThresh` while outside.
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinateLeaf {
    pub condition: ConditionKind,
    pub metric: Metric,
    pub center: Coordinate,
    pub radius_m: f64,
}

impl CoordinateLeaf {
    /// Build a leaf; only `MaxThresh` and `MinThresh` make sense for a fence.
    pub fn new(
        condition: ConditionKind,
        metric: Metric,
        center: Coordinate,
        radius_m: f64,
    ) -> Option<Self> {
        matches!(
            condition,
            ConditionKind::MaxThresh | ConditionKind::MinThresh
        )
        .then_some(Self {
            condition,
            metric,
            center,
            radius_m,
        })
    }

    fn fence(&self, proximity: Proximity, radius_m: f64) -> Fence {
        Fence {
            center: self.center,
            radius_m,
            proximity,
        }
    }

    /// Fence that fires when the condition becomes true.
    pub fn primary(&self) -> Fence {
        match self.condition {
            ConditionKind::MinThresh => self.fence(Proximity::Exit, self.radius_m),
            _ => self.fence(Proximity::Enter, self.radius_m),
        }
    }

    /// Fence that fires when the condition ceases, widened by the margin.
    pub fn anti(&self) -> Fence {
        match self.condition {
            ConditionKind::MinThresh => {
                let shrunk = self.radius_m - FENCE_MARGIN_M;
                let radius = if shrunk > 0.0 {
                    shrunk
                } else {
                    self.radius_m / 2.0
                };
                self.fence(Proximity::Enter, radius)
            }
            _ => self.fence(Proximity::Exit, self.radius_m + FENCE_MARGIN_M),
        }
    }

    /// Whether a crossing of `proximity` is the fence armed for `state`.
    pub fn expects(&self, state: bool, proximity: Proximity) -> bool {
        let armed = if state { self.anti() } else { self.primary() };
        armed.proximity == proximity
    }

    pub fn arm_primary(&self, port: &mut dyn ConditionPort, period: Millis, owner: ConditionRef) {
        port.insert_fence(self.metric, self.primary(), period, owner);
    }

    pub fn on_trigger(&self, port: &mut dyn ConditionPort, period: Millis, owner: ConditionRef) {
        port.insert_fence(self.metric, self.anti(), period, owner);
    }

    pub fn disarm(&self, port: &mut dyn ConditionPort, owner: ConditionRef) {
        port.remove_fence(self.metric, Proximity::Enter, owner);
        port.remove_fence(self.metric, Proximity::Exit, owner);
    }
}
