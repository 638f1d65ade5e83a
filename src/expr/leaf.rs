//! Scalar condition leaves.

use sensewatch_types::{Metric, MetricValue, Millis};

use crate::schedule::Bound;

use super::{ConditionKind, ConditionPort, ConditionRef};

/// A threshold or change condition on one scalar metric.
///
/// Offsets are taken relative to `insertion`, the metric's value when the
/// leaf was built. Once the condition holds, an anti-condition on the
/// opposite side, pulled back by the metric's oscillation offset, has to
/// fire before the primary watch is armed again.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionLeaf {
    pub condition: ConditionKind,
    pub metric: Metric,
    pub threshold: MetricValue,
    pub insertion: MetricValue,
    pub oscillation: MetricValue,
}

impl ConditionLeaf {
    pub fn new(
        condition: ConditionKind,
        metric: Metric,
        threshold: MetricValue,
        insertion: MetricValue,
    ) -> Self {
        let oscillation = metric.oscillation().unwrap_or(threshold - threshold);
        Self {
            condition,
            metric,
            threshold,
            insertion,
            oscillation,
        }
    }

    /// Watches that detect the condition becoming true.
    pub fn primary(&self) -> Vec<(Bound, MetricValue)> {
        let (ins, thr) = (self.insertion, self.threshold);
        match self.condition {
            ConditionKind::MinThresh => vec![(Bound::Min, thr)],
            ConditionKind::MaxThresh => vec![(Bound::Max, thr)],
            ConditionKind::UpThresh => vec![(Bound::Max, ins + thr)],
            ConditionKind::DownThresh => vec![(Bound::Min, ins - thr)],
            ConditionKind::Change => vec![(Bound::Min, ins - thr), (Bound::Max, ins + thr)],
        }
    }

    /// Watch that detects the condition ceasing after the primary on
    /// `fired` crossed.
    pub fn anti(&self, fired: Bound) -> (Bound, MetricValue) {
        let crossed = self
            .primary()
            .into_iter()
            .find(|(bound, _)| *bound == fired)
            .map(|(_, value)| value)
            .unwrap_or(self.threshold);
        match fired {
            Bound::Max => (Bound::Min, crossed - self.oscillation),
            Bound::Min => (Bound::Max, crossed + self.oscillation),
        }
    }

    /// Whether a crossing of `bound` at `level` is a watch this leaf has
    /// armed. `fired` is the primary that made the leaf true, if it is.
    pub fn expects(&self, fired: Option<Bound>, bound: Bound, level: MetricValue) -> bool {
        match fired {
            None => self.primary().contains(&(bound, level)),
            Some(fired) => self.anti(fired) == (bound, level),
        }
    }

    pub fn arm_primary(&self, port: &mut dyn ConditionPort, period: Millis, owner: ConditionRef) {
        for (bound, value) in self.primary() {
            port.insert_threshold(self.metric, bound, value, period, owner);
        }
    }

    /// React to the primary on `fired` crossing.
    ///
    /// A change is directional per occurrence, so its watch on the other side
    /// is dropped before the anti-condition is armed.
    pub fn on_trigger(
        &self,
        fired: Bound,
        port: &mut dyn ConditionPort,
        period: Millis,
        owner: ConditionRef,
    ) {
        if self.condition == ConditionKind::Change {
            port.remove_threshold(self.metric, fired.opposite(), owner);
        }
        let (bound, value) = self.anti(fired);
        port.insert_threshold(self.metric, bound, value, period, owner);
    }

    pub fn disarm(&self, port: &mut dyn ConditionPort, owner: ConditionRef) {
        port.remove_threshold(self.metric, Bound::Max, owner);
        port.remove_threshold(self.metric, Bound::Min, owner);
    }
}
