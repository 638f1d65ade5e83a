//! Threshold watches of one metric.

use std::cmp::Ordering;

use sensewatch_types::{Millis, MetricValue, MonitorId};

use crate::expr::ConditionRef;

/// Which side of the current value a watch sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bound {
    /// Fires once the value rises to the threshold.
    Max,
    /// Fires once the value falls to the threshold.
    Min,
}

impl Bound {
    pub fn opposite(self) -> Self {
        match self {
            Bound::Max => Bound::Min,
            Bound::Min => Bound::Max,
        }
    }
}

/// One threshold watch registered by an expression leaf.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdNode {
    pub monitor: MonitorId,
    pub threshold: MetricValue,
    /// Maximum staleness tolerated by the owning condition.
    pub period: Millis,
    pub owner: ConditionRef,
}

/// Threshold watches sorted so the first one to be crossed is at the head.
///
/// A max list is ascending (nearest ceiling first), a min list is descending
/// (nearest floor first). Reaching a threshold exactly counts as crossing it.
#[derive(Debug)]
pub struct ThresholdList {
    nodes: Vec<ThresholdNode>,
    descending: bool,
    min_period: Option<Millis>,
}

impl ThresholdList {
    pub fn new(bound: Bound) -> Self {
        Self {
            nodes: Vec::new(),
            descending: bound == Bound::Min,
            min_period: None,
        }
    }

    pub fn bound(&self) -> Bound {
        if self.descending {
            Bound::Min
        } else {
            Bound::Max
        }
    }

    /// Ordering of `a` relative to `b` in this list's direction.
    fn order(&self, a: &MetricValue, b: &MetricValue) -> Ordering {
        self.directed(a.partial_cmp(b).unwrap_or(Ordering::Equal))
    }

    fn directed(&self, ord: Ordering) -> Ordering {
        if self.descending {
            ord.reverse()
        } else {
            ord
        }
    }

    pub fn insert(
        &mut self,
        monitor: MonitorId,
        threshold: MetricValue,
        period: Millis,
        owner: ConditionRef,
    ) {
        let at = self
            .nodes
            .partition_point(|n| self.order(&n.threshold, &threshold) != Ordering::Greater);
        self.nodes.insert(
            at,
            ThresholdNode {
                monitor,
                threshold,
                period,
                owner,
            },
        );
        if self.min_period.map_or(true, |min| period < min) {
            self.min_period = Some(period);
        }
    }

    /// Whether `current` has reached the head's threshold. Values that do
    /// not compare (`NaN`) never cross.
    pub fn threshold_passed(&self, current: &MetricValue) -> bool {
        self.nodes.first().is_some_and(|head| {
            current
                .partial_cmp(&head.threshold)
                .is_some_and(|ord| self.directed(ord) != Ordering::Less)
        })
    }

    pub fn pop_head(&mut self) -> Option<ThresholdNode> {
        if self.nodes.is_empty() {
            return None;
        }
        let node = self.nodes.remove(0);
        self.on_removed(node.period);
        Some(node)
    }

    /// Remove the watch registered by `owner`.
    pub fn remove(&mut self, owner: ConditionRef) -> Option<ThresholdNode> {
        let at = self.nodes.iter().position(|n| n.owner == owner)?;
        let node = self.nodes.remove(at);
        self.on_removed(node.period);
        Some(node)
    }

    fn on_removed(&mut self, period: Millis) {
        if self.min_period == Some(period) {
            self.min_period = self.nodes.iter().map(|n| n.period).min();
        }
    }

    pub fn min_period(&self) -> Option<Millis> {
        self.min_period
    }

    pub fn head(&self) -> Option<&ThresholdNode> {
        self.nodes.first()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ThresholdNode> {
        self.nodes.iter()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
