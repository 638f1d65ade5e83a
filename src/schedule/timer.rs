//! Periodic and opportunistic subscriber lists.
//!
//! A [`TimerList`] holds the periodic monitors of one metric, sorted by the
//! absolute time they are next due. New monitors are phase-aligned with the
//! schedules already running in the same metric group so that, where the
//! periods allow it, several monitors share one wakeup.
//!
//! An [`EavesdropList`] holds opportunistic monitors. They never cause a
//! wakeup of their own: they receive whatever update happens, and their
//! period only bounds how stale they are willing to get.

use std::collections::BTreeMap;
use std::fmt;

use sensewatch_sdk::Callback;
use sensewatch_types::{Millis, MonitorId, Timestamp};

/// A running periodic schedule, as seen by phase alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    pub period: Millis,
    pub key: Timestamp,
}

/// Every periodic schedule of a metric group, keyed by monitor.
///
/// Shared by all hubs of the group so a new monitor on one metric can align
/// with a monitor on another. Ordered so alignment is reproducible.
pub type Schedules = BTreeMap<MonitorId, Schedule>;

/// Greatest common divisor (Euclid).
pub fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

/// Least common multiple, saturating at `u64::MAX`.
pub fn lcm(a: u64, b: u64) -> u64 {
    if a == 0 || b == 0 {
        return 0;
    }
    a.saturating_mul(b / gcd(a, b))
}

/// Move `anchor` by whole periods into the window `(now, now + period]`.
fn fold_into_window(anchor: Timestamp, period: Millis, now: Timestamp) -> Timestamp {
    let offset = if anchor > now {
        match (anchor - now) % period {
            0 => period,
            r => r,
        }
    } else {
        period - (now - anchor) % period
    };
    now + offset
}

/// The first multiple of `period` after `key` that is later than `now`.
fn next_key(key: Timestamp, period: Millis, now: Timestamp) -> Timestamp {
    let next = key + period;
    if next > now {
        next
    } else {
        next + ((now - next) / period + 1) * period
    }
}

/// One periodic monitor.
pub struct TimerNode {
    pub monitor: MonitorId,
    pub period: Millis,
    /// Absolute time this monitor is next due.
    pub key: Timestamp,
    /// Duration left; `None` when unbounded.
    pub remaining: Option<Millis>,
    pub callback: Callback,
}

impl fmt::Debug for TimerNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerNode")
            .field("monitor", &self.monitor)
            .field("period", &self.period)
            .field("key", &self.key)
            .field("remaining", &self.remaining)
            .finish()
    }
}

/// Periodic monitors of one metric, sorted ascending by `key`.
#[derive(Debug, Default)]
pub struct TimerList {
    nodes: Vec<TimerNode>,
}

impl TimerList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a monitor and return its first wake key.
    ///
    /// The key is aligned to the running schedule whose period has the
    /// smallest LCM with `period`, the earliest key breaking ties; a schedule
    /// whose period divides `period` wins immediately. Without any running schedule the monitor first fires
    /// one period from now.
    pub fn insert(
        &mut self,
        monitor: MonitorId,
        period: Millis,
        callback: Callback,
        duration: Millis,
        now: Timestamp,
        schedules: &mut Schedules,
    ) -> Timestamp {
        let key = self.aligned_key(period, now, schedules);
        self.insert_sorted(TimerNode {
            monitor,
            period,
            key,
            remaining: (duration > 0).then_some(duration),
            callback,
        });
        schedules.insert(monitor, Schedule { period, key });
        key
    }

    fn aligned_key(&self, period: Millis, now: Timestamp, schedules: &Schedules) -> Timestamp {
        let head = self.nodes.first().map(|n| Schedule {
            period: n.period,
            key: n.key,
        });

        let mut best: Option<(u64, Timestamp)> = None;
        for candidate in head.into_iter().chain(schedules.values().copied()) {
            if candidate.period == 0 {
                continue;
            }
            let multiple = lcm(period, candidate.period);
            let better = best.map_or(true, |(smallest, key)| {
                multiple < smallest || (multiple == smallest && candidate.key < key)
            });
            if better {
                best = Some((multiple, candidate.key));
            }
            if multiple == period {
                break;
            }
        }

        match best {
            Some((_, anchor)) => fold_into_window(anchor, period, now),
            None => now + period,
        }
    }

    fn insert_sorted(&mut self, node: TimerNode) {
        // Stay at the head when the key does not pass the current head
        if self.nodes.first().map_or(true, |head| node.key <= head.key) {
            self.nodes.insert(0, node);
            return;
        }
        let at = self.nodes.partition_point(|n| n.key <= node.key);
        self.nodes.insert(at, node);
    }

    pub fn head(&self) -> Option<&TimerNode> {
        self.nodes.first()
    }

    /// Whether the head is due at `now`.
    pub fn head_time_passed(&self, now: Timestamp) -> bool {
        self.nodes.first().is_some_and(|head| head.key <= now)
    }

    /// Cycle the head after it fired.
    ///
    /// Returns the node only when its duration is used up; it is then gone
    /// from the list and from `schedules`. Otherwise the node moves to its
    /// next key (skipping any periods already missed) and `None` is returned.
    pub fn pop_head(&mut self, now: Timestamp, schedules: &mut Schedules) -> Option<TimerNode> {
        if self.nodes.is_empty() {
            return None;
        }
        let mut node = self.nodes.remove(0);

        if let Some(remaining) = node.remaining {
            let left = remaining.saturating_sub(node.period);
            if left == 0 {
                schedules.remove(&node.monitor);
                return Some(node);
            }
            node.remaining = Some(left);
        }

        node.key = next_key(node.key, node.period, now);
        schedules.insert(
            node.monitor,
            Schedule {
                period: node.period,
                key: node.key,
            },
        );
        self.insert_sorted(node);
        None
    }

    /// Remove a monitor outright.
    pub fn remove(&mut self, monitor: MonitorId, schedules: &mut Schedules) -> Option<TimerNode> {
        let at = self.nodes.iter().position(|n| n.monitor == monitor)?;
        schedules.remove(&monitor);
        Some(self.nodes.remove(at))
    }

    pub fn contains(&self, monitor: MonitorId) -> bool {
        self.nodes.iter().any(|n| n.monitor == monitor)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TimerNode> {
        self.nodes.iter()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// One opportunistic monitor.
pub struct EavesdropNode {
    pub monitor: MonitorId,
    /// Maximum tolerated staleness.
    pub period: Millis,
    /// When the monitor's duration runs out; `None` when unbounded.
    pub expires_at: Option<Timestamp>,
    pub callback: Callback,
}

impl fmt::Debug for EavesdropNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EavesdropNode")
            .field("monitor", &self.monitor)
            .field("period", &self.period)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Opportunistic monitors of one metric, sorted ascending by period.
#[derive(Debug, Default)]
pub struct EavesdropList {
    nodes: Vec<EavesdropNode>,
}

impl EavesdropList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        monitor: MonitorId,
        period: Millis,
        callback: Callback,
        duration: Millis,
        now: Timestamp,
    ) {
        let node = EavesdropNode {
            monitor,
            period,
            expires_at: (duration > 0).then_some(now + duration),
            callback,
        };
        let at = self.nodes.partition_point(|n| n.period <= period);
        self.nodes.insert(at, node);
    }

    /// Re-arm a monitor after a delivery.
    ///
    /// Opportunistic monitors have no next key, so this only checks the
    /// duration: the node is removed and returned once it has expired.
    pub fn pop_node(&mut self, monitor: MonitorId, now: Timestamp) -> Option<EavesdropNode> {
        let at = self.nodes.iter().position(|n| n.monitor == monitor)?;
        match self.nodes[at].expires_at {
            Some(deadline) if deadline <= now => Some(self.nodes.remove(at)),
            _ => None,
        }
    }

    pub fn remove(&mut self, monitor: MonitorId) -> Option<EavesdropNode> {
        let at = self.nodes.iter().position(|n| n.monitor == monitor)?;
        Some(self.nodes.remove(at))
    }

    /// Smallest staleness bound, which is the head's period.
    pub fn min_period(&self) -> Option<Millis> {
        self.nodes.first().map(|n| n.period)
    }

    pub fn contains(&self, monitor: MonitorId) -> bool {
        self.nodes.iter().any(|n| n.monitor == monitor)
    }

    pub fn iter(&self) -> impl Iterator<Item = &EavesdropNode> {
        self.nodes.iter()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
