//! Admin status shared across scheduling domains.
//!
//! Unlike the rest of the middleware, which is single-writer per domain, the
//! admin status is touched from several domains at once, so it carries its
//! own locks. Nothing reads it on the scheduling path: it exists for
//! dashboards and diagnostics only.

use std::collections::{BTreeMap, BTreeSet};

use parking_lot::RwLock;
use sensewatch_types::{
    current_timestamp_ms, Metric, MetricGroup, Millis, MonitorId, SampleValue, Timestamp,
};
use serde::Serialize;

/// What an active/inactive flag refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Target {
    Metric(Metric),
    Monitor(MonitorId),
}

/// Status of one metric.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricStatus {
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<SampleValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_ms: Option<Timestamp>,
}

/// Status of one metric group's acquisition loop.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GroupStatus {
    /// Current delay until the next wake, if the group is awake.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period_ms: Option<Millis>,
    /// Number of structural changes (registrations, evictions).
    pub changes: u64,
}

/// Point-in-time copy of the admin status, keyed by display names.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AdminSnapshot {
    pub timestamp_ms: Timestamp,
    pub metrics: BTreeMap<String, MetricStatus>,
    /// Ids of the monitors currently active.
    pub monitors: BTreeSet<u64>,
    pub groups: BTreeMap<String, GroupStatus>,
}

impl AdminSnapshot {
    pub fn active_monitors(&self) -> usize {
        self.monitors.len()
    }
}

/// Thread-safe admin status.
///
/// Metrics and groups are a fixed catalogue and keep their entries. Monitors
/// come and go, so only the active ones are held.
#[derive(Debug, Default)]
pub struct AdminStatus {
    metrics: RwLock<BTreeMap<Metric, MetricStatus>>,
    monitors: RwLock<BTreeSet<MonitorId>>,
    groups: RwLock<BTreeMap<MetricGroup, GroupStatus>>,
}

impl AdminStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_active(&self, target: Target) {
        self.set_flag(target, true);
    }

    pub fn set_inactive(&self, target: Target) {
        self.set_flag(target, false);
    }

    fn set_flag(&self, target: Target, active: bool) {
        match target {
            Target::Metric(metric) => {
                self.metrics.write().entry(metric).or_default().active = active;
            }
            Target::Monitor(monitor) if active => {
                self.monitors.write().insert(monitor);
            }
            Target::Monitor(monitor) => {
                self.monitors.write().remove(&monitor);
            }
        }
    }

    /// Record the latest value of a metric.
    pub fn set_value(&self, metric: Metric, value: SampleValue) {
        let mut metrics = self.metrics.write();
        let status = metrics.entry(metric).or_default();
        status.value = Some(value);
        status.updated_ms = Some(current_timestamp_ms());
    }

    /// Record a group's current wake period (`None` when dormant).
    pub fn set_period(&self, group: MetricGroup, period: Option<Millis>) {
        self.groups.write().entry(group).or_default().period_ms = period;
    }

    /// Note a structural change in a group.
    pub fn notify_change(&self, group: MetricGroup) {
        self.groups.write().entry(group).or_default().changes += 1;
    }

    pub fn is_active(&self, target: Target) -> bool {
        match target {
            Target::Metric(metric) => self.metrics.read().get(&metric).is_some_and(|s| s.active),
            Target::Monitor(monitor) => self.monitors.read().contains(&monitor),
        }
    }

    pub fn value(&self, metric: Metric) -> Option<SampleValue> {
        self.metrics.read().get(&metric).and_then(|s| s.value)
    }

    pub fn group(&self, group: MetricGroup) -> GroupStatus {
        self.groups.read().get(&group).cloned().unwrap_or_default()
    }

    /// Collect everything into a serializable snapshot.
    pub fn snapshot(&self) -> AdminSnapshot {
        let metrics = self
            .metrics
            .read()
            .iter()
            .map(|(metric, status)| (metric.name().to_string(), status.clone()))
            .collect();

        let monitors = self
            .monitors
            .read()
            .iter()
            .map(|monitor| monitor.0)
            .collect();

        let groups = self
            .groups
            .read()
            .iter()
            .map(|(group, status)| (group.name().to_string(), status.clone()))
            .collect();

        AdminSnapshot {
            timestamp_ms: current_timestamp_ms(),
            metrics,
            monitors,
            groups,
        }
    }
}
