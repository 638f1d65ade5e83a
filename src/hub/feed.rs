//! Periodic and opportunistic delivery shared by every hub kind.

use std::collections::HashMap;

use sensewatch_sdk::{AdminStatus, Callback, Target};
use sensewatch_types::{
    Batch, Delivery, Metric, Millis, MonitorId, Reading, SampleValue, Timestamp,
};
use tracing::debug;

use crate::schedule::{EavesdropList, Schedules, TimerList};

use super::Outbox;

/// Default number of readings buffered per monitor before a forced flush.
pub const DEFAULT_BATCH_LIMIT: usize = 1_000;

/// Outcome of handing one reading to one monitor.
enum Handoff {
    Delivered,
    Dead,
}

/// Timer and eavesdrop subscribers of one metric plus their pending batches.
#[derive(Debug)]
pub struct Feed {
    metric: Metric,
    timers: TimerList,
    eavesdrop: EavesdropList,
    batches: HashMap<MonitorId, Vec<Reading>>,
    batch_limit: usize,
}

impl Feed {
    pub fn new(metric: Metric, batch_limit: usize) -> Self {
        Self {
            metric,
            timers: TimerList::new(),
            eavesdrop: EavesdropList::new(),
            batches: HashMap::new(),
            batch_limit: batch_limit.max(1),
        }
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    pub fn timers(&self) -> &TimerList {
        &self.timers
    }

    pub fn eavesdrop(&self) -> &EavesdropList {
        &self.eavesdrop
    }

    /// Add a periodic monitor and return its first wake key.
    pub fn insert_timed(
        &mut self,
        monitor: MonitorId,
        period: Millis,
        callback: Callback,
        duration: Millis,
        now: Timestamp,
        schedules: &mut Schedules,
    ) -> Timestamp {
        self.timers
            .insert(monitor, period, callback, duration, now, schedules)
    }

    pub fn insert_opportunistic(
        &mut self,
        monitor: MonitorId,
        period: Millis,
        callback: Callback,
        duration: Millis,
        now: Timestamp,
    ) {
        self.eavesdrop
            .insert(monitor, period, callback, duration, now);
    }

    /// Remove a monitor from whichever list holds it, flushing its batch.
    ///
    /// Returns whether the monitor was found.
    pub fn remove(
        &mut self,
        monitor: MonitorId,
        schedules: &mut Schedules,
        outbox: &mut Outbox,
    ) -> bool {
        let found = self.timers.remove(monitor, schedules).is_some()
            | self.eavesdrop.remove(monitor).is_some();
        self.flush(monitor, outbox);
        found
    }

    /// Deliver `value` to every opportunistic monitor, then to every periodic
    /// monitor that is due at `timestamp`.
    pub fn deliver(
        &mut self,
        value: SampleValue,
        timestamp: Timestamp,
        schedules: &mut Schedules,
        admin: &AdminStatus,
        outbox: &mut Outbox,
    ) {
        // Snapshot first: eviction reshapes the list under us
        let listeners: Vec<(MonitorId, Callback)> = self
            .eavesdrop
            .iter()
            .map(|n| (n.monitor, n.callback.clone()))
            .collect();

        for (monitor, callback) in listeners {
            match self.hand_off(monitor, &callback, value, timestamp) {
                Handoff::Dead => {
                    self.eavesdrop.remove(monitor);
                    self.evict(monitor, admin, outbox);
                }
                Handoff::Delivered => {
                    if self.eavesdrop.pop_node(monitor, timestamp).is_some() {
                        debug!(%monitor, metric = %self.metric, "opportunistic monitor expired");
                        self.evict(monitor, admin, outbox);
                    } else {
                        self.flush_if_full(monitor, outbox);
                    }
                }
            }
        }

        while self.timers.head_time_passed(timestamp) {
            let Some((monitor, callback)) =
                self.timers.head().map(|n| (n.monitor, n.callback.clone()))
            else {
                break;
            };

            match self.hand_off(monitor, &callback, value, timestamp) {
                Handoff::Dead => {
                    self.timers.remove(monitor, schedules);
                    self.evict(monitor, admin, outbox);
                }
                Handoff::Delivered => {
                    if self.timers.pop_head(timestamp, schedules).is_some() {
                        debug!(%monitor, metric = %self.metric, "periodic monitor expired");
                        self.evict(monitor, admin, outbox);
                    } else {
                        self.flush_if_full(monitor, outbox);
                    }
                }
            }
        }
    }

    fn hand_off(
        &mut self,
        monitor: MonitorId,
        callback: &Callback,
        value: SampleValue,
        timestamp: Timestamp,
    ) -> Handoff {
        let delivery = Delivery {
            monitor,
            metric: self.metric,
            timestamp_ms: timestamp,
            value,
        };
        match callback.send(&delivery) {
            Ok(()) => {
                self.batches
                    .entry(monitor)
                    .or_default()
                    .push(Reading::new(timestamp, value));
                Handoff::Delivered
            }
            Err(_) => {
                debug!(%monitor, metric = %self.metric, "delivery channel closed");
                Handoff::Dead
            }
        }
    }

    fn evict(&mut self, monitor: MonitorId, admin: &AdminStatus, outbox: &mut Outbox) {
        self.flush(monitor, outbox);
        admin.set_inactive(Target::Monitor(monitor));
        outbox.evicted.push(monitor);
    }

    fn flush_if_full(&mut self, monitor: MonitorId, outbox: &mut Outbox) {
        if self
            .batches
            .get(&monitor)
            .is_some_and(|b| b.len() >= self.batch_limit)
        {
            self.flush(monitor, outbox);
        }
    }

    fn flush(&mut self, monitor: MonitorId, outbox: &mut Outbox) {
        if let Some(readings) = self.batches.remove(&monitor) {
            if !readings.is_empty() {
                outbox
                    .batches
                    .push(Batch::new(monitor, self.metric, readings));
            }
        }
    }

    /// Flush every pending batch.
    pub fn flush_all(&mut self, outbox: &mut Outbox) {
        let monitors: Vec<MonitorId> = self.batches.keys().copied().collect();
        for monitor in monitors {
            self.flush(monitor, outbox);
        }
    }

    /// Delay until this feed next needs a fresh value.
    ///
    /// `None` when there are no subscribers; an overdue timer yields 0.
    pub fn min_period(&self, now: Timestamp) -> Option<Millis> {
        let timer = self.timers.head().map(|n| n.key.saturating_sub(now));
        [timer, self.eavesdrop.min_period()]
            .into_iter()
            .flatten()
            .min()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty() && self.eavesdrop.is_empty()
    }
}
