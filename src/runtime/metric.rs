//! The metric task: owns every metric service.

use std::collections::HashMap;

use sensewatch_types::{Batch, Metric, MetricGroup, Timestamp};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use crate::hub::Outbox;
use crate::service::MetricService;

use super::clock::Clock;
use super::command::{EventCommand, MetricCommand};

/// Single consumer of [`MetricCommand`]s.
///
/// Between commands it sleeps until the earliest wake of any service, then
/// polls every service that is due.
pub(crate) struct MetricTask {
    services: HashMap<MetricGroup, MetricService>,
    rx: mpsc::UnboundedReceiver<MetricCommand>,
    events: mpsc::UnboundedSender<EventCommand>,
    db: mpsc::UnboundedSender<Batch>,
    clock: Clock,
}

impl MetricTask {
    pub fn new(
        services: HashMap<MetricGroup, MetricService>,
        rx: mpsc::UnboundedReceiver<MetricCommand>,
        events: mpsc::UnboundedSender<EventCommand>,
        db: mpsc::UnboundedSender<Batch>,
        clock: Clock,
    ) -> Self {
        Self {
            services,
            rx,
            events,
            db,
            clock,
        }
    }

    fn next_wake(&self) -> Option<Timestamp> {
        self.services.values().filter_map(|s| s.next_wake()).min()
    }

    pub async fn run(mut self, mut stop: watch::Receiver<bool>) {
        info!(groups = self.services.len(), "metric task starting");

        loop {
            let wake = self.next_wake();
            let deadline = self.clock.instant(wake.unwrap_or_default());

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

                _ = tokio::time::sleep_until(deadline), if wake.is_some() => {
                    self.acquire_due();
                }
            }
        }

        let mut outbox = Outbox::default();
        for service in self.services.values_mut() {
            service.flush_all(&mut outbox);
        }
        self.dispatch(outbox);
        info!("metric task stopped");
    }

    fn service_for(&mut self, metric: Metric) -> Option<&mut MetricService> {
        let service = metric
            .group()
            .and_then(|group| self.services.get_mut(&group));
        if service.is_none() {
            info!(%metric, "no service for metric, request ignored");
        }
        service
    }

    fn handle(&mut self, command: MetricCommand) {
        let now = self.clock.now();
        debug!(command = command.name(), now, "metric command");
        let mut outbox = Outbox::default();

        match command {
            MetricCommand::Register {
                metric,
                monitor,
                period,
                duration,
                opportunistic,
                callback,
            } => {
                if let Some(service) = self.service_for(metric) {
                    service.register(
                        metric,
                        monitor,
                        period,
                        duration,
                        opportunistic,
                        callback,
                        now,
                    );
                }
            }
            MetricCommand::Unregister { metric, monitor } => {
                if let Some(service) = self.service_for(metric) {
                    service.unregister(metric, monitor, now, &mut outbox);
                }
            }
            MetricCommand::InsertThreshold {
                metric,
                bound,
                threshold,
                period,
                owner,
            } => {
                if let Some(service) = self.service_for(metric) {
                    service.insert_threshold(metric, bound, threshold, period, owner, now);
                }
            }
            MetricCommand::RemoveThreshold {
                metric,
                bound,
                owner,
            } => {
                if let Some(service) = self.service_for(metric) {
                    service.remove_threshold(metric, bound, owner, now);
                }
            }
            MetricCommand::InsertFence {
                metric,
                fence,
                period,
                owner,
            } => {
                if let Some(service) = self.service_for(metric) {
                    service.insert_fence(metric, fence, period, owner, now);
                }
            }
            MetricCommand::RemoveFence {
                metric,
                proximity,
                owner,
            } => {
                if let Some(service) = self.service_for(metric) {
                    service.remove_fence(metric, proximity, owner, now);
                }
            }
            MetricCommand::Publish {
                group,
                readings,
                timestamp,
            } => match self.services.get_mut(&group) {
                Some(service) => {
                    outbox = service.update(readings, timestamp.unwrap_or(now));
                }
                None => info!(%group, "readings for group without service dropped"),
            },
        }

        self.dispatch(outbox);
    }

    fn acquire_due(&mut self) {
        let now = self.clock.now();
        let mut outbox = Outbox::default();
        for service in self.services.values_mut() {
            if service.next_wake().is_some_and(|wake| wake <= now) {
                let mut produced = service.acquire(now);
                outbox.append(&mut produced);
            }
        }
        self.dispatch(outbox);
    }

    /// Post crossings to the event task and batches to the db task.
    fn dispatch(&self, outbox: Outbox) {
        for monitor in &outbox.evicted {
            debug!(%monitor, "monitor evicted");
        }
        for crossing in outbox.crossings {
            if self.events.send(EventCommand::Crossing(crossing)).is_err() {
                debug!(owner = %crossing.owner, "event task gone, crossing dropped");
            }
        }
        for batch in outbox.batches {
            if self.db.send(batch).is_err() {
                debug!("db task gone, batch dropped");
            }
        }
    }
}
