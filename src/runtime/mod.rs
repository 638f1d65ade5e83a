//! The running middleware.
//!
//! Work is split over three tokio tasks, each the only owner of its state:
//!
//! - **metric**: every [`MetricService`], polled whenever a group's wake
//!   comes due
//! - **event**: the [`EventList`] of registered condition trees
//! - **db**: the persistence [`Output`]
//!
//! The tasks talk through unbounded channels only. [`Middleware`] is the
//! cloneable front door: it validates registrations synchronously and posts
//! them to the right task.

mod clock;
mod command;
mod db;
mod event;
mod metric;

pub use clock::Clock;
pub use event::EventList;

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use sensewatch_sdk::{AdminSnapshot, AdminStatus, Callback, NotifyHandle, Output, Target};
use sensewatch_types::{Metric, MetricGroup, Millis, MonitorId, SampleValue, Timestamp};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::error::RegistrationError;
use crate::expr::{ConditionTree, Flavor};
use crate::hub::DEFAULT_BATCH_LIMIT;
use crate::service::{LatestValues, MetricService};
use crate::source::AcquisitionSource;

use command::{EventCommand, MetricCommand};
use event::{EventTask, MetricPort};
use metric::MetricTask;

/// Builder for a [`Middleware`].
///
/// # Example
///
/// ```rust
/// use sensewatch::{Middleware, SimulatedSource};
/// use sensewatch_sdk::Output;
/// use sensewatch_types::MetricGroup;
///
/// # tokio_test::block_on(async {
/// let (output, _store) = Output::memory();
/// let (middleware, handle) = Middleware::builder()
///     .source(SimulatedSource::with_defaults(MetricGroup::Battery))
///     .output(output)
///     .spawn();
///
/// assert!(middleware.supports(MetricGroup::Battery));
/// handle.join().await;
/// # });
/// ```
#[derive(Debug)]
pub struct MiddlewareBuilder {
    sources: Vec<Box<dyn AcquisitionSource>>,
    output: Option<Output>,
    batch_limit: usize,
    admin: Option<Arc<AdminStatus>>,
    clock: Option<Clock>,
}

impl Default for MiddlewareBuilder {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            output: None,
            batch_limit: DEFAULT_BATCH_LIMIT,
            admin: None,
            clock: None,
        }
    }
}

impl MiddlewareBuilder {
    /// Add the acquisition source of one metric group.
    pub fn source(self, source: impl AcquisitionSource + 'static) -> Self {
        self.boxed_source(Box::new(source))
    }

    pub fn boxed_source(mut self, source: Box<dyn AcquisitionSource>) -> Self {
        self.sources.push(source);
        self
    }

    /// Where flushed batches go. Without an output they are dropped.
    pub fn output(mut self, output: Output) -> Self {
        self.output = Some(output);
        self
    }

    /// Readings buffered per monitor before a batch is flushed.
    pub fn batch_limit(mut self, limit: usize) -> Self {
        self.batch_limit = limit.max(1);
        self
    }

    /// Share an existing admin status instead of creating one.
    pub fn admin(mut self, admin: Arc<AdminStatus>) -> Self {
        self.admin = Some(admin);
        self
    }

    /// Use a specific clock, e.g. one starting at a fixed timestamp.
    pub fn clock(mut self, clock: Clock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Start the metric, event and db tasks.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(self) -> (Middleware, MiddlewareHandle) {
        let admin = self.admin.unwrap_or_default();
        let clock = self.clock.unwrap_or_else(Clock::start);
        let latest = LatestValues::new();

        let mut services = HashMap::new();
        for source in self.sources {
            let group = source.group();
            let service =
                MetricService::new(source, self.batch_limit, admin.clone(), latest.clone());
            if services.insert(group, service).is_some() {
                warn!(%group, "second source for group replaces the first");
            }
        }
        let groups: BTreeSet<MetricGroup> = services.keys().copied().collect();

        let (metric_tx, metric_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (db_tx, db_rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = watch::channel(false);

        let metric_task = MetricTask::new(services, metric_rx, event_tx.clone(), db_tx, clock);
        let event_task = EventTask::new(
            MetricPort::new(metric_tx.clone()),
            event_rx,
            admin.clone(),
            clock,
        );

        let tasks = vec![
            tokio::spawn(metric_task.run(stop_rx.clone())),
            tokio::spawn(event_task.run(stop_rx)),
            tokio::spawn(db::run(self.output, db_rx)),
        ];
        info!(groups = ?groups, "middleware started");

        let middleware = Middleware {
            inner: Arc::new(Shared {
                metric_tx,
                event_tx,
                admin,
                latest,
                groups,
                next_id: AtomicU64::new(1),
                clock,
            }),
        };
        (middleware, MiddlewareHandle { stop_tx, tasks })
    }
}

#[derive(Debug)]
struct Shared {
    metric_tx: mpsc::UnboundedSender<MetricCommand>,
    event_tx: mpsc::UnboundedSender<EventCommand>,
    admin: Arc<AdminStatus>,
    latest: LatestValues,
    groups: BTreeSet<MetricGroup>,
    next_id: AtomicU64,
    clock: Clock,
}

/// Registration and query API of a running middleware.
#[derive(Debug, Clone)]
pub struct Middleware {
    inner: Arc<Shared>,
}

impl Middleware {
    pub fn builder() -> MiddlewareBuilder {
        MiddlewareBuilder::default()
    }

    /// Whether a source serves `group`.
    pub fn supports(&self, group: MetricGroup) -> bool {
        self.inner.groups.contains(&group)
    }

    pub fn now(&self) -> Timestamp {
        self.inner.clock.now()
    }

    pub fn admin(&self) -> &Arc<AdminStatus> {
        &self.inner.admin
    }

    pub fn snapshot(&self) -> AdminSnapshot {
        self.inner.admin.snapshot()
    }

    /// Most recent reading of `metric`, if any was acquired yet.
    pub fn current_value(&self, metric: Metric) -> Option<SampleValue> {
        self.inner.latest.get(metric)
    }

    fn next_monitor(&self) -> MonitorId {
        MonitorId(self.inner.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// The group serving `metric`, if the metric is known and served.
    fn served_group(&self, metric: Metric) -> Result<MetricGroup, RegistrationError> {
        let group = metric
            .group()
            .ok_or(RegistrationError::UnknownMetric(metric))?;
        if self.supports(group) {
            Ok(group)
        } else {
            Err(RegistrationError::Unsupported(group))
        }
    }

    fn post_metric(&self, command: MetricCommand) -> Result<(), RegistrationError> {
        self.inner
            .metric_tx
            .send(command)
            .map_err(|_| RegistrationError::Stopped)
    }

    fn post_event(&self, command: EventCommand) -> Result<(), RegistrationError> {
        self.inner
            .event_tx
            .send(command)
            .map_err(|_| RegistrationError::Stopped)
    }

    /// Deliver `metric` to `callback` every `period` ms, for `duration` ms
    /// (`0` means until unregistered).
    ///
    /// An opportunistic monitor never causes an acquisition of its own: it
    /// receives whatever readings other monitors trigger, and `period` is
    /// only the longest gap it tolerates.
    pub fn register_periodic(
        &self,
        metric: Metric,
        period: Millis,
        duration: Millis,
        opportunistic: bool,
        callback: Callback,
    ) -> Result<MonitorId, RegistrationError> {
        self.served_group(metric)?;
        if period == 0 {
            return Err(RegistrationError::ZeroPeriod);
        }
        let monitor = self.next_monitor();
        self.post_metric(MetricCommand::Register {
            metric,
            monitor,
            period,
            duration,
            opportunistic,
            callback,
        })?;
        info!(%metric, %monitor, period, duration, opportunistic, "periodic monitor registered");
        Ok(monitor)
    }

    pub fn unregister_periodic(
        &self,
        metric: Metric,
        monitor: MonitorId,
    ) -> Result<(), RegistrationError> {
        self.served_group(metric)?;
        self.post_metric(MetricCommand::Unregister { metric, monitor })
    }

    fn register_tree(
        &self,
        expr: &str,
        period: Millis,
        flavor: Flavor,
    ) -> Result<MonitorId, RegistrationError> {
        if period == 0 {
            return Err(RegistrationError::ZeroPeriod);
        }
        let monitor = self.next_monitor();
        let latest = &self.inner.latest;
        let tree = ConditionTree::construct(expr, monitor, period, 0, flavor, |metric| {
            latest.scalar(metric)
        })?;
        self.post_event(EventCommand::Add(tree))?;
        self.inner.admin.set_active(Target::Monitor(monitor));
        Ok(monitor)
    }

    /// Notify once when `expr` becomes true, then forget it.
    pub fn register_event(
        &self,
        expr: &str,
        period: Millis,
        notifier: NotifyHandle,
    ) -> Result<MonitorId, RegistrationError> {
        let monitor = self.register_tree(expr, period, Flavor::Event { notifier })?;
        info!(%monitor, expr, "event monitor registered");
        Ok(monitor)
    }

    /// Feed `metric` to `callback` every `period` ms while `expr` holds.
    pub fn register_conditional(
        &self,
        metric: Metric,
        expr: &str,
        period: Millis,
        callback: Callback,
    ) -> Result<MonitorId, RegistrationError> {
        self.served_group(metric)?;
        let monitor = self.register_tree(expr, period, Flavor::Conditional { metric, callback })?;
        info!(%metric, %monitor, expr, "conditional monitor registered");
        Ok(monitor)
    }

    pub fn unregister_event(&self, monitor: MonitorId) -> Result<(), RegistrationError> {
        self.post_event(EventCommand::Remove(monitor))
    }

    pub fn unregister_conditional(&self, monitor: MonitorId) -> Result<(), RegistrationError> {
        self.post_event(EventCommand::Remove(monitor))
    }

    /// Push readings for a group, as if its source had produced them.
    ///
    /// `timestamp` defaults to now.
    pub fn publish(
        &self,
        group: MetricGroup,
        readings: Vec<(Metric, SampleValue)>,
        timestamp: Option<Timestamp>,
    ) -> Result<(), RegistrationError> {
        if !self.supports(group) {
            return Err(RegistrationError::Unsupported(group));
        }
        for (metric, value) in &readings {
            let kind = metric
                .kind()
                .ok_or(RegistrationError::UnknownMetric(*metric))?;
            if metric.group() != Some(group) || !value.fits(kind) {
                return Err(RegistrationError::WrongKind(*metric));
            }
            if !value.is_finite() {
                return Err(RegistrationError::NonFinite(*metric));
            }
        }
        self.post_metric(MetricCommand::Publish {
            group,
            readings,
            timestamp,
        })
    }
}

/// Handle to the middleware tasks.
///
/// Dropping the handle stops the tasks; use [`join`](Self::join) to wait for
/// pending batches to be persisted.
#[derive(Debug)]
pub struct MiddlewareHandle {
    stop_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl MiddlewareHandle {
    /// Ask every task to stop.
    pub fn stop(&self) {
        self.stop_tx.send_replace(true);
    }

    /// Stop and wait for every task to finish.
    pub async fn join(mut self) {
        self.stop();
        for task in std::mem::take(&mut self.tasks) {
            if let Err(e) = task.await {
                warn!("middleware task failed: {}", e);
            }
        }
    }
}
