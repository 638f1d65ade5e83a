//! Delivery contracts between the middleware and its clients.

use std::fmt;
use std::sync::Arc;

use sensewatch_types::{Delivery, EventNotice};

/// The receiving side of a delivery target has gone away.
///
/// The middleware treats this as "client dead" and evicts the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelClosed;

impl fmt::Display for ChannelClosed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("delivery channel closed")
    }
}

impl std::error::Error for ChannelClosed {}

/// A push channel for periodic data delivery.
///
/// Implementations must not block: `send` is called from the scheduling
/// loop that serves every monitor of a metric group.
pub trait PushChannel: Send + Sync {
    fn send(&self, delivery: &Delivery) -> Result<(), ChannelClosed>;
}

/// A one-shot notification target for event monitors.
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: &EventNotice) -> Result<(), ChannelClosed>;
}

/// Shared handle to a push channel.
pub type Callback = Arc<dyn PushChannel>;

/// Shared handle to a notifier.
pub type NotifyHandle = Arc<dyn Notifier>;

impl<F> PushChannel for F
where
    F: Fn(&Delivery) -> Result<(), ChannelClosed> + Send + Sync,
{
    fn send(&self, delivery: &Delivery) -> Result<(), ChannelClosed> {
        self(delivery)
    }
}

impl<F> Notifier for F
where
    F: Fn(&EventNotice) -> Result<(), ChannelClosed> + Send + Sync,
{
    fn notify(&self, notice: &EventNotice) -> Result<(), ChannelClosed> {
        self(notice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sensewatch_types::{Metric, MetricValue, MonitorId};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn closures_are_push_channels() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let callback: Callback = Arc::new(move |_: &Delivery| {
            counter.fetch_add(1, Ordering::Relaxed);
            Ok(())
        });

        let delivery = Delivery {
            monitor: MonitorId(1),
            metric: Metric::CPU_USAGE,
            timestamp_ms: 0,
            value: MetricValue::Byte(10).into(),
        };
        callback.send(&delivery).unwrap();
        callback.send(&delivery).unwrap();
        assert_eq!(seen.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn closures_are_notifiers() {
        let notifier: NotifyHandle = Arc::new(|_: &EventNotice| Err(ChannelClosed));
        let notice = EventNotice {
            monitor: MonitorId(9),
            timestamp_ms: 5,
        };
        assert_eq!(notifier.notify(&notice), Err(ChannelClosed));
    }
}
