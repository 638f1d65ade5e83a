//! # sensewatch-sdk
//!
//! Plumbing shared by sensewatch clients and hosts.
//!
//! - **Delivery targets**: the [`PushChannel`] and [`Notifier`] contracts the
//!   middleware pushes readings and event notices through, plus tokio-backed
//!   implementations ([`ChannelCallback`], [`ChannelNotifier`])
//! - **Persistence outputs**: [`Output`] backends that accept batched
//!   readings (JSON-lines file, channel, in-memory)
//! - **Admin status**: [`AdminStatus`], a thread-safe view of which metrics
//!   and monitors are active, for dashboards and diagnostics
//!
//! ## Quick Start
//!
//! ```rust
//! use sensewatch_sdk::{ChannelCallback, PushChannel};
//! use sensewatch_types::{Delivery, Metric, MetricValue, MonitorId};
//!
//! # tokio_test::block_on(async {
//! let (callback, mut rx) = ChannelCallback::pair();
//!
//! let delivery = Delivery {
//!     monitor: MonitorId(1),
//!     metric: Metric::BATTERY_PERCENT,
//!     timestamp_ms: 1_000,
//!     value: MetricValue::Byte(87).into(),
//! };
//! callback.send(&delivery).unwrap();
//!
//! assert_eq!(rx.recv().await, Some(delivery));
//! # });
//! ```

mod channel;
#[cfg(feature = "tokio")]
mod handle;
mod output;
mod state;

pub use channel::{Callback, ChannelClosed, NotifyHandle, Notifier, PushChannel};
#[cfg(feature = "tokio")]
pub use handle::{ChannelCallback, ChannelNotifier};
pub use output::{MemoryStore, Output};
pub use state::{AdminSnapshot, AdminStatus, GroupStatus, MetricStatus, Target};

// Re-export types for convenience
pub use sensewatch_types::{Batch, Delivery, EventNotice, Metric, MonitorId, Reading};
