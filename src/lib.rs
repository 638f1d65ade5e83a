//! # sensewatch
//!
//! Resource-monitoring middleware for mobile devices.
//!
//! Clients register interest in device metrics (battery, CPU, memory,
//! network, location, ...) and sensewatch schedules acquisition so every
//! client is served while the device samples as little as possible.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  commands   ┌──────────────────────────────────────┐
//! │  Middleware  │────────────▶│ metric task                          │
//! │ (register_*) │             │  MetricService per group             │
//! └──────┬───────┘             │   └─ Hub per metric                  │
//!        │ trees               │       ├─ TimerList / EavesdropList   │
//!        ▼                     │       └─ ThresholdLists / fences     │
//! ┌──────────────┐  crossings  └───────┬──────────────────┬───────────┘
//! │ event task   │◀────────────────────┘                  │ batches
//! │  EventList   │── threshold / fence requests ──▶       ▼
//! └──────────────┘                              ┌──────────────────┐
//!                                               │ db task (Output) │
//!                                               └──────────────────┘
//! ```
//!
//! - **[`schedule`]**: the sorted timer, eavesdrop and threshold lists
//! - **[`hub`]**: per-metric state ([`ValueNode`], [`CoordValNode`])
//! - **[`service`]**: per-group acquisition and wake scheduling
//! - **[`expr`]**: condition expressions, their parser and evaluation trees
//! - **[`runtime`]**: the tasks and the [`Middleware`] registration API
//! - **[`source`]**: acquisition sources ([`SimulatedSource`], [`ScriptedSource`])
//!
//! ## Monitor kinds
//!
//! - **Periodic**: a value every period, phase-aligned with other monitors
//!   of the same group so acquisitions are shared
//! - **Opportunistic**: whatever values other monitors cause to be acquired
//! - **Event**: one notification when a condition expression becomes true
//! - **Conditional**: periodic delivery while an expression holds
//!
//! ## Usage
//!
//! ```
//! use sensewatch::expr::builder::condition;
//! use sensewatch::{ConditionKind, Middleware, ScriptedSource};
//! use sensewatch_sdk::ChannelNotifier;
//! use sensewatch_types::{Metric, MetricGroup, MetricValue};
//!
//! # tokio_test::block_on(async {
//! let (middleware, handle) = Middleware::builder()
//!     .source(ScriptedSource::new(MetricGroup::Battery))
//!     .spawn();
//!
//! let (notifier, _notices) = ChannelNotifier::pair();
//! let low_battery = condition(ConditionKind::MinThresh, Metric::BATTERY_PERCENT, 15);
//! let monitor = middleware.register_event(&low_battery, 1_000, notifier).unwrap();
//!
//! middleware
//!     .publish(
//!         MetricGroup::Battery,
//!         vec![(Metric::BATTERY_PERCENT, MetricValue::Byte(12).into())],
//!         None,
//!     )
//!     .unwrap();
//! # let _ = monitor;
//! handle.join().await;
//! # });
//! ```

pub mod config;
pub mod error;
pub mod expr;
pub mod hub;
pub mod runtime;
pub mod schedule;
pub mod service;
pub mod source;

pub use error::{ParseError, RegistrationError, SettingsError};
pub use expr::{ConditionKind, ConditionTree, Operator};
pub use hub::{CoordValNode, ValueNode};
pub use runtime::{Clock, EventList, Middleware, MiddlewareBuilder, MiddlewareHandle};
pub use service::MetricService;
pub use source::{AcquisitionSource, ScriptedSource, SimulatedSource, Waveform};
