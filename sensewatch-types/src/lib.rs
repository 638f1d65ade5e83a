//! # sensewatch-types
//!
//! Core types shared by the sensewatch middleware and its clients.
//!
//! ## Contents
//!
//! - **Metric catalogue**: every observable quantity has a fixed [`Metric`] id,
//!   a name, a value [`MetricKind`], the [`MetricGroup`] whose acquisition
//!   source produces it, and an oscillation offset used for hysteresis
//! - **Values**: [`MetricValue`] is a closed sum over the scalar kinds;
//!   [`Coordinate`] carries geolocation; [`SampleValue`] is either of them
//! - **Records**: [`Reading`], [`Batch`], [`Delivery`] and [`EventNotice`]
//!   are what the middleware hands to clients and to persistence
//!
//! ## Features
//!
//! - `serde`: serialization of values and records via serde
//!
//! ## Example
//!
//! ```rust
//! use sensewatch_types::{Metric, MetricGroup, MetricKind, MetricValue};
//!
//! let metric = Metric::lookup("BATTERY_PERCENT").unwrap();
//! assert_eq!(metric.kind(), Some(MetricKind::Byte));
//! assert_eq!(metric.group(), Some(MetricGroup::Battery));
//!
//! let threshold = MetricValue::parse(MetricKind::Byte, "20").unwrap();
//! assert!(MetricValue::Byte(15) < threshold);
//! ```

mod metric;
mod record;
mod time;
mod value;
mod version;

pub use metric::*;
pub use record::*;
pub use time::*;
pub use value::*;
pub use version::*;

/// Current record schema version.
///
/// Increment this when making breaking changes to persisted batches.
pub const SCHEMA_VERSION: u32 = 1;
