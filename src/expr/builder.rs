//! Helpers that compose expression strings.
//!
//! ```
//! use sensewatch::expr::builder::{and_with, condition};
//! use sensewatch::expr::ConditionKind;
//! use sensewatch_types::Metric;
//!
//! let hot = condition(ConditionKind::MaxThresh, Metric::CPU_LOAD1, 1.25);
//! let low = condition(ConditionKind::MinThresh, Metric::BATTERY_PERCENT, 15);
//! assert_eq!(
//!     and_with(&hot, &low),
//!     "(AND:[4:CPU_LOAD1:1.25]:[5:BATTERY_PERCENT:15])"
//! );
//! ```

use std::fmt::Display;

use sensewatch_types::{Coordinate, Metric};

use super::{ConditionKind, Operator};

/// A scalar leaf.
pub fn condition(kind: ConditionKind, metric: Metric, threshold: impl Display) -> String {
    format!("[{}:{}:{}]", kind.code(), metric.name(), threshold)
}

/// A geofence leaf on the coordinate metric.
pub fn geofence(kind: ConditionKind, center: Coordinate, radius_m: f64) -> String {
    format!(
        "[{}:{}:{}:{}:{}]",
        kind.code(),
        Metric::COORDINATES.name(),
        center.lat,
        center.lon,
        radius_m
    )
}

fn combine(op: Operator, left: &str, right: &str) -> String {
    format!("({}:{}:{})", op.name(), left, right)
}

pub fn and_with(left: &str, right: &str) -> String {
    combine(Operator::And, left, right)
}

pub fn or_with(left: &str, right: &str) -> String {
    combine(Operator::Or, left, right)
}
