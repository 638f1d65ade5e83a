//! Records exchanged with clients and persistence.

use core::fmt;

use crate::{Metric, SampleValue, SchemaVersion, Timestamp};

/// Process-assigned identifier of a monitor registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct MonitorId(pub u64);

impl fmt::Display for MonitorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A single timestamped value.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Reading {
    pub timestamp_ms: Timestamp,
    pub value: SampleValue,
}

impl Reading {
    pub fn new(timestamp_ms: Timestamp, value: impl Into<SampleValue>) -> Self {
        Self {
            timestamp_ms,
            value: value.into(),
        }
    }
}

/// Readings delivered to one monitor, flushed to persistence together.
///
/// Readings are in acquisition order.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Batch {
    /// Schema version for report reconstruction.
    pub version: SchemaVersion,
    pub monitor: MonitorId,
    pub metric: Metric,
    pub readings: Vec<Reading>,
}

impl Batch {
    pub fn new(monitor: MonitorId, metric: Metric, readings: Vec<Reading>) -> Self {
        Self {
            version: SchemaVersion::current(),
            monitor,
            metric,
            readings,
        }
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    /// Whether this build can rebuild readings from the batch.
    pub fn is_readable(&self) -> bool {
        SchemaVersion::current().can_read(self.version)
    }
}

/// One value pushed to a periodic or opportunistic monitor.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Delivery {
    pub monitor: MonitorId,
    pub metric: Metric,
    pub timestamp_ms: Timestamp,
    pub value: SampleValue,
}

/// Notification that an event expression became true.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EventNotice {
    pub monitor: MonitorId,
    pub timestamp_ms: Timestamp,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MetricValue;

    #[test]
    fn batch_carries_current_version() {
        let batch = Batch::new(
            MonitorId(3),
            Metric::BATTERY_PERCENT,
            vec![Reading::new(1_000, MetricValue::Byte(80))],
        );
        assert_eq!(batch.version, SchemaVersion::current());
        assert!(batch.is_readable());
        assert_eq!(batch.len(), 1);
        assert!(!batch.is_empty());
    }

    #[test]
    fn monitor_id_display() {
        assert_eq!(MonitorId(42).to_string(), "#42");
    }

    #[cfg(feature = "serde")]
    #[test]
    fn batch_serializes_as_json_line() {
        let batch = Batch::new(
            MonitorId(7),
            Metric::MEMORY_AVAIL,
            vec![Reading::new(5, MetricValue::Long(2_100_000))],
        );
        let json = serde_json::to_string(&batch).unwrap();
        assert!(json.contains(r#""monitor":7"#));
        assert!(json.contains(r#""metric":21"#));
        let back: Batch = serde_json::from_str(&json).unwrap();
        assert_eq!(back, batch);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn batch_from_other_major_is_unreadable() {
        let json = r#"{"version":{"major":99,"minor":0},"monitor":1,"metric":1,"readings":[]}"#;
        let batch: Batch = serde_json::from_str(json).unwrap();
        assert!(!batch.is_readable());
    }
}
