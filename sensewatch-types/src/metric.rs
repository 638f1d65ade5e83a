//! The metric catalogue.
//!
//! Every metric the middleware can observe is listed here once, with the
//! value kind its readings carry, the acquisition group that produces it and
//! the oscillation offset condition monitors use to avoid chattering around a
//! threshold.

use core::fmt;
use core::str::FromStr;

use crate::MetricValue;

/// Identifier of a single observable quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Metric(pub u16);

/// The value type carried by a metric's readings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum MetricKind {
    Long,
    Int,
    Float,
    Double,
    Byte,
    Coordinate,
}

impl MetricKind {
    /// Whether threshold conditions can be placed on this kind.
    pub fn is_scalar(&self) -> bool {
        !matches!(self, MetricKind::Coordinate)
    }
}

/// A set of metrics produced together by one acquisition source.
///
/// The middleware runs one scheduling service per group; all metrics of a
/// group are sampled in the same acquisition cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum MetricGroup {
    Battery,
    Cpu,
    Memory,
    Network,
    Accelerometer,
    Location,
    Telephony,
    Activity,
}

impl MetricGroup {
    /// All groups, in catalogue order.
    pub const ALL: [MetricGroup; 8] = [
        MetricGroup::Battery,
        MetricGroup::Cpu,
        MetricGroup::Memory,
        MetricGroup::Network,
        MetricGroup::Accelerometer,
        MetricGroup::Location,
        MetricGroup::Telephony,
        MetricGroup::Activity,
    ];

    /// Lowercase group name, as used in configuration files.
    pub fn name(&self) -> &'static str {
        match self {
            MetricGroup::Battery => "battery",
            MetricGroup::Cpu => "cpu",
            MetricGroup::Memory => "memory",
            MetricGroup::Network => "network",
            MetricGroup::Accelerometer => "accelerometer",
            MetricGroup::Location => "location",
            MetricGroup::Telephony => "telephony",
            MetricGroup::Activity => "activity",
        }
    }

    /// Metrics belonging to this group.
    pub fn metrics(&self) -> impl Iterator<Item = Metric> + '_ {
        CATALOGUE
            .iter()
            .filter(move |info| info.group == *self)
            .map(|info| info.metric)
    }
}

impl fmt::Display for MetricGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MetricGroup {
    type Err = UnknownGroup;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MetricGroup::ALL
            .iter()
            .copied()
            .find(|g| g.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownGroup(s.to_string()))
    }
}

/// Error returned when a group name is not in the catalogue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownGroup(pub String);

impl fmt::Display for UnknownGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown metric group: {}", self.0)
    }
}

impl std::error::Error for UnknownGroup {}

/// One catalogue entry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricInfo {
    pub metric: Metric,
    pub name: &'static str,
    pub kind: MetricKind,
    pub group: MetricGroup,
    /// Hysteresis margin for threshold conditions; `None` for coordinates,
    /// whose geofences use a fixed margin in meters.
    pub oscillation: Option<MetricValue>,
}

macro_rules! catalogue {
    ($( $konst:ident = $id:expr, $kind:ident, $group:ident, $osc:expr; )*) => {
        impl Metric {
            $( pub const $konst: Metric = Metric($id); )*
        }

        const CATALOGUE: &[MetricInfo] = &[
            $( MetricInfo {
                metric: Metric($id),
                name: stringify!($konst),
                kind: MetricKind::$kind,
                group: MetricGroup::$group,
                oscillation: $osc,
            }, )*
        ];
    };
}

catalogue! {
    BATTERY_PERCENT = 1, Byte, Battery, Some(MetricValue::Byte(2));
    BATTERY_VOLTAGE = 2, Int, Battery, Some(MetricValue::Int(50));
    BATTERY_TEMPERATURE = 3, Int, Battery, Some(MetricValue::Int(10));
    BATTERY_PLUGGED = 4, Byte, Battery, Some(MetricValue::Byte(1));

    CPU_LOAD1 = 10, Float, Cpu, Some(MetricValue::Float(5.0));
    CPU_LOAD5 = 11, Float, Cpu, Some(MetricValue::Float(5.0));
    CPU_LOAD15 = 12, Float, Cpu, Some(MetricValue::Float(5.0));
    CPU_USAGE = 13, Byte, Cpu, Some(MetricValue::Byte(5));

    MEMORY_TOTAL = 20, Long, Memory, Some(MetricValue::Long(100_000));
    MEMORY_AVAIL = 21, Long, Memory, Some(MetricValue::Long(100_000));
    MEMORY_CACHED = 22, Long, Memory, Some(MetricValue::Long(100_000));

    NET_RX_BYTES = 30, Long, Network, Some(MetricValue::Long(1_024));
    NET_TX_BYTES = 31, Long, Network, Some(MetricValue::Long(1_024));
    NET_SIGNAL_STRENGTH = 32, Int, Network, Some(MetricValue::Int(2));

    ACCEL_X = 40, Double, Accelerometer, Some(MetricValue::Double(0.5));
    ACCEL_Y = 41, Double, Accelerometer, Some(MetricValue::Double(0.5));
    ACCEL_Z = 42, Double, Accelerometer, Some(MetricValue::Double(0.5));

    COORDINATES = 50, Coordinate, Location, None;
    SPEED = 51, Float, Location, Some(MetricValue::Float(1.0));
    ALTITUDE = 52, Double, Location, Some(MetricValue::Double(5.0));

    CALL_COUNT = 60, Int, Telephony, Some(MetricValue::Int(1));
    SMS_COUNT = 61, Int, Telephony, Some(MetricValue::Int(1));
    CALL_STATE = 62, Byte, Telephony, Some(MetricValue::Byte(1));

    SCREEN_ON = 70, Byte, Activity, Some(MetricValue::Byte(1));
    APP_LAUNCHES = 71, Int, Activity, Some(MetricValue::Int(1));
}

impl Metric {
    /// Catalogue entry for this metric, if it exists.
    pub fn info(self) -> Option<&'static MetricInfo> {
        CATALOGUE.iter().find(|info| info.metric == self)
    }

    /// Resolve a metric from a numeric id or a catalogue name.
    ///
    /// Names are matched case-insensitively. Unknown ids resolve to `None`.
    pub fn lookup(token: &str) -> Option<Metric> {
        let token = token.trim();
        if let Ok(id) = token.parse::<u16>() {
            return Metric(id).info().map(|info| info.metric);
        }
        CATALOGUE
            .iter()
            .find(|info| info.name.eq_ignore_ascii_case(token))
            .map(|info| info.metric)
    }

    pub fn kind(self) -> Option<MetricKind> {
        self.info().map(|info| info.kind)
    }

    pub fn group(self) -> Option<MetricGroup> {
        self.info().map(|info| info.group)
    }

    /// Oscillation offset for threshold hysteresis.
    pub fn oscillation(self) -> Option<MetricValue> {
        self.info().and_then(|info| info.oscillation)
    }

    /// Catalogue name, or `"UNKNOWN"`.
    pub fn name(self) -> &'static str {
        self.info().map_or("UNKNOWN", |info| info.name)
    }

    /// Iterate over the whole catalogue.
    pub fn all() -> impl Iterator<Item = Metric> {
        CATALOGUE.iter().map(|info| info.metric)
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_by_name_and_id() {
        assert_eq!(Metric::lookup("CPU_LOAD1"), Some(Metric::CPU_LOAD1));
        assert_eq!(Metric::lookup("memory_avail"), Some(Metric::MEMORY_AVAIL));
        assert_eq!(Metric::lookup("1"), Some(Metric::BATTERY_PERCENT));
        assert_eq!(Metric::lookup("999"), None);
        assert_eq!(Metric::lookup("NOT_A_METRIC"), None);
    }

    #[test]
    fn ids_are_unique() {
        let mut ids: Vec<u16> = Metric::all().map(|m| m.0).collect();
        let total = ids.len();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), total);
    }

    #[test]
    fn oscillation_matches_kind() {
        for metric in Metric::all() {
            let info = metric.info().unwrap();
            match info.oscillation {
                Some(osc) => assert_eq!(osc.kind(), info.kind, "{}", metric),
                None => assert_eq!(info.kind, MetricKind::Coordinate),
            }
        }
    }

    #[test]
    fn every_group_has_metrics() {
        for group in MetricGroup::ALL {
            assert!(group.metrics().count() > 0, "{}", group);
        }
        assert_eq!(MetricGroup::Battery.metrics().count(), 4);
    }

    #[test]
    fn group_from_str() {
        assert_eq!("Battery".parse::<MetricGroup>(), Ok(MetricGroup::Battery));
        assert!("gpu".parse::<MetricGroup>().is_err());
    }

    #[test]
    fn display_includes_name_and_id() {
        assert_eq!(Metric::CPU_LOAD1.to_string(), "CPU_LOAD1(10)");
        assert_eq!(Metric(999).to_string(), "UNKNOWN(999)");
    }
}
