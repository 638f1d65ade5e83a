//! Simulated acquisition source.
//!
//! Produces deterministic readings from per-metric waveforms so the
//! middleware can run without device readers.

use std::collections::BTreeMap;
use std::f64::consts::TAU;

use sensewatch_types::{
    Coordinate, Metric, MetricGroup, MetricKind, MetricValue, SampleValue, Timestamp,
};
use serde::Deserialize;

use super::AcquisitionSource;

/// Meters per degree of latitude.
const METERS_PER_DEGREE: f64 = 111_195.0;

/// Shape of a simulated metric over time.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "shape", rename_all = "lowercase")]
pub enum Waveform {
    Constant {
        value: f64,
    },
    Sine {
        base: f64,
        amplitude: f64,
        period_ms: u64,
    },
    /// Linear sweep from `from` to `to`, then restart.
    Sawtooth {
        from: f64,
        to: f64,
        period_ms: u64,
    },
    /// Circle around a point; only meaningful for coordinates.
    Orbit {
        lat: f64,
        lon: f64,
        radius_m: f64,
        period_ms: u64,
    },
}

impl Waveform {
    /// Phase in `[0, 1)` at `elapsed` ms.
    fn phase(elapsed: u64, period_ms: u64) -> f64 {
        if period_ms == 0 {
            0.0
        } else {
            (elapsed % period_ms) as f64 / period_ms as f64
        }
    }

    fn scalar(&self, elapsed: u64) -> f64 {
        match *self {
            Waveform::Constant { value } => value,
            Waveform::Sine {
                base,
                amplitude,
                period_ms,
            } => base + amplitude * (TAU * Self::phase(elapsed, period_ms)).sin(),
            Waveform::Sawtooth { from, to, period_ms } => {
                from + (to - from) * Self::phase(elapsed, period_ms)
            }
            Waveform::Orbit { radius_m, .. } => radius_m,
        }
    }

    fn coordinate(&self, elapsed: u64) -> Coordinate {
        match *self {
            Waveform::Orbit {
                lat,
                lon,
                radius_m,
                period_ms,
            } => {
                let angle = TAU * Self::phase(elapsed, period_ms);
                let dlat = radius_m * angle.cos() / METERS_PER_DEGREE;
                let dlon = radius_m * angle.sin() / (METERS_PER_DEGREE * lat.to_radians().cos());
                Coordinate::new(lat + dlat, lon + dlon)
            }
            _ => Coordinate::new(self.scalar(elapsed), 0.0),
        }
    }

    /// Sample for a metric of `kind`, `elapsed` ms after the source started.
    pub fn sample(&self, kind: MetricKind, elapsed: u64) -> Option<SampleValue> {
        match kind {
            MetricKind::Coordinate => Some(self.coordinate(elapsed).into()),
            MetricKind::Float | MetricKind::Double => {
                MetricValue::from_f64(kind, self.scalar(elapsed)).map(SampleValue::from)
            }
            _ => MetricValue::from_f64(kind, self.scalar(elapsed).round()).map(SampleValue::from),
        }
    }

    /// A plausible waveform for any catalogued metric.
    pub fn default_for(metric: Metric) -> Waveform {
        match metric {
            Metric::BATTERY_PERCENT => Waveform::Sawtooth {
                from: 100.0,
                to: 5.0,
                period_ms: 600_000,
            },
            Metric::BATTERY_VOLTAGE => Waveform::Sine {
                base: 3_900.0,
                amplitude: 200.0,
                period_ms: 300_000,
            },
            Metric::BATTERY_TEMPERATURE => Waveform::Sine {
                base: 300.0,
                amplitude: 40.0,
                period_ms: 120_000,
            },
            Metric::MEMORY_TOTAL => Waveform::Constant { value: 4_000_000.0 },
            Metric::MEMORY_AVAIL | Metric::MEMORY_CACHED => Waveform::Sine {
                base: 2_000_000.0,
                amplitude: 500_000.0,
                period_ms: 90_000,
            },
            Metric::NET_RX_BYTES | Metric::NET_TX_BYTES => Waveform::Sawtooth {
                from: 0.0,
                to: 10_000_000.0,
                period_ms: 3_600_000,
            },
            Metric::COORDINATES => Waveform::Orbit {
                lat: 51.5007,
                lon: -0.1246,
                radius_m: 500.0,
                period_ms: 120_000,
            },
            Metric::CPU_LOAD1 | Metric::CPU_LOAD5 | Metric::CPU_LOAD15 => Waveform::Sine {
                base: 1.0,
                amplitude: 0.8,
                period_ms: 60_000,
            },
            Metric::ACCEL_X | Metric::ACCEL_Y | Metric::ACCEL_Z => Waveform::Sine {
                base: 0.0,
                amplitude: 9.81,
                period_ms: 2_000,
            },
            _ => Waveform::Sine {
                base: 50.0,
                amplitude: 40.0,
                period_ms: 60_000,
            },
        }
    }
}

/// A source that synthesizes readings for one metric group.
#[derive(Debug, Clone)]
pub struct SimulatedSource {
    group: MetricGroup,
    description: String,
    waveforms: BTreeMap<Metric, Waveform>,
    started: Option<Timestamp>,
}

impl SimulatedSource {
    /// An empty source; add metrics with [`waveform`](Self::waveform).
    pub fn new(group: MetricGroup) -> Self {
        Self {
            group,
            description: format!("simulated: {}", group),
            waveforms: BTreeMap::new(),
            started: None,
        }
    }

    /// A source covering every metric of the group with default waveforms.
    pub fn with_defaults(group: MetricGroup) -> Self {
        group
            .metrics()
            .fold(Self::new(group), |source, metric| {
                source.waveform(metric, Waveform::default_for(metric))
            })
    }

    /// Set the waveform of one metric. Metrics outside the group are ignored.
    pub fn waveform(mut self, metric: Metric, waveform: Waveform) -> Self {
        if metric.group() == Some(self.group) {
            self.waveforms.insert(metric, waveform);
        }
        self
    }
}

impl AcquisitionSource for SimulatedSource {
    fn group(&self) -> MetricGroup {
        self.group
    }

    fn sample(&mut self, now: Timestamp) -> Vec<(Metric, SampleValue)> {
        let started = *self.started.get_or_insert(now);
        let elapsed = now.saturating_sub(started);
        self.waveforms
            .iter()
            .filter_map(|(metric, waveform)| {
                let kind = metric.kind()?;
                waveform.sample(kind, elapsed).map(|value| (*metric, value))
            })
            .collect()
    }

    fn description(&self) -> &str {
        &self.description
    }
}
