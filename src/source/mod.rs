//! Acquisition source abstraction.
//!
//! Each metric group is backed by one source. The middleware polls it
//! whenever the group's next wake comes due; sources never call back into
//! the middleware themselves.

mod scripted;
mod simulated;

pub use scripted::ScriptedSource;
pub use simulated::{SimulatedSource, Waveform};

use std::fmt::Debug;

use sensewatch_types::{Metric, MetricGroup, SampleValue, Timestamp};

/// Trait for acquiring fresh readings of one metric group.
///
/// # Example
///
/// ```
/// use sensewatch::{AcquisitionSource, SimulatedSource};
/// use sensewatch_types::MetricGroup;
///
/// let mut source = SimulatedSource::with_defaults(MetricGroup::Battery);
/// let readings = source.sample(1_000);
/// assert!(!readings.is_empty());
/// ```
pub trait AcquisitionSource: Send + Debug {
    /// The group this source serves.
    fn group(&self) -> MetricGroup;

    /// Acquire readings at `now`.
    ///
    /// Returns one value per metric the source could read; metrics it could
    /// not read are left out. This method should be non-blocking.
    fn sample(&mut self, now: Timestamp) -> Vec<(Metric, SampleValue)>;

    /// Returns a human-readable description of the source.
    fn description(&self) -> &str;
}
