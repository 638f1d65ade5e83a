//! Scripted acquisition source.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use sensewatch_types::{Metric, MetricGroup, SampleValue, Timestamp};

use super::AcquisitionSource;

/// A source that replays queued readings, one frame per sample.
///
/// Clones share the same queue, so a test can keep a handle and push frames
/// after the source has been handed to the middleware. When the queue runs
/// dry the last frame is repeated, or nothing if there never was one.
///
/// # Example
///
/// ```
/// use sensewatch::{AcquisitionSource, ScriptedSource};
/// use sensewatch_types::{Metric, MetricGroup, MetricValue};
///
/// let source = ScriptedSource::new(MetricGroup::Battery);
/// let mut handle = source.clone();
/// source.push(vec![(Metric::BATTERY_PERCENT, MetricValue::Byte(80).into())]);
/// assert_eq!(handle.sample(0).len(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct ScriptedSource {
    group: MetricGroup,
    description: String,
    frames: Arc<Mutex<Script>>,
}

#[derive(Debug, Default)]
struct Script {
    queue: VecDeque<Vec<(Metric, SampleValue)>>,
    last: Vec<(Metric, SampleValue)>,
}

impl ScriptedSource {
    pub fn new(group: MetricGroup) -> Self {
        Self {
            group,
            description: format!("scripted: {}", group),
            frames: Arc::new(Mutex::new(Script::default())),
        }
    }

    /// Queue one frame of readings.
    pub fn push(&self, frame: Vec<(Metric, SampleValue)>) {
        self.frames.lock().queue.push_back(frame);
    }

    /// Queue one reading as its own frame.
    pub fn push_value(&self, metric: Metric, value: impl Into<SampleValue>) {
        self.push(vec![(metric, value.into())]);
    }

    /// Number of frames not yet sampled.
    pub fn pending(&self) -> usize {
        self.frames.lock().queue.len()
    }
}

impl AcquisitionSource for ScriptedSource {
    fn group(&self) -> MetricGroup {
        self.group
    }

    fn sample(&mut self, _now: Timestamp) -> Vec<(Metric, SampleValue)> {
        let mut script = self.frames.lock();
        if let Some(frame) = script.queue.pop_front() {
            script.last = frame;
        }
        script.last.clone()
    }

    fn description(&self) -> &str {
        &self.description
    }
}
