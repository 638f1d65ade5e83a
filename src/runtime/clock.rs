//! Millisecond wall clock backed by the tokio timer.

use std::time::Duration;

use sensewatch_types::{current_timestamp_ms, Timestamp};
use tokio::time::Instant;

/// Maps millisecond timestamps onto tokio instants.
///
/// Time advances with the tokio clock, so a paused test runtime drives the
/// schedules deterministically.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    origin: Instant,
    origin_ms: Timestamp,
}

impl Clock {
    /// A clock reading the current wall time.
    pub fn start() -> Self {
        Self::starting_at(current_timestamp_ms())
    }

    /// A clock reading `origin_ms` right now.
    pub fn starting_at(origin_ms: Timestamp) -> Self {
        Self {
            origin: Instant::now(),
            origin_ms,
        }
    }

    pub fn now(&self) -> Timestamp {
        self.origin_ms + self.origin.elapsed().as_millis() as u64
    }

    /// The tokio instant at which [`now`](Self::now) reaches `at`.
    pub fn instant(&self, at: Timestamp) -> Instant {
        self.origin + Duration::from_millis(at.saturating_sub(self.origin_ms))
    }
}
