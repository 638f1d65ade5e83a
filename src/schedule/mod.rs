//! Per-metric subscriber lists.
//!
//! These are plain data structures with no knowledge of delivery or tasks;
//! the hubs in [`crate::hub`] drive them.

mod threshold;
mod timer;

pub use threshold::{Bound, ThresholdList, ThresholdNode};
pub use timer::{
    gcd, lcm, EavesdropList, EavesdropNode, Schedule, Schedules, TimerList, TimerNode,
};
