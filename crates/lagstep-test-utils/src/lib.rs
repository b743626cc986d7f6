//! Test utilities and mock types for lagstep development.
//!
//! The fixtures are built so that timing is observable in the data:
//! [`CounterState::tick`] counts frames since the instance was created,
//! and [`EchoPolicy`] acts with the tick it observed. A recorded action
//! therefore names the frame its decision was made on, which makes delay
//! alignment checkable with plain arithmetic.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;
pub mod spy;

pub use fixtures::{CounterSim, EchoPolicy, FailingPolicy, FailingSim};
pub use spy::{PeekLog, SpyAgent};

use lagstep_core::{project_frames, Column, PairwiseReward, Stack, StackError};

/// One agent's view of a [`CounterSim`] frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CounterState {
    /// Frames since the instance was created. Survives episode resets.
    pub tick: u64,
    /// Frames since the current episode started.
    pub frame: u64,
    /// Control this agent applied on the transition into this frame.
    /// `-1` before the first transition.
    pub control: i64,
}

/// Time-major stack of [`CounterState`]s.
#[derive(Clone, Debug, PartialEq)]
pub struct StackedCounter {
    pub tick: Column<u64>,
    pub frame: Column<u64>,
    pub control: Column<i64>,
}

impl Stack for CounterState {
    type Stacked = StackedCounter;

    fn stack(frames: &[Vec<Self>]) -> Result<StackedCounter, StackError> {
        Ok(StackedCounter {
            tick: u64::stack(&project_frames(frames, |s| s.tick))?,
            frame: u64::stack(&project_frames(frames, |s| s.frame))?,
            control: i64::stack(&project_frames(frames, |s| s.control))?,
        })
    }
}

/// A state with the given tick and episode frame and no applied control.
pub fn counter_state(tick: u64, frame: u64) -> CounterState {
    CounterState {
        tick,
        frame,
        control: -1,
    }
}

/// `n` identical states at `tick`.
pub fn counter_frame(tick: u64, n: usize) -> Vec<CounterState> {
    vec![counter_state(tick, tick); n]
}

pub type CounterRewardFn = fn(&CounterState, &CounterState) -> f32;

/// Reward function over [`CounterState`]s.
pub type CounterReward = PairwiseReward<CounterRewardFn>;

fn control_of_next(_prev: &CounterState, next: &CounterState) -> f32 {
    next.control as f32
}

/// Rewards each transition with the control applied on it.
pub fn control_reward() -> CounterReward {
    PairwiseReward::new(control_of_next as CounterRewardFn)
}

fn unit(_prev: &CounterState, _next: &CounterState) -> f32 {
    1.0
}

/// Rewards every transition with `1.0`.
pub fn unit_reward() -> CounterReward {
    PairwiseReward::new(unit as CounterRewardFn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lagstep_core::RewardFunction;

    #[test]
    fn counter_states_stack_per_field() {
        let frames = vec![counter_frame(0, 2), counter_frame(1, 2)];
        let stacked = CounterState::stack(&frames).unwrap();
        assert_eq!(stacked.tick.as_slice(), &[0, 0, 1, 1]);
        assert_eq!(stacked.control.shape(), (2, 2));
    }

    #[test]
    fn control_reward_reads_next_state() {
        let prev = counter_state(0, 0);
        let next = CounterState {
            control: 4,
            ..counter_state(1, 1)
        };
        let rewards = control_reward().compute_rewards(&[vec![prev], vec![next]]);
        assert_eq!(rewards, vec![vec![4.0]]);
    }
}
