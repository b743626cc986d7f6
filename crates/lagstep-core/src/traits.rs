//! Capabilities the rollout pipeline consumes from its collaborators.
//!
//! The pipeline never looks inside a decision function, a simulation, or a
//! reward computation. It only needs the narrow contracts below.

use indexmap::IndexMap;

use crate::error::{PolicyError, SimError};
use crate::frame::Outputs;
use crate::id::AgentId;
use crate::stack::Stack;

/// A batched decision function.
///
/// `sample` maps one frame of states (one per environment instance) and
/// the matching recurrent states to one [`Sample`](crate::Sample) per
/// instance. Implementations may be stateful (e.g. hold an RNG) but must
/// not keep per-instance recurrent state themselves; the delay buffer
/// owns that.
pub trait Policy: Send + 'static {
    /// Per-instance observation.
    type State: Stack + Clone + Send + 'static;
    /// Per-instance action as recorded in trajectories.
    type Action: Stack + Clone + Send + 'static;
    /// Per-instance recurrent state.
    type Hidden: Stack + Clone + Send + 'static;
    /// Environment-native control input decoded from an action.
    type Control: Clone + Send + 'static;
    /// Parameters pushed by the learner between rollouts.
    type Params: Clone + Send + 'static;

    /// Recurrent state for a fresh episode.
    fn initial_state(&self) -> Self::Hidden;

    /// Placeholder action emitted before any real decision exists.
    fn dummy_action(&self) -> Self::Action;

    /// Decide one frame for every instance.
    fn sample(
        &mut self,
        states: &[Self::State],
        hidden: &[Self::Hidden],
    ) -> Result<Outputs<Self::Action, Self::Hidden>, PolicyError>;

    /// Decode an action into the control input the simulation consumes.
    fn decode(action: &Self::Action) -> Self::Control;

    /// Replace the policy parameters.
    fn set_params(&mut self, params: Self::Params) -> Result<(), PolicyError>;
}

/// Result of advancing one simulation instance by one frame.
#[derive(Clone, Debug, PartialEq)]
pub struct SimStep<S> {
    /// Each agent's view of the new frame.
    pub states: IndexMap<AgentId, S>,
    /// The episode ended on this frame.
    pub done: bool,
}

/// A single simulation instance driven by per-agent controls.
pub trait Simulator: Send + 'static {
    /// Per-agent observation of one frame.
    type State: Clone + Send + 'static;
    /// Per-agent control input.
    type Control: Clone + Send + 'static;

    /// Start a new episode and return each agent's view of its first frame.
    fn reset(&mut self) -> Result<IndexMap<AgentId, Self::State>, SimError>;

    /// Advance one frame.
    fn step(
        &mut self,
        controls: &IndexMap<AgentId, Self::Control>,
    ) -> Result<SimStep<Self::State>, SimError>;
}

/// A pure reward function over a time-major state sequence.
///
/// Given `T + 1` frames it returns `T` frames of per-instance rewards,
/// reward `t` belonging to the transition from frame `t` to `t + 1`.
pub trait RewardFunction<S>: Send {
    /// Compute rewards for consecutive frame pairs.
    fn compute_rewards(&self, states: &[Vec<S>]) -> Vec<Vec<f32>>;
}

/// A [`RewardFunction`] built from a per-instance `(prev, next)` closure.
pub struct PairwiseReward<F> {
    f: F,
}

impl<F> PairwiseReward<F> {
    /// Wrap a closure computing the reward of one transition.
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<S, F> RewardFunction<S> for PairwiseReward<F>
where
    F: Fn(&S, &S) -> f32 + Send,
{
    fn compute_rewards(&self, states: &[Vec<S>]) -> Vec<Vec<f32>> {
        states
            .windows(2)
            .map(|pair| {
                pair[0]
                    .iter()
                    .zip(&pair[1])
                    .map(|(prev, next)| (self.f)(prev, next))
                    .collect()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pairwise_reward_yields_one_fewer_frame() {
        let reward = PairwiseReward::new(|a: &i32, b: &i32| (b - a) as f32);
        let states = vec![vec![0, 10], vec![1, 8], vec![5, 8]];
        let rewards = reward.compute_rewards(&states);
        assert_eq!(rewards, vec![vec![1.0, -2.0], vec![4.0, 0.0]]);
    }

    #[test]
    fn pairwise_reward_on_single_frame_is_empty() {
        let reward = PairwiseReward::new(|_: &i32, _: &i32| 1.0);
        assert!(reward.compute_rewards(&[vec![3]]).is_empty());
    }
}
