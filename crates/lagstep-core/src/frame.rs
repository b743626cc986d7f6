//! Per-frame data exchanged between the environment, agents and the worker.

use indexmap::IndexMap;

use crate::error::StackError;
use crate::id::AgentId;
use crate::stack::{project_frames, Column, Stack};

/// One decision for one environment instance.
///
/// Produced exactly once per consumed state by exactly one agent.
#[derive(Clone, Debug, PartialEq)]
pub struct Sample<A, H> {
    /// The chosen action (controller state).
    pub action: A,
    /// Log-probability of `action` under the policy that produced it.
    pub log_prob: f32,
    /// The agent's recurrent state after taking this decision.
    pub next_state: H,
}

/// One agent's decisions for a whole batch, one [`Sample`] per instance.
pub type Outputs<A, H> = Vec<Sample<A, H>>;

/// Time-major stack of [`Sample`]s, produced by [`Stack::stack`].
#[derive(Clone, Debug, PartialEq)]
pub struct StackedSample<SA, SH> {
    /// Stacked actions.
    pub action: SA,
    /// Log-probabilities, `[time, batch]`.
    pub log_prob: Column<f32>,
    /// Stacked recurrent states.
    pub next_state: SH,
}

impl<A, H> Stack for Sample<A, H>
where
    A: Stack + Clone,
    H: Stack + Clone,
{
    type Stacked = StackedSample<A::Stacked, H::Stacked>;

    fn stack(frames: &[Vec<Self>]) -> Result<Self::Stacked, StackError> {
        Ok(StackedSample {
            action: A::stack(&project_frames(frames, |s| s.action.clone()))?,
            log_prob: Column::from_frames(&project_frames(frames, |s| s.log_prob))?,
            next_state: H::stack(&project_frames(frames, |s| s.next_state.clone()))?,
        })
    }
}

/// One frame popped from a batched environment.
///
/// `states` holds, per agent, that agent's view of every instance.
/// `is_resetting[i]` is set on the frame at which instance `i` restarted
/// its episode; consumers treat such frames as episode boundaries.
#[derive(Clone, Debug, PartialEq)]
pub struct EnvOutput<S> {
    /// Per-agent state batch, one element per environment instance.
    pub states: IndexMap<AgentId, Vec<S>>,
    /// Per-instance episode-boundary flags.
    pub is_resetting: Vec<bool>,
}

impl<S> EnvOutput<S> {
    /// Number of environment instances in this frame.
    pub fn num_envs(&self) -> usize {
        self.is_resetting.len()
    }

    /// The state batch observed by `agent`.
    pub fn state(&self, agent: AgentId) -> Option<&[S]> {
        self.states.get(&agent).map(Vec::as_slice)
    }

    /// Agents present in this frame, in insertion order.
    pub fn agents(&self) -> Vec<AgentId> {
        self.states.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn samples_stack_field_by_field() {
        let frames = vec![
            vec![
                Sample {
                    action: 1i32,
                    log_prob: -0.5,
                    next_state: 10u64,
                },
                Sample {
                    action: 2,
                    log_prob: -0.25,
                    next_state: 20,
                },
            ],
            vec![
                Sample {
                    action: 3,
                    log_prob: 0.0,
                    next_state: 30,
                },
                Sample {
                    action: 4,
                    log_prob: -1.0,
                    next_state: 40,
                },
            ],
        ];
        let stacked = Sample::stack(&frames).unwrap();
        assert_eq!(stacked.action.as_slice(), &[1, 2, 3, 4]);
        assert_eq!(stacked.log_prob.row(0), Some(&[-0.5, -0.25][..]));
        assert_eq!(stacked.next_state.get(1, 1), Some(&40));
    }

    #[test]
    fn env_output_accessors() {
        let mut states = IndexMap::new();
        states.insert(AgentId(2), vec![7u8, 8]);
        states.insert(AgentId(1), vec![5u8, 6]);
        let out = EnvOutput {
            states,
            is_resetting: vec![false, true],
        };
        assert_eq!(out.num_envs(), 2);
        assert_eq!(out.state(AgentId(1)), Some(&[5u8, 6][..]));
        assert_eq!(out.state(AgentId(3)), None);
        assert_eq!(out.agents(), vec![AgentId(2), AgentId(1)]);
    }
}
