//! Per-agent trajectory buffers and their assembly into time-major records.

use lagstep_agent::AgentOutputs;
use lagstep_core::{AgentId, Column, Policy, RewardFunction, Sample, Stack, StackedSample};

use crate::error::{SyncError, WorkerError};

/// Stacked decisions of policy `P`.
pub type StackedActions<P> =
    StackedSample<<<P as Policy>::Action as Stack>::Stacked, <<P as Policy>::Hidden as Stack>::Stacked>;

/// One agent's time-major record of a rollout of `T` steps.
///
/// `states`, `actions` and `is_resetting` have `T + 1` frames, `rewards`
/// has `T`. `actions[i]` is the decision applied to the environment on the
/// transition into `states[i]`; with delay `D` it was decided on frame
/// `i - 1 - D`, counting frames across rollouts.
pub struct Trajectory<P: Policy> {
    /// The agent this record belongs to.
    pub agent: AgentId,
    /// Observed states.
    pub states: <P::State as Stack>::Stacked,
    /// Applied decisions, paired with `states`.
    pub actions: StackedActions<P>,
    /// Reward of each transition `states[t] -> states[t + 1]`.
    pub rewards: Column<f32>,
    /// Episode-boundary flags.
    pub is_resetting: Column<bool>,
    /// Recurrent state at the start of the rollout.
    pub initial_state: Vec<P::Hidden>,
    /// The agent's `delay` decisions already made but not yet reflected in
    /// `actions`, oldest first. They become the next rollout's
    /// `actions[1..=delay]`.
    pub delayed_actions: Vec<AgentOutputs<P>>,
}

impl<P: Policy> Trajectory<P> {
    /// Number of steps `T`.
    pub fn num_steps(&self) -> usize {
        self.rewards.time_len()
    }

    /// Sum of every reward in the record.
    pub fn total_reward(&self) -> f32 {
        self.rewards.as_slice().iter().sum()
    }
}

/// Per-frame buffers for one agent, filled during the step loop.
pub(crate) struct TrajectoryBuffer<P: Policy> {
    agent: AgentId,
    states: Vec<Vec<P::State>>,
    actions: Vec<AgentOutputs<P>>,
    is_resetting: Vec<Vec<bool>>,
}

impl<P: Policy> TrajectoryBuffer<P> {
    pub(crate) fn new(agent: AgentId, num_steps: usize) -> Self {
        Self {
            agent,
            states: Vec::with_capacity(num_steps + 1),
            actions: Vec::with_capacity(num_steps + 1),
            is_resetting: Vec::with_capacity(num_steps + 1),
        }
    }

    pub(crate) fn agent(&self) -> AgentId {
        self.agent
    }

    pub(crate) fn record(
        &mut self,
        states: Vec<P::State>,
        actions: AgentOutputs<P>,
        is_resetting: Vec<bool>,
    ) {
        self.states.push(states);
        self.actions.push(actions);
        self.is_resetting.push(is_resetting);
    }

    fn check_len(&self, field: &'static str, found: usize, expected: usize) -> Result<(), SyncError> {
        if found != expected {
            return Err(SyncError::TrajectoryShape {
                agent: self.agent,
                field,
                expected,
                found,
            });
        }
        Ok(())
    }

    /// Stack the buffers and compute rewards.
    pub(crate) fn assemble(
        self,
        num_steps: usize,
        reward: &dyn RewardFunction<P::State>,
        initial_state: Vec<P::Hidden>,
        delayed_actions: Vec<AgentOutputs<P>>,
    ) -> Result<Trajectory<P>, WorkerError> {
        self.check_len("states", self.states.len(), num_steps + 1)?;
        self.check_len("actions", self.actions.len(), num_steps + 1)?;
        self.check_len("is_resetting", self.is_resetting.len(), num_steps + 1)?;

        let rewards = reward.compute_rewards(&self.states);
        self.check_len("rewards", rewards.len(), num_steps)?;
        // No reward rows to infer the width from.
        let rewards = if rewards.is_empty() {
            let num_envs = self.states.first().map_or(0, Vec::len);
            Column::from_parts(Vec::new(), 0, num_envs)?
        } else {
            Column::from_frames(&rewards)?
        };

        Ok(Trajectory {
            agent: self.agent,
            states: <P::State as Stack>::stack(&self.states)?,
            actions: Sample::stack(&self.actions)?,
            rewards,
            is_resetting: Column::from_frames(&self.is_resetting)?,
            initial_state,
            delayed_actions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lagstep_test_utils::{counter_frame, unit_reward, EchoPolicy};

    fn outputs(action: i64, n: usize) -> AgentOutputs<EchoPolicy> {
        vec![
            Sample {
                action,
                log_prob: 0.0,
                next_state: 0,
            };
            n
        ]
    }

    #[test]
    fn assembles_time_major_record() {
        let mut buf = TrajectoryBuffer::<EchoPolicy>::new(AgentId(1), 2);
        for t in 0..3 {
            buf.record(counter_frame(t, 2), outputs(t as i64 - 1, 2), vec![t == 0; 2]);
        }
        let traj = buf
            .assemble(2, &unit_reward(), vec![0, 0], vec![outputs(9, 2)])
            .unwrap();
        assert_eq!(traj.agent, AgentId(1));
        assert_eq!(traj.states.tick.shape(), (3, 2));
        assert_eq!(traj.actions.action.row(2), Some(&[1, 1][..]));
        assert_eq!(traj.rewards.shape(), (2, 2));
        assert_eq!(traj.is_resetting.row(0), Some(&[true, true][..]));
        assert_eq!(traj.num_steps(), 2);
        assert_eq!(traj.total_reward(), 4.0);
        assert_eq!(traj.delayed_actions.len(), 1);
    }

    #[test]
    fn zero_steps_keep_batch_width() {
        let mut buf = TrajectoryBuffer::<EchoPolicy>::new(AgentId(0), 0);
        buf.record(counter_frame(4, 3), outputs(2, 3), vec![false; 3]);
        let traj = buf.assemble(0, &unit_reward(), vec![0; 3], Vec::new()).unwrap();
        assert_eq!(traj.states.tick.shape(), (1, 3));
        assert_eq!(traj.rewards.shape(), (0, 3));
        assert_eq!(traj.num_steps(), 0);
        assert_eq!(traj.total_reward(), 0.0);
    }

    #[test]
    fn short_buffers_are_a_sync_error() {
        let mut buf = TrajectoryBuffer::<EchoPolicy>::new(AgentId(0), 3);
        buf.record(counter_frame(0, 1), outputs(0, 1), vec![true]);
        let err = buf.assemble(3, &unit_reward(), vec![0], Vec::new()).err();
        assert_eq!(
            err,
            Some(WorkerError::Sync(SyncError::TrajectoryShape {
                agent: AgentId(0),
                field: "states",
                expected: 4,
                found: 1
            }))
        );
    }
}
