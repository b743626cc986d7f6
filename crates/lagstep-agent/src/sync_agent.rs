//! Inline delay buffer.

use std::collections::VecDeque;

use lagstep_core::{Policy, Profiler};

use crate::delayed::{dummy_outputs, AgentOutputs, DelayedAgent, InferenceCore};
use crate::error::AgentError;

/// Delay buffer that decides each pushed frame immediately.
///
/// The output queue starts with `delay` dummy decisions, so the queue
/// length is always `delay + pushes - pops`.
pub struct SyncDelayedAgent<P: Policy> {
    core: InferenceCore<P>,
    delay: usize,
    num_envs: usize,
    outputs: VecDeque<AgentOutputs<P>>,
    dummy: AgentOutputs<P>,
    step_profiler: Profiler,
}

impl<P: Policy> SyncDelayedAgent<P> {
    /// Wrap `policy` for `num_envs` instances with `delay` frames of latency.
    pub fn new(policy: P, num_envs: usize, delay: usize) -> Self {
        let dummy = dummy_outputs(&policy, num_envs);
        let outputs = std::iter::repeat_with(|| dummy.clone())
            .take(delay)
            .collect();
        Self {
            core: InferenceCore::new(policy, num_envs),
            delay,
            num_envs,
            outputs,
            dummy,
            step_profiler: Profiler::default(),
        }
    }

    /// Decisions currently buffered, dummies included.
    pub fn buffered(&self) -> usize {
        self.outputs.len()
    }
}

impl<P: Policy> DelayedAgent<P> for SyncDelayedAgent<P> {
    fn delay(&self) -> usize {
        self.delay
    }

    fn batch_steps(&self) -> usize {
        1
    }

    fn num_envs(&self) -> usize {
        self.num_envs
    }

    fn push(&mut self, states: Vec<P::State>, is_resetting: Vec<bool>) -> Result<(), AgentError> {
        if states.len() != self.num_envs || is_resetting.len() != self.num_envs {
            return Err(AgentError::BatchMismatch {
                expected: self.num_envs,
                found: states.len(),
            });
        }
        let core = &mut self.core;
        let outputs = self
            .step_profiler
            .time(|| core.step(&states, &is_resetting))?;
        self.outputs.push_back(outputs);
        Ok(())
    }

    fn pop(&mut self) -> Result<AgentOutputs<P>, AgentError> {
        self.outputs.pop_front().ok_or(AgentError::NothingReady {
            requested: 1,
            available: 0,
        })
    }

    fn peek_n(&mut self, n: usize) -> Result<Vec<AgentOutputs<P>>, AgentError> {
        if self.outputs.len() < n {
            return Err(AgentError::NothingReady {
                requested: n,
                available: self.outputs.len(),
            });
        }
        Ok(self.outputs.iter().take(n).cloned().collect())
    }

    fn pending_states(&self) -> usize {
        0
    }

    fn hidden_state(&self) -> Result<Vec<P::Hidden>, AgentError> {
        Ok(self.core.hidden.clone())
    }

    fn dummy_outputs(&self) -> AgentOutputs<P> {
        self.dummy.clone()
    }

    fn start(&mut self) -> Result<(), AgentError> {
        Ok(())
    }

    fn stop(&mut self) -> Result<(), AgentError> {
        Ok(())
    }

    fn update_params(&mut self, params: P::Params) -> Result<(), AgentError> {
        self.core.policy.set_params(params)?;
        Ok(())
    }

    fn step_mean_us(&self) -> f64 {
        self.step_profiler.mean_us()
    }
}
