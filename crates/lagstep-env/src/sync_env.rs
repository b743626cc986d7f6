//! Inline batched environment.

use std::collections::VecDeque;

use lagstep_core::{AgentId, EnvOutput, Simulator};

use crate::batch::SimBatch;
use crate::environment::{BatchedEnvironment, Controls};
use crate::error::EnvError;

/// Batched environment that steps every instance inside `push`.
///
/// Holds at most one frame between a `push` and the matching `pop`.
pub struct SyncBatchedEnv<S: Simulator> {
    batch: SimBatch<S>,
    outputs: VecDeque<EnvOutput<S::State>>,
}

impl<S: Simulator> SyncBatchedEnv<S> {
    /// Reset every instance and buffer the first frame.
    pub fn new(sims: Vec<S>) -> Result<Self, EnvError> {
        let (batch, first) = SimBatch::start(sims)?;
        Ok(Self {
            batch,
            outputs: VecDeque::from([first]),
        })
    }

    /// Frames buffered and not yet popped.
    pub fn buffered(&self) -> usize {
        self.outputs.len()
    }
}

impl<S: Simulator> BatchedEnvironment for SyncBatchedEnv<S> {
    type State = S::State;
    type Control = S::Control;

    fn agents(&self) -> &[AgentId] {
        self.batch.agents()
    }

    fn num_envs(&self) -> usize {
        self.batch.len()
    }

    fn num_steps(&self) -> usize {
        1
    }

    fn push(&mut self, controls: Controls<S::Control>) -> Result<(), EnvError> {
        let out = self.batch.step(&controls)?;
        self.outputs.push_back(out);
        Ok(())
    }

    fn pop(&mut self) -> Result<EnvOutput<S::State>, EnvError> {
        self.outputs.pop_front().ok_or(EnvError::Empty)
    }

    fn peek(&mut self) -> Result<&EnvOutput<S::State>, EnvError> {
        self.outputs.front().ok_or(EnvError::Empty)
    }
}
