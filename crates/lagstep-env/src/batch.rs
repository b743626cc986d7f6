//! Lockstep stepping of simulation instances.

use indexmap::IndexMap;
use lagstep_core::{AgentId, EnvOutput, Simulator};

use crate::environment::Controls;
use crate::error::EnvError;

/// A set of simulation instances that share one agent set.
///
/// Owns the per-instance reset policy: an instance whose step reports
/// `done` is reset immediately and its fresh state is emitted with the
/// reset flag set.
pub struct SimBatch<S: Simulator> {
    sims: Vec<S>,
    agents: Vec<AgentId>,
}

impl<S: Simulator> SimBatch<S> {
    /// Reset every instance and return the batch with its first frame.
    ///
    /// The first frame is flagged as resetting for every instance.
    pub fn start(mut sims: Vec<S>) -> Result<(Self, EnvOutput<S::State>), EnvError> {
        let mut per_instance = Vec::with_capacity(sims.len());
        for (env_index, sim) in sims.iter_mut().enumerate() {
            let states = sim
                .reset()
                .map_err(|error| EnvError::Sim { env_index, error })?;
            per_instance.push(states);
        }
        let agents: Vec<AgentId> = per_instance
            .first()
            .map(|s| s.keys().copied().collect())
            .unwrap_or_default();
        let batch = Self { sims, agents };
        let resets = vec![true; per_instance.len()];
        let first = batch.collate(per_instance, resets)?;
        Ok((batch, first))
    }

    /// Agents observed on instance 0's first frame.
    pub fn agents(&self) -> &[AgentId] {
        &self.agents
    }

    /// Number of instances.
    pub fn len(&self) -> usize {
        self.sims.len()
    }

    /// Whether the batch has no instances.
    pub fn is_empty(&self) -> bool {
        self.sims.is_empty()
    }

    /// Advance every instance by one frame.
    pub fn step(&mut self, controls: &Controls<S::Control>) -> Result<EnvOutput<S::State>, EnvError> {
        let num_envs = self.sims.len();
        for &agent in &self.agents {
            let batch = controls
                .get(&agent)
                .ok_or(EnvError::MissingControls { agent })?;
            if batch.len() != num_envs {
                return Err(EnvError::BatchMismatch {
                    agent,
                    expected: num_envs,
                    found: batch.len(),
                });
            }
        }

        let mut per_instance = Vec::with_capacity(num_envs);
        let mut resets = Vec::with_capacity(num_envs);
        for (env_index, sim) in self.sims.iter_mut().enumerate() {
            let instance_controls: IndexMap<AgentId, S::Control> = controls
                .iter()
                .map(|(&agent, batch)| (agent, batch[env_index].clone()))
                .collect();
            let step = sim
                .step(&instance_controls)
                .map_err(|error| EnvError::Sim { env_index, error })?;
            if step.done {
                let fresh = sim
                    .reset()
                    .map_err(|error| EnvError::Sim { env_index, error })?;
                per_instance.push(fresh);
                resets.push(true);
            } else {
                per_instance.push(step.states);
                resets.push(false);
            }
        }
        self.collate(per_instance, resets)
    }

    /// Transpose per-instance agent maps into per-agent batches.
    fn collate(
        &self,
        per_instance: Vec<IndexMap<AgentId, S::State>>,
        is_resetting: Vec<bool>,
    ) -> Result<EnvOutput<S::State>, EnvError> {
        let mut states: IndexMap<AgentId, Vec<S::State>> = self
            .agents
            .iter()
            .map(|&a| (a, Vec::with_capacity(per_instance.len())))
            .collect();
        for (env_index, mut instance) in per_instance.into_iter().enumerate() {
            if instance.len() != self.agents.len() {
                return Err(EnvError::AgentSetMismatch { env_index });
            }
            for (agent, batch) in states.iter_mut() {
                let state = instance
                    .swap_remove(agent)
                    .ok_or(EnvError::AgentSetMismatch { env_index })?;
                batch.push(state);
            }
        }
        Ok(EnvOutput {
            states,
            is_resetting,
        })
    }
}
