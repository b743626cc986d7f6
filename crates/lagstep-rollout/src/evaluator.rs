//! Reward-only evaluation runs.

use indexmap::IndexMap;
use lagstep_core::{AgentId, Policy};
use lagstep_env::BatchedEnvironment;

use crate::error::WorkerError;
use crate::worker::{Rollout, RolloutWorker, WorkerPhase};

/// Summary of one agent's rollout.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RolloutMetrics {
    /// Sum of rewards over every instance and step.
    pub reward: f32,
}

impl RolloutMetrics {
    /// Per-agent metrics of a rollout.
    pub fn from_rollout<P: Policy>(rollout: &Rollout<P>) -> IndexMap<AgentId, RolloutMetrics> {
        rollout
            .trajectories
            .iter()
            .map(|(&id, t)| {
                (
                    id,
                    RolloutMetrics {
                        reward: t.total_reward(),
                    },
                )
            })
            .collect()
    }

    /// Add `other` into `into`, agent by agent.
    pub fn accumulate(
        into: &mut IndexMap<AgentId, RolloutMetrics>,
        other: &IndexMap<AgentId, RolloutMetrics>,
    ) {
        for (&id, m) in other {
            into.entry(id).or_default().reward += m.reward;
        }
    }
}

/// Runs rollouts for their metrics only.
pub struct Evaluator<P, E>
where
    P: Policy,
    E: BatchedEnvironment<State = P::State, Control = P::Control>,
{
    worker: RolloutWorker<P, E>,
}

impl<P, E> Evaluator<P, E>
where
    P: Policy,
    E: BatchedEnvironment<State = P::State, Control = P::Control>,
{
    /// Wrap a worker.
    pub fn new(worker: RolloutWorker<P, E>) -> Self {
        Self { worker }
    }

    /// Optionally update parameters, run one rollout and return per-agent
    /// metrics. Starts the worker if needed.
    pub fn evaluate(
        &mut self,
        num_steps: usize,
        params: Option<IndexMap<AgentId, P::Params>>,
    ) -> Result<IndexMap<AgentId, RolloutMetrics>, WorkerError> {
        if let Some(params) = params {
            self.worker.update_variables(params)?;
        }
        if self.worker.phase() != WorkerPhase::Running {
            self.worker.start()?;
        }
        let rollout = self.worker.rollout(num_steps)?;
        Ok(RolloutMetrics::from_rollout(&rollout))
    }

    /// The wrapped worker.
    pub fn worker(&self) -> &RolloutWorker<P, E> {
        &self.worker
    }

    /// Unwrap the worker.
    pub fn into_inner(self) -> RolloutWorker<P, E> {
        self.worker
    }
}
