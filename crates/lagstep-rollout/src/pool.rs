//! Fan-out of rollouts over several hosted workers.

use indexmap::IndexMap;
use lagstep_core::{AgentId, Policy};
use lagstep_env::BatchedEnvironment;

use crate::error::WorkerError;
use crate::evaluator::RolloutMetrics;
use crate::remote::RemoteRolloutWorker;
use crate::timings::RolloutTimings;
use crate::worker::{Rollout, RolloutWorker};

/// Results of one pool-wide rollout.
pub struct PoolRollout<P: Policy> {
    /// Each worker's rollout, in pool order.
    pub rollouts: Vec<Rollout<P>>,
    /// Per-agent metrics summed over workers.
    pub metrics: IndexMap<AgentId, RolloutMetrics>,
    /// Timings averaged over workers.
    pub timings: RolloutTimings,
}

/// A set of hosted workers driven in lockstep.
pub struct WorkerPool<P: Policy> {
    workers: Vec<RemoteRolloutWorker<P>>,
}

impl<P: Policy> WorkerPool<P>
where
    Rollout<P>: Send,
{
    /// Host each worker on its own thread.
    pub fn spawn<E>(workers: Vec<RolloutWorker<P, E>>) -> Result<Self, WorkerError>
    where
        E: BatchedEnvironment<State = P::State, Control = P::Control> + 'static,
    {
        let workers = workers
            .into_iter()
            .map(RemoteRolloutWorker::spawn)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { workers })
    }

    /// Pool over already hosted workers.
    pub fn from_remotes(workers: Vec<RemoteRolloutWorker<P>>) -> Self {
        Self { workers }
    }

    /// Number of workers.
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    /// Whether the pool has no workers.
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Start every worker.
    pub fn start(&self) -> Result<(), WorkerError> {
        self.workers.iter().try_for_each(RemoteRolloutWorker::start)
    }

    /// Stop every worker, reporting the first failure after trying all.
    pub fn stop(&self) -> Result<(), WorkerError> {
        let mut first_err = None;
        for w in &self.workers {
            if let Err(e) = w.stop() {
                first_err = first_err.or(Some(e));
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    /// Send the same parameters to every worker.
    pub fn update_variables(&self, params: &IndexMap<AgentId, P::Params>) -> Result<(), WorkerError> {
        self.workers
            .iter()
            .try_for_each(|w| w.update_variables(params.clone()))
    }

    /// Run one rollout on every worker concurrently.
    ///
    /// Waits for every worker before reporting, so no request is left in
    /// flight; the first error wins.
    pub fn rollout(&self, num_steps: usize) -> Result<PoolRollout<P>, WorkerError> {
        let tickets = self
            .workers
            .iter()
            .map(|w| w.request_rollout(num_steps))
            .collect::<Result<Vec<_>, _>>()?;

        let mut rollouts = Vec::with_capacity(tickets.len());
        let mut first_err = None;
        for ticket in tickets {
            match ticket.wait() {
                Ok(r) => rollouts.push(r),
                Err(e) => first_err = first_err.or(Some(e)),
            }
        }
        if let Some(e) = first_err {
            return Err(e);
        }

        let mut metrics = IndexMap::new();
        for r in &rollouts {
            RolloutMetrics::accumulate(&mut metrics, &RolloutMetrics::from_rollout(r));
        }
        let timings = RolloutTimings::mean(rollouts.iter().map(|r| &r.timings));
        Ok(PoolRollout {
            rollouts,
            metrics,
            timings,
        })
    }
}
