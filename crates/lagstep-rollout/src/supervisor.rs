//! Periodic and failure-driven worker reconstruction.
//!
//! A failed rollout leaves a [`RolloutWorker`] unusable, and long-lived
//! workers may be recycled on a schedule. The supervisor owns a factory
//! and rebuilds the worker when either happens, replaying the latest
//! parameters and running burn-in rollouts whose results are discarded.

use indexmap::IndexMap;
use lagstep_core::{AgentId, Policy};
use lagstep_env::BatchedEnvironment;

use crate::error::WorkerError;
use crate::worker::{Rollout, RolloutWorker, WorkerPhase};

/// Rebuild schedule.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SupervisorConfig {
    /// Rebuild after this many rollouts. `None` rebuilds only on failure.
    pub reset_every_n_rollouts: Option<usize>,
    /// Discarded rollouts after each build.
    pub burnin_rollouts: usize,
    /// Steps per burn-in rollout.
    pub burnin_steps: usize,
}

/// Owns a worker and rebuilds it from a factory as needed.
pub struct WorkerSupervisor<P, E, F>
where
    P: Policy,
    E: BatchedEnvironment<State = P::State, Control = P::Control>,
    F: FnMut() -> Result<RolloutWorker<P, E>, WorkerError>,
{
    factory: F,
    config: SupervisorConfig,
    worker: Option<RolloutWorker<P, E>>,
    rollouts_since_build: usize,
    builds: usize,
    params: IndexMap<AgentId, P::Params>,
}

impl<P, E, F> WorkerSupervisor<P, E, F>
where
    P: Policy,
    E: BatchedEnvironment<State = P::State, Control = P::Control>,
    F: FnMut() -> Result<RolloutWorker<P, E>, WorkerError>,
{
    /// Build, start and burn in the first worker.
    pub fn new(factory: F, config: SupervisorConfig) -> Result<Self, WorkerError> {
        let mut sup = Self {
            factory,
            config,
            worker: None,
            rollouts_since_build: 0,
            builds: 0,
            params: IndexMap::new(),
        };
        sup.rebuild()?;
        Ok(sup)
    }

    /// Number of workers built so far.
    pub fn builds(&self) -> usize {
        self.builds
    }

    /// The current worker, if one is alive.
    pub fn worker(&self) -> Option<&RolloutWorker<P, E>> {
        self.worker.as_ref()
    }

    fn needs_rebuild(&self) -> bool {
        match &self.worker {
            None => true,
            Some(w) if w.phase() == WorkerPhase::Failed => true,
            Some(_) => self
                .config
                .reset_every_n_rollouts
                .is_some_and(|n| self.rollouts_since_build >= n),
        }
    }

    fn rebuild(&mut self) -> Result<(), WorkerError> {
        if let Some(old) = self.worker.take() {
            if old.phase() == WorkerPhase::Failed {
                tracing::warn!(builds = self.builds, "rebuilding failed worker");
            } else {
                tracing::info!(
                    rollouts = self.rollouts_since_build,
                    "recycling worker on schedule"
                );
            }
        }

        let mut worker = (self.factory)()?;
        if !self.params.is_empty() {
            worker.update_variables(self.params.clone())?;
        }
        worker.start()?;
        for _ in 0..self.config.burnin_rollouts {
            worker.rollout(self.config.burnin_steps)?;
        }
        self.builds += 1;
        self.rollouts_since_build = 0;
        self.worker = Some(worker);
        tracing::debug!(
            builds = self.builds,
            burnin = self.config.burnin_rollouts,
            "worker built"
        );
        Ok(())
    }

    /// Run one rollout, rebuilding first if the worker failed or is due
    /// for recycling. A failure is returned and the worker is rebuilt on
    /// the next call.
    pub fn rollout(&mut self, num_steps: usize) -> Result<Rollout<P>, WorkerError> {
        if self.needs_rebuild() {
            self.rebuild()?;
        }
        let worker = self.worker.as_mut().ok_or(WorkerError::Failed)?;
        let result = worker.rollout(num_steps);
        self.rollouts_since_build += 1;
        result
    }

    /// Update parameters on the current worker and remember them for
    /// future rebuilds.
    pub fn update_variables(
        &mut self,
        params: IndexMap<AgentId, P::Params>,
    ) -> Result<(), WorkerError> {
        for (id, p) in &params {
            self.params.insert(*id, p.clone());
        }
        match self.worker.as_mut() {
            Some(w) if w.phase() != WorkerPhase::Failed => w.update_variables(params),
            _ => Ok(()),
        }
    }
}
