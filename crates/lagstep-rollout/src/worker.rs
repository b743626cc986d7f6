//! The delay-compensated rollout worker.
//!
//! # Step loop
//!
//! Each step pops one frame from the environment, pairs it with the oldest
//! entry of the pending-outputs ring (the decisions that produced it),
//! feeds the states to every agent, pops one new decision per agent,
//! appends those to the ring and pushes their decoded controls into the
//! environment.
//!
//! The ring holds `1 + min_delay` frames: one dummy frame at construction
//! plus `min_delay` priming pops on first start. Its length is constant
//! between steps.
//!
//! # Rollout boundary
//!
//! After `T` steps the worker peeks (does not pop) the next environment
//! frame and records it with the ring head (not dequeued), giving `T + 1`
//! frames. The next rollout pops the same frame and the same head, so
//! consecutive rollouts overlap by exactly one frame. Each agent then
//! exposes `delay - min_delay` decisions with `peek_n`; together with the
//! `min_delay` ring entries behind the head they are the agent's
//! `delayed_actions`.

use std::time::Instant;

use indexmap::IndexMap;
use lagstep_agent::{AgentOutputs, DelayedAgent};
use lagstep_core::{AgentId, ConfigError, EnvOutput, Policy, Profiler, RewardFunction};
use lagstep_env::{BatchedEnvironment, Controls};

use crate::config::check_buffer_sizes;
use crate::error::{agent_err, SyncError, WorkerError};
use crate::pending::PendingOutputs;
use crate::timings::RolloutTimings;
use crate::trajectory::{Trajectory, TrajectoryBuffer};

/// Every agent's decisions for one frame.
pub type PendingFrame<P> = IndexMap<AgentId, AgentOutputs<P>>;

/// Result of one [`RolloutWorker::rollout`] call.
pub struct Rollout<P: Policy> {
    /// One trajectory per agent, in the worker's agent order.
    pub trajectories: IndexMap<AgentId, Trajectory<P>>,
    /// Mean per-phase latency over the worker's lifetime.
    pub timings: RolloutTimings,
}

/// Lifecycle of a worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerPhase {
    /// Constructed and validated, components not started yet.
    Uninitialized,
    /// Started and primed; rollouts allowed.
    Running,
    /// Stopped after running; `start` resumes where it left off.
    Stopped,
    /// A rollout failed. The worker must be rebuilt.
    Failed,
}

struct AgentSlot<P: Policy> {
    agent: Box<dyn DelayedAgent<P>>,
    pop_profiler: Profiler,
}

/// Orchestrates delayed agents and one batched environment.
pub struct RolloutWorker<P, E>
where
    P: Policy,
    E: BatchedEnvironment<State = P::State, Control = P::Control>,
{
    agents: IndexMap<AgentId, AgentSlot<P>>,
    env: E,
    reward: Box<dyn RewardFunction<P::State>>,
    min_delay: usize,
    pending: PendingOutputs<PendingFrame<P>>,
    phase: WorkerPhase,
    primed: bool,
    env_pop_profiler: Profiler,
    env_push_profiler: Profiler,
}

fn decode_controls<P: Policy>(frame: &PendingFrame<P>) -> Controls<P::Control> {
    frame
        .iter()
        .map(|(&id, outputs)| (id, outputs.iter().map(|s| P::decode(&s.action)).collect()))
        .collect()
}

impl<P, E> RolloutWorker<P, E>
where
    P: Policy,
    E: BatchedEnvironment<State = P::State, Control = P::Control>,
{
    /// Validate the agent and environment configuration and build a worker.
    ///
    /// Fails if the environment has no instances, if the agent set
    /// differs from the environment's, if batch
    /// widths disagree, or if any agent violates
    /// `(batch_steps - 1) + (env_num_steps - 1) <= 1 + delay`.
    pub fn new(
        agents: IndexMap<AgentId, Box<dyn DelayedAgent<P>>>,
        env: E,
        reward: Box<dyn RewardFunction<P::State>>,
    ) -> Result<Self, WorkerError> {
        if agents.is_empty() {
            return Err(ConfigError::NoAgents.into());
        }
        if env.num_envs() == 0 {
            return Err(ConfigError::ZeroEnvs.into());
        }
        let mut ours: Vec<AgentId> = agents.keys().copied().collect();
        let mut theirs: Vec<AgentId> = env.agents().to_vec();
        ours.sort_unstable();
        theirs.sort_unstable();
        if ours != theirs {
            return Err(ConfigError::AgentSetMismatch {
                agents: agents.keys().copied().collect(),
                env_agents: env.agents().to_vec(),
            }
            .into());
        }
        if env.num_steps() == 0 {
            return Err(ConfigError::ZeroEnvSteps.into());
        }
        for (&id, agent) in &agents {
            if agent.batch_steps() == 0 {
                return Err(ConfigError::ZeroBatchSteps { agent: id }.into());
            }
            if agent.num_envs() != env.num_envs() {
                return Err(ConfigError::BatchSizeMismatch {
                    agent: id,
                    agent_batch: agent.num_envs(),
                    num_envs: env.num_envs(),
                }
                .into());
            }
            check_buffer_sizes(id, agent.batch_steps(), env.num_steps(), agent.delay())?;
        }

        let min_delay = agents.values().map(|a| a.delay()).min().unwrap_or(0);
        let mut pending = PendingOutputs::new(1 + min_delay);
        pending.push(
            agents
                .iter()
                .map(|(&id, a)| (id, a.dummy_outputs()))
                .collect(),
        )?;

        tracing::info!(
            agents = agents.len(),
            num_envs = env.num_envs(),
            env_num_steps = env.num_steps(),
            min_delay,
            "rollout worker constructed"
        );

        let agents = agents
            .into_iter()
            .map(|(id, agent)| {
                (
                    id,
                    AgentSlot {
                        agent,
                        pop_profiler: Profiler::default(),
                    },
                )
            })
            .collect();

        Ok(Self {
            agents,
            env,
            reward,
            min_delay,
            pending,
            phase: WorkerPhase::Uninitialized,
            primed: false,
            env_pop_profiler: Profiler::default(),
            env_push_profiler: Profiler::default(),
        })
    }

    /// Smallest agent delay.
    pub fn min_delay(&self) -> usize {
        self.min_delay
    }

    /// Current pending-outputs ring length.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> WorkerPhase {
        self.phase
    }

    /// Agents in trajectory order.
    pub fn agents(&self) -> impl Iterator<Item = AgentId> + '_ {
        self.agents.keys().copied()
    }

    /// Delay configured for `agent`.
    pub fn delay_of(&self, agent: AgentId) -> Option<usize> {
        self.agents.get(&agent).map(|s| s.agent.delay())
    }

    /// Number of environment instances.
    pub fn num_envs(&self) -> usize {
        self.env.num_envs()
    }

    /// Start the environment and every agent. The first start also primes
    /// the pipeline with `min_delay` decisions.
    pub fn start(&mut self) -> Result<(), WorkerError> {
        match self.phase {
            WorkerPhase::Running => return Err(WorkerError::AlreadyStarted),
            WorkerPhase::Failed => return Err(WorkerError::Failed),
            WorkerPhase::Uninitialized | WorkerPhase::Stopped => {}
        }
        let result = self.start_components();
        if result.is_err() {
            self.phase = WorkerPhase::Failed;
            self.stop_components();
        }
        result
    }

    fn start_components(&mut self) -> Result<(), WorkerError> {
        self.env.start()?;
        for (&id, slot) in self.agents.iter_mut() {
            slot.agent.start().map_err(agent_err(id))?;
        }
        if !self.primed {
            self.prime()?;
            self.primed = true;
        }
        self.phase = WorkerPhase::Running;
        tracing::info!(pending = self.pending.len(), "rollout worker started");
        Ok(())
    }

    /// Pop `min_delay` decisions from every agent into the ring and the
    /// environment.
    fn prime(&mut self) -> Result<(), WorkerError> {
        for _ in 0..self.min_delay {
            let mut frame = IndexMap::with_capacity(self.agents.len());
            for (&id, slot) in self.agents.iter_mut() {
                frame.insert(id, slot.agent.pop().map_err(agent_err(id))?);
            }
            let controls = decode_controls::<P>(&frame);
            self.pending.push(frame)?;
            self.env.push(controls)?;
        }
        tracing::debug!(min_delay = self.min_delay, "pipeline primed");
        Ok(())
    }

    /// Stop the environment and every agent, joining their threads.
    /// Idempotent.
    pub fn stop(&mut self) -> Result<(), WorkerError> {
        let mut first_err = self.env.stop().err().map(WorkerError::Env);
        for (&id, slot) in self.agents.iter_mut() {
            if let Err(error) = slot.agent.stop() {
                first_err = first_err.or(Some(WorkerError::Agent { agent: id, error }));
            }
        }
        if self.phase == WorkerPhase::Running {
            self.phase = WorkerPhase::Stopped;
            tracing::info!("rollout worker stopped");
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn stop_components(&mut self) {
        if let Err(e) = self.stop() {
            tracing::warn!(error = %e, "component failed to stop");
        }
    }

    /// Replace the policy parameters of the named agents. Applies to every
    /// state pushed after this call.
    pub fn update_variables(
        &mut self,
        params: IndexMap<AgentId, P::Params>,
    ) -> Result<(), WorkerError> {
        if self.phase == WorkerPhase::Failed {
            return Err(WorkerError::Failed);
        }
        if let Some(&agent) = params.keys().find(|id| !self.agents.contains_key(*id)) {
            return Err(WorkerError::UnknownAgent { agent });
        }
        for (id, p) in params {
            if let Some(slot) = self.agents.get_mut(&id) {
                slot.agent.update_params(p).map_err(agent_err(id))?;
            }
        }
        Ok(())
    }

    /// Run `num_steps` environment steps and return one trajectory per
    /// agent.
    ///
    /// Any failure leaves the worker in [`WorkerPhase::Failed`].
    pub fn rollout(&mut self, num_steps: usize) -> Result<Rollout<P>, WorkerError> {
        match self.phase {
            WorkerPhase::Running => {}
            WorkerPhase::Failed => return Err(WorkerError::Failed),
            WorkerPhase::Uninitialized | WorkerPhase::Stopped => {
                return Err(WorkerError::NotStarted)
            }
        }
        let result = self.run_rollout(num_steps);
        if let Err(e) = &result {
            tracing::error!(error = %e, "rollout failed, worker must be rebuilt");
            self.phase = WorkerPhase::Failed;
        }
        result
    }

    fn run_rollout(&mut self, num_steps: usize) -> Result<Rollout<P>, WorkerError> {
        let mut initial_states = Vec::with_capacity(self.agents.len());
        let mut buffers = Vec::with_capacity(self.agents.len());
        for (&id, slot) in &self.agents {
            initial_states.push(slot.agent.hidden_state().map_err(agent_err(id))?);
            buffers.push(TrajectoryBuffer::<P>::new(id, num_steps));
        }

        for _ in 0..num_steps {
            self.step(&mut buffers)?;
        }

        // Overlap frame: shared with the next rollout's first frame.
        let last = self.env.peek()?.clone();
        let head = self.pending.front().ok_or(SyncError::PendingUnderflow)?;
        record_frame(&mut buffers, last, head)?;

        let expected = 1 + self.min_delay;
        if self.pending.len() != expected {
            return Err(SyncError::PendingLength {
                expected,
                found: self.pending.len(),
            }
            .into());
        }

        let mut trajectories = IndexMap::with_capacity(self.agents.len());
        let parts = self.agents.iter_mut().zip(buffers).zip(initial_states);
        for (((&id, slot), buffer), initial_state) in parts {
            let drain = slot.agent.delay() - self.min_delay;
            let extra = slot.agent.peek_n(drain).map_err(agent_err(id))?;
            let left = slot.agent.pending_states();
            if left != 0 {
                return Err(SyncError::AgentNotDrained {
                    agent: id,
                    pending: left,
                }
                .into());
            }

            let mut delayed = Vec::with_capacity(slot.agent.delay());
            for frame in self.pending.iter().skip(1) {
                let outputs = frame
                    .get(&id)
                    .ok_or(SyncError::MissingAgentOutputs { agent: id })?;
                delayed.push(outputs.clone());
            }
            delayed.extend(extra);

            let trajectory =
                buffer.assemble(num_steps, self.reward.as_ref(), initial_state, delayed)?;
            trajectories.insert(id, trajectory);
        }

        tracing::debug!(
            num_steps,
            agents = trajectories.len(),
            "rollout finalized"
        );
        Ok(Rollout {
            trajectories,
            timings: self.timings(),
        })
    }

    /// One iteration of the step loop.
    fn step(&mut self, buffers: &mut [TrajectoryBuffer<P>]) -> Result<(), WorkerError> {
        let env = &mut self.env;
        let out = self.env_pop_profiler.time(|| env.pop())?;
        let applied = self.pending.pop()?;
        let EnvOutput {
            mut states,
            is_resetting,
        } = out;

        let mut per_agent = Vec::with_capacity(self.agents.len());
        for ((&id, _), buffer) in self.agents.iter().zip(buffers.iter_mut()) {
            let agent_states = states
                .swap_remove(&id)
                .ok_or(SyncError::MissingAgentStates { agent: id })?;
            let action = applied
                .get(&id)
                .ok_or(SyncError::MissingAgentOutputs { agent: id })?
                .clone();
            buffer.record(agent_states.clone(), action, is_resetting.clone());
            per_agent.push(agent_states);
        }

        for ((&id, slot), agent_states) in self.agents.iter_mut().zip(per_agent) {
            slot.agent
                .push(agent_states, is_resetting.clone())
                .map_err(agent_err(id))?;
        }

        let mut frame = IndexMap::with_capacity(self.agents.len());
        for (&id, slot) in self.agents.iter_mut() {
            let start = Instant::now();
            let outputs = slot.agent.pop().map_err(agent_err(id))?;
            slot.pop_profiler.record(start.elapsed());
            frame.insert(id, outputs);
        }

        let controls = decode_controls::<P>(&frame);
        self.pending.push(frame)?;
        let env = &mut self.env;
        self.env_push_profiler.time(|| env.push(controls))?;
        Ok(())
    }

    /// Lifetime mean latency of every phase.
    pub fn timings(&self) -> RolloutTimings {
        RolloutTimings {
            env_pop_us: self.env_pop_profiler.mean_us(),
            env_push_us: self.env_push_profiler.mean_us(),
            agent_pop_us: self
                .agents
                .iter()
                .map(|(&id, s)| (id, s.pop_profiler.mean_us()))
                .collect(),
            agent_step_us: self
                .agents
                .iter()
                .map(|(&id, s)| (id, s.agent.step_mean_us()))
                .collect(),
        }
    }
}

fn record_frame<P: Policy>(
    buffers: &mut [TrajectoryBuffer<P>],
    frame: EnvOutput<P::State>,
    outputs: &PendingFrame<P>,
) -> Result<(), SyncError> {
    let EnvOutput {
        mut states,
        is_resetting,
    } = frame;
    for buffer in buffers.iter_mut() {
        let id = buffer.agent();
        let agent_states = states
            .swap_remove(&id)
            .ok_or(SyncError::MissingAgentStates { agent: id })?;
        let action = outputs
            .get(&id)
            .ok_or(SyncError::MissingAgentOutputs { agent: id })?
            .clone();
        buffer.record(agent_states, action, is_resetting.clone());
    }
    Ok(())
}

impl<P, E> Drop for RolloutWorker<P, E>
where
    P: Policy,
    E: BatchedEnvironment<State = P::State, Control = P::Control>,
{
    fn drop(&mut self) {
        if self.phase == WorkerPhase::Running {
            self.stop_components();
        }
    }
}
