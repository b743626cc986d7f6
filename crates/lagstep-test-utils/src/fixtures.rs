//! Reusable policy and simulation fixtures.
//!
//! - [`EchoPolicy`]: acts with the tick it observed, plus a parameter offset.
//! - [`FailingPolicy`]: an [`EchoPolicy`] that fails after N calls.
//! - [`CounterSim`]: counts frames, echoes controls, optional fixed-length episodes.
//! - [`FailingSim`]: a [`CounterSim`] that fails after N steps.

use indexmap::IndexMap;
use lagstep_core::{
    AgentId, Outputs, Policy, PolicyError, Sample, SimError, SimStep, Simulator,
};

use crate::CounterState;

/// Deterministic policy whose action is the observed tick plus an offset.
///
/// The recurrent state counts decisions since the last reset. `Params`
/// replaces the offset.
#[derive(Clone, Debug, Default)]
pub struct EchoPolicy {
    pub offset: i64,
}

impl EchoPolicy {
    pub fn with_offset(offset: i64) -> Self {
        Self { offset }
    }
}

impl Policy for EchoPolicy {
    type State = CounterState;
    type Action = i64;
    type Hidden = u64;
    type Control = i64;
    type Params = i64;

    fn initial_state(&self) -> u64 {
        0
    }

    fn dummy_action(&self) -> i64 {
        -1
    }

    fn sample(
        &mut self,
        states: &[CounterState],
        hidden: &[u64],
    ) -> Result<Outputs<i64, u64>, PolicyError> {
        Ok(states
            .iter()
            .zip(hidden)
            .map(|(s, h)| Sample {
                action: s.tick as i64 + self.offset,
                log_prob: -0.5,
                next_state: h + 1,
            })
            .collect())
    }

    fn decode(action: &i64) -> i64 {
        *action
    }

    fn set_params(&mut self, params: i64) -> Result<(), PolicyError> {
        self.offset = params;
        Ok(())
    }
}

/// Behaves like [`EchoPolicy`] for `succeed_count` calls, then fails.
#[derive(Clone, Debug)]
pub struct FailingPolicy {
    inner: EchoPolicy,
    succeed_count: usize,
    calls: usize,
}

impl FailingPolicy {
    pub fn after(succeed_count: usize) -> Self {
        Self {
            inner: EchoPolicy::default(),
            succeed_count,
            calls: 0,
        }
    }
}

impl Policy for FailingPolicy {
    type State = CounterState;
    type Action = i64;
    type Hidden = u64;
    type Control = i64;
    type Params = i64;

    fn initial_state(&self) -> u64 {
        self.inner.initial_state()
    }

    fn dummy_action(&self) -> i64 {
        self.inner.dummy_action()
    }

    fn sample(
        &mut self,
        states: &[CounterState],
        hidden: &[u64],
    ) -> Result<Outputs<i64, u64>, PolicyError> {
        self.calls += 1;
        if self.calls > self.succeed_count {
            return Err(PolicyError::ExecutionFailed {
                reason: format!("fail after {} calls", self.succeed_count),
            });
        }
        self.inner.sample(states, hidden)
    }

    fn decode(action: &i64) -> i64 {
        *action
    }

    fn set_params(&mut self, params: i64) -> Result<(), PolicyError> {
        if params < 0 {
            return Err(PolicyError::InvalidParams {
                reason: format!("negative offset {params}"),
            });
        }
        self.inner.set_params(params)
    }
}

/// Simulation whose state is a frame counter and the last control of
/// each agent.
///
/// With `episode_len = Some(n)` an episode ends after `n` steps.
/// `tick` keeps counting across resets.
#[derive(Clone, Debug)]
pub struct CounterSim {
    agents: Vec<AgentId>,
    episode_len: Option<u64>,
    tick: u64,
    frame: u64,
    last_controls: IndexMap<AgentId, i64>,
    resets: u64,
}

impl CounterSim {
    pub fn new(agents: &[AgentId]) -> Self {
        Self {
            agents: agents.to_vec(),
            episode_len: None,
            tick: 0,
            frame: 0,
            last_controls: agents.iter().map(|&a| (a, -1)).collect(),
            resets: 0,
        }
    }

    pub fn with_episode_len(mut self, len: u64) -> Self {
        self.episode_len = Some(len);
        self
    }

    pub fn agents(&self) -> &[AgentId] {
        &self.agents
    }

    /// Number of `reset` calls so far.
    pub fn resets(&self) -> u64 {
        self.resets
    }

    fn observe(&self) -> IndexMap<AgentId, CounterState> {
        self.last_controls
            .iter()
            .map(|(&agent, &control)| {
                (
                    agent,
                    CounterState {
                        tick: self.tick,
                        frame: self.frame,
                        control,
                    },
                )
            })
            .collect()
    }
}

impl Simulator for CounterSim {
    type State = CounterState;
    type Control = i64;

    fn reset(&mut self) -> Result<IndexMap<AgentId, CounterState>, SimError> {
        self.frame = 0;
        self.resets += 1;
        Ok(self.observe())
    }

    fn step(
        &mut self,
        controls: &IndexMap<AgentId, i64>,
    ) -> Result<SimStep<CounterState>, SimError> {
        for (&agent, &control) in controls {
            match self.last_controls.get_mut(&agent) {
                Some(slot) => *slot = control,
                None => return Err(SimError::UnknownAgent { agent }),
            }
        }
        self.tick += 1;
        self.frame += 1;
        let done = self.episode_len.is_some_and(|len| self.frame >= len);
        Ok(SimStep {
            states: self.observe(),
            done,
        })
    }
}

/// Behaves like [`CounterSim`] for `succeed_count` steps, then fails.
#[derive(Clone, Debug)]
pub struct FailingSim {
    inner: CounterSim,
    succeed_count: usize,
    steps: usize,
}

impl FailingSim {
    pub fn new(agents: &[AgentId], succeed_count: usize) -> Self {
        Self {
            inner: CounterSim::new(agents),
            succeed_count,
            steps: 0,
        }
    }
}

impl Simulator for FailingSim {
    type State = CounterState;
    type Control = i64;

    fn reset(&mut self) -> Result<IndexMap<AgentId, CounterState>, SimError> {
        self.inner.reset()
    }

    fn step(
        &mut self,
        controls: &IndexMap<AgentId, i64>,
    ) -> Result<SimStep<CounterState>, SimError> {
        self.steps += 1;
        if self.steps > self.succeed_count {
            return Err(SimError::ExecutionFailed {
                reason: format!("fail after {} steps", self.succeed_count),
            });
        }
        self.inner.step(controls)
    }
}
