//! Worker configuration.

use indexmap::IndexMap;
use lagstep_agent::{build_delayed_agent, AgentConfig, DelayedAgent};
use lagstep_core::{AgentId, ConfigError, Policy, RewardFunction, Simulator};
use lagstep_env::{build_batched_env, BatchedEnvironment, EnvConfig};

use crate::error::WorkerError;
use crate::worker::RolloutWorker;

/// Everything needed to build a [`RolloutWorker`](crate::RolloutWorker)
/// from factories.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WorkerConfig {
    // ── Agents ──────────────────────────────────────────────────
    /// Delay buffer settings per agent. Order is the trajectory order.
    pub agents: IndexMap<AgentId, AgentConfig>,

    // ── Environment ─────────────────────────────────────────────
    /// Batched environment settings.
    pub env: EnvConfig,
}

impl WorkerConfig {
    /// A config with the given environment and no agents.
    pub fn new(env: EnvConfig) -> Self {
        Self {
            agents: IndexMap::new(),
            env,
        }
    }

    /// Add an agent.
    pub fn with_agent(mut self, agent: AgentId, config: AgentConfig) -> Self {
        self.agents.insert(agent, config);
        self
    }

    /// Smallest configured delay.
    pub fn min_delay(&self) -> Option<usize> {
        self.agents.values().map(|a| a.delay).min()
    }

    /// Validate every part, including the buffer-size invariant.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.agents.is_empty() {
            return Err(ConfigError::NoAgents);
        }
        self.env.validate()?;
        let env_num_steps = self.env.effective_num_steps();
        for (&agent, cfg) in &self.agents {
            cfg.validate(agent)?;
            check_buffer_sizes(agent, cfg.max_buffered() + 1, env_num_steps, cfg.delay)?;
        }
        Ok(())
    }
}

impl<P> RolloutWorker<P, Box<dyn BatchedEnvironment<State = P::State, Control = P::Control>>>
where
    P: Policy,
{
    /// Build a worker from `config`. Agent `id`'s policy comes from
    /// `make_policy(id)`, instance `i`'s simulation from `make_sim(i)`.
    ///
    /// The whole config is validated before anything is built.
    pub fn from_config<S, R>(
        config: &WorkerConfig,
        mut make_policy: impl FnMut(AgentId) -> P,
        make_sim: impl FnMut(usize) -> S,
        reward: R,
    ) -> Result<Self, WorkerError>
    where
        S: Simulator<State = P::State, Control = P::Control>,
        R: RewardFunction<P::State> + 'static,
    {
        config.validate()?;
        let env = build_batched_env(&config.env, make_sim)?;
        let agents: IndexMap<AgentId, Box<dyn DelayedAgent<P>>> = config
            .agents
            .iter()
            .map(|(&id, cfg)| (id, build_delayed_agent(make_policy(id), config.env.num_envs, cfg)))
            .collect();
        Self::new(agents, env, Box::new(reward))
    }
}

/// Check that the frames an agent and the environment may hold internally
/// fit in the agent's delay slack:
/// `(batch_steps - 1) + (env_num_steps - 1) <= 1 + delay`.
pub fn check_buffer_sizes(
    agent: AgentId,
    batch_steps: usize,
    env_num_steps: usize,
    delay: usize,
) -> Result<(), ConfigError> {
    let max_agent_buffer = batch_steps.saturating_sub(1);
    let max_env_buffer = env_num_steps.saturating_sub(1);
    let slack = 1 + delay;
    if max_agent_buffer + max_env_buffer > slack {
        return Err(ConfigError::BufferTooLarge {
            agent,
            max_agent_buffer,
            max_env_buffer,
            slack,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_has_no_agents() {
        assert_eq!(WorkerConfig::default().validate(), Err(ConfigError::NoAgents));
    }

    #[test]
    fn buffer_invariant_boundary() {
        // 1 + 1 <= 1 + 1
        assert!(check_buffer_sizes(AgentId(0), 2, 2, 1).is_ok());
        // 2 + 1 > 1 + 1
        assert_eq!(
            check_buffer_sizes(AgentId(0), 3, 2, 1),
            Err(ConfigError::BufferTooLarge {
                agent: AgentId(0),
                max_agent_buffer: 2,
                max_env_buffer: 1,
                slack: 2
            })
        );
    }

    #[test]
    fn validate_checks_each_agent() {
        let cfg = WorkerConfig::new(EnvConfig::pipelined(2, 3))
            .with_agent(AgentId(0), AgentConfig::threaded(4, 2))
            .with_agent(AgentId(1), AgentConfig::threaded(0, 2));
        assert_eq!(cfg.min_delay(), Some(0));
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::BufferTooLarge {
                agent: AgentId(1),
                ..
            })
        ));
    }

    #[test]
    fn inline_components_always_fit() {
        let cfg = WorkerConfig::new(EnvConfig::sync(4))
            .with_agent(AgentId(0), AgentConfig::sync(0))
            .with_agent(AgentId(1), AgentConfig::sync(3));
        assert!(cfg.validate().is_ok());
    }
}
