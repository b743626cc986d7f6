//! Agent configuration and construction.

use lagstep_core::{AgentId, ConfigError, Policy};

use crate::async_agent::AsyncDelayedAgent;
use crate::delayed::DelayedAgent;
use crate::sync_agent::SyncDelayedAgent;

/// How one agent's delay buffer is built.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AgentConfig {
    // ── Timing ──────────────────────────────────────────────────
    /// Frames of latency between observing a state and acting on it.
    pub delay: usize,

    // ── Inference ───────────────────────────────────────────────
    /// Maximum frames decided per inference call. Values above 1 only
    /// take effect with `async_inference`.
    pub batch_steps: usize,
    /// Run inference on a dedicated thread.
    pub async_inference: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            delay: 0,
            batch_steps: 1,
            async_inference: false,
        }
    }
}

impl AgentConfig {
    /// Inline agent with the given delay.
    pub fn sync(delay: usize) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    /// Threaded agent with the given delay and inference batch depth.
    pub fn threaded(delay: usize, batch_steps: usize) -> Self {
        Self {
            delay,
            batch_steps,
            async_inference: true,
        }
    }

    /// Check structural invariants for `agent`.
    pub fn validate(&self, agent: AgentId) -> Result<(), ConfigError> {
        if self.batch_steps == 0 {
            return Err(ConfigError::ZeroBatchSteps { agent });
        }
        Ok(())
    }

    /// Largest number of pushed states the agent may hold unprocessed.
    pub fn max_buffered(&self) -> usize {
        if self.async_inference {
            self.batch_steps.saturating_sub(1)
        } else {
            0
        }
    }
}

/// Build the delay buffer described by `config` around `policy`.
pub fn build_delayed_agent<P: Policy>(
    policy: P,
    num_envs: usize,
    config: &AgentConfig,
) -> Box<dyn DelayedAgent<P>> {
    if config.async_inference {
        Box::new(AsyncDelayedAgent::new(
            policy,
            num_envs,
            config.delay,
            config.batch_steps,
        ))
    } else {
        Box::new(SyncDelayedAgent::new(policy, num_envs, config.delay))
    }
}
