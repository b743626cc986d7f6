//! Benchmark profiles for the lagstep rollout pipeline.
//!
//! Provides pre-built [`WorkerConfig`] profiles for benchmarks and examples:
//!
//! - [`inline_profile`]: inline agents and environment
//! - [`threaded_profile`]: threaded agents and a pipelined environment,
//!   each agent batching as deep as its delay allows
//! - [`build_profile_worker`]: a counter-simulation worker for a profile

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use lagstep_agent::AgentConfig;
use lagstep_core::AgentId;
use lagstep_env::{BoxedEnv, EnvConfig};
use lagstep_rollout::{RolloutWorker, WorkerConfig, WorkerError};
use lagstep_test_utils::{control_reward, CounterSim, EchoPolicy};

/// Environment buffer depth used by [`threaded_profile`].
pub const PIPELINE_DEPTH: usize = 2;

/// Worker type built by [`build_profile_worker`].
pub type BenchWorker = RolloutWorker<EchoPolicy, BoxedEnv<CounterSim>>;

/// Inline agents, one per entry of `delays`, over an inline environment.
pub fn inline_profile(num_envs: usize, delays: &[usize]) -> WorkerConfig {
    delays
        .iter()
        .enumerate()
        .fold(WorkerConfig::new(EnvConfig::sync(num_envs)), |cfg, (i, &d)| {
            cfg.with_agent(AgentId(i as u32), AgentConfig::sync(d))
        })
}

/// Threaded agents over a pipelined environment of depth
/// [`PIPELINE_DEPTH`].
///
/// Agent `i` batches up to `delays[i] + 1` frames, the most that
/// `(batch_steps - 1) + (PIPELINE_DEPTH - 1) <= 1 + delay` allows.
pub fn threaded_profile(num_envs: usize, delays: &[usize]) -> WorkerConfig {
    let env = EnvConfig::pipelined(num_envs, PIPELINE_DEPTH);
    delays
        .iter()
        .enumerate()
        .fold(WorkerConfig::new(env), |cfg, (i, &d)| {
            cfg.with_agent(AgentId(i as u32), AgentConfig::threaded(d, d + 1))
        })
}

/// Build a worker over [`CounterSim`] instances with episodes of
/// `episode_len` steps, every agent running an [`EchoPolicy`].
pub fn build_profile_worker(
    config: &WorkerConfig,
    episode_len: u64,
) -> Result<BenchWorker, WorkerError> {
    let agents: Vec<AgentId> = config.agents.keys().copied().collect();
    RolloutWorker::from_config(
        config,
        |_| EchoPolicy::default(),
        move |_| CounterSim::new(&agents).with_episode_len(episode_len),
        control_reward(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profiles_validate() {
        let delays = [0, 1, 4];
        assert!(inline_profile(8, &delays).validate().is_ok());
        assert!(threaded_profile(8, &delays).validate().is_ok());
    }

    #[test]
    fn threaded_profile_runs() {
        let mut w = build_profile_worker(&threaded_profile(2, &[0, 3]), 16).unwrap();
        w.start().unwrap();
        let r = w.rollout(8).unwrap();
        assert_eq!(r.trajectories.len(), 2);
        w.stop().unwrap();
    }
}
