//! Environment configuration and construction.

use lagstep_core::{ConfigError, Simulator};

use crate::environment::BatchedEnvironment;
use crate::error::EnvError;
use crate::pipelined::PipelinedBatchedEnv;
use crate::sync_env::SyncBatchedEnv;

/// How a batched environment is built.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnvConfig {
    /// Number of simulation instances.
    pub num_envs: usize,
    /// Step on a dedicated thread.
    pub pipelined: bool,
    /// Control frames the simulation thread may buffer. Ignored unless
    /// `pipelined`.
    pub num_steps: usize,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            num_envs: 1,
            pipelined: false,
            num_steps: 1,
        }
    }
}

impl EnvConfig {
    /// Inline environment with `num_envs` instances.
    pub fn sync(num_envs: usize) -> Self {
        Self {
            num_envs,
            ..Self::default()
        }
    }

    /// Threaded environment with `num_envs` instances and `num_steps`
    /// frames of buffering.
    pub fn pipelined(num_envs: usize, num_steps: usize) -> Self {
        Self {
            num_envs,
            pipelined: true,
            num_steps,
        }
    }

    /// Check structural invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_envs == 0 {
            return Err(ConfigError::ZeroEnvs);
        }
        if self.num_steps == 0 {
            return Err(ConfigError::ZeroEnvSteps);
        }
        Ok(())
    }

    /// Internal buffer depth of the environment this config builds.
    pub fn effective_num_steps(&self) -> usize {
        if self.pipelined {
            self.num_steps
        } else {
            1
        }
    }
}

/// Boxed environment over simulator `S`.
pub type BoxedEnv<S> = Box<
    dyn BatchedEnvironment<State = <S as Simulator>::State, Control = <S as Simulator>::Control>,
>;

/// Build the environment described by `config`, creating instance `i`
/// with `make_sim(i)`.
pub fn build_batched_env<S, F>(config: &EnvConfig, make_sim: F) -> Result<BoxedEnv<S>, EnvError>
where
    S: Simulator,
    F: FnMut(usize) -> S,
{
    config.validate()?;
    let sims: Vec<S> = (0..config.num_envs).map(make_sim).collect();
    if config.pipelined {
        Ok(Box::new(PipelinedBatchedEnv::new(sims, config.num_steps)?))
    } else {
        Ok(Box::new(SyncBatchedEnv::new(sims)?))
    }
}
