//! lagstep: delay-compensated rollouts for reinforcement learning.
//!
//! Agents act on information that is `delay` frames old, so training data
//! matches a deployment where sensing, inference and actuation take time.
//! This facade re-exports the public API of the sub-crates; for most users
//! adding `lagstep` as a single dependency is enough.
//!
//! # Quick start
//!
//! ```rust
//! use lagstep::prelude::*;
//! use lagstep_test_utils::{control_reward, CounterSim, EchoPolicy};
//!
//! let a = AgentId(0);
//! let config = WorkerConfig::new(EnvConfig::sync(2)).with_agent(a, AgentConfig::sync(2));
//! let mut worker = RolloutWorker::from_config(
//!     &config,
//!     |_| EchoPolicy::default(),
//!     |_| CounterSim::new(&[a]),
//!     control_reward(),
//! )
//! .unwrap();
//! worker.start().unwrap();
//!
//! let rollout = worker.rollout(5).unwrap();
//! let traj = &rollout.trajectories[&a];
//! // Six frames, the first three carrying placeholder actions.
//! assert_eq!(traj.actions.action.row(3), Some(&[0, 0][..]));
//! assert_eq!(traj.delayed_actions.len(), 2);
//! worker.stop().unwrap();
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `lagstep-core` | IDs, frames, columns, policy and simulator traits, errors |
//! | [`agent`] | `lagstep-agent` | Delay buffers (inline and threaded inference) |
//! | [`env`] | `lagstep-env` | Batched environments (inline and pipelined) |
//! | [`rollout`] | `lagstep-rollout` | Rollout worker, trajectories, hosting, pools |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Core types, traits and errors (`lagstep-core`).
///
/// Implement [`types::Policy`] and [`types::Simulator`] to plug a model and
/// a simulation into the pipeline.
pub use lagstep_core as types;

/// Delay buffers (`lagstep-agent`).
///
/// [`agent::SyncDelayedAgent`] runs inference inline,
/// [`agent::AsyncDelayedAgent`] on a dedicated thread.
pub use lagstep_agent as agent;

/// Batched environments (`lagstep-env`).
///
/// [`env::SyncBatchedEnv`] steps inline, [`env::PipelinedBatchedEnv`]
/// runs ahead on a dedicated thread.
pub use lagstep_env as env;

/// Rollout orchestration (`lagstep-rollout`).
pub use lagstep_rollout as rollout;

/// Common imports for typical lagstep usage.
///
/// ```rust
/// use lagstep::prelude::*;
/// ```
pub mod prelude {
    // Core types and traits
    pub use lagstep_core::{
        AgentId, Column, EnvOutput, Outputs, PairwiseReward, Policy, RewardFunction, Sample,
        SimStep, Simulator, Stack,
    };

    // Errors
    pub use lagstep_core::{ConfigError, PolicyError, SimError, StackError};
    pub use lagstep_agent::AgentError;
    pub use lagstep_env::EnvError;
    pub use lagstep_rollout::{SyncError, WorkerError};

    // Components
    pub use lagstep_agent::{AgentConfig, DelayedAgent};
    pub use lagstep_env::{BatchedEnvironment, EnvConfig};

    // Rollouts
    pub use lagstep_rollout::{
        Evaluator, RemoteRolloutWorker, Rollout, RolloutWorker, SupervisorConfig, Trajectory,
        WorkerConfig, WorkerPool, WorkerSupervisor,
    };
}
