//! Delay-compensated rollouts.
//!
//! A [`RolloutWorker`] drives a set of [`DelayedAgent`]s and one
//! [`BatchedEnvironment`] so that every agent acts on information `delay`
//! frames old, and records per-agent time-major [`Trajectory`]s in which
//! each state is paired with the decision that was actually applied on
//! the transition into it.
//!
//! Around the worker:
//!
//! - [`Evaluator`]: rollouts reduced to [`RolloutMetrics`].
//! - [`RemoteRolloutWorker`]: a worker hosted on its own thread, driven by
//!   [`WorkerMsg`] requests.
//! - [`WorkerPool`]: rollouts fanned out over several hosted workers.
//! - [`WorkerSupervisor`]: rebuilds a worker on failure or on a schedule.
//!
//! [`DelayedAgent`]: lagstep_agent::DelayedAgent
//! [`BatchedEnvironment`]: lagstep_env::BatchedEnvironment

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod evaluator;
pub mod pending;
pub mod pool;
pub mod remote;
pub mod supervisor;
pub mod timings;
pub mod trajectory;
pub mod worker;

pub use config::{check_buffer_sizes, WorkerConfig};
pub use error::{SyncError, WorkerError};
pub use evaluator::{Evaluator, RolloutMetrics};
pub use pending::PendingOutputs;
pub use pool::{PoolRollout, WorkerPool};
pub use remote::{RemoteRolloutWorker, RolloutTicket, WorkerMsg};
pub use supervisor::{SupervisorConfig, WorkerSupervisor};
pub use timings::RolloutTimings;
pub use trajectory::{StackedActions, Trajectory};
pub use worker::{PendingFrame, Rollout, RolloutWorker, WorkerPhase};
