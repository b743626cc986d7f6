//! Batched simulation environments.
//!
//! A [`BatchedEnvironment`] advances `num_envs` independent
//! [`Simulator`](lagstep_core::Simulator) instances in lockstep. Controls go
//! in with [`push`](BatchedEnvironment::push); resulting frames come out in
//! the same order with [`pop`](BatchedEnvironment::pop). Instances whose
//! episode ends are reset in the same step, and the fresh frame is flagged
//! in [`EnvOutput::is_resetting`](lagstep_core::EnvOutput).
//!
//! - [`SyncBatchedEnv`] steps inline inside `push`.
//! - [`PipelinedBatchedEnv`] steps on a dedicated thread with up to
//!   `num_steps` control frames in flight.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod batch;
pub mod config;
pub mod environment;
pub mod error;
pub mod pipelined;
pub mod sync_env;

pub use batch::SimBatch;
pub use config::{build_batched_env, BoxedEnv, EnvConfig};
pub use environment::{BatchedEnvironment, Controls};
pub use error::EnvError;
pub use pipelined::PipelinedBatchedEnv;
pub use sync_env::SyncBatchedEnv;
