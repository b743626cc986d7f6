//! Core types and traits for the lagstep rollout pipeline.
//!
//! This is the leaf crate with no internal dependencies. It defines the
//! data that flows through the pipeline (agent ids, per-frame environment
//! output, decision samples, time-major columns), the capabilities the
//! pipeline consumes from the outside (policies, simulators, reward
//! functions), and the error types shared across the workspace.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod error;
pub mod frame;
pub mod id;
pub mod profiler;
pub mod stack;
pub mod traits;

pub use error::{ConfigError, PolicyError, SimError, StackError};
pub use frame::{EnvOutput, Outputs, Sample, StackedSample};
pub use id::AgentId;
pub use profiler::{Profiler, SharedProfiler};
pub use stack::{project_frames, Column, Stack};
pub use traits::{PairwiseReward, Policy, RewardFunction, SimStep, Simulator};
