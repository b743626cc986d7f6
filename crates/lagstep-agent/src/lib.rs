//! Delay buffers for decision agents.
//!
//! A delay buffer wraps a [`Policy`](lagstep_core::Policy) and makes its
//! decisions arrive `delay` frames late, emulating input/network latency.
//! It is prefilled with `delay` dummy outputs, so the `k`-th
//! [`pop`](DelayedAgent::pop) returns the decision for the `(k - delay)`-th
//! pushed state (or a dummy while `k < delay`).
//!
//! Two variants implement [`DelayedAgent`]:
//!
//! - [`SyncDelayedAgent`]: runs inference inline inside `push`.
//! - [`AsyncDelayedAgent`]: runs inference on a dedicated thread, gathering
//!   up to `batch_steps` queued frames per call.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod async_agent;
pub mod config;
pub mod delayed;
pub mod error;
pub mod sync_agent;

pub use async_agent::AsyncDelayedAgent;
pub use config::{build_delayed_agent, AgentConfig};
pub use delayed::{dummy_outputs, AgentOutputs, DelayedAgent};
pub use error::AgentError;
pub use sync_agent::SyncDelayedAgent;
