//! Error types shared across the lagstep workspace.
//!
//! Split by origin: the decision function ([`PolicyError`]), the
//! simulation ([`SimError`]), structure-preserving stacking
//! ([`StackError`]) and worker construction ([`ConfigError`]).

use std::error::Error;
use std::fmt;

use crate::id::AgentId;

/// Errors raised by a [`Policy`](crate::Policy) implementation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PolicyError {
    /// Sampling an action failed.
    ExecutionFailed {
        /// Human-readable description of the failure.
        reason: String,
    },
    /// A parameter update was rejected.
    InvalidParams {
        /// Description of what was wrong with the parameters.
        reason: String,
    },
    /// The policy returned a batch of the wrong width.
    BatchMismatch {
        /// Number of instances the agent asked for.
        expected: usize,
        /// Number of samples the policy produced.
        found: usize,
    },
}

impl fmt::Display for PolicyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExecutionFailed { reason } => write!(f, "policy execution failed: {reason}"),
            Self::InvalidParams { reason } => write!(f, "invalid policy parameters: {reason}"),
            Self::BatchMismatch { expected, found } => {
                write!(f, "policy produced {found} samples, expected {expected}")
            }
        }
    }
}

impl Error for PolicyError {}

/// Errors raised by a [`Simulator`](crate::Simulator) implementation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SimError {
    /// The simulation crashed or refused to advance.
    ExecutionFailed {
        /// Human-readable description of the failure.
        reason: String,
    },
    /// A control input was addressed to an agent the simulation does not know.
    UnknownAgent {
        /// The unexpected agent.
        agent: AgentId,
    },
}

impl fmt::Display for SimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExecutionFailed { reason } => write!(f, "simulation failed: {reason}"),
            Self::UnknownAgent { agent } => write!(f, "simulation has no agent {agent}"),
        }
    }
}

impl Error for SimError {}

/// Errors from stacking per-frame batches into time-major columns.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StackError {
    /// One frame has a different batch width than the first frame.
    RaggedBatch {
        /// Time index of the offending frame.
        time_index: usize,
        /// Batch width of frame 0.
        expected: usize,
        /// Batch width of the offending frame.
        found: usize,
    },
    /// Flat data length does not match `time * batch`.
    ShapeMismatch {
        /// `time * batch`.
        expected: usize,
        /// Actual data length.
        found: usize,
    },
}

impl fmt::Display for StackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RaggedBatch {
                time_index,
                expected,
                found,
            } => write!(
                f,
                "frame {time_index} has batch width {found}, frame 0 has {expected}"
            ),
            Self::ShapeMismatch { expected, found } => {
                write!(f, "column data has {found} elements, shape needs {expected}")
            }
        }
    }
}

impl Error for StackError {}

/// Errors detected while validating a rollout worker configuration.
///
/// All of these are fatal at construction: no worker is returned and
/// nothing that was partially built stays reachable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// The agent and environment buffers could hold more frames than the
    /// agent's delay accounts for, making delay alignment impossible.
    BufferTooLarge {
        /// The agent whose slack is exceeded.
        agent: AgentId,
        /// `agent_batch_steps - 1`.
        max_agent_buffer: usize,
        /// `env_num_steps - 1`.
        max_env_buffer: usize,
        /// `1 + agent.delay`.
        slack: usize,
    },
    /// The agents registered on the worker differ from the agents the
    /// environment produces states for.
    AgentSetMismatch {
        /// Agents configured on the worker.
        agents: Vec<AgentId>,
        /// Agents reported by the environment.
        env_agents: Vec<AgentId>,
    },
    /// No agents were configured.
    NoAgents,
    /// `num_envs` is zero.
    ZeroEnvs,
    /// An agent's `batch_steps` is zero.
    ZeroBatchSteps {
        /// The misconfigured agent.
        agent: AgentId,
    },
    /// The environment's `num_steps` is zero.
    ZeroEnvSteps,
    /// An agent's batch width differs from the environment's.
    BatchSizeMismatch {
        /// The misconfigured agent.
        agent: AgentId,
        /// The agent's batch width.
        agent_batch: usize,
        /// The environment's instance count.
        num_envs: usize,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BufferTooLarge {
                agent,
                max_agent_buffer,
                max_env_buffer,
                slack,
            } => write!(
                f,
                "agent {agent}: agent and environment step buffer sizes are too large: \
                 {max_agent_buffer} + {max_env_buffer} > {slack}"
            ),
            Self::AgentSetMismatch { agents, env_agents } => write!(
                f,
                "worker agents {agents:?} do not match environment agents {env_agents:?}"
            ),
            Self::NoAgents => write!(f, "at least one agent is required"),
            Self::ZeroEnvs => write!(f, "num_envs must be at least 1"),
            Self::ZeroBatchSteps { agent } => {
                write!(f, "agent {agent}: batch_steps must be at least 1")
            }
            Self::ZeroEnvSteps => write!(f, "environment num_steps must be at least 1"),
            Self::BatchSizeMismatch {
                agent,
                agent_batch,
                num_envs,
            } => write!(
                f,
                "agent {agent} is batched for {agent_batch} instances, environment has {num_envs}"
            ),
        }
    }
}

impl Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_error_names_both_sides() {
        let e = ConfigError::BufferTooLarge {
            agent: AgentId(1),
            max_agent_buffer: 2,
            max_env_buffer: 3,
            slack: 4,
        };
        let msg = e.to_string();
        assert!(msg.contains("agent 1"));
        assert!(msg.contains("2 + 3 > 4"));
    }

    #[test]
    fn ragged_batch_display() {
        let e = StackError::RaggedBatch {
            time_index: 3,
            expected: 2,
            found: 1,
        };
        assert_eq!(e.to_string(), "frame 3 has batch width 1, frame 0 has 2");
    }
}
