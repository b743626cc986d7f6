//! Errors raised by rollout workers.

use std::error::Error;
use std::fmt;

use lagstep_agent::AgentError;
use lagstep_core::{AgentId, ConfigError, StackError};
use lagstep_env::EnvError;

/// A broken synchronization invariant between the agents, the environment
/// and the pending-outputs ring. Always fatal for the worker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncError {
    /// A push into the full pending-outputs ring.
    PendingOverflow {
        /// Ring capacity (`1 + min_delay`).
        capacity: usize,
    },
    /// A pop from the empty pending-outputs ring.
    PendingUnderflow,
    /// The ring length drifted from `1 + min_delay` after a rollout.
    PendingLength {
        /// `1 + min_delay`.
        expected: usize,
        /// Observed length.
        found: usize,
    },
    /// An agent still held unprocessed states after its drain.
    AgentNotDrained {
        /// The agent.
        agent: AgentId,
        /// States still queued inside it.
        pending: usize,
    },
    /// A pending-outputs frame had no entry for `agent`.
    MissingAgentOutputs {
        /// The agent.
        agent: AgentId,
    },
    /// An environment frame had no states for `agent`.
    MissingAgentStates {
        /// The agent.
        agent: AgentId,
    },
    /// A per-agent buffer had the wrong length at assembly.
    TrajectoryShape {
        /// The agent.
        agent: AgentId,
        /// Which buffer.
        field: &'static str,
        /// Required length.
        expected: usize,
        /// Recorded length.
        found: usize,
    },
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PendingOverflow { capacity } => {
                write!(f, "pending outputs overflow (capacity {capacity})")
            }
            Self::PendingUnderflow => write!(f, "pending outputs underflow"),
            Self::PendingLength { expected, found } => {
                write!(f, "pending outputs length {found}, expected {expected}")
            }
            Self::AgentNotDrained { agent, pending } => write!(
                f,
                "agent {agent} still has {pending} pending states after drain"
            ),
            Self::MissingAgentOutputs { agent } => {
                write!(f, "pending frame has no outputs for agent {agent}")
            }
            Self::MissingAgentStates { agent } => {
                write!(f, "environment frame has no states for agent {agent}")
            }
            Self::TrajectoryShape {
                agent,
                field,
                expected,
                found,
            } => write!(
                f,
                "agent {agent}: {field} has {found} frames, expected {expected}"
            ),
        }
    }
}

impl Error for SyncError {}

/// Error returned by [`RolloutWorker`](crate::RolloutWorker) and the
/// types built on it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WorkerError {
    /// Construction-time validation failed.
    Config(ConfigError),
    /// A synchronization invariant broke.
    Sync(SyncError),
    /// An agent failed.
    Agent {
        /// The failing agent.
        agent: AgentId,
        /// Its error.
        error: AgentError,
    },
    /// The environment failed.
    Env(EnvError),
    /// Stacking recorded frames failed.
    Stack(StackError),
    /// Parameters were addressed to an agent the worker does not own.
    UnknownAgent {
        /// The unexpected agent.
        agent: AgentId,
    },
    /// `rollout()` was called before `start()`.
    NotStarted,
    /// `start()` was called on a running worker.
    AlreadyStarted,
    /// An earlier rollout failed; the worker must be rebuilt.
    Failed,
    /// The thread hosting the worker is gone.
    Disconnected,
    /// The thread hosting the worker could not be spawned.
    ThreadSpawnFailed {
        /// Description of the spawn failure.
        reason: String,
    },
    /// The thread hosting the worker panicked.
    ThreadPanicked,
}

impl fmt::Display for WorkerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "config: {e}"),
            Self::Sync(e) => write!(f, "sync: {e}"),
            Self::Agent { agent, error } => write!(f, "agent {agent}: {error}"),
            Self::Env(e) => write!(f, "env: {e}"),
            Self::Stack(e) => write!(f, "stack: {e}"),
            Self::UnknownAgent { agent } => write!(f, "worker has no agent {agent}"),
            Self::NotStarted => write!(f, "worker not started"),
            Self::AlreadyStarted => write!(f, "worker already started"),
            Self::Failed => write!(f, "worker failed earlier and must be rebuilt"),
            Self::Disconnected => write!(f, "worker thread disconnected"),
            Self::ThreadSpawnFailed { reason } => {
                write!(f, "worker thread spawn failed: {reason}")
            }
            Self::ThreadPanicked => write!(f, "worker thread panicked"),
        }
    }
}

impl Error for WorkerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Config(e) => Some(e),
            Self::Sync(e) => Some(e),
            Self::Agent { error, .. } => Some(error),
            Self::Env(e) => Some(e),
            Self::Stack(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for WorkerError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<SyncError> for WorkerError {
    fn from(e: SyncError) -> Self {
        Self::Sync(e)
    }
}

impl From<EnvError> for WorkerError {
    fn from(e: EnvError) -> Self {
        Self::Env(e)
    }
}

impl From<StackError> for WorkerError {
    fn from(e: StackError) -> Self {
        Self::Stack(e)
    }
}

/// Attach the agent identity to an [`AgentError`].
pub(crate) fn agent_err(agent: AgentId) -> impl FnOnce(AgentError) -> WorkerError {
    move |error| WorkerError::Agent { agent, error }
}
