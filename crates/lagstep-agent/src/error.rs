//! Errors from delay buffers.

use std::error::Error;
use std::fmt;

use lagstep_core::PolicyError;

/// Error from a [`DelayedAgent`](crate::DelayedAgent) operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AgentError {
    /// The wrapped policy failed.
    Policy(PolicyError),
    /// A pushed frame does not have one state per environment instance.
    BatchMismatch {
        /// The agent's batch width.
        expected: usize,
        /// Width of the pushed frame.
        found: usize,
    },
    /// Fewer decisions are buffered than requested and none can be produced.
    NothingReady {
        /// Number of decisions requested.
        requested: usize,
        /// Number of decisions buffered.
        available: usize,
    },
    /// The inference thread is not running.
    NotRunning,
    /// `start()` was called on a running agent.
    AlreadyRunning,
    /// The inference thread exited and its channels are closed.
    Disconnected,
    /// The inference thread could not be spawned.
    ThreadSpawnFailed {
        /// Description of the spawn failure.
        reason: String,
    },
    /// The inference thread panicked.
    ThreadPanicked,
    /// Shared agent state was poisoned by a panic.
    Poisoned,
}

impl fmt::Display for AgentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Policy(e) => write!(f, "policy: {e}"),
            Self::BatchMismatch { expected, found } => {
                write!(f, "pushed {found} states, agent is batched for {expected}")
            }
            Self::NothingReady {
                requested,
                available,
            } => write!(
                f,
                "requested {requested} decisions, only {available} are buffered"
            ),
            Self::NotRunning => write!(f, "inference thread is not running"),
            Self::AlreadyRunning => write!(f, "agent already started"),
            Self::Disconnected => write!(f, "inference thread disconnected"),
            Self::ThreadSpawnFailed { reason } => {
                write!(f, "inference thread spawn failed: {reason}")
            }
            Self::ThreadPanicked => write!(f, "inference thread panicked"),
            Self::Poisoned => write!(f, "agent state poisoned"),
        }
    }
}

impl Error for AgentError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Policy(e) => Some(e),
            _ => None,
        }
    }
}

impl From<PolicyError> for AgentError {
    fn from(e: PolicyError) -> Self {
        Self::Policy(e)
    }
}
