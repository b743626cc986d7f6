//! Errors from batched environments.

use std::error::Error;
use std::fmt;

use lagstep_core::{AgentId, ConfigError, SimError};

/// Error from a [`BatchedEnvironment`](crate::BatchedEnvironment) operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EnvError {
    /// Invalid environment configuration.
    Config(ConfigError),
    /// One simulation instance failed.
    Sim {
        /// Index of the failing instance.
        env_index: usize,
        /// The simulation's error.
        error: SimError,
    },
    /// A pushed control frame has no entry for `agent`.
    MissingControls {
        /// The agent without controls.
        agent: AgentId,
    },
    /// An agent's controls do not cover every instance.
    BatchMismatch {
        /// The agent whose controls are mis-sized.
        agent: AgentId,
        /// Number of instances.
        expected: usize,
        /// Number of controls pushed.
        found: usize,
    },
    /// Instance `env_index` reported a different agent set than instance 0.
    AgentSetMismatch {
        /// Index of the disagreeing instance.
        env_index: usize,
    },
    /// No frame is buffered and no step is in flight.
    Empty,
    /// The simulation thread is not running.
    NotRunning,
    /// `start()` was called on a running environment.
    AlreadyRunning,
    /// The simulation thread exited and its channels are closed.
    Disconnected,
    /// The simulation thread could not be spawned.
    ThreadSpawnFailed {
        /// Description of the spawn failure.
        reason: String,
    },
    /// The simulation thread panicked.
    ThreadPanicked,
}

impl fmt::Display for EnvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "config: {e}"),
            Self::Sim { env_index, error } => write!(f, "instance {env_index}: {error}"),
            Self::MissingControls { agent } => write!(f, "no controls pushed for agent {agent}"),
            Self::BatchMismatch {
                agent,
                expected,
                found,
            } => write!(
                f,
                "agent {agent} pushed {found} controls for {expected} instances"
            ),
            Self::AgentSetMismatch { env_index } => {
                write!(f, "instance {env_index} reports a different agent set")
            }
            Self::Empty => write!(f, "no frame buffered"),
            Self::NotRunning => write!(f, "simulation thread is not running"),
            Self::AlreadyRunning => write!(f, "environment already started"),
            Self::Disconnected => write!(f, "simulation thread disconnected"),
            Self::ThreadSpawnFailed { reason } => {
                write!(f, "simulation thread spawn failed: {reason}")
            }
            Self::ThreadPanicked => write!(f, "simulation thread panicked"),
        }
    }
}

impl Error for EnvError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Config(e) => Some(e),
            Self::Sim { error, .. } => Some(error),
            _ => None,
        }
    }
}

impl From<ConfigError> for EnvError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}
