//! The [`BatchedEnvironment`] contract.

use indexmap::IndexMap;
use lagstep_core::{AgentId, EnvOutput};

use crate::error::EnvError;

/// One frame of controls: per agent, one control per instance.
pub type Controls<C> = IndexMap<AgentId, Vec<C>>;

/// A batch of simulation instances stepped in lockstep.
///
/// Frames come out of [`pop`](Self::pop) in the order their controls went
/// into [`push`](Self::push). The first frame (the initial reset) is
/// available before any push.
pub trait BatchedEnvironment: Send {
    /// Per-agent observation of one instance.
    type State: Clone + Send + 'static;
    /// Per-agent control input for one instance.
    type Control: Clone + Send + 'static;

    /// Agents every instance produces states for, in a stable order.
    fn agents(&self) -> &[AgentId];

    /// Number of instances.
    fn num_envs(&self) -> usize;

    /// Internal frame buffer depth.
    ///
    /// Up to `num_steps - 1` pushed control frames may be in flight beyond
    /// the one the caller is waiting for, which counts against the
    /// worker's buffer-size invariant.
    fn num_steps(&self) -> usize;

    /// Submit one frame of controls.
    fn push(&mut self, controls: Controls<Self::Control>) -> Result<(), EnvError>;

    /// Take the next frame, blocking until it exists.
    fn pop(&mut self) -> Result<EnvOutput<Self::State>, EnvError>;

    /// Borrow the next frame without consuming it, blocking until it
    /// exists. Repeated calls return the same frame.
    fn peek(&mut self) -> Result<&EnvOutput<Self::State>, EnvError>;

    /// Start background resources. A no-op for inline environments.
    fn start(&mut self) -> Result<(), EnvError> {
        Ok(())
    }

    /// Release background resources, joining any simulation thread.
    fn stop(&mut self) -> Result<(), EnvError> {
        Ok(())
    }
}

impl<E: BatchedEnvironment + ?Sized> BatchedEnvironment for Box<E> {
    type State = E::State;
    type Control = E::Control;

    fn agents(&self) -> &[AgentId] {
        (**self).agents()
    }

    fn num_envs(&self) -> usize {
        (**self).num_envs()
    }

    fn num_steps(&self) -> usize {
        (**self).num_steps()
    }

    fn push(&mut self, controls: Controls<Self::Control>) -> Result<(), EnvError> {
        (**self).push(controls)
    }

    fn pop(&mut self) -> Result<EnvOutput<Self::State>, EnvError> {
        (**self).pop()
    }

    fn peek(&mut self) -> Result<&EnvOutput<Self::State>, EnvError> {
        (**self).peek()
    }

    fn start(&mut self) -> Result<(), EnvError> {
        (**self).start()
    }

    fn stop(&mut self) -> Result<(), EnvError> {
        (**self).stop()
    }
}
