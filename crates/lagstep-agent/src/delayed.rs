//! The [`DelayedAgent`] contract and the inference core shared by both
//! implementations.

use lagstep_core::{Outputs, Policy, PolicyError, Sample};

use crate::error::AgentError;

/// One agent's decisions for a batch, typed by its policy.
pub type AgentOutputs<P> = Outputs<<P as Policy>::Action, <P as Policy>::Hidden>;

/// A per-agent delay buffer.
///
/// Decisions come out of [`pop`](Self::pop) in the order states went into
/// [`push`](Self::push), `delay` frames late. A rollout worker is the only
/// caller; it never calls two methods concurrently.
pub trait DelayedAgent<P: Policy>: Send {
    /// Frames between observing a state and its decision being popped.
    fn delay(&self) -> usize;

    /// Maximum number of frames processed per inference call.
    ///
    /// Up to `batch_steps - 1` pushed states may sit unprocessed inside the
    /// agent, which counts against the worker's buffer-size invariant.
    fn batch_steps(&self) -> usize;

    /// Number of environment instances per frame.
    fn num_envs(&self) -> usize;

    /// Enqueue one frame of states for decision-making.
    fn push(&mut self, states: Vec<P::State>, is_resetting: Vec<bool>) -> Result<(), AgentError>;

    /// Dequeue the oldest decision, blocking until it exists.
    fn pop(&mut self) -> Result<AgentOutputs<P>, AgentError>;

    /// Return the next `n` decisions without consuming them, blocking
    /// until all `n` exist.
    fn peek_n(&mut self, n: usize) -> Result<Vec<AgentOutputs<P>>, AgentError>;

    /// Pushed states whose decisions have not been computed yet.
    fn pending_states(&self) -> usize;

    /// The recurrent state after the most recently processed frame.
    fn hidden_state(&self) -> Result<Vec<P::Hidden>, AgentError>;

    /// Placeholder decisions used before any real decision exists.
    fn dummy_outputs(&self) -> AgentOutputs<P>;

    /// Start background resources. A no-op for inline agents.
    fn start(&mut self) -> Result<(), AgentError>;

    /// Release background resources, joining any inference thread.
    fn stop(&mut self) -> Result<(), AgentError>;

    /// Replace the policy parameters. Applies to every state pushed after
    /// this call.
    fn update_params(&mut self, params: P::Params) -> Result<(), AgentError>;

    /// Mean latency of one inference call, in microseconds.
    fn step_mean_us(&self) -> f64;
}

/// Dummy decisions for `num_envs` instances.
pub fn dummy_outputs<P: Policy>(policy: &P, num_envs: usize) -> AgentOutputs<P> {
    (0..num_envs)
        .map(|_| Sample {
            action: policy.dummy_action(),
            log_prob: 0.0,
            next_state: policy.initial_state(),
        })
        .collect()
}

/// A policy together with the per-instance recurrent state it advances.
pub(crate) struct InferenceCore<P: Policy> {
    pub(crate) policy: P,
    pub(crate) hidden: Vec<P::Hidden>,
}

impl<P: Policy> InferenceCore<P> {
    pub(crate) fn new(policy: P, num_envs: usize) -> Self {
        let hidden = (0..num_envs).map(|_| policy.initial_state()).collect();
        Self { policy, hidden }
    }

    /// Decide one frame. Instances flagged as resetting start from a fresh
    /// recurrent state.
    pub(crate) fn step(
        &mut self,
        states: &[P::State],
        is_resetting: &[bool],
    ) -> Result<AgentOutputs<P>, PolicyError> {
        for (hidden, &reset) in self.hidden.iter_mut().zip(is_resetting) {
            if reset {
                *hidden = self.policy.initial_state();
            }
        }
        let outputs = self.policy.sample(states, &self.hidden)?;
        if outputs.len() != self.hidden.len() {
            return Err(PolicyError::BatchMismatch {
                expected: self.hidden.len(),
                found: outputs.len(),
            });
        }
        for (hidden, sample) in self.hidden.iter_mut().zip(&outputs) {
            *hidden = sample.next_state.clone();
        }
        Ok(outputs)
    }

    /// Decide several frames in order, stopping at the first failure.
    pub(crate) fn step_many(
        &mut self,
        frames: &[(Vec<P::State>, Vec<bool>)],
    ) -> Result<Vec<AgentOutputs<P>>, PolicyError> {
        frames
            .iter()
            .map(|(states, is_resetting)| self.step(states, is_resetting))
            .collect()
    }
}
