//! A [`DelayedAgent`] wrapper that records how the worker drives it.

use std::sync::{Arc, Mutex};

use lagstep_agent::{AgentError, AgentOutputs, DelayedAgent};
use lagstep_core::Policy;

/// Every `n` passed to [`DelayedAgent::peek_n`], in call order.
pub type PeekLog = Arc<Mutex<Vec<usize>>>;

/// Forwards to an inner agent, logging `peek_n` calls.
///
/// It can also overstate [`pending_states`](DelayedAgent::pending_states)
/// and report a fixed inference latency, which lets tests drive the
/// worker's drain check and timing report.
pub struct SpyAgent<P: Policy> {
    inner: Box<dyn DelayedAgent<P>>,
    peeks: PeekLog,
    phantom_pending: usize,
    step_us: Option<f64>,
}

impl<P: Policy> SpyAgent<P> {
    pub fn new(inner: Box<dyn DelayedAgent<P>>) -> Self {
        Self {
            inner,
            peeks: PeekLog::default(),
            phantom_pending: 0,
            step_us: None,
        }
    }

    /// Report `n` more pending states than the inner agent holds.
    pub fn with_phantom_pending(mut self, n: usize) -> Self {
        self.phantom_pending = n;
        self
    }

    /// Report `us` as the mean inference latency.
    pub fn with_step_us(mut self, us: f64) -> Self {
        self.step_us = Some(us);
        self
    }

    /// Handle to the log, usable after the spy is boxed into a worker.
    pub fn peek_log(&self) -> PeekLog {
        Arc::clone(&self.peeks)
    }
}

impl<P: Policy> DelayedAgent<P> for SpyAgent<P> {
    fn delay(&self) -> usize {
        self.inner.delay()
    }

    fn batch_steps(&self) -> usize {
        self.inner.batch_steps()
    }

    fn num_envs(&self) -> usize {
        self.inner.num_envs()
    }

    fn push(&mut self, states: Vec<P::State>, is_resetting: Vec<bool>) -> Result<(), AgentError> {
        self.inner.push(states, is_resetting)
    }

    fn pop(&mut self) -> Result<AgentOutputs<P>, AgentError> {
        self.inner.pop()
    }

    fn peek_n(&mut self, n: usize) -> Result<Vec<AgentOutputs<P>>, AgentError> {
        if let Ok(mut log) = self.peeks.lock() {
            log.push(n);
        }
        self.inner.peek_n(n)
    }

    fn pending_states(&self) -> usize {
        self.inner.pending_states() + self.phantom_pending
    }

    fn hidden_state(&self) -> Result<Vec<P::Hidden>, AgentError> {
        self.inner.hidden_state()
    }

    fn dummy_outputs(&self) -> AgentOutputs<P> {
        self.inner.dummy_outputs()
    }

    fn start(&mut self) -> Result<(), AgentError> {
        self.inner.start()
    }

    fn stop(&mut self) -> Result<(), AgentError> {
        self.inner.stop()
    }

    fn update_params(&mut self, params: P::Params) -> Result<(), AgentError> {
        self.inner.update_params(params)
    }

    fn step_mean_us(&self) -> f64 {
        self.step_us.unwrap_or_else(|| self.inner.step_mean_us())
    }
}
