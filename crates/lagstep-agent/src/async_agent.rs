//! Threaded delay buffer.
//!
//! The inference thread owns the policy while running. It blocks for one
//! queued frame, then greedily drains up to `batch_steps - 1` more that are
//! already waiting, decides them in order and sends one reply per frame.
//! It never waits for a batch to fill, so a frame is never held back by
//! frames the caller cannot produce until this one is decided.
//!
//! Shutdown closes the request channel; the thread finishes the batch in
//! hand, exits its loop and hands the policy back through its join handle,
//! so the agent can be restarted with its state intact.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use lagstep_core::{Policy, PolicyError, SharedProfiler};

use crate::delayed::{dummy_outputs, AgentOutputs, DelayedAgent, InferenceCore};
use crate::error::AgentError;

enum AgentMsg<P: Policy> {
    Step {
        states: Vec<P::State>,
        is_resetting: Vec<bool>,
    },
    UpdateParams(P::Params),
}

type Reply<P> = Result<AgentOutputs<P>, PolicyError>;

/// Channel endpoints and thread handle of a running agent.
struct Running<P: Policy> {
    msg_tx: Sender<AgentMsg<P>>,
    reply_rx: Receiver<Reply<P>>,
    handle: JoinHandle<InferenceCore<P>>,
}

/// Delay buffer whose inference runs on a dedicated thread.
pub struct AsyncDelayedAgent<P: Policy> {
    delay: usize,
    batch_steps: usize,
    num_envs: usize,
    dummy: AgentOutputs<P>,
    /// Decisions received from the thread (or prefilled dummies) not yet popped.
    ready: VecDeque<AgentOutputs<P>>,
    /// Policy and recurrent state while no thread owns them.
    core: Option<InferenceCore<P>>,
    running: Option<Running<P>>,
    /// Frames sent to the thread whose reply has not been received.
    outstanding: usize,
    pending: Arc<AtomicUsize>,
    hidden: Arc<Mutex<Vec<P::Hidden>>>,
    step_profiler: Arc<SharedProfiler>,
}

impl<P: Policy> AsyncDelayedAgent<P> {
    /// Wrap `policy` for `num_envs` instances. Call
    /// [`start`](DelayedAgent::start) before pushing states.
    pub fn new(policy: P, num_envs: usize, delay: usize, batch_steps: usize) -> Self {
        let dummy = dummy_outputs(&policy, num_envs);
        let ready = std::iter::repeat_with(|| dummy.clone())
            .take(delay)
            .collect();
        let core = InferenceCore::new(policy, num_envs);
        let hidden = Arc::new(Mutex::new(core.hidden.clone()));
        Self {
            delay,
            batch_steps: batch_steps.max(1),
            num_envs,
            dummy,
            ready,
            core: Some(core),
            running: None,
            outstanding: 0,
            pending: Arc::new(AtomicUsize::new(0)),
            hidden,
            step_profiler: Arc::new(SharedProfiler::default()),
        }
    }

    /// Whether the inference thread is running.
    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Block for the next reply from the inference thread.
    ///
    /// Fails with `NothingReady` instead of blocking when no frame is in
    /// flight, since no reply could ever arrive.
    fn receive(&mut self) -> Result<AgentOutputs<P>, AgentError> {
        let running = self.running.as_ref().ok_or(AgentError::NotRunning)?;
        if self.outstanding == 0 {
            return Err(AgentError::NothingReady {
                requested: self.ready.len() + 1,
                available: self.ready.len(),
            });
        }
        let reply = running.reply_rx.recv();
        self.outstanding -= 1;
        match reply {
            Ok(Ok(outputs)) => Ok(outputs),
            Ok(Err(e)) => Err(AgentError::Policy(e)),
            Err(_) => {
                self.outstanding = 0;
                Err(AgentError::Disconnected)
            }
        }
    }
}

impl<P: Policy> DelayedAgent<P> for AsyncDelayedAgent<P> {
    fn delay(&self) -> usize {
        self.delay
    }

    fn batch_steps(&self) -> usize {
        self.batch_steps
    }

    fn num_envs(&self) -> usize {
        self.num_envs
    }

    fn push(&mut self, states: Vec<P::State>, is_resetting: Vec<bool>) -> Result<(), AgentError> {
        if states.len() != self.num_envs || is_resetting.len() != self.num_envs {
            return Err(AgentError::BatchMismatch {
                expected: self.num_envs,
                found: states.len(),
            });
        }
        let running = self.running.as_ref().ok_or(AgentError::NotRunning)?;
        self.pending.fetch_add(1, Ordering::AcqRel);
        if running
            .msg_tx
            .send(AgentMsg::Step {
                states,
                is_resetting,
            })
            .is_err()
        {
            self.pending.fetch_sub(1, Ordering::AcqRel);
            return Err(AgentError::Disconnected);
        }
        self.outstanding += 1;
        Ok(())
    }

    fn pop(&mut self) -> Result<AgentOutputs<P>, AgentError> {
        match self.ready.pop_front() {
            Some(outputs) => Ok(outputs),
            None => self.receive(),
        }
    }

    fn peek_n(&mut self, n: usize) -> Result<Vec<AgentOutputs<P>>, AgentError> {
        if self.running.is_some() && self.ready.len() + self.outstanding < n {
            return Err(AgentError::NothingReady {
                requested: n,
                available: self.ready.len() + self.outstanding,
            });
        }
        while self.ready.len() < n {
            let outputs = self.receive()?;
            self.ready.push_back(outputs);
        }
        Ok(self.ready.iter().take(n).cloned().collect())
    }

    fn pending_states(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    fn hidden_state(&self) -> Result<Vec<P::Hidden>, AgentError> {
        self.hidden
            .lock()
            .map(|h| h.clone())
            .map_err(|_| AgentError::Poisoned)
    }

    fn dummy_outputs(&self) -> AgentOutputs<P> {
        self.dummy.clone()
    }

    fn start(&mut self) -> Result<(), AgentError> {
        if self.running.is_some() {
            return Err(AgentError::AlreadyRunning);
        }
        let core = self.core.take().ok_or(AgentError::Disconnected)?;

        // One slot per state the worker can have outstanding, plus one
        // for a parameter update.
        let (msg_tx, msg_rx) = bounded(self.delay + 2);
        let (reply_tx, reply_rx) = unbounded();
        let ctx = InferenceContext {
            batch_steps: self.batch_steps,
            pending: Arc::clone(&self.pending),
            hidden: Arc::clone(&self.hidden),
            profiler: Arc::clone(&self.step_profiler),
        };

        let handle = thread::Builder::new()
            .name("lagstep-inference".into())
            .spawn(move || ctx.run(core, msg_rx, reply_tx))
            .map_err(|e| AgentError::ThreadSpawnFailed {
                reason: e.to_string(),
            })?;

        tracing::debug!(
            delay = self.delay,
            batch_steps = self.batch_steps,
            "inference thread started"
        );
        self.running = Some(Running {
            msg_tx,
            reply_rx,
            handle,
        });
        Ok(())
    }

    fn stop(&mut self) -> Result<(), AgentError> {
        let Some(Running {
            msg_tx,
            reply_rx,
            handle,
        }) = self.running.take()
        else {
            return Ok(());
        };
        drop(msg_tx);
        let core = handle.join().map_err(|_| AgentError::ThreadPanicked)?;
        self.core = Some(core);

        // Keep decisions the thread produced but nobody collected yet.
        for reply in reply_rx.try_iter() {
            self.outstanding = self.outstanding.saturating_sub(1);
            match reply {
                Ok(outputs) => self.ready.push_back(outputs),
                Err(e) => {
                    tracing::warn!(error = %e, "discarding policy error received during shutdown")
                }
            }
        }
        if self.outstanding > 0 {
            tracing::warn!(
                lost = self.outstanding,
                "inference thread exited with frames undecided"
            );
            self.outstanding = 0;
        }
        tracing::debug!(buffered = self.ready.len(), "inference thread stopped");
        Ok(())
    }

    fn update_params(&mut self, params: P::Params) -> Result<(), AgentError> {
        match (&self.running, &mut self.core) {
            (Some(running), _) => running
                .msg_tx
                .send(AgentMsg::UpdateParams(params))
                .map_err(|_| AgentError::Disconnected),
            (None, Some(core)) => Ok(core.policy.set_params(params)?),
            (None, None) => Err(AgentError::Disconnected),
        }
    }

    fn step_mean_us(&self) -> f64 {
        self.step_profiler.mean_us()
    }
}

impl<P: Policy> Drop for AsyncDelayedAgent<P> {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            tracing::error!(error = %e, "inference thread did not shut down cleanly");
        }
    }
}

/// State moved onto the inference thread.
struct InferenceContext<H> {
    batch_steps: usize,
    pending: Arc<AtomicUsize>,
    hidden: Arc<Mutex<Vec<H>>>,
    profiler: Arc<SharedProfiler>,
}

impl<H: Clone> InferenceContext<H> {
    fn run<P>(
        self,
        mut core: InferenceCore<P>,
        rx: Receiver<AgentMsg<P>>,
        tx: Sender<Reply<P>>,
    ) -> InferenceCore<P>
    where
        P: Policy<Hidden = H>,
    {
        while let Ok(msg) = rx.recv() {
            let (states, is_resetting) = match msg {
                AgentMsg::Step {
                    states,
                    is_resetting,
                } => (states, is_resetting),
                AgentMsg::UpdateParams(params) => {
                    if let Err(e) = core.policy.set_params(params) {
                        let _ = tx.send(Err(e));
                        break;
                    }
                    continue;
                }
            };

            let mut batch = Vec::with_capacity(self.batch_steps);
            batch.push((states, is_resetting));
            let mut deferred = None;
            while batch.len() < self.batch_steps {
                match rx.try_recv() {
                    Ok(AgentMsg::Step {
                        states,
                        is_resetting,
                    }) => batch.push((states, is_resetting)),
                    Ok(AgentMsg::UpdateParams(params)) => {
                        deferred = Some(params);
                        break;
                    }
                    Err(_) => break,
                }
            }

            let start = Instant::now();
            let result = core.step_many(&batch);
            self.profiler.record(start.elapsed());
            if let Ok(mut shared) = self.hidden.lock() {
                shared.clone_from(&core.hidden);
            }
            self.pending.fetch_sub(batch.len(), Ordering::AcqRel);

            match result {
                Ok(decided) => {
                    for outputs in decided {
                        if tx.send(Ok(outputs)).is_err() {
                            return core;
                        }
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "policy failed, stopping inference thread");
                    let _ = tx.send(Err(e));
                    break;
                }
            }

            if let Some(params) = deferred {
                if let Err(e) = core.policy.set_params(params) {
                    let _ = tx.send(Err(e));
                    break;
                }
            }
        }
        core
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lagstep_test_utils::{counter_frame, EchoPolicy, FailingPolicy};

    #[test]
    fn dummies_available_before_start() {
        let mut agent = AsyncDelayedAgent::new(EchoPolicy::default(), 2, 2, 1);
        let out = agent.peek_n(2).unwrap();
        assert_eq!(out.len(), 2);
        assert!(out.iter().flatten().all(|s| s.action == -1));
        assert_eq!(agent.pop().unwrap()[0].action, -1);
        assert_eq!(agent.pop().unwrap()[0].action, -1);
        assert_eq!(agent.pop(), Err(AgentError::NotRunning));
    }

    #[test]
    fn pop_with_nothing_in_flight_fails_fast() {
        let mut agent = AsyncDelayedAgent::new(EchoPolicy::default(), 1, 0, 1);
        agent.start().unwrap();
        assert_eq!(
            agent.pop(),
            Err(AgentError::NothingReady {
                requested: 1,
                available: 0
            })
        );
        assert_eq!(
            agent.peek_n(1),
            Err(AgentError::NothingReady {
                requested: 1,
                available: 0
            })
        );
        agent.stop().unwrap();
    }

    #[test]
    fn peek_n_beyond_in_flight_fails_fast() {
        let mut agent = AsyncDelayedAgent::new(EchoPolicy::default(), 1, 1, 1);
        agent.start().unwrap();
        agent.push(counter_frame(3, 1), vec![false]).unwrap();
        assert_eq!(
            agent.peek_n(3),
            Err(AgentError::NothingReady {
                requested: 3,
                available: 2
            })
        );
        let peeked = agent.peek_n(2).unwrap();
        assert_eq!(peeked[1][0].action, 3);
        assert_eq!(agent.pop().unwrap()[0].action, -1);
        assert_eq!(agent.pop().unwrap()[0].action, 3);
        assert!(matches!(agent.pop(), Err(AgentError::NothingReady { .. })));
        agent.stop().unwrap();
    }

    #[test]
    fn push_requires_running_thread() {
        let mut agent = AsyncDelayedAgent::new(EchoPolicy::default(), 1, 0, 1);
        assert_eq!(
            agent.push(counter_frame(0, 1), vec![false]),
            Err(AgentError::NotRunning)
        );
    }

    #[test]
    fn decisions_arrive_in_push_order() {
        let mut agent = AsyncDelayedAgent::new(EchoPolicy::default(), 2, 1, 3);
        agent.start().unwrap();
        for tick in 0..3 {
            agent.push(counter_frame(tick, 2), vec![false; 2]).unwrap();
        }
        let actions: Vec<i64> = (0..4).map(|_| agent.pop().unwrap()[1].action).collect();
        assert_eq!(actions, vec![-1, 0, 1, 2]);
        assert_eq!(agent.pending_states(), 0);
        assert_eq!(agent.hidden_state().unwrap(), vec![3, 3]);
        agent.stop().unwrap();
    }

    #[test]
    fn peek_n_blocks_until_decided_then_keeps_buffer() {
        let mut agent = AsyncDelayedAgent::new(EchoPolicy::default(), 1, 2, 2);
        agent.start().unwrap();
        agent.push(counter_frame(9, 1), vec![false]).unwrap();
        let peeked = agent.peek_n(3).unwrap();
        assert_eq!(peeked[2][0].action, 9);
        assert_eq!(agent.peek_n(3).unwrap(), peeked);
        agent.stop().unwrap();
    }

    #[test]
    fn restart_keeps_policy_and_buffer() {
        let mut agent = AsyncDelayedAgent::new(EchoPolicy::default(), 1, 0, 1);
        agent.start().unwrap();
        agent.push(counter_frame(1, 1), vec![false]).unwrap();
        agent.stop().unwrap();
        assert!(!agent.is_running());
        agent.update_params(10).unwrap();
        agent.start().unwrap();
        agent.push(counter_frame(1, 1), vec![false]).unwrap();
        assert_eq!(agent.pop().unwrap()[0].action, 1);
        assert_eq!(agent.pop().unwrap()[0].action, 11);
        assert_eq!(agent.hidden_state().unwrap(), vec![2]);
    }

    #[test]
    fn params_sent_while_running_apply_to_later_frames() {
        let mut agent = AsyncDelayedAgent::new(EchoPolicy::default(), 1, 0, 4);
        agent.start().unwrap();
        agent.push(counter_frame(5, 1), vec![false]).unwrap();
        agent.update_params(1000).unwrap();
        agent.push(counter_frame(5, 1), vec![false]).unwrap();
        assert_eq!(agent.pop().unwrap()[0].action, 5);
        assert_eq!(agent.pop().unwrap()[0].action, 1005);
    }

    #[test]
    fn policy_failure_surfaces_on_pop() {
        let mut agent = AsyncDelayedAgent::new(FailingPolicy::after(0), 1, 0, 1);
        agent.start().unwrap();
        agent.push(counter_frame(0, 1), vec![false]).unwrap();
        assert!(matches!(agent.pop(), Err(AgentError::Policy(_))));
        assert_eq!(
            agent.pop(),
            Err(AgentError::NothingReady {
                requested: 1,
                available: 0
            })
        );
    }

    #[test]
    fn double_start_rejected() {
        let mut agent = AsyncDelayedAgent::new(EchoPolicy::default(), 1, 0, 1);
        agent.start().unwrap();
        assert_eq!(agent.start(), Err(AgentError::AlreadyRunning));
        agent.stop().unwrap();
        agent.stop().unwrap();
    }
}
