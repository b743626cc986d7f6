//! A rollout worker hosted on its own thread.
//!
//! The host thread owns the worker exclusively. Callers talk to it with
//! [`WorkerMsg`] requests, each carrying a bounded(1) reply channel, so a
//! rollout can be requested on several hosts before waiting on any.
//! Dropping the handle closes the request channel; the host stops its
//! worker and exits.

use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use indexmap::IndexMap;
use lagstep_core::{AgentId, Policy};
use lagstep_env::BatchedEnvironment;

use crate::error::WorkerError;
use crate::worker::{Rollout, RolloutWorker};

type Reply<T> = Sender<Result<T, WorkerError>>;

/// A request to a hosted worker.
pub enum WorkerMsg<P: Policy> {
    /// Run a rollout.
    Rollout {
        /// Steps to run.
        num_steps: usize,
        /// Where the result goes.
        reply: Reply<Rollout<P>>,
    },
    /// Update policy parameters.
    UpdateVariables {
        /// Parameters per agent.
        params: IndexMap<AgentId, P::Params>,
        /// Acknowledgement.
        reply: Reply<()>,
    },
    /// Start the worker.
    Start {
        /// Acknowledgement.
        reply: Reply<()>,
    },
    /// Stop the worker (the host keeps running).
    Stop {
        /// Acknowledgement.
        reply: Reply<()>,
    },
}

/// A rollout requested from a hosted worker and not yet collected.
pub struct RolloutTicket<P: Policy> {
    rx: Receiver<Result<Rollout<P>, WorkerError>>,
}

impl<P: Policy> RolloutTicket<P> {
    /// Block until the rollout finishes.
    pub fn wait(self) -> Result<Rollout<P>, WorkerError> {
        self.rx.recv().map_err(|_| WorkerError::Disconnected)?
    }
}

/// Handle to a [`RolloutWorker`] running on a dedicated thread.
pub struct RemoteRolloutWorker<P: Policy> {
    msg_tx: Option<Sender<WorkerMsg<P>>>,
    handle: Option<JoinHandle<()>>,
    agents: Vec<AgentId>,
}

impl<P: Policy> RemoteRolloutWorker<P>
where
    Rollout<P>: Send,
{
    /// Move `worker` onto a new host thread.
    pub fn spawn<E>(worker: RolloutWorker<P, E>) -> Result<Self, WorkerError>
    where
        E: BatchedEnvironment<State = P::State, Control = P::Control> + 'static,
    {
        let agents: Vec<AgentId> = worker.agents().collect();
        let (msg_tx, msg_rx) = unbounded();
        let handle = thread::Builder::new()
            .name("lagstep-worker".into())
            .spawn(move || host_loop(worker, msg_rx))
            .map_err(|e| WorkerError::ThreadSpawnFailed {
                reason: e.to_string(),
            })?;
        tracing::debug!(agents = agents.len(), "worker host thread started");
        Ok(Self {
            msg_tx: Some(msg_tx),
            handle: Some(handle),
            agents,
        })
    }

    /// Agents of the hosted worker, in trajectory order.
    pub fn agents(&self) -> &[AgentId] {
        &self.agents
    }

    fn send(&self, msg: WorkerMsg<P>) -> Result<(), WorkerError> {
        self.msg_tx
            .as_ref()
            .ok_or(WorkerError::Disconnected)?
            .send(msg)
            .map_err(|_| WorkerError::Disconnected)
    }

    fn call(&self, make: impl FnOnce(Reply<()>) -> WorkerMsg<P>) -> Result<(), WorkerError> {
        let (reply, rx) = bounded(1);
        self.send(make(reply))?;
        rx.recv().map_err(|_| WorkerError::Disconnected)?
    }

    /// Ask for a rollout without waiting for it.
    pub fn request_rollout(&self, num_steps: usize) -> Result<RolloutTicket<P>, WorkerError> {
        let (reply, rx) = bounded(1);
        self.send(WorkerMsg::Rollout { num_steps, reply })?;
        Ok(RolloutTicket { rx })
    }

    /// Run a rollout and wait for it.
    pub fn rollout(&self, num_steps: usize) -> Result<Rollout<P>, WorkerError> {
        self.request_rollout(num_steps)?.wait()
    }

    /// Update policy parameters on the hosted worker.
    pub fn update_variables(&self, params: IndexMap<AgentId, P::Params>) -> Result<(), WorkerError> {
        self.call(|reply| WorkerMsg::UpdateVariables { params, reply })
    }

    /// Start the hosted worker.
    pub fn start(&self) -> Result<(), WorkerError> {
        self.call(|reply| WorkerMsg::Start { reply })
    }

    /// Stop the hosted worker.
    pub fn stop(&self) -> Result<(), WorkerError> {
        self.call(|reply| WorkerMsg::Stop { reply })
    }
}

impl<P: Policy> RemoteRolloutWorker<P> {
    /// Close the request channel and join the host thread. Idempotent.
    pub fn shutdown(&mut self) -> Result<(), WorkerError> {
        self.msg_tx.take();
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| WorkerError::ThreadPanicked),
            None => Ok(()),
        }
    }
}

impl<P: Policy> Drop for RemoteRolloutWorker<P> {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            tracing::warn!(error = %e, "worker host thread did not join cleanly");
        }
    }
}

fn host_loop<P, E>(mut worker: RolloutWorker<P, E>, rx: Receiver<WorkerMsg<P>>)
where
    P: Policy,
    E: BatchedEnvironment<State = P::State, Control = P::Control>,
{
    while let Ok(msg) = rx.recv() {
        // A dropped reply receiver means the caller gave up; keep serving.
        match msg {
            WorkerMsg::Rollout { num_steps, reply } => {
                let _ = reply.send(worker.rollout(num_steps));
            }
            WorkerMsg::UpdateVariables { params, reply } => {
                let _ = reply.send(worker.update_variables(params));
            }
            WorkerMsg::Start { reply } => {
                let _ = reply.send(worker.start());
            }
            WorkerMsg::Stop { reply } => {
                let _ = reply.send(worker.stop());
            }
        }
    }
    if let Err(e) = worker.stop() {
        tracing::warn!(error = %e, "hosted worker failed to stop");
    }
    tracing::debug!("worker host thread exiting");
}
