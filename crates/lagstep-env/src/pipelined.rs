//! Threaded batched environment.
//!
//! The simulation thread owns the [`SimBatch`] while running and steps one
//! control frame as soon as it arrives. The control channel holds at most
//! `num_steps` frames, which bounds how far the simulation may run ahead
//! of the caller. Results, including failures, come back in push order.
//!
//! Stopping closes the control channel, joins the thread and keeps every
//! frame it already produced, so a restart continues seamlessly.

use std::collections::VecDeque;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use lagstep_core::{AgentId, EnvOutput, Simulator};

use crate::batch::SimBatch;
use crate::environment::{BatchedEnvironment, Controls};
use crate::error::EnvError;

type StepResult<S> = Result<EnvOutput<S>, EnvError>;

struct Running<S: Simulator> {
    control_tx: Sender<Controls<S::Control>>,
    result_rx: Receiver<StepResult<S::State>>,
    handle: JoinHandle<SimBatch<S>>,
}

/// Batched environment stepping on a dedicated thread.
pub struct PipelinedBatchedEnv<S: Simulator> {
    agents: Vec<AgentId>,
    num_envs: usize,
    num_steps: usize,
    /// Results received from the thread (or the initial frame) not yet popped.
    ready: VecDeque<StepResult<S::State>>,
    /// The instances while no thread owns them.
    batch: Option<SimBatch<S>>,
    running: Option<Running<S>>,
    in_flight: usize,
}

impl<S: Simulator> PipelinedBatchedEnv<S> {
    /// Reset every instance on the calling thread and buffer the first
    /// frame. Call [`start`](BatchedEnvironment::start) before pushing.
    pub fn new(sims: Vec<S>, num_steps: usize) -> Result<Self, EnvError> {
        let (batch, first) = SimBatch::start(sims)?;
        Ok(Self {
            agents: batch.agents().to_vec(),
            num_envs: batch.len(),
            num_steps: num_steps.max(1),
            ready: VecDeque::from([Ok(first)]),
            batch: Some(batch),
            running: None,
            in_flight: 0,
        })
    }

    /// Whether the simulation thread is running.
    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Control frames pushed whose results have not been received.
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Make sure at least one result is in `ready`.
    fn fill(&mut self) -> Result<(), EnvError> {
        if !self.ready.is_empty() {
            return Ok(());
        }
        let running = self.running.as_ref().ok_or(EnvError::NotRunning)?;
        if self.in_flight == 0 {
            return Err(EnvError::Empty);
        }
        let result = running.result_rx.recv().map_err(|_| EnvError::Disconnected)?;
        self.in_flight -= 1;
        self.ready.push_back(result);
        Ok(())
    }
}

impl<S: Simulator> BatchedEnvironment for PipelinedBatchedEnv<S> {
    type State = S::State;
    type Control = S::Control;

    fn agents(&self) -> &[AgentId] {
        &self.agents
    }

    fn num_envs(&self) -> usize {
        self.num_envs
    }

    fn num_steps(&self) -> usize {
        self.num_steps
    }

    fn push(&mut self, controls: Controls<S::Control>) -> Result<(), EnvError> {
        let running = self.running.as_ref().ok_or(EnvError::NotRunning)?;
        running
            .control_tx
            .send(controls)
            .map_err(|_| EnvError::Disconnected)?;
        self.in_flight += 1;
        Ok(())
    }

    fn pop(&mut self) -> Result<EnvOutput<S::State>, EnvError> {
        self.fill()?;
        self.ready.pop_front().ok_or(EnvError::Empty)?
    }

    fn peek(&mut self) -> Result<&EnvOutput<S::State>, EnvError> {
        self.fill()?;
        match self.ready.front() {
            Some(Ok(out)) => Ok(out),
            Some(Err(e)) => Err(e.clone()),
            None => Err(EnvError::Empty),
        }
    }

    fn start(&mut self) -> Result<(), EnvError> {
        if self.running.is_some() {
            return Err(EnvError::AlreadyRunning);
        }
        let mut batch = self.batch.take().ok_or(EnvError::Disconnected)?;

        let (control_tx, control_rx) = bounded::<Controls<S::Control>>(self.num_steps);
        let (result_tx, result_rx) = unbounded();
        let handle = thread::Builder::new()
            .name("lagstep-sim".into())
            .spawn(move || {
                run_sim_loop(&mut batch, &control_rx, &result_tx);
                batch
            })
            .map_err(|e| EnvError::ThreadSpawnFailed {
                reason: e.to_string(),
            })?;

        tracing::debug!(
            num_envs = self.num_envs,
            num_steps = self.num_steps,
            "simulation thread started"
        );
        self.running = Some(Running {
            control_tx,
            result_rx,
            handle,
        });
        Ok(())
    }

    fn stop(&mut self) -> Result<(), EnvError> {
        let Some(Running {
            control_tx,
            result_rx,
            handle,
        }) = self.running.take()
        else {
            return Ok(());
        };
        drop(control_tx);
        let batch = handle.join().map_err(|_| EnvError::ThreadPanicked)?;
        self.batch = Some(batch);
        for result in result_rx.try_iter() {
            self.in_flight = self.in_flight.saturating_sub(1);
            self.ready.push_back(result);
        }
        if self.in_flight > 0 {
            tracing::warn!(
                lost = self.in_flight,
                "simulation thread exited with control frames unprocessed"
            );
            self.in_flight = 0;
        }
        tracing::debug!(buffered = self.ready.len(), "simulation thread stopped");
        Ok(())
    }
}

impl<S: Simulator> Drop for PipelinedBatchedEnv<S> {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            tracing::error!(error = %e, "simulation thread did not shut down cleanly");
        }
    }
}

fn run_sim_loop<S: Simulator>(
    batch: &mut SimBatch<S>,
    controls: &Receiver<Controls<S::Control>>,
    results: &Sender<StepResult<S::State>>,
) {
    while let Ok(frame) = controls.recv() {
        let result = batch.step(&frame);
        let failed = result.is_err();
        if results.send(result).is_err() || failed {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lagstep_test_utils::{CounterSim, FailingSim};

    fn controls(a: AgentId, v: i64, n: usize) -> Controls<i64> {
        [(a, vec![v; n])].into_iter().collect()
    }

    #[test]
    fn first_frame_available_before_start() {
        let a = AgentId(0);
        let mut env = PipelinedBatchedEnv::new(vec![CounterSim::new(&[a]); 2], 2).unwrap();
        assert!(env.peek().unwrap().is_resetting.iter().all(|&r| r));
        env.pop().unwrap();
        assert_eq!(env.pop(), Err(EnvError::NotRunning));
        assert_eq!(env.push(controls(a, 0, 2)), Err(EnvError::NotRunning));
    }

    #[test]
    fn frames_arrive_in_push_order() {
        let a = AgentId(0);
        let mut env = PipelinedBatchedEnv::new(vec![CounterSim::new(&[a])], 3).unwrap();
        env.start().unwrap();
        env.pop().unwrap();
        for v in 10..13 {
            env.push(controls(a, v, 1)).unwrap();
        }
        let seen: Vec<i64> = (0..3)
            .map(|_| env.pop().unwrap().state(a).unwrap()[0].control)
            .collect();
        assert_eq!(seen, vec![10, 11, 12]);
        assert_eq!(env.pop(), Err(EnvError::Empty));
        env.stop().unwrap();
    }

    #[test]
    fn stop_keeps_produced_frames() {
        let a = AgentId(0);
        let mut env = PipelinedBatchedEnv::new(vec![CounterSim::new(&[a])], 2).unwrap();
        env.start().unwrap();
        env.pop().unwrap();
        env.push(controls(a, 7, 1)).unwrap();
        env.push(controls(a, 8, 1)).unwrap();
        env.stop().unwrap();
        assert!(!env.is_running());
        assert_eq!(env.in_flight(), 0);
        assert_eq!(env.peek().unwrap().state(a).unwrap()[0].control, 7);
        env.start().unwrap();
        env.pop().unwrap();
        env.push(controls(a, 9, 1)).unwrap();
        assert_eq!(env.pop().unwrap().state(a).unwrap()[0].control, 8);
        assert_eq!(env.pop().unwrap().state(a).unwrap()[0].tick, 3);
    }

    #[test]
    fn peek_repeats_until_pop() {
        let a = AgentId(0);
        let mut env = PipelinedBatchedEnv::new(vec![CounterSim::new(&[a])], 1).unwrap();
        env.start().unwrap();
        env.pop().unwrap();
        env.push(controls(a, 1, 1)).unwrap();
        let first = env.peek().unwrap().clone();
        assert_eq!(env.peek().unwrap(), &first);
        assert_eq!(env.pop().unwrap(), first);
    }

    #[test]
    fn sim_failure_surfaces_in_order() {
        let a = AgentId(0);
        let mut env = PipelinedBatchedEnv::new(vec![FailingSim::new(&[a], 1)], 2).unwrap();
        env.start().unwrap();
        env.pop().unwrap();
        env.push(controls(a, 1, 1)).unwrap();
        env.push(controls(a, 2, 1)).unwrap();
        assert!(env.pop().is_ok());
        assert!(matches!(env.peek(), Err(EnvError::Sim { env_index: 0, .. })));
        assert!(matches!(env.pop(), Err(EnvError::Sim { env_index: 0, .. })));
    }
}
