//! Integration test: how the worker drains agents at the rollout
//! boundary, observed through a recording agent wrapper.

use indexmap::IndexMap;
use lagstep_agent::{build_delayed_agent, AgentConfig, DelayedAgent};
use lagstep_core::AgentId;
use lagstep_env::{build_batched_env, BoxedEnv, EnvConfig};
use lagstep_rollout::{RolloutWorker, SyncError, WorkerError, WorkerPhase};
use lagstep_test_utils::{unit_reward, CounterSim, EchoPolicy, PeekLog, SpyAgent};

const A: AgentId = AgentId(0);
const B: AgentId = AgentId(1);

type Worker = RolloutWorker<EchoPolicy, BoxedEnv<CounterSim>>;

fn spy(delay: usize) -> SpyAgent<EchoPolicy> {
    SpyAgent::new(build_delayed_agent(
        EchoPolicy::default(),
        1,
        &AgentConfig::sync(delay),
    ))
}

fn worker(a: SpyAgent<EchoPolicy>, b: SpyAgent<EchoPolicy>) -> Worker {
    let env = build_batched_env(&EnvConfig::sync(1), |_| CounterSim::new(&[A, B])).unwrap();
    let mut agents: IndexMap<AgentId, Box<dyn DelayedAgent<EchoPolicy>>> = IndexMap::new();
    agents.insert(A, Box::new(a));
    agents.insert(B, Box::new(b));
    RolloutWorker::new(agents, env, Box::new(unit_reward())).unwrap()
}

fn logged(log: &PeekLog) -> Vec<usize> {
    log.lock().unwrap().clone()
}

#[test]
fn each_agent_drains_its_delay_beyond_the_minimum() {
    let (a, b) = (spy(1), spy(3));
    let (log_a, log_b) = (a.peek_log(), b.peek_log());
    let mut w = worker(a, b);
    w.start().unwrap();
    assert!(logged(&log_a).is_empty());

    let first = w.rollout(4).unwrap();
    let second = w.rollout(4).unwrap();
    assert_eq!(logged(&log_a), vec![0, 0]);
    assert_eq!(logged(&log_b), vec![2, 2]);
    assert_eq!(first.trajectories[&A].delayed_actions.len(), 1);
    assert_eq!(second.trajectories[&B].delayed_actions.len(), 3);
}

#[test]
fn undrained_agent_fails_rollout() {
    let mut w = worker(spy(1), spy(3).with_phantom_pending(1));
    w.start().unwrap();
    let err = w.rollout(2).err();
    assert!(matches!(
        err,
        Some(WorkerError::Sync(SyncError::AgentNotDrained {
            agent: B,
            pending: 1,
        }))
    ));
    assert_eq!(w.phase(), WorkerPhase::Failed);
    assert!(matches!(w.rollout(1), Err(WorkerError::Failed)));
}

#[test]
fn step_timing_comes_from_the_agent() {
    let mut w = worker(spy(1).with_step_us(42.5), spy(3).with_step_us(7.0));
    w.start().unwrap();
    let r = w.rollout(3).unwrap();
    assert_eq!(r.timings.agent_step_us[&A], 42.5);
    assert_eq!(r.timings.agent_step_us[&B], 7.0);
    assert_eq!(r.timings.agent_pop_us.len(), 2);
}
