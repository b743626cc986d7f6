//! Integration test: delay alignment of recorded trajectories.
//!
//! `CounterSim` stamps every frame with a global tick and `EchoPolicy`
//! acts with the tick it observed, so a recorded action names the frame
//! its decision was made on. With delay `D` the action recorded at tick
//! `t` must have been decided at tick `t - 1 - D` (or be the `-1` dummy),
//! and the control the simulation reports must be that same action.

use lagstep_agent::AgentConfig;
use lagstep_core::AgentId;
use lagstep_env::{BoxedEnv, EnvConfig};
use lagstep_rollout::{Rollout, RolloutWorker, Trajectory, WorkerConfig};
use lagstep_test_utils::{control_reward, CounterSim, EchoPolicy};
use proptest::prelude::*;

type Worker = RolloutWorker<EchoPolicy, BoxedEnv<CounterSim>>;

const A: AgentId = AgentId(0);
const B: AgentId = AgentId(1);

fn build(config: &WorkerConfig, episode_len: Option<u64>) -> Worker {
    let agents: Vec<AgentId> = config.agents.keys().copied().collect();
    RolloutWorker::from_config(
        config,
        |_| EchoPolicy::default(),
        move |i| {
            let sim = CounterSim::new(&agents);
            match episode_len {
                Some(len) => sim.with_episode_len(len + i as u64),
                None => sim,
            }
        },
        control_reward(),
    )
    .unwrap()
}

/// The action a delay-`delay` agent applies on the transition into `tick`.
fn expected_action(tick: u64, delay: usize) -> i64 {
    (tick as i64 - 1 - delay as i64).max(-1)
}

fn assert_aligned(traj: &Trajectory<EchoPolicy>, delay: usize) {
    let ticks = traj.states.tick.as_slice();
    let actions = traj.actions.action.as_slice();
    let controls = traj.states.control.as_slice();
    for ((&tick, &action), &control) in ticks.iter().zip(actions).zip(controls) {
        assert_eq!(action, expected_action(tick, delay), "action at tick {tick}");
        assert_eq!(control, action, "control at tick {tick}");
    }
}

/// Delayed decisions are the ones made on the `delay` frames before the
/// last recorded frame.
fn assert_delayed(traj: &Trajectory<EchoPolicy>, delay: usize) {
    assert_eq!(traj.delayed_actions.len(), delay);
    let last = traj.states.tick.time_len() - 1;
    let last_tick = *traj.states.tick.get(last, 0).unwrap();
    for (j, outputs) in traj.delayed_actions.iter().enumerate() {
        let decided = last_tick as i64 - delay as i64 + j as i64;
        for sample in outputs {
            assert_eq!(sample.action, decided.max(-1), "delayed action {j}");
        }
    }
}

fn actions_of(rollout: &Rollout<EchoPolicy>, agent: AgentId) -> Vec<i64> {
    rollout.trajectories[&agent].actions.action.as_slice().to_vec()
}

// ── Scenarios ──────────────────────────────────────────────────

#[test]
fn zero_delay_single_env() {
    let cfg = WorkerConfig::new(EnvConfig::sync(1)).with_agent(A, AgentConfig::sync(0));
    let mut w = build(&cfg, None);
    w.start().unwrap();
    assert_eq!(w.pending_len(), 1);

    let r = w.rollout(3).unwrap();
    let t = &r.trajectories[&A];
    assert_eq!(t.states.tick.as_slice(), &[0, 1, 2, 3]);
    assert_eq!(t.actions.action.as_slice(), &[-1, 0, 1, 2]);
    assert_eq!(t.is_resetting.as_slice(), &[true, false, false, false]);
    assert_eq!(t.rewards.as_slice(), &[0.0, 1.0, 2.0]);
    assert_eq!(t.num_steps(), 3);
    assert!(t.delayed_actions.is_empty());
    assert_eq!(w.pending_len(), 1);
}

#[test]
fn delay_two_records_two_delayed_decisions() {
    let cfg = WorkerConfig::new(EnvConfig::sync(1)).with_agent(A, AgentConfig::sync(2));
    let mut w = build(&cfg, None);
    assert_eq!(w.pending_len(), 1);
    w.start().unwrap();
    assert_eq!(w.pending_len(), 3);

    let r = w.rollout(5).unwrap();
    assert_eq!(actions_of(&r, A), vec![-1, -1, -1, 0, 1, 2]);
    let delayed: Vec<i64> = r.trajectories[&A]
        .delayed_actions
        .iter()
        .map(|o| o[0].action)
        .collect();
    assert_eq!(delayed, vec![3, 4]);
    assert_eq!(w.pending_len(), 3);
}

#[test]
fn mixed_delays_drain_the_slower_agent() {
    let cfg = WorkerConfig::new(EnvConfig::sync(1))
        .with_agent(A, AgentConfig::sync(1))
        .with_agent(B, AgentConfig::sync(3));
    let mut w = build(&cfg, None);
    assert_eq!(w.min_delay(), 1);
    w.start().unwrap();
    assert_eq!(w.pending_len(), 2);

    let r = w.rollout(6).unwrap();
    assert_eq!(actions_of(&r, A), vec![-1, -1, 0, 1, 2, 3, 4]);
    assert_eq!(actions_of(&r, B), vec![-1, -1, -1, -1, 0, 1, 2]);
    assert_delayed(&r.trajectories[&A], 1);
    assert_delayed(&r.trajectories[&B], 3);
}

#[test]
fn consecutive_rollouts_overlap_by_one_frame() {
    let cfg = WorkerConfig::new(EnvConfig::sync(2))
        .with_agent(A, AgentConfig::sync(1))
        .with_agent(B, AgentConfig::sync(3));
    let mut w = build(&cfg, None);
    w.start().unwrap();

    let mut prev: Option<Rollout<EchoPolicy>> = None;
    for _ in 0..4 {
        let r = w.rollout(4).unwrap();
        for (id, delay) in [(A, 1), (B, 3)] {
            let t = &r.trajectories[&id];
            assert_aligned(t, delay);
            assert_delayed(t, delay);
            if let Some(p) = &prev {
                let last = &p.trajectories[&id];
                let end = last.states.tick.time_len() - 1;
                assert_eq!(last.states.tick.row(end), t.states.tick.row(0));
                assert_eq!(last.actions.action.row(end), t.actions.action.row(0));
                for (j, outputs) in last.delayed_actions.iter().enumerate() {
                    let carried: Vec<i64> = outputs.iter().map(|s| s.action).collect();
                    assert_eq!(t.actions.action.row(j + 1), Some(&carried[..]));
                }
            }
        }
        prev = Some(r);
    }
}

#[test]
fn recurrent_state_resets_with_episodes() {
    let cfg = WorkerConfig::new(EnvConfig::sync(2)).with_agent(A, AgentConfig::sync(1));
    let mut w = build(&cfg, Some(3));
    w.start().unwrap();

    let first = w.rollout(7).unwrap();
    let t = &first.trajectories[&A];
    assert_eq!(t.initial_state, vec![0, 0]);
    assert_aligned(t, 1);
    for (flags, frames) in t.is_resetting.rows().zip(t.states.frame.rows()) {
        for (&flag, &frame) in flags.iter().zip(frames) {
            assert_eq!(flag, frame == 0);
        }
    }

    // Hidden state counts decisions since the last reset; the last state
    // pushed in the first rollout was tick 6.
    let pushed_last = t.states.frame.row(6).unwrap();
    let expected: Vec<u64> = pushed_last.iter().map(|f| f + 1).collect();
    let second = w.rollout(2).unwrap();
    assert_eq!(second.trajectories[&A].initial_state, expected);
}

#[test]
fn rewards_follow_applied_controls() {
    let cfg = WorkerConfig::new(EnvConfig::sync(3)).with_agent(A, AgentConfig::sync(2));
    let mut w = build(&cfg, None);
    w.start().unwrap();
    w.rollout(2).unwrap();
    let r = w.rollout(5).unwrap();
    let t = &r.trajectories[&A];
    assert_eq!(t.rewards.shape(), (5, 3));
    for step in 0..5 {
        let next: Vec<f32> = t
            .actions
            .action
            .row(step + 1)
            .unwrap()
            .iter()
            .map(|&a| a as f32)
            .collect();
        assert_eq!(t.rewards.row(step), Some(&next[..]));
    }
}

#[test]
fn params_apply_to_states_pushed_after_update() {
    let cfg = WorkerConfig::new(EnvConfig::sync(1)).with_agent(A, AgentConfig::sync(2));
    let mut w = build(&cfg, None);
    w.start().unwrap();
    w.rollout(4).unwrap();
    w.update_variables([(A, 100)].into_iter().collect()).unwrap();

    let r = w.rollout(6).unwrap();
    let t = &r.trajectories[&A];
    for (&tick, &action) in t.states.tick.as_slice().iter().zip(t.actions.action.as_slice()) {
        let decided = expected_action(tick, 2);
        let offset = if decided >= 4 { 100 } else { 0 };
        assert_eq!(action, decided + offset, "tick {tick}");
    }
}

// ── Threaded components ────────────────────────────────────────

#[test]
fn threaded_components_match_inline() {
    let inline = WorkerConfig::new(EnvConfig::sync(2))
        .with_agent(A, AgentConfig::sync(1))
        .with_agent(B, AgentConfig::sync(3));
    // 1 + 1 <= 1 + 1 and 2 + 1 <= 1 + 3
    let threaded = WorkerConfig::new(EnvConfig::pipelined(2, 2))
        .with_agent(A, AgentConfig::threaded(1, 2))
        .with_agent(B, AgentConfig::threaded(3, 3));

    let mut a = build(&inline, Some(4));
    let mut b = build(&threaded, Some(4));
    a.start().unwrap();
    b.start().unwrap();
    for _ in 0..3 {
        let ra = a.rollout(5).unwrap();
        let rb = b.rollout(5).unwrap();
        for id in [A, B] {
            let (ta, tb) = (&ra.trajectories[&id], &rb.trajectories[&id]);
            assert_eq!(ta.states, tb.states);
            assert_eq!(ta.actions, tb.actions);
            assert_eq!(ta.rewards, tb.rewards);
            assert_eq!(ta.is_resetting, tb.is_resetting);
            assert_eq!(ta.initial_state, tb.initial_state);
            assert_eq!(ta.delayed_actions, tb.delayed_actions);
        }
    }
    a.stop().unwrap();
    b.stop().unwrap();
}

#[test]
fn zero_delay_threaded_agent_with_pipelined_env() {
    // 0 + 1 <= 1 + 0
    let cfg = WorkerConfig::new(EnvConfig::pipelined(3, 2))
        .with_agent(A, AgentConfig::threaded(0, 1));
    let mut w = build(&cfg, None);
    w.start().unwrap();
    for _ in 0..3 {
        let r = w.rollout(4).unwrap();
        assert_aligned(&r.trajectories[&A], 0);
    }
    w.stop().unwrap();
}

#[test]
fn restart_resumes_the_stream() {
    let cfg = WorkerConfig::new(EnvConfig::pipelined(1, 2))
        .with_agent(A, AgentConfig::threaded(2, 2));
    let mut w = build(&cfg, None);
    w.start().unwrap();
    let first = w.rollout(3).unwrap();
    w.stop().unwrap();
    w.start().unwrap();
    assert_eq!(w.pending_len(), 3);

    let second = w.rollout(3).unwrap();
    let (t1, t2) = (&first.trajectories[&A], &second.trajectories[&A]);
    assert_eq!(t1.states.tick.row(3), t2.states.tick.row(0));
    assert_aligned(t2, 2);
    assert_delayed(t2, 2);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn alignment_holds_for_any_delays(
        delay_a in 0usize..4,
        delay_b in 0usize..4,
        num_envs in 1usize..3,
        lens in proptest::collection::vec(1usize..6, 1..4),
    ) {
        let cfg = WorkerConfig::new(EnvConfig::sync(num_envs))
            .with_agent(A, AgentConfig::sync(delay_a))
            .with_agent(B, AgentConfig::sync(delay_b));
        let mut w = build(&cfg, Some(3));
        w.start().unwrap();
        for len in lens {
            let r = w.rollout(len).unwrap();
            prop_assert_eq!(w.pending_len(), 1 + delay_a.min(delay_b));
            assert_aligned(&r.trajectories[&A], delay_a);
            assert_aligned(&r.trajectories[&B], delay_b);
            assert_delayed(&r.trajectories[&A], delay_a);
            assert_delayed(&r.trajectories[&B], delay_b);
        }
    }
}
