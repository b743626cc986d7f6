//! End-to-end delayed rollout example.
//!
//! Demonstrates: build config → worker → start → rollouts → parameter
//! update → stop, printing which frame each applied action was decided on.

use lagstep_bench::{build_profile_worker, threaded_profile};
use lagstep_core::AgentId;

fn main() {
    println!("=== lagstep delayed rollout example ===\n");

    let delays = [0, 2, 4];
    let config = threaded_profile(2, &delays);
    let mut worker = build_profile_worker(&config, 10).unwrap();
    worker.start().unwrap();
    println!("min_delay={}, pending ring={}\n", worker.min_delay(), worker.pending_len());

    for round in 0..3 {
        if round == 2 {
            let params = config.agents.keys().map(|&id| (id, 1000)).collect();
            worker.update_variables(params).unwrap();
            println!("  (policy offset set to 1000)");
        }
        let rollout = worker.rollout(6).unwrap();
        println!("Rollout {round}:");
        for (i, &d) in delays.iter().enumerate() {
            let t = &rollout.trajectories[&AgentId(i as u32)];
            let ticks: Vec<u64> = t.states.tick.rows().map(|r| r[0]).collect();
            let actions: Vec<i64> = t.actions.action.rows().map(|r| r[0]).collect();
            println!(
                "  agent {i} (delay {d}): ticks={ticks:?} actions={actions:?} reward={:.1}",
                t.total_reward()
            );
        }
        println!(
            "  env_pop={:.1}us env_push={:.1}us\n",
            rollout.timings.env_pop_us, rollout.timings.env_push_us
        );
    }

    worker.stop().unwrap();
    println!("Done.");
}
