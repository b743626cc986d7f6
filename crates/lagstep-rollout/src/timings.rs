//! Per-phase rollout latency.

use indexmap::IndexMap;
use lagstep_core::AgentId;

/// Mean latency of each step-loop phase, in microseconds.
///
/// Means are taken over the worker's lifetime, with the first sample of
/// each phase discarded as warm-up.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RolloutTimings {
    /// Environment `pop`.
    pub env_pop_us: f64,
    /// Environment `push`.
    pub env_push_us: f64,
    /// Per-agent `pop`.
    pub agent_pop_us: IndexMap<AgentId, f64>,
    /// Per-agent inference call, as measured by the agent itself.
    pub agent_step_us: IndexMap<AgentId, f64>,
}

impl RolloutTimings {
    /// Average several timing reports field by field. Agents missing from
    /// some reports are averaged over the reports that have them.
    pub fn mean<'a>(reports: impl IntoIterator<Item = &'a RolloutTimings>) -> RolloutTimings {
        let mut n = 0usize;
        let mut out = RolloutTimings::default();
        let mut pop_counts: IndexMap<AgentId, usize> = IndexMap::new();
        let mut step_counts: IndexMap<AgentId, usize> = IndexMap::new();
        for r in reports {
            n += 1;
            out.env_pop_us += r.env_pop_us;
            out.env_push_us += r.env_push_us;
            accumulate(&mut out.agent_pop_us, &mut pop_counts, &r.agent_pop_us);
            accumulate(&mut out.agent_step_us, &mut step_counts, &r.agent_step_us);
        }
        if n == 0 {
            return out;
        }
        out.env_pop_us /= n as f64;
        out.env_push_us /= n as f64;
        divide(&mut out.agent_pop_us, &pop_counts);
        divide(&mut out.agent_step_us, &step_counts);
        out
    }
}

fn accumulate(
    sums: &mut IndexMap<AgentId, f64>,
    counts: &mut IndexMap<AgentId, usize>,
    values: &IndexMap<AgentId, f64>,
) {
    for (&agent, &v) in values {
        *sums.entry(agent).or_insert(0.0) += v;
        *counts.entry(agent).or_insert(0) += 1;
    }
}

fn divide(sums: &mut IndexMap<AgentId, f64>, counts: &IndexMap<AgentId, usize>) {
    for (agent, sum) in sums.iter_mut() {
        if let Some(&c) = counts.get(agent) {
            *sum /= c as f64;
        }
    }
}
