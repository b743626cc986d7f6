//! Strongly-typed agent identifier.

use std::fmt;

/// Identifies one decision-making agent (a controller port) in a rollout.
///
/// Agents are registered when the worker is built; every environment
/// output carries exactly one state sequence per registered agent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AgentId(pub u32);

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for AgentId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}
