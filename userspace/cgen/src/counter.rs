use std::fmt;

use cgen_common::{errors_index, policy_index, Counter};

use crate::{Error, Result};

/// Logical counter of a chain.
///
/// Rule counters are addressed by the rule's position in the chain, the
/// policy and errors counters exist for every chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CounterIndex {
    /// Packets matched by the rule at this position.
    Rule(u32),
    /// Packets that didn't match any rule and got the chain's policy.
    Policy,
    /// Packets the program failed to process.
    Errors,
}

impl CounterIndex {
    /// Fails if a rule index is out of a `rules` long chain.
    pub(crate) fn check(self, rules: usize) -> Result<Self> {
        match self {
            CounterIndex::Rule(index) if index as usize >= rules => {
                Err(Error::CounterOutOfRange { index, rules })
            }
            _ => Ok(self),
        }
    }

    /// Slot in the counters map of a program generated for `rules` rules.
    ///
    /// `None` if the program has no such rule.
    pub(crate) fn slot(self, rules: u32) -> Option<u32> {
        match self {
            CounterIndex::Rule(index) if index < rules => Some(index),
            CounterIndex::Rule(_) => None,
            CounterIndex::Policy => Some(policy_index(rules)),
            CounterIndex::Errors => Some(errors_index(rules)),
        }
    }
}

impl fmt::Display for CounterIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CounterIndex::Rule(index) => write!(f, "rule {index}"),
            CounterIndex::Policy => f.write_str("policy"),
            CounterIndex::Errors => f.write_str("errors"),
        }
    }
}

/// Sums counters read from several programs, stopping at the first failed read.
pub(crate) fn aggregate(counters: impl IntoIterator<Item = Result<Counter>>) -> Result<Counter> {
    counters.into_iter().sum()
}
