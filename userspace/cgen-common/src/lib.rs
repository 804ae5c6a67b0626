#![cfg_attr(not(feature = "user"), no_std)]
mod counter;

pub use counter::{counters_len, errors_index, policy_index, Counter};

/// Name of the counters map every generated program must declare.
///
/// The map is an `Array<Counter>` laid out as one slot per rule, followed by
/// the policy slot and the errors slot. See [`policy_index`] and
/// [`errors_index`].
pub const COUNTERS_MAP: &str = "COUNTERS";

/// Default entry point name of a generated program.
pub const PROGRAM_NAME: &str = "cgen_prog";

// These are also defined in aya-bpf::bindings (xdp_action)
// We redefine them here as not to depend on aya-bpf in this crate
const XDP_DROP: i32 = 1;
const XDP_PASS: i32 = 2;

/// Verdict applied to a packet, by a rule or by the chain's policy.
#[repr(i32)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(
    feature = "user",
    derive(Debug, Hash, serde::Serialize, serde::Deserialize)
)]
pub enum Verdict {
    /// Let the packet through.
    Accept = XDP_PASS,
    /// Drop the packet.
    Drop = XDP_DROP,
}

impl Default for Verdict {
    fn default() -> Self {
        Self::Drop
    }
}

#[cfg(feature = "user")]
impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Accept => f.write_str("ACCEPT"),
            Verdict::Drop => f.write_str("DROP"),
        }
    }
}
