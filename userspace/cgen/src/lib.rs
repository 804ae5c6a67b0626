//! Code generation orchestration for firewall chains.
//!
//! A [`Cgen`] owns one [`Chain`] and the programs generated from it, one per
//! attachment point. It brings them up, swaps them atomically on update,
//! reports aggregated [`Counter`]s and can be serialized to a snapshot so a
//! restarted daemon picks up the programs still running in the kernel.
//!
//! Bytecode generation and the kernel primitives are behind the
//! [`Generator`] and [`Kernel`] traits. [`kernel::AyaKernel`] implements the
//! latter for XDP with bpffs pinning.
//!
//! # Example
//! ```no_run
//! # use cgen::{Cgen, Chain, Config, CounterIndex, Front, Hook, Verdict};
//! # use cgen::kernel::AyaKernel;
//! # fn run(generator: &impl cgen::Generator) -> cgen::Result<()> {
//! let mut kernel = AyaKernel::new(Config::default());
//! let chain = Chain::new("input", Hook::Xdp, Verdict::Accept).with_interface("eth0");
//! let mut cgen = Cgen::new(Front::Cli, chain);
//! cgen.up(generator, &mut kernel)?;
//! let policy = cgen.counter(CounterIndex::Policy, &kernel)?;
//! println!("{} packets hit the policy", policy.packets);
//! # Ok(())
//! # }
//! ```
mod cgen;
mod chain;
mod config;
mod counter;
mod error;
pub mod kernel;
mod marsh;
mod program;
mod program_set;
mod rule;

pub use crate::cgen::{Cgen, Front, UpdateFailure};
pub use cgen_common::{Counter, Verdict};
pub use chain::{Chain, Hook, Set};
pub use config::{Config, XdpMode};
pub use counter::CounterIndex;
pub use error::{DecodeError, Error};
pub use kernel::{Generator, Kernel, ProgramHandle, ProgramImage};
pub use marsh::{Marsh, Marshal, Tag};
pub use program::{AttachPoint, Program};
pub use program_set::ProgramSet;
pub use rule::{PortRange, Protocol, Rule};

pub type Result<T> = std::result::Result<T, Error>;

const LINK_PIN: &str = "link";
const SYS_CLASS_NET: &str = "/sys/class/net";
