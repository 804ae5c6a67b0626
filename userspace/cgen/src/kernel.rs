use std::path::PathBuf;

use cgen_common::Counter;
use serde::{Deserialize, Serialize};

use crate::{AttachPoint, Chain, Result};

#[cfg(test)]
pub(crate) mod fake;
mod xdp;

pub use xdp::AyaKernel;

/// Output of the bytecode generator.
///
/// `object` is an eBPF ELF object. It must contain an XDP program called
/// `name` and an `Array<Counter>` map called
/// [COUNTERS_MAP](cgen_common::COUNTERS_MAP) declared with by-name pinning,
/// sized with [counters_len](cgen_common::counters_len).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramImage {
    pub name: String,
    pub object: Vec<u8>,
}

/// Kernel references of a loaded program.
///
/// Everything needed to query, replace or unload the program from another
/// process, as long as the referenced objects still exist.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProgramHandle {
    /// Attachment of the program to its hook.
    pub link: PathBuf,
    /// Counters map of the program.
    pub counters: PathBuf,
}

/// Bytecode generator, compiles a chain for one attachment point.
pub trait Generator {
    fn generate(&self, chain: &Chain, point: &AttachPoint) -> Result<ProgramImage>;
}

/// Kernel primitives used to run generated programs.
///
/// Calls are synchronous and never retried.
pub trait Kernel {
    /// Interfaces a chain without explicit interfaces is enforced on.
    fn interfaces(&self) -> Result<Vec<String>>;

    /// Loads `image` as a new kernel object, without attaching it.
    fn load(&mut self, image: &ProgramImage, point: &AttachPoint) -> Result<ProgramHandle>;

    /// Attaches a loaded program to `point`, which must be free.
    fn attach(&mut self, handle: &ProgramHandle, point: &AttachPoint) -> Result<()>;

    /// Atomically redirects `point` from `old` to the loaded program `new`.
    ///
    /// On failure `old` is still attached.
    fn replace(
        &mut self,
        old: &ProgramHandle,
        new: &ProgramHandle,
        point: &AttachPoint,
    ) -> Result<()>;

    /// Detaches and unloads a program. Succeeds on an already detached one.
    fn unload(&mut self, handle: &ProgramHandle) -> Result<()>;

    /// Reads the counter stored at `index` in the program's counters map.
    fn read_counter(&self, handle: &ProgramHandle, index: u32) -> Result<Counter>;
}
