use std::fmt;

use cgen_common::Counter;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    marsh::{self, Marsh, Marshal, Tag},
    Chain, CounterIndex, Error, Generator, Hook, Kernel, ProgramHandle, Result,
};

/// Hook and interface a program is attached to.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AttachPoint {
    pub hook: Hook,
    pub ifname: String,
}

impl AttachPoint {
    pub fn new(hook: Hook, ifname: impl Into<String>) -> Self {
        Self {
            hook,
            ifname: ifname.into(),
        }
    }
}

impl fmt::Display for AttachPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.hook, self.ifname)
    }
}

/// Program generated from a chain for a single attachment point.
///
/// Only holds references to kernel objects: dropping a `Program` leaves
/// the kernel side untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    point: AttachPoint,
    handle: ProgramHandle,
    /// Number of rules the program was generated for, its counters map
    /// layout depends on it.
    rules: u32,
}

impl Program {
    pub fn point(&self) -> &AttachPoint {
        &self.point
    }

    pub fn handle(&self) -> &ProgramHandle {
        &self.handle
    }

    pub fn rules(&self) -> u32 {
        self.rules
    }

    /// Generates the program for `point` and loads it, without attaching it.
    ///
    /// A generation failure leaves the kernel untouched.
    pub(crate) fn load(
        chain: &Chain,
        point: &AttachPoint,
        generator: &impl Generator,
        kernel: &mut impl Kernel,
    ) -> Result<Self> {
        let rules = u32::try_from(chain.rule_count()).map_err(|_| Error::Generate {
            point: point.clone(),
            reason: format!("too many rules: {}", chain.rule_count()),
        })?;
        let image = generator.generate(chain, point)?;
        let handle = kernel.load(&image, point)?;
        debug!(%point, chain = chain.name(), "program generated");

        Ok(Self {
            point: point.clone(),
            handle,
            rules,
        })
    }

    pub(crate) fn attach(&self, kernel: &mut impl Kernel) -> Result<()> {
        kernel.attach(&self.handle, &self.point)
    }

    pub(crate) fn unload(&self, kernel: &mut impl Kernel) -> Result<()> {
        kernel.unload(&self.handle)
    }

    /// Reads the program's own value of a counter.
    ///
    /// Zero if the program was generated for fewer rules than `index` needs.
    pub(crate) fn counter(&self, index: CounterIndex, kernel: &impl Kernel) -> Result<Counter> {
        match index.slot(self.rules) {
            Some(slot) => kernel.read_counter(&self.handle, slot),
            None => {
                debug!(point = %self.point, %index, "program has no such counter");
                Ok(Counter::default())
            }
        }
    }
}

impl Marshal for Program {
    fn marsh(&self) -> Result<Marsh> {
        marsh::json_leaf(Tag::Program, self)
    }

    fn unmarsh(marsh: Marsh) -> Result<Self> {
        marsh::from_json_leaf(marsh, Tag::Program)
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} rules, link {}, counters {}",
            self.point,
            self.rules,
            self.handle.link.display(),
            self.handle.counters.display()
        )
    }
}
