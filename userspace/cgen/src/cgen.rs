use std::{fmt, mem};

use bytes::Bytes;
use cgen_common::Counter;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use thiserror::Error;
use tracing::{info, warn};

use crate::{
    marsh::{Marsh, Marshal, Tag},
    Chain, CounterIndex, DecodeError, Error, Generator, Kernel, ProgramSet, Result,
};


/// Configuration surface a chain was defined through.
#[repr(u8)]
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    FromPrimitive,
    strum::Display,
    strum::EnumString,
)]
#[strum(serialize_all = "lowercase")]
pub enum Front {
    Ipt = 0,
    Nft = 1,
    Cli = 2,
}

/// Codegen for a chain: owns the chain and the programs generated from it.
///
/// Programs are loaded in the kernel by [up](Cgen::up) and stay loaded until
/// [unload](Cgen::unload), even if the `Cgen` is dropped. A dropped `Cgen` can
/// be recovered from a [snapshot](Cgen::snapshot), which is how a daemon
/// restarts without interrupting traffic.
///
/// Mutating operations take `&mut self`, reads can be shared.
///
/// # Example
/// ```no_run
/// # use cgen::{Cgen, Chain, Front, Hook, Verdict};
/// # fn run(generator: &impl cgen::Generator, kernel: &mut impl cgen::Kernel) -> cgen::Result<()> {
/// let chain = Chain::new("input", Hook::Xdp, Verdict::Accept);
/// let mut cgen = Cgen::new(Front::Nft, chain);
/// cgen.up(generator, kernel)?;
/// let snapshot = cgen.snapshot()?;
/// drop(cgen);
///
/// // Programs are still running, pick them up again
/// let mut cgen = Cgen::from_snapshot(&snapshot)?;
/// cgen.unload(kernel)?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Cgen {
    front: Front,
    chain: Chain,
    programs: ProgramSet,
}

/// Failed [Cgen::update].
///
/// If no attachment point was updated, the `Cgen` is unchanged and `chain`
/// is the rejected one. Otherwise `error` is [Error::PartialUpdate], the
/// `Cgen` owns the new chain and `chain` is the previous one, to retry or
/// roll back with.
#[derive(Error, Debug)]
#[error("chain update failed")]
pub struct UpdateFailure {
    #[source]
    pub error: Error,
    pub chain: Chain,
}

impl UpdateFailure {
    /// Whether some attachment points run the new chain.
    pub fn is_partial(&self) -> bool {
        matches!(self.error, Error::PartialUpdate { .. })
    }
}

impl Cgen {
    /// Creates a codegen for `chain`, no program is generated yet.
    pub fn new(front: Front, chain: Chain) -> Self {
        Self {
            front,
            chain,
            programs: ProgramSet::default(),
        }
    }

    /// Restores a codegen from [snapshot](Self::snapshot) output.
    ///
    /// Recorded programs are trusted to still exist, a stale one fails the
    /// first operation that uses it.
    pub fn from_snapshot(snapshot: &[u8]) -> Result<Self> {
        Self::unmarsh(Marsh::from_snapshot(snapshot)?)
    }

    /// Serializes the front, the chain and the program descriptors.
    pub fn snapshot(&self) -> Result<Bytes> {
        self.marsh()?.to_snapshot()
    }

    pub fn front(&self) -> Front {
        self.front
    }

    pub fn chain(&self) -> &Chain {
        &self.chain
    }

    pub fn programs(&self) -> &ProgramSet {
        &self.programs
    }

    /// Generates, loads and attaches a program on every attachment point
    /// of the chain's scope that has none yet.
    ///
    /// Stops at the first failure without unwinding: call
    /// [unload](Self::unload) to get rid of the programs already up.
    pub fn up(&mut self, generator: &impl Generator, kernel: &mut impl Kernel) -> Result<()> {
        info!(front = %self.front, chain = self.chain.name(), "bringing chain up");
        self.programs.up(&self.chain, generator, kernel)
    }

    /// Replaces the chain, regenerating and atomically swapping every
    /// program. Returns the previous chain.
    ///
    /// The new chain must have the same hook and interfaces as the current
    /// one, otherwise [Error::ScopeChanged] is returned before any kernel
    /// call. A partial failure is not rolled back, see [UpdateFailure].
    pub fn update(
        &mut self,
        chain: Chain,
        generator: &impl Generator,
        kernel: &mut impl Kernel,
    ) -> std::result::Result<Chain, UpdateFailure> {
        if let Err(error) = self.chain.check_same_scope(&chain) {
            return Err(UpdateFailure { error, chain });
        }

        match self.programs.update(&chain, generator, kernel) {
            Ok(()) => {
                info!(front = %self.front, chain = chain.name(), "chain updated");
                Ok(mem::replace(&mut self.chain, chain))
            }
            Err(error @ Error::PartialUpdate { .. }) => {
                warn!(front = %self.front, chain = chain.name(), "chain partially updated: {error}");
                let previous = mem::replace(&mut self.chain, chain);
                Err(UpdateFailure {
                    error,
                    chain: previous,
                })
            }
            Err(error) => Err(UpdateFailure { error, chain }),
        }
    }

    /// Detaches and unloads every program, even if some of them fail.
    pub fn unload(&mut self, kernel: &mut impl Kernel) -> Result<()> {
        info!(front = %self.front, chain = self.chain.name(), "unloading chain");
        self.programs.unload(kernel)
    }

    /// Reads a counter, summed over every program of the chain.
    ///
    /// Rule indexes past the last rule fail with [Error::CounterOutOfRange].
    pub fn counter(&self, index: CounterIndex, kernel: &impl Kernel) -> Result<Counter> {
        let index = index.check(self.chain.rule_count())?;
        self.programs.counter(index, kernel)
    }
}

impl Marshal for Cgen {
    fn marsh(&self) -> Result<Marsh> {
        Marsh::node(
            Tag::Cgen,
            [
                Marsh::leaf(Tag::Front, vec![self.front as u8]),
                self.chain.marsh()?,
                self.programs.marsh()?,
            ],
        )
    }

    fn unmarsh(marsh: Marsh) -> Result<Self> {
        let marsh = marsh.expect(Tag::Cgen)?;
        let mut children = marsh.children();

        let front = children.expect(Tag::Front)?;
        let front = match front.data()[..] {
            [raw] => Front::from_u8(raw).ok_or(DecodeError::UnknownFront(raw))?,
            _ => {
                return Err(DecodeError::Malformed {
                    what: Tag::Front,
                    reason: format!("{} bytes instead of 1", front.data().len()),
                }
                .into())
            }
        };
        let chain = Chain::unmarsh(children.expect(Tag::Chain)?)?;
        let programs = ProgramSet::unmarsh(children.expect(Tag::ProgramSet)?)?;
        children.finish()?;

        Ok(Self {
            front,
            chain,
            programs,
        })
    }
}

impl fmt::Display for Cgen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "codegen (front {})", self.front)?;
        writeln!(f, "  chain: {}", self.chain)?;
        write!(f, "  programs: {}", self.programs.len())?;
        for program in self.programs.iter() {
            write!(f, "\n    {program}")?;
        }
        Ok(())
    }
}
