use std::collections::BTreeMap;

use cgen_common::Counter;
use tracing::{debug, info, warn};

use crate::{
    counter,
    marsh::{Marsh, Marshal, Tag},
    AttachPoint, Chain, CounterIndex, DecodeError, Error, Generator, Kernel, Program, Result,
};


/// Programs enforcing one chain, at most one per attachment point.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgramSet {
    programs: BTreeMap<AttachPoint, Program>,
}

impl ProgramSet {
    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub fn get(&self, point: &AttachPoint) -> Option<&Program> {
        self.programs.get(point)
    }

    /// Programs sorted by attachment point.
    pub fn iter(&self) -> impl Iterator<Item = &Program> {
        self.programs.values()
    }

    /// Brings up a program on every point of the chain's scope that has none.
    ///
    /// Stops at the first failure, programs already up stay up.
    pub(crate) fn up(
        &mut self,
        chain: &Chain,
        generator: &impl Generator,
        kernel: &mut impl Kernel,
    ) -> Result<()> {
        for point in chain.scope(&*kernel)? {
            if self.programs.contains_key(&point) {
                continue;
            }

            let program = Program::load(chain, &point, generator, kernel)?;
            if let Err(err) = program.attach(kernel) {
                release(&program, kernel);
                return Err(err);
            }
            info!(%point, chain = chain.name(), "program up");
            self.programs.insert(point, program);
        }

        Ok(())
    }

    /// Replaces every program with one generated from `chain`, in
    /// attachment point order. `chain` must have the scope the programs
    /// were brought up for.
    ///
    /// If a point fails after others were swapped, those keep running the
    /// new chain and [Error::PartialUpdate] lists them.
    pub(crate) fn update(
        &mut self,
        chain: &Chain,
        generator: &impl Generator,
        kernel: &mut impl Kernel,
    ) -> Result<()> {
        let points = self.programs.keys().cloned().collect::<Vec<_>>();
        let mut updated = Vec::with_capacity(points.len());

        for point in points {
            if let Err(err) = self.swap(&point, chain, generator, kernel) {
                if updated.is_empty() {
                    return Err(err);
                }
                return Err(Error::PartialUpdate {
                    updated,
                    failed: point,
                    source: Box::new(err),
                });
            }
            updated.push(point);
        }

        Ok(())
    }

    /// Generate, load, redirect the hook, then unload the superseded program.
    ///
    /// The hook always has either the old or the new program attached.
    fn swap(
        &mut self,
        point: &AttachPoint,
        chain: &Chain,
        generator: &impl Generator,
        kernel: &mut impl Kernel,
    ) -> Result<()> {
        let new = Program::load(chain, point, generator, kernel)?;
        let old = &self.programs[point];
        if let Err(err) = kernel.replace(old.handle(), new.handle(), point) {
            release(&new, kernel);
            return Err(err);
        }
        info!(%point, chain = chain.name(), "program replaced");

        if let Some(old) = self.programs.insert(point.clone(), new) {
            if let Err(err) = old.unload(kernel) {
                warn!(%point, "superseded program leaked: {err}");
            }
        }
        Ok(())
    }

    /// Unloads every program and empties the set, even if some fail.
    ///
    /// Returns the first failure and how many programs failed.
    pub(crate) fn unload(&mut self, kernel: &mut impl Kernel) -> Result<()> {
        let mut failed = 0;
        let mut first = None;

        for (point, program) in std::mem::take(&mut self.programs) {
            match program.unload(kernel) {
                Ok(()) => debug!(%point, "program unloaded"),
                Err(err) => {
                    warn!(%point, "failed to unload program: {err}");
                    failed += 1;
                    if first.is_none() {
                        first = Some(err);
                    }
                }
            }
        }

        match first {
            None => Ok(()),
            Some(first) => Err(Error::Unload {
                failed,
                first: Box::new(first),
            }),
        }
    }

    /// Sum of a counter over every program, zero if there is none.
    pub(crate) fn counter(&self, index: CounterIndex, kernel: &impl Kernel) -> Result<Counter> {
        counter::aggregate(self.programs.values().map(|p| p.counter(index, kernel)))
    }
}

// Unloads a program that was never attached
fn release(program: &Program, kernel: &mut impl Kernel) {
    if let Err(err) = program.unload(kernel) {
        warn!(point = %program.point(), "couldn't release unattached program: {err}");
    }
}

impl Marshal for ProgramSet {
    fn marsh(&self) -> Result<Marsh> {
        let children = self
            .programs
            .values()
            .map(Program::marsh)
            .collect::<Result<Vec<_>>>()?;
        Marsh::node(Tag::ProgramSet, children)
    }

    fn unmarsh(marsh: Marsh) -> Result<Self> {
        let marsh = marsh.expect(Tag::ProgramSet)?;
        let mut programs = BTreeMap::new();
        for child in marsh.children() {
            let program = Program::unmarsh(child?)?;
            let point = program.point().clone();
            if programs.insert(point.clone(), program).is_some() {
                return Err(DecodeError::DuplicateProgram(point).into());
            }
        }

        Ok(Self { programs })
    }
}
