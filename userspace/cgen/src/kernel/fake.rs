//! In-memory [Kernel] and [Generator] with failure injection.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    io,
    path::PathBuf,
};

use cgen_common::{Counter, PROGRAM_NAME};

use crate::{AttachPoint, Chain, Error, Generator, Kernel, ProgramHandle, ProgramImage, Result};

/// Kernel side operations, in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Event {
    Load(AttachPoint),
    Attach(AttachPoint),
    Replace(AttachPoint),
    Unload(PathBuf),
}

#[derive(Debug)]
pub(crate) struct FakeProgram {
    pub point: AttachPoint,
    /// Name of the chain the program was generated from.
    pub chain: String,
    pub counters: HashMap<u32, Counter>,
}

#[derive(Debug, Default)]
pub(crate) struct FakeKernel {
    pub interfaces: Vec<String>,
    pub programs: HashMap<PathBuf, FakeProgram>,
    pub attached: BTreeMap<AttachPoint, PathBuf>,
    pub events: Vec<Event>,
    pub fail_load: HashSet<String>,
    pub fail_attach: HashSet<String>,
    pub fail_replace: HashSet<String>,
    pub fail_unload: HashSet<String>,
    next_id: u64,
}

impl FakeKernel {
    pub fn with_interfaces(ifaces: &[&str]) -> Self {
        Self {
            interfaces: ifaces.iter().map(ToString::to_string).collect(),
            ..Default::default()
        }
    }

    /// Chain run by the program attached to `point`.
    pub fn running(&self, point: &AttachPoint) -> Option<&str> {
        let link = self.attached.get(point)?;
        self.programs.get(link).map(|p| p.chain.as_str())
    }

    /// Simulates traffic on the program attached to `point`.
    pub fn set_counter(&mut self, point: &AttachPoint, index: u32, counter: Counter) {
        let link = &self.attached[point];
        self.programs
            .get_mut(link)
            .expect("attached program is loaded")
            .counters
            .insert(index, counter);
    }

    /// Removes a program behind the orchestrator's back.
    pub fn forget(&mut self, point: &AttachPoint) {
        if let Some(link) = self.attached.remove(point) {
            self.programs.remove(&link);
        }
    }
}

impl Kernel for FakeKernel {
    fn interfaces(&self) -> Result<Vec<String>> {
        Ok(self.interfaces.clone())
    }

    fn load(&mut self, image: &ProgramImage, point: &AttachPoint) -> Result<ProgramHandle> {
        self.events.push(Event::Load(point.clone()));
        if self.fail_load.contains(&point.ifname) {
            return Err(Error::Load {
                point: point.clone(),
                reason: "injected failure".to_string(),
            });
        }

        self.next_id += 1;
        let dir = PathBuf::from(format!("/fake/{}_{}.{}", point.hook, point.ifname, self.next_id));
        let handle = ProgramHandle {
            link: dir.join("link"),
            counters: dir.join("COUNTERS"),
        };
        self.programs.insert(
            handle.link.clone(),
            FakeProgram {
                point: point.clone(),
                chain: String::from_utf8_lossy(&image.object).into_owned(),
                counters: HashMap::new(),
            },
        );
        Ok(handle)
    }

    fn attach(&mut self, handle: &ProgramHandle, point: &AttachPoint) -> Result<()> {
        self.events.push(Event::Attach(point.clone()));
        if self.fail_attach.contains(&point.ifname) || self.attached.contains_key(point) {
            return Err(Error::Attach {
                point: point.clone(),
                reason: "injected failure".to_string(),
            });
        }
        if !self.programs.contains_key(&handle.link) {
            return Err(Error::StaleHandle(handle.link.clone()));
        }
        self.attached.insert(point.clone(), handle.link.clone());
        Ok(())
    }

    fn replace(
        &mut self,
        old: &ProgramHandle,
        new: &ProgramHandle,
        point: &AttachPoint,
    ) -> Result<()> {
        self.events.push(Event::Replace(point.clone()));
        if self.fail_replace.contains(&point.ifname) {
            return Err(Error::Replace {
                point: point.clone(),
                reason: "injected failure".to_string(),
            });
        }
        if self.attached.get(point) != Some(&old.link) {
            return Err(Error::StaleHandle(old.link.clone()));
        }
        if !self.programs.contains_key(&new.link) {
            return Err(Error::StaleHandle(new.link.clone()));
        }
        self.attached.insert(point.clone(), new.link.clone());
        Ok(())
    }

    fn unload(&mut self, handle: &ProgramHandle) -> Result<()> {
        self.events.push(Event::Unload(handle.link.clone()));
        let Some(program) = self.programs.get(&handle.link) else {
            return Ok(());
        };
        if self.fail_unload.contains(&program.point.ifname) {
            return Err(Error::IoError(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "injected failure",
            )));
        }
        self.programs.remove(&handle.link);
        self.attached.retain(|_, link| link != &handle.link);
        Ok(())
    }

    fn read_counter(&self, handle: &ProgramHandle, index: u32) -> Result<Counter> {
        let program = self
            .programs
            .get(&handle.link)
            .ok_or_else(|| Error::StaleHandle(handle.counters.clone()))?;
        Ok(program.counters.get(&index).copied().unwrap_or_default())
    }
}

/// Generator producing the chain name as object.
#[derive(Debug, Default)]
pub(crate) struct FakeGenerator {
    pub fail_on: HashSet<String>,
}

impl Generator for FakeGenerator {
    fn generate(&self, chain: &Chain, point: &AttachPoint) -> Result<ProgramImage> {
        if self.fail_on.contains(&point.ifname) {
            return Err(Error::Generate {
                point: point.clone(),
                reason: "injected failure".to_string(),
            });
        }
        Ok(ProgramImage {
            name: PROGRAM_NAME.to_string(),
            object: chain.name().as_bytes().to_vec(),
        })
    }
}
