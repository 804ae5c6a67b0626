use std::{
    collections::HashMap,
    fs, io,
    path::{Path, PathBuf},
};

use aya::{
    maps::{Array, Map, MapData},
    programs::{
        links::{FdLink, PinnedLink},
        xdp::XdpLink,
        Xdp,
    },
    Bpf, BpfLoader,
};
use cgen_common::{Counter, COUNTERS_MAP};
use tracing::{debug, warn};

use crate::{
    AttachPoint, Config, Error, Hook, Kernel, ProgramHandle, ProgramImage, Result, LINK_PIN,
    SYS_CLASS_NET,
};

// Pin directories per attachment point, leaked ones included
const MAX_GENERATIONS: u32 = 1024;

/// Loaded but not yet attached program.
struct Loaded {
    bpf: Bpf,
    name: String,
}

impl Loaded {
    fn xdp(&mut self, point: &AttachPoint) -> Result<&mut Xdp> {
        let program = self
            .bpf
            .program_mut(&self.name)
            .ok_or_else(|| Error::Load {
                point: point.clone(),
                reason: format!("no program named {}", self.name),
            })?;
        Ok(program.try_into()?)
    }
}

/// [Kernel] backend running XDP programs through aya.
///
/// Each program gets its own directory under [Config::bpffs_path], holding
/// its pinned maps and, once attached, its pinned link. Pins keep the
/// program running after this process exits, and are all another process
/// needs to take over.
pub struct AyaKernel {
    config: Config,
    // Keyed by link pin path
    loaded: HashMap<PathBuf, Loaded>,
}

impl AyaKernel {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            loaded: HashMap::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // First free `{hook}_{ifname}.{generation}` directory
    fn pin_dir(&self, point: &AttachPoint) -> Result<PathBuf> {
        (0..MAX_GENERATIONS)
            .map(|generation| {
                self.config
                    .bpffs_path
                    .join(format!("{}_{}.{generation}", point.hook, point.ifname))
            })
            .find(|dir| !dir.exists())
            .ok_or_else(|| Error::Load {
                point: point.clone(),
                reason: format!(
                    "{MAX_GENERATIONS} pin directories already exist under {}",
                    self.config.bpffs_path.display()
                ),
            })
    }
}

impl Kernel for AyaKernel {
    fn interfaces(&self) -> Result<Vec<String>> {
        let mut ifaces = Vec::new();
        for entry in fs::read_dir(SYS_CLASS_NET)? {
            let name = entry?.file_name().to_string_lossy().into_owned();
            if !self.config.ignored_interfaces.contains(&name) {
                ifaces.push(name);
            }
        }
        Ok(ifaces)
    }

    fn load(&mut self, image: &ProgramImage, point: &AttachPoint) -> Result<ProgramHandle> {
        if point.hook != Hook::Xdp {
            return Err(Error::UnsupportedHook(point.hook));
        }

        let dir = self.pin_dir(point)?;
        fs::create_dir_all(&dir)?;
        let bpf = match load_pinned(image, point, &dir) {
            Ok(bpf) => bpf,
            Err(err) => {
                if let Err(e) = fs::remove_dir_all(&dir) {
                    warn!(dir = %dir.display(), "couldn't clean up pin directory: {e}");
                }
                return Err(err);
            }
        };

        let handle = ProgramHandle {
            link: dir.join(LINK_PIN),
            counters: dir.join(COUNTERS_MAP),
        };
        debug!(%point, dir = %dir.display(), "program loaded");
        self.loaded.insert(
            handle.link.clone(),
            Loaded {
                bpf,
                name: image.name.clone(),
            },
        );
        Ok(handle)
    }

    fn attach(&mut self, handle: &ProgramHandle, point: &AttachPoint) -> Result<()> {
        let mut loaded = self
            .loaded
            .remove(&handle.link)
            .ok_or_else(|| Error::StaleHandle(handle.link.clone()))?;
        let program = loaded.xdp(point)?;
        let link_id = program
            .attach(&point.ifname, self.config.xdp_mode.flags())
            .map_err(|err| Error::Attach {
                point: point.clone(),
                reason: err.to_string(),
            })?;
        // The pinned link keeps the program attached once `loaded` is dropped
        let link = FdLink::try_from(program.take_link(link_id)?)?;
        link.pin(&handle.link)?;
        debug!(%point, "program attached");
        Ok(())
    }

    fn replace(
        &mut self,
        old: &ProgramHandle,
        new: &ProgramHandle,
        point: &AttachPoint,
    ) -> Result<()> {
        if !old.link.exists() {
            return Err(Error::StaleHandle(old.link.clone()));
        }
        let mut loaded = self
            .loaded
            .remove(&new.link)
            .ok_or_else(|| Error::StaleHandle(new.link.clone()))?;
        let program = loaded.xdp(point)?;

        // The link is pinned under the new program before it's redirected,
        // nothing can fail once the hook runs the new program. Until the old
        // pin is removed, the link is pinned twice.
        let link = FdLink::from(PinnedLink::from_pin(&old.link)?);
        let link = XdpLink::try_from(FdLink::from(link.pin(&new.link)?))?;
        program.attach_to_link(link).map_err(|err| Error::Replace {
            point: point.clone(),
            reason: err.to_string(),
        })?;
        debug!(%point, "program replaced");
        Ok(())
    }

    fn unload(&mut self, handle: &ProgramHandle) -> Result<()> {
        self.loaded.remove(&handle.link);
        // Removing the last pin of the link detaches the program
        ignore_missing(fs::remove_file(&handle.link))?;
        if let Some(dir) = handle.link.parent() {
            ignore_missing(fs::remove_dir_all(dir))?;
        }
        Ok(())
    }

    fn read_counter(&self, handle: &ProgramHandle, index: u32) -> Result<Counter> {
        if !handle.counters.exists() {
            return Err(Error::StaleHandle(handle.counters.clone()));
        }
        let map = Map::Array(MapData::from_pin(&handle.counters)?);
        let counters: Array<MapData, Counter> = Array::try_from(map)?;
        Ok(counters.get(&index, 0)?)
    }
}

fn load_pinned(image: &ProgramImage, point: &AttachPoint, dir: &Path) -> Result<Bpf> {
    let mut bpf = BpfLoader::new().map_pin_path(dir).load(&image.object)?;
    if !dir.join(COUNTERS_MAP).exists() {
        return Err(Error::Load {
            point: point.clone(),
            reason: format!("object doesn't pin a {COUNTERS_MAP} map"),
        });
    }

    let program: &mut Xdp = bpf
        .program_mut(&image.name)
        .ok_or_else(|| Error::Load {
            point: point.clone(),
            reason: format!("no program named {}", image.name),
        })?
        .try_into()?;
    program.load()?;
    Ok(bpf)
}

fn ignore_missing(res: io::Result<()>) -> io::Result<()> {
    match res {
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        res => res,
    }
}
