use std::{fs, path::Path, path::PathBuf};

use aya::programs::XdpFlags;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

const DEFAULT_BPFFS_PATH: &str = "/sys/fs/bpf/cgen";

/// Settings of the [AyaKernel](crate::kernel::AyaKernel) backend.
///
/// Every field is optional in the JSON representation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Directory programs are pinned under, must live in a bpffs mount.
    pub bpffs_path: PathBuf,
    /// How XDP programs are attached.
    pub xdp_mode: XdpMode,
    /// Interfaces skipped when a chain doesn't list any.
    pub ignored_interfaces: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bpffs_path: PathBuf::from(DEFAULT_BPFFS_PATH),
            xdp_mode: XdpMode::default(),
            ignored_interfaces: vec!["lo".to_string()],
        }
    }
}

impl Config {
    /// Reads a JSON configuration file.
    ///
    /// # Example
    /// ```no_run
    /// # use cgen::Config;
    /// let config = Config::from_file("/etc/cgen.json").unwrap();
    /// ```
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if !self.bpffs_path.is_absolute() {
            return Err(Error::Config(format!(
                "bpffs_path must be absolute, got {}",
                self.bpffs_path.display()
            )));
        }
        Ok(())
    }
}

/// XDP attach mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum XdpMode {
    /// Let the kernel pick the best supported mode.
    #[default]
    Auto,
    /// Generic XDP, works on any interface.
    Skb,
    /// Native XDP, needs driver support.
    Drv,
    /// Offloaded to the NIC.
    Hw,
}

impl XdpMode {
    pub(crate) fn flags(self) -> XdpFlags {
        match self {
            XdpMode::Auto => XdpFlags::default(),
            XdpMode::Skb => XdpFlags::SKB_MODE,
            XdpMode::Drv => XdpFlags::DRV_MODE,
            XdpMode::Hw => XdpFlags::HW_MODE,
        }
    }
}
