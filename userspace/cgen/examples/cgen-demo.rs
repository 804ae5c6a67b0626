// Brings a chain up from a precompiled eBPF object, prints its counters and
// optionally stores a snapshot to pick it up later with --restore.
use std::{fs, path::PathBuf};

use anyhow::Context;
use cgen::{
    kernel::AyaKernel, AttachPoint, Cgen, Chain, Config, CounterIndex, Front, Generator, Hook,
    ProgramImage, Protocol, Rule, Verdict,
};
use cgen_common::PROGRAM_NAME;
use clap::Parser;

#[derive(Debug, Parser)]
pub struct Opt {
    /// Interfaces to enforce the chain on, every interface if none
    #[clap(short, long)]
    iface: Vec<String>,
    /// JSON configuration of the kernel backend
    #[clap(short, long)]
    config: Option<PathBuf>,
    /// eBPF object used as generated program
    #[clap(short, long, default_value = "cgen.o")]
    object: PathBuf,
    /// Program name in the object
    #[clap(short, long, default_value = PROGRAM_NAME)]
    program: String,
    /// Where the snapshot is stored
    #[clap(short, long, default_value = "/var/run/cgen-demo.snapshot")]
    snapshot: PathBuf,
    /// Restore from the snapshot instead of creating a new chain
    #[clap(long)]
    restore: bool,
    /// Unload the programs before exiting
    #[clap(long)]
    unload: bool,
}

// Stands in for the bytecode generator: every chain gets the same object
struct FileGenerator {
    object: Vec<u8>,
    name: String,
}

impl Generator for FileGenerator {
    fn generate(&self, chain: &Chain, point: &AttachPoint) -> cgen::Result<ProgramImage> {
        tracing::debug!(%point, chain = chain.name(), "using precompiled object");
        Ok(ProgramImage {
            name: self.name.clone(),
            object: self.object.clone(),
        })
    }
}

// Some runners need to update its rlimit to create the maps we use without problems
// See: https://github.com/aya-rs/aya-template/pull/51
fn bump_memlock_rlimit() -> Result<(), anyhow::Error> {
    let rlimit = libc::rlimit {
        rlim_cur: libc::RLIM_INFINITY,
        rlim_max: libc::RLIM_INFINITY,
    };

    if unsafe { libc::setrlimit(libc::RLIMIT_MEMLOCK, &rlimit) } != 0 {
        anyhow::bail!("Failed to increase rlimit");
    }

    Ok(())
}

fn demo_chain(ifaces: &[String]) -> Result<Chain, anyhow::Error> {
    let mut chain = ifaces
        .iter()
        .fold(Chain::new("demo", Hook::Xdp, Verdict::Accept), |chain, iface| {
            chain.with_interface(iface)
        });

    chain.add_rule(
        Rule::new(Verdict::Drop)
            .with_dest("10.13.0.0/16".parse()?)
            .with_range(800..=900, Protocol::TCP)
            .with_counters(),
    )?;
    chain.add_rule(
        Rule::new(Verdict::Drop)
            .with_source("fafa::3/128".parse()?)
            .with_counters(),
    )?;
    Ok(chain)
}

fn main() -> Result<(), anyhow::Error> {
    let opt = Opt::parse();
    tracing_subscriber::fmt::init();

    bump_memlock_rlimit()?;
    let config = match &opt.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    let mut kernel = AyaKernel::new(config);
    let generator = FileGenerator {
        object: fs::read(&opt.object)
            .with_context(|| format!("couldn't read {}", opt.object.display()))?,
        name: opt.program.clone(),
    };

    let mut cgen = if opt.restore {
        let snapshot = fs::read(&opt.snapshot)?;
        Cgen::from_snapshot(&snapshot)?
    } else {
        let mut cgen = Cgen::new(Front::Cli, demo_chain(&opt.iface)?);
        cgen.up(&generator, &mut kernel)?;
        cgen
    };
    println!("{cgen}");

    let rules = cgen.chain().rule_count() as u32;
    for index in (0..rules)
        .map(CounterIndex::Rule)
        .chain([CounterIndex::Policy, CounterIndex::Errors])
    {
        let counter = cgen.counter(index, &kernel)?;
        println!("{index}: {} packets, {} bytes", counter.packets, counter.bytes);
    }

    if opt.unload {
        cgen.unload(&mut kernel)?;
        if opt.snapshot.exists() {
            fs::remove_file(&opt.snapshot)?;
        }
    } else {
        fs::write(&opt.snapshot, cgen.snapshot()?)?;
    }

    tracing::info!("Program executed");
    Ok(())
}
