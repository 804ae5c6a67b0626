use std::{io, path::PathBuf};

use aya::{
    maps::MapError,
    pin::PinError,
    programs::{links::LinkError, ProgramError},
    BpfError,
};
use thiserror::Error;

use crate::{marsh::Tag, AttachPoint, Hook};

/// Codegen errors.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum Error {
    /// The bytecode generator rejected the chain.
    #[error("failed to generate program for {point}: {reason}")]
    Generate { point: AttachPoint, reason: String },
    /// The kernel refused to load the program.
    #[error("failed to load program for {point}: {reason}")]
    Load { point: AttachPoint, reason: String },
    /// The kernel refused to attach the program.
    #[error("failed to attach program to {point}: {reason}")]
    Attach { point: AttachPoint, reason: String },
    /// The hook could not be redirected to the new program.
    /// The previous program is still attached.
    #[error("failed to replace program attached to {point}: {reason}")]
    Replace { point: AttachPoint, reason: String },
    #[error("hook {0} is not supported by this kernel backend")]
    UnsupportedHook(Hook),
    /// The new chain isn't enforced on the same attachment points as the
    /// running programs.
    #[error("chain {chain} can't replace a chain with another scope: {reason}")]
    ScopeChanged { chain: String, reason: String },
    /// Counter index past the chain's last rule. This is a usage error,
    /// not a system fault.
    #[error("counter index {index} is too large, chain has {rules} rules")]
    CounterOutOfRange { index: u32, rules: usize },
    /// A kernel reference, usually restored from a snapshot, is gone.
    #[error("kernel object {} no longer exists", .0.display())]
    StaleHandle(PathBuf),
    /// Some attachment points run the new chain, the others the previous one.
    #[error("{} attachment point(s) updated before {failed} failed: {source}", .updated.len())]
    PartialUpdate {
        updated: Vec<AttachPoint>,
        failed: AttachPoint,
        #[source]
        source: Box<Error>,
    },
    /// Some programs could not be unloaded. The other ones were.
    #[error("{failed} program(s) failed to unload, first error: {first}")]
    Unload {
        failed: usize,
        #[source]
        first: Box<Error>,
    },
    #[error("port range is invalid")]
    InvalidPort,
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("failed to serialize {what}: {reason}")]
    Encode { what: &'static str, reason: String },
    #[error("invalid configuration: {0}")]
    Config(String),
    // Aya's error seems clear enough to just let them bubble up
    /// Error while loading or attaching an eBPF program.
    #[error(transparent)]
    ProgramError(#[from] ProgramError),
    /// Error when accessing an eBPF map.
    #[error(transparent)]
    MapError(#[from] MapError),
    /// Error when parsing an eBPF object.
    #[error(transparent)]
    BpfError(#[from] BpfError),
    /// Error when pinning to bpffs.
    #[error(transparent)]
    PinError(#[from] PinError),
    /// Error when converting a link.
    #[error(transparent)]
    LinkError(#[from] LinkError),
    /// IO error
    #[error(transparent)]
    IoError(#[from] io::Error),
}

/// Snapshot decoding errors. A snapshot is never partially applied.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("snapshot is truncated: {needed} bytes needed, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },
    #[error("not a codegen snapshot")]
    BadMagic,
    #[error("unsupported snapshot version {0}")]
    UnsupportedVersion(u16),
    #[error("unknown marsh tag {0}")]
    UnknownTag(u8),
    #[error("expected {expected:?} element, found {found:?}")]
    UnexpectedTag { expected: Tag, found: Tag },
    #[error("missing {0:?} element")]
    Missing(Tag),
    #[error("unexpected trailing {0:?} element")]
    Extra(Tag),
    #[error("{0} trailing bytes after snapshot")]
    TrailingBytes(usize),
    #[error("unknown front {0}")]
    UnknownFront(u8),
    #[error("duplicate program for {0}")]
    DuplicateProgram(AttachPoint),
    #[error("malformed {what:?} element: {reason}")]
    Malformed { what: Tag, reason: String },
}
