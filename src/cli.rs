//! Shared CLI plumbing (§6): parsing the `-d` debug flag string into
//! [`DebugFlags`], grounded on `debug.h`'s bitflag set. Kept separate from
//! `bin/emulate.rs` so the parsing logic has its own unit tests.

use thiserror::Error;

use crate::elf::ElfError;
use crate::host::DebugFlags;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DebugFlagError {
    #[error("unrecognized debug flag character '{0}'")]
    UnknownFlag(char),
}

/// Everything that can go wrong before the CPU ever takes a step: a bad
/// `-d` flag string, or a VM that failed to start up (ELF load failure).
/// The binary maps the two variants to exit codes 1 and 2 respectively
/// (§6).
#[derive(Debug, Error)]
pub enum CliError {
    #[error("bad argument: {0}")]
    BadArgument(#[from] DebugFlagError),
    #[error("failed to start VM: {0}")]
    Startup(#[from] ElfError),
}

/// Parse a debug flag string like `"ts"` (trace + syscall trace) into
/// [`DebugFlags`]. Recognized characters: `t` trace, `s` syscall trace,
/// `m` memory trace, `r` register dump, `i` interactive step, `l` load
/// trace.
pub fn parse_debug_flags(spec: &str) -> Result<DebugFlags, DebugFlagError> {
    let mut flags = DebugFlags::default();
    for ch in spec.chars() {
        match ch {
            't' => flags.trace = true,
            's' => flags.syscall = true,
            'm' => flags.memory = true,
            'r' => flags.registers = true,
            'i' => flags.interactive = true,
            'l' => flags.load = true,
            other => return Err(DebugFlagError::UnknownFlag(other)),
        }
    }
    Ok(flags)
}
