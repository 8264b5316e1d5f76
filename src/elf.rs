//! ELF32 loader (§4.4, §6).
//!
//! Grounded on `elf_utils.rs`'s use of the `elf` crate, generalized from
//! reading a single named section to walking every loadable program
//! header, the way `readelf_internal` in the original loader does.
//! Endianness is enforced at the type level: parsing with
//! [`elf::endian::LittleEndian`] instead of `AnyEndian` makes a
//! big-endian input fail to parse at all, rather than requiring a
//! follow-up check on a header field the original inspects by hand.

use elf::abi::PT_LOAD;
use elf::endian::LittleEndian;
use elf::ElfBytes;
use thiserror::Error;

use crate::bus::BusError;
use crate::host::HostMemory;

const EM_RISCV: u16 = 0xF3;

#[derive(Debug, Error)]
pub enum ElfError {
    #[error("failed to read '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("'{0}' is not a valid little-endian 32-bit ELF file")]
    Malformed(String),
    #[error("'{path}' targets machine {machine:#06x}, expected RISC-V ({EM_RISCV:#06x})")]
    WrongMachine { path: String, machine: u16 },
    #[error("segment at {vaddr:#010x} (size {memsz}) does not fit in {ram_size}-byte RAM")]
    SegmentTooLarge {
        vaddr: u32,
        memsz: u32,
        ram_size: u32,
    },
    #[error(transparent)]
    Bus(#[from] BusError),
}

/// Result of a successful load: where execution should begin, and the
/// computed initial program break.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadedImage {
    pub entry: u32,
    pub program_break: u32,
}

/// Load `path` into `mem`'s RAM, placing each `PT_LOAD` segment at its
/// virtual address. `on_segment` is called once per segment for trace
/// output (debug flag `l`).
pub fn load_elf<W: std::io::Write>(
    mem: &mut HostMemory<W>,
    path: &str,
    mut on_segment: impl FnMut(u32, u32, u32),
) -> Result<LoadedImage, ElfError> {
    let bytes = std::fs::read(path).map_err(|source| ElfError::Io {
        path: path.to_string(),
        source,
    })?;

    let file = ElfBytes::<LittleEndian>::minimal_parse(&bytes)
        .map_err(|_| ElfError::Malformed(path.to_string()))?;

    if file.ehdr.e_machine != EM_RISCV {
        return Err(ElfError::WrongMachine {
            path: path.to_string(),
            machine: file.ehdr.e_machine,
        });
    }

    let headers = file
        .segments()
        .ok_or_else(|| ElfError::Malformed(path.to_string()))?;

    let mut program_break = 0u32;

    for phdr in headers.iter().filter(|p| p.p_type == PT_LOAD) {
        let vaddr = phdr.p_vaddr as u32;
        let memsz = phdr.p_memsz as u32;
        let filesz = phdr.p_filesz as u32;
        let offset = phdr.p_offset as usize;

        let segment_end = vaddr
            .checked_add(memsz)
            .ok_or(ElfError::SegmentTooLarge {
                vaddr,
                memsz,
                ram_size: mem.ram_size(),
            })?;
        if segment_end >= mem.ram_size() {
            return Err(ElfError::SegmentTooLarge {
                vaddr,
                memsz,
                ram_size: mem.ram_size(),
            });
        }

        let data = bytes
            .get(offset..offset + filesz as usize)
            .ok_or_else(|| ElfError::Malformed(path.to_string()))?;
        mem.load_segment(vaddr, data)?;

        program_break = program_break.max(segment_end);
        on_segment(vaddr, segment_end, memsz);
    }

    mem.set_program_break(program_break);

    Ok(LoadedImage {
        entry: file.ehdr.e_entry as u32,
        program_break,
    })
}
