//! The concrete host: flat RAM plus the five recognized syscalls (§4.4,
//! §6).
//!
//! Grounded directly on `interface.c`'s `read8`/`write8`/`ecall`: bounds are
//! checked against `ram_size` on every access (no partial-read fixups,
//! per §7's wording that a straddling access at the RAM boundary is an
//! error rather than a short read), and the syscall switch keeps the same
//! five recognized numbers with the same stub bodies.

use std::io::Write;

use thiserror::Error;

use crate::bus::{Bus, BusError, EcallOutcome};
use crate::registers::Registers;

const SYS_CLOSE: u32 = 57;
const SYS_WRITE: u32 = 64;
const SYS_FSTAT: u32 = 80;
const SYS_EXIT: u32 = 93;
const SYS_BRK: u32 = 214;

/// ABI register indices used by the syscall convention (a0..a2, a7).
const REG_A0: u8 = 10;
const REG_A1: u8 = 11;
const REG_A2: u8 = 12;
const REG_A7: u8 = 17;

#[derive(Debug, Error)]
pub enum HostError {
    #[error("failed to allocate {0} bytes of RAM")]
    AllocationFailed(u32),
}

/// Debug trace flags recognized by [`HostMemory`] and the CLI (§6).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DebugFlags {
    pub trace: bool,
    pub syscall: bool,
    pub memory: bool,
    pub registers: bool,
    pub interactive: bool,
    pub load: bool,
}

/// A flat byte-addressable RAM backing the [`Bus`] trait, with stdout as
/// the sink for syscall 64 writes. Generic over the sink so tests can
/// capture output instead of writing to the real stdout.
pub struct HostMemory<W: Write = std::io::Stdout> {
    ram: Vec<u8>,
    stack_size: u32,
    prog_break: u32,
    heap_max: u32,
    debug: DebugFlags,
    out: W,
}

impl HostMemory<std::io::Stdout> {
    pub fn new(ram_size: u32, stack_size: u32, debug: DebugFlags) -> Self {
        Self::with_sink(ram_size, stack_size, debug, std::io::stdout())
    }
}

impl<W: Write> HostMemory<W> {
    pub fn with_sink(ram_size: u32, stack_size: u32, debug: DebugFlags, out: W) -> Self {
        let heap_max = ram_size.saturating_sub(stack_size);
        HostMemory {
            ram: vec![0u8; ram_size as usize],
            stack_size,
            prog_break: 0,
            heap_max,
            debug,
            out,
        }
    }

    pub fn ram_size(&self) -> u32 {
        self.ram.len() as u32
    }

    pub fn stack_size(&self) -> u32 {
        self.stack_size
    }

    /// Write `bytes` into RAM starting at `addr`, used to load ELF segments.
    pub fn load_segment(&mut self, addr: u32, bytes: &[u8]) -> Result<(), BusError> {
        let end = addr as usize + bytes.len();
        let dest = self
            .ram
            .get_mut(addr as usize..end)
            .ok_or(BusError::OutOfBounds(addr))?;
        dest.copy_from_slice(bytes);
        Ok(())
    }

    pub fn set_program_break(&mut self, value: u32) {
        self.prog_break = value;
    }

    fn check(&self, addr: u32, width: u32) -> Result<(), BusError> {
        let end = addr.checked_add(width).ok_or(BusError::OutOfBounds(addr))?;
        if end as usize > self.ram.len() {
            return Err(BusError::OutOfBounds(addr));
        }
        Ok(())
    }
}

impl<W: Write> Bus for HostMemory<W> {
    fn read8(&mut self, addr: u32) -> Result<u8, BusError> {
        self.check(addr, 1)?;
        let val = self.ram[addr as usize];
        if self.debug.memory {
            println!("read byte from {addr:#010x}: {val:#04x}");
        }
        Ok(val)
    }

    fn read16(&mut self, addr: u32) -> Result<u16, BusError> {
        self.check(addr, 2)?;
        let bytes = [self.ram[addr as usize], self.ram[addr as usize + 1]];
        let val = u16::from_le_bytes(bytes);
        if self.debug.memory {
            println!("read halfword from {addr:#010x}: {val:#06x}");
        }
        Ok(val)
    }

    fn read32(&mut self, addr: u32) -> Result<u32, BusError> {
        self.check(addr, 4)?;
        let bytes: [u8; 4] = self.ram[addr as usize..addr as usize + 4]
            .try_into()
            .expect("checked range is exactly 4 bytes");
        let val = u32::from_le_bytes(bytes);
        if self.debug.memory {
            println!("read word from {addr:#010x}: {val:#010x}");
        }
        Ok(val)
    }

    fn write8(&mut self, addr: u32, value: u8) -> Result<(), BusError> {
        self.check(addr, 1)?;
        self.ram[addr as usize] = value;
        if self.debug.memory {
            println!("write byte to {addr:#010x}: {value:#04x}");
        }
        Ok(())
    }

    fn write16(&mut self, addr: u32, value: u16) -> Result<(), BusError> {
        self.check(addr, 2)?;
        let bytes = value.to_le_bytes();
        self.ram[addr as usize..addr as usize + 2].copy_from_slice(&bytes);
        if self.debug.memory {
            println!("write halfword to {addr:#010x}: {value:#06x}");
        }
        Ok(())
    }

    fn write32(&mut self, addr: u32, value: u32) -> Result<(), BusError> {
        self.check(addr, 4)?;
        let bytes = value.to_le_bytes();
        self.ram[addr as usize..addr as usize + 4].copy_from_slice(&bytes);
        if self.debug.memory {
            println!("write word to {addr:#010x}: {value:#010x}");
        }
        Ok(())
    }

    fn ecall(&mut self, regs: &mut Registers) -> EcallOutcome {
        let number = regs.get(REG_A7);
        if self.debug.syscall {
            println!("syscall request {number} encountered at pc={:#010x}", regs.pc);
        }

        match number {
            SYS_CLOSE => {
                regs.set(REG_A0, 0);
                EcallOutcome::Continue
            }
            SYS_WRITE => {
                let addr = regs.get(REG_A1);
                let len = regs.get(REG_A2);
                for j in 0..len {
                    if let Ok(byte) = self.read8(addr + j) {
                        let _ = self.out.write_all(&[byte]);
                    }
                }
                let _ = self.out.flush();
                regs.set(REG_A0, len);
                EcallOutcome::Continue
            }
            SYS_FSTAT => {
                regs.set(REG_A0, 0);
                EcallOutcome::Continue
            }
            SYS_EXIT => {
                let code = regs.get(REG_A0);
                if self.debug.syscall {
                    println!("exiting with code {code}");
                }
                EcallOutcome::Exit((code & 0xFF) as u8)
            }
            SYS_BRK => {
                let requested = regs.get(REG_A0);
                if self.debug.syscall {
                    println!("moving program break to {requested:#010x}");
                }
                if requested != 0 && requested < self.heap_max {
                    self.prog_break = requested;
                }
                regs.set(REG_A0, self.prog_break);
                EcallOutcome::Continue
            }
            other => {
                println!("warning: unimplemented syscall {other}");
                EcallOutcome::Continue
            }
        }
    }

    fn ebreak(&mut self, regs: &mut Registers) {
        println!("breakpoint encountered at pc={:#010x}", regs.pc);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(ram_size: u32, stack_size: u32) -> HostMemory<Vec<u8>> {
        HostMemory::with_sink(ram_size, stack_size, DebugFlags::default(), Vec::new())
    }

    #[test]
    fn write_syscall_copies_ram_bytes_to_sink() {
        let mut h = host(64, 16);
        h.write8(0, b'h').unwrap();
        h.write8(1, b'i').unwrap();
        let mut regs = Registers::new(0);
        regs.set(REG_A7, SYS_WRITE);
        regs.set(REG_A1, 0);
        regs.set(REG_A2, 2);
        h.ecall(&mut regs);
        assert_eq!(h.out, b"hi");
        assert_eq!(regs.get(REG_A0), 2);
    }

    #[test]
    fn exit_syscall_returns_exit_code() {
        let mut h = host(64, 16);
        let mut regs = Registers::new(0);
        regs.set(REG_A7, SYS_EXIT);
        regs.set(REG_A0, 7);
        assert_eq!(h.ecall(&mut regs), EcallOutcome::Exit(7));
    }

    #[test]
    fn brk_moves_break_within_heap_ceiling() {
        let mut h = host(1024, 256);
        let mut regs = Registers::new(0);
        regs.set(REG_A7, SYS_BRK);
        regs.set(REG_A0, 500);
        h.ecall(&mut regs);
        assert_eq!(regs.get(REG_A0), 500);
    }

    #[test]
    fn brk_rejects_request_above_heap_ceiling() {
        let mut h = host(1024, 256);
        let mut regs = Registers::new(0);
        regs.set(REG_A7, SYS_BRK);
        regs.set(REG_A0, 900); // heap_max = 1024 - 256 = 768
        h.ecall(&mut regs);
        assert_eq!(regs.get(REG_A0), 0);
    }

    #[test]
    fn brk_query_with_zero_arg_returns_current_break() {
        let mut h = host(1024, 256);
        h.set_program_break(100);
        let mut regs = Registers::new(0);
        regs.set(REG_A7, SYS_BRK);
        regs.set(REG_A0, 0);
        h.ecall(&mut regs);
        assert_eq!(regs.get(REG_A0), 100);
    }

    #[test]
    fn reads_and_writes_outside_ram_report_out_of_bounds() {
        let mut h = host(16, 4);
        assert_eq!(h.read32(14).unwrap_err(), BusError::OutOfBounds(14));
        assert_eq!(
            h.write8(16, 1).unwrap_err(),
            BusError::OutOfBounds(16)
        );
    }

    #[test]
    fn load_segment_populates_ram() {
        let mut h = host(16, 4);
        h.load_segment(4, &[1, 2, 3]).unwrap();
        assert_eq!(h.read8(4).unwrap(), 1);
        assert_eq!(h.read8(6).unwrap(), 3);
    }

    #[test]
    fn repeated_reads_of_the_same_word_with_no_intervening_write_agree() {
        let mut h = host(64, 16);
        h.write32(8, 0xDEAD_BEEF).unwrap();
        let first = h.read32(8).unwrap();
        let second = h.read32(8).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, 0xDEAD_BEEF);
    }
}
