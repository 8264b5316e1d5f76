//! The integer register file (§3, §4.3).
//!
//! `x0` is hard-wired to zero: writes to it are silently discarded rather
//! than rejected, matching how every RV32I implementation treats it (it is
//! routinely used as a `/dev/null` destination for instructions whose
//! result nobody wants, e.g. `addi x0, x0, 0` as a no-op encoding).

use crate::opcode::ABI_REGISTER_NAMES;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registers {
    x: [u32; 32],
    pub pc: u32,
}

impl Registers {
    pub fn new(pc: u32) -> Self {
        Registers { x: [0; 32], pc }
    }

    pub fn get(&self, index: u8) -> u32 {
        self.x[index as usize]
    }

    pub fn set(&mut self, index: u8, value: u32) {
        if index != 0 {
            self.x[index as usize] = value;
        }
    }

    /// ABI register name, used by trace and disassembly output.
    pub fn name(index: u8) -> &'static str {
        ABI_REGISTER_NAMES[index as usize]
    }

    pub fn dump(&self) -> impl Iterator<Item = (&'static str, u32)> + '_ {
        (0u8..32).map(move |i| (Self::name(i), self.get(i)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn x0_reads_as_zero_after_write_attempt() {
        let mut regs = Registers::new(0);
        regs.set(0, 0xDEAD_BEEF);
        assert_eq!(regs.get(0), 0);
    }

    #[test]
    fn other_registers_hold_written_value() {
        let mut regs = Registers::new(0);
        regs.set(5, 42);
        assert_eq!(regs.get(5), 42);
    }

    #[test]
    fn dump_covers_all_32_registers_in_abi_order() {
        let regs = Registers::new(0x1000);
        let names: Vec<_> = regs.dump().map(|(name, _)| name).collect();
        assert_eq!(names.len(), 32);
        assert_eq!(names[0], "zero");
        assert_eq!(names[2], "sp");
    }
}
