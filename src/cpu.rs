//! The execution dispatcher (component 4 of the core, §4.2, §4.5).
//!
//! One `match` over [`Opcode`], grounded directly on `riscv_exec`'s switch:
//! every arm reads straight from `Registers`/`Bus` and either falls through
//! to the `pc += 4` at the bottom or sets `next_pc` itself for control-flow
//! instructions. Kept as a single function with the register file and
//! decoded fields in locals, not a per-opcode dispatch table, because
//! nothing about this instruction set benefits from indirecting through
//! function pointers for 40 known cases.

use crate::bus::{read16_signed, read8_signed, Bus, EcallOutcome};
use crate::decode::{DecodeError, Decoder};
use crate::opcode::Opcode;
use crate::registers::Registers;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepResult {
    Success,
    Halt(u8),
    Error,
    WrongOpcode,
}

pub struct Cpu {
    pub regs: Registers,
    decoder: Decoder,
}

impl Cpu {
    pub fn new(entry_pc: u32) -> Self {
        Cpu {
            regs: Registers::new(entry_pc),
            decoder: Decoder::new(),
        }
    }

    /// Execute one instruction. `pc` must be 4-byte aligned on entry, per
    /// §4.2's precondition; violating it is a caller bug, so it is checked
    /// with `debug_assert!` rather than folded into [`StepResult`].
    pub fn step<B: Bus>(&mut self, bus: &mut B) -> StepResult {
        debug_assert_eq!(self.regs.pc & 3, 0, "pc must be 4-byte aligned");
        self.regs.set(0, 0);

        let instr = match bus.read32(self.regs.pc) {
            Ok(word) => word,
            Err(_) => return StepResult::Error,
        };

        let decoded = match self.decoder.decode(instr) {
            Ok(d) => d,
            Err(DecodeError::UnknownInstruction(_)) => return StepResult::WrongOpcode,
        };

        let rs1 = self.regs.get(decoded.rs1);
        let rs2 = self.regs.get(decoded.rs2);
        let mut next_pc = self.regs.pc.wrapping_add(4);

        macro_rules! imm_signed {
            ($bit:expr) => {
                crate::sext::sext(decoded.imm, $bit)
            };
        }

        match decoded.opcode {
            Opcode::Lui => self.regs.set(decoded.rd, decoded.imm),
            Opcode::Auipc => self.regs.set(decoded.rd, self.regs.pc.wrapping_add(decoded.imm)),
            Opcode::Jal => {
                if decoded.rd != 0 {
                    self.regs.set(decoded.rd, self.regs.pc.wrapping_add(4));
                }
                next_pc = self.regs.pc.wrapping_add(imm_signed!(20) as u32);
            }
            Opcode::Jalr => {
                let link = self.regs.pc.wrapping_add(4);
                next_pc = rs1.wrapping_add(imm_signed!(11) as u32) & !1u32;
                if decoded.rd != 0 {
                    self.regs.set(decoded.rd, link);
                }
            }
            Opcode::Beq => {
                if rs1 == rs2 {
                    next_pc = self.regs.pc.wrapping_add(imm_signed!(12) as u32);
                }
            }
            Opcode::Bne => {
                if rs1 != rs2 {
                    next_pc = self.regs.pc.wrapping_add(imm_signed!(12) as u32);
                }
            }
            Opcode::Blt => {
                if (rs1 as i32) < (rs2 as i32) {
                    next_pc = self.regs.pc.wrapping_add(imm_signed!(12) as u32);
                }
            }
            Opcode::Bge => {
                if (rs1 as i32) >= (rs2 as i32) {
                    next_pc = self.regs.pc.wrapping_add(imm_signed!(12) as u32);
                }
            }
            Opcode::Bltu => {
                if rs1 < rs2 {
                    next_pc = self.regs.pc.wrapping_add(imm_signed!(12) as u32);
                }
            }
            Opcode::Bgeu => {
                if rs1 >= rs2 {
                    next_pc = self.regs.pc.wrapping_add(imm_signed!(12) as u32);
                }
            }
            Opcode::Lb => {
                let addr = rs1.wrapping_add(imm_signed!(11) as u32);
                match read8_signed(bus, addr) {
                    Ok(byte) => self.regs.set(decoded.rd, byte as u32),
                    Err(_) => return StepResult::Error,
                }
            }
            Opcode::Lh => {
                let addr = rs1.wrapping_add(imm_signed!(11) as u32);
                match read16_signed(bus, addr) {
                    Ok(half) => self.regs.set(decoded.rd, half as u32),
                    Err(_) => return StepResult::Error,
                }
            }
            Opcode::Lw => {
                let addr = rs1.wrapping_add(imm_signed!(11) as u32);
                match bus.read32(addr) {
                    Ok(word) => self.regs.set(decoded.rd, word),
                    Err(_) => return StepResult::Error,
                }
            }
            Opcode::Lbu => {
                let addr = rs1.wrapping_add(imm_signed!(11) as u32);
                match bus.read8(addr) {
                    Ok(byte) => self.regs.set(decoded.rd, byte as u32),
                    Err(_) => return StepResult::Error,
                }
            }
            Opcode::Lhu => {
                let addr = rs1.wrapping_add(imm_signed!(11) as u32);
                match bus.read16(addr) {
                    Ok(half) => self.regs.set(decoded.rd, half as u32),
                    Err(_) => return StepResult::Error,
                }
            }
            Opcode::Sb => {
                let addr = rs1.wrapping_add(imm_signed!(11) as u32);
                if bus.write8(addr, rs2 as u8).is_err() {
                    return StepResult::Error;
                }
            }
            Opcode::Sh => {
                let addr = rs1.wrapping_add(imm_signed!(11) as u32);
                if bus.write16(addr, rs2 as u16).is_err() {
                    return StepResult::Error;
                }
            }
            Opcode::Sw => {
                let addr = rs1.wrapping_add(imm_signed!(11) as u32);
                if bus.write32(addr, rs2).is_err() {
                    return StepResult::Error;
                }
            }
            Opcode::Addi => {
                self.regs
                    .set(decoded.rd, (rs1 as i32).wrapping_add(imm_signed!(11)) as u32)
            }
            Opcode::Slti => self
                .regs
                .set(decoded.rd, ((rs1 as i32) < imm_signed!(11)) as u32),
            Opcode::Sltiu => self
                .regs
                .set(decoded.rd, (rs1 < imm_signed!(11) as u32) as u32),
            Opcode::Xori => self.regs.set(decoded.rd, rs1 ^ imm_signed!(11) as u32),
            Opcode::Ori => self.regs.set(decoded.rd, rs1 | imm_signed!(11) as u32),
            Opcode::Andi => self.regs.set(decoded.rd, rs1 & imm_signed!(11) as u32),
            Opcode::Slli => self.regs.set(decoded.rd, rs1 << (decoded.shamt & 0x1F)),
            Opcode::Srli => self.regs.set(decoded.rd, rs1 >> (decoded.shamt & 0x1F)),
            Opcode::Srai => self
                .regs
                .set(decoded.rd, arithmetic_shift_right(rs1, decoded.shamt & 0x1F)),
            Opcode::Add => self.regs.set(decoded.rd, rs1.wrapping_add(rs2)),
            Opcode::Sub => self.regs.set(decoded.rd, rs1.wrapping_sub(rs2)),
            Opcode::Sll => self.regs.set(decoded.rd, rs1 << (rs2 & 0x1F)),
            Opcode::Slt => self
                .regs
                .set(decoded.rd, ((rs1 as i32) < (rs2 as i32)) as u32),
            Opcode::Sltu => self.regs.set(decoded.rd, (rs1 < rs2) as u32),
            Opcode::Xor => self.regs.set(decoded.rd, rs1 ^ rs2),
            Opcode::Srl => self.regs.set(decoded.rd, rs1 >> (rs2 & 0x1F)),
            Opcode::Sra => self
                .regs
                .set(decoded.rd, arithmetic_shift_right(rs1, rs2 & 0x1F)),
            Opcode::Or => self.regs.set(decoded.rd, rs1 | rs2),
            Opcode::And => self.regs.set(decoded.rd, rs1 & rs2),
            Opcode::Fence => {}
            Opcode::Ecall => match bus.ecall(&mut self.regs) {
                EcallOutcome::Continue => {}
                EcallOutcome::Exit(code) => return StepResult::Halt(code),
            },
            Opcode::Ebreak => bus.ebreak(&mut self.regs),
        }

        self.regs.pc = next_pc;
        StepResult::Success
    }
}

/// `x >> shamt`, filling vacated high bits with the sign bit of `x`
/// (shamt is always in 0..32 here, masked by every call site).
fn arithmetic_shift_right(x: u32, shamt: u8) -> u32 {
    if shamt == 0 {
        return x;
    }
    let fill = if x & 0x8000_0000 != 0 {
        ((1u32 << shamt) - 1) << (32 - shamt)
    } else {
        0
    };
    (x >> shamt) | fill
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{DebugFlags, HostMemory};

    fn word_r(opcode7: u32, funct3: u32, funct7: u32, rd: u32, rs1: u32, rs2: u32) -> u32 {
        (funct7 << 25) | (rs2 << 20) | (rs1 << 15) | (funct3 << 12) | (rd << 7) | opcode7
    }

    fn word_i(opcode7: u32, funct3: u32, rd: u32, rs1: u32, imm12: u32) -> u32 {
        ((imm12 & 0xFFF) << 20) | (rs1 << 15) | (funct3 << 12) | (rd << 7) | opcode7
    }

    fn bus() -> HostMemory<Vec<u8>> {
        HostMemory::with_sink(4096, 256, DebugFlags::default(), Vec::new())
    }

    #[test]
    fn addi_adds_sign_extended_immediate() {
        let mut b = bus();
        b.write32(0, word_i(0b0010011, 0, 5, 0, 0xFFF)).unwrap(); // addi x5, x0, -1
        let mut cpu = Cpu::new(0);
        assert_eq!(cpu.step(&mut b), StepResult::Success);
        assert_eq!(cpu.regs.get(5), u32::MAX);
        assert_eq!(cpu.regs.pc, 4);
    }

    #[test]
    fn srai_sign_extends_on_shift() {
        let mut b = bus();
        // srai x2, x1, 4
        b.write32(0, word_r(0b0010011, 0b101, 0b0100000, 2, 1, 4))
            .unwrap();
        let mut cpu = Cpu::new(0);
        cpu.regs.set(1, 0x8000_0000);
        cpu.step(&mut b);
        assert_eq!(cpu.regs.get(2), 0xF800_0000);
    }

    #[test]
    fn jal_links_and_jumps() {
        let mut b = bus();
        // jal x1, 8
        let imm = 8u32;
        let word = ((imm >> 20) & 1) << 31
            | ((imm >> 1) & 0x3FF) << 21
            | ((imm >> 11) & 1) << 20
            | ((imm >> 12) & 0xFF) << 12
            | (1 << 7) // rd = x1
            | 0b1101111;
        b.write32(0, word).unwrap();
        let mut cpu = Cpu::new(0);
        assert_eq!(cpu.step(&mut b), StepResult::Success);
        assert_eq!(cpu.regs.get(1), 4);
        assert_eq!(cpu.regs.pc, 8);
    }

    #[test]
    fn jalr_clears_low_bit_of_target() {
        let mut b = bus();
        b.write32(0, word_i(0b1100111, 0, 1, 2, 5)).unwrap(); // jalr x1, x2, 5
        let mut cpu = Cpu::new(0);
        cpu.regs.set(2, 0x1000);
        cpu.step(&mut b);
        assert_eq!(cpu.regs.pc, 0x1004); // (0x1000+5) & !1 = 0x1004
        assert_eq!(cpu.regs.get(1), 4);
    }

    #[test]
    fn branch_not_taken_falls_through() {
        let mut b = bus();
        b.write32(0, word_i(0b1100011, 0b000, 0, 1, 0)).unwrap(); // beq x1, x0, +0
        let mut cpu = Cpu::new(0);
        cpu.regs.set(1, 1);
        cpu.step(&mut b);
        assert_eq!(cpu.regs.pc, 4);
    }

    #[test]
    fn x0_write_attempts_are_discarded_before_step() {
        let mut b = bus();
        b.write32(0, word_i(0b0010011, 0, 0, 0, 5)).unwrap(); // addi x0, x0, 5
        let mut cpu = Cpu::new(0);
        cpu.step(&mut b);
        assert_eq!(cpu.regs.get(0), 0);
    }

    #[test]
    fn ecall_exit_halts_with_code() {
        let mut b = bus();
        b.write32(0, word_r(0b1110011, 0, 0, 0, 0, 0)).unwrap(); // ecall
        let mut cpu = Cpu::new(0);
        cpu.regs.set(17, 93); // a7 = exit
        cpu.regs.set(10, 7); // a0 = code
        assert_eq!(cpu.step(&mut b), StepResult::Halt(7));
    }

    #[test]
    fn unknown_instruction_reports_wrong_opcode() {
        let mut b = bus();
        b.write32(0, 0b1111111).unwrap();
        let mut cpu = Cpu::new(0);
        assert_eq!(cpu.step(&mut b), StepResult::WrongOpcode);
    }

    #[test]
    fn load_past_ram_end_reports_error() {
        let mut b = bus();
        b.write32(0, word_i(0b0000011, 0b010, 5, 0, 4090)).unwrap(); // lw x5, 4090(x0)
        let mut cpu = Cpu::new(0);
        assert_eq!(cpu.step(&mut b), StepResult::Error);
    }
}
