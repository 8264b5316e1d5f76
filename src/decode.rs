//! The decoder (component 2 of the core, §4.1/§4.2).
//!
//! Builds the encoding table once, then tries each row in [`Opcode::ALL`]
//! order against an instruction word. The first row whose literal
//! positions all match wins; its `Imm(..)` positions are gathered back into
//! an unextended immediate (callers sign-extend with [`crate::sext::sext`]
//! using whatever width is appropriate for that opcode). rd/rs1/rs2 are not
//! part of the table at all — they sit at fixed positions in every format
//! that has them, so they are pulled directly off the word.

use thiserror::Error;

use crate::encoding::{finish_system_row, row_for, Field, Row};
use crate::opcode::Opcode;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("instruction word {0:#010x} does not match any known opcode")]
    UnknownInstruction(u32),
}

/// A decoded instruction: the opcode plus its raw register fields and
/// unextended immediate. Not every field is meaningful for every opcode
/// (e.g. `rd` is unused by branches and stores); callers read only the
/// fields their opcode's format defines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decoded {
    pub opcode: Opcode,
    pub rd: u8,
    pub rs1: u8,
    pub rs2: u8,
    /// Shift amount for SLLI/SRLI/SRAI (low 5 bits of the rs2 field).
    pub shamt: u8,
    /// Unextended immediate, built from the opcode's `Imm(..)` positions.
    pub imm: u32,
}

pub struct Decoder {
    rows: Vec<(Opcode, Row)>,
}

impl Decoder {
    pub fn new() -> Self {
        let rows = Opcode::ALL
            .iter()
            .map(|&op| {
                let row = match op {
                    Opcode::Ecall => finish_system_row(row_for(op), 0),
                    Opcode::Ebreak => finish_system_row(row_for(op), 1),
                    _ => row_for(op),
                };
                (op, row)
            })
            .collect();
        Decoder { rows }
    }

    pub fn decode(&self, instr: u32) -> Result<Decoded, DecodeError> {
        for &(opcode, ref row) in &self.rows {
            if row_matches(row, instr) {
                return Ok(Decoded {
                    opcode,
                    rd: field(instr, 11, 7),
                    rs1: field(instr, 19, 15),
                    rs2: field(instr, 24, 20),
                    shamt: field(instr, 24, 20),
                    imm: gather_immediate(row, instr),
                });
            }
        }
        Err(DecodeError::UnknownInstruction(instr))
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

fn row_matches(row: &Row, instr: u32) -> bool {
    for pos in 0..32 {
        let instr_bit = (instr >> (31 - pos)) & 1;
        match row[pos] {
            Field::Zero if instr_bit != 0 => return false,
            Field::One if instr_bit == 0 => return false,
            _ => {}
        }
    }
    true
}

fn gather_immediate(row: &Row, instr: u32) -> u32 {
    let mut imm = 0u32;
    for pos in 0..32 {
        if let Field::Imm(bit) = row[pos] {
            let instr_bit = (instr >> (31 - pos)) & 1;
            imm |= instr_bit << bit;
        }
    }
    imm
}

/// Extract bits `[hi:lo]` (inclusive, instruction numbering) as an unsigned
/// value in the low bits of the result.
fn field(instr: u32, hi: u32, lo: u32) -> u8 {
    ((instr >> lo) & ((1 << (hi - lo + 1)) - 1)) as u8
}
