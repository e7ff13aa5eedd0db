//! Instruction decoder for the LC-3.
//!
//! Every instruction is one 16-bit word. The top four bits select one of
//! sixteen opcodes; the remaining twelve hold opcode-specific operand fields:
//!
//! ```text
//!  15  12 11  9 8   6 5 4   0
//! +------+-----+-----+-+-----+
//! |  op  | DR  | SR1 |i| ... |
//! +------+-----+-----+-+-----+
//! ```
//!
//! Decoding never fails: the two reserved opcodes decode to explicit
//! [`Instruction::Rti`] and [`Instruction::Res`] variants and the executor
//! decides what to do with them.

use serde::{Deserialize, Serialize};

/// The sixteen LC-3 opcodes, in encoding order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Opcode {
    Br = 0,
    Add,
    Ld,
    St,
    Jsr,
    And,
    Ldr,
    Str,
    /// Return from interrupt (unimplemented)
    Rti,
    Not,
    Ldi,
    Sti,
    Jmp,
    /// Reserved
    Res,
    Lea,
    Trap,
}

/// Opcode lookup table, indexed by the top four bits of a word.
const OPCODES: [Opcode; 16] = [
    Opcode::Br,
    Opcode::Add,
    Opcode::Ld,
    Opcode::St,
    Opcode::Jsr,
    Opcode::And,
    Opcode::Ldr,
    Opcode::Str,
    Opcode::Rti,
    Opcode::Not,
    Opcode::Ldi,
    Opcode::Sti,
    Opcode::Jmp,
    Opcode::Res,
    Opcode::Lea,
    Opcode::Trap,
];

impl Opcode {
    /// Extract the opcode from an instruction word.
    #[inline]
    pub fn from_word(word: u16) -> Self {
        OPCODES[usize::from(word >> 12)]
    }
}

/// Second operand of ADD and AND.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operand {
    /// Register SR2
    Reg(u8),
    /// Sign-extended 5-bit immediate
    Imm(u16),
}

/// Target of JSR / JSRR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JsrTarget {
    /// JSR: PC-relative, sign-extended 11-bit offset
    Offset(u16),
    /// JSRR: address held in a base register
    Base(u8),
}

/// Decoded LC-3 instruction.
///
/// Offsets and immediates are stored already sign-extended to 16 bits, so
/// the executor only ever does wrapping adds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Instruction {
    // ==================== Control Flow ====================

    /// Conditional branch: if `nzp & COND != 0` then PC += offset
    Br { nzp: u16, offset: u16 },

    /// Jump to subroutine: R7 := PC, then PC := target
    Jsr { target: JsrTarget },

    /// Jump: PC := base (RET is `JMP R7`)
    Jmp { base: u8 },

    /// System call into a trap service routine
    Trap { vector: u8 },

    // ==================== Arithmetic / Logic ====================

    /// DR := SR1 + operand
    Add { dst: u8, src: u8, operand: Operand },

    /// DR := SR1 & operand
    And { dst: u8, src: u8, operand: Operand },

    /// DR := !SR
    Not { dst: u8, src: u8 },

    // ==================== Data Transfer ====================

    /// DR := mem[PC + offset]
    Ld { dst: u8, offset: u16 },

    /// mem[PC + offset] := SR
    St { src: u8, offset: u16 },

    /// DR := mem[mem[PC + offset]]
    Ldi { dst: u8, offset: u16 },

    /// mem[mem[PC + offset]] := SR
    Sti { src: u8, offset: u16 },

    /// DR := mem[base + offset]
    Ldr { dst: u8, base: u8, offset: u16 },

    /// mem[base + offset] := SR
    Str { src: u8, base: u8, offset: u16 },

    /// DR := PC + offset (no memory access)
    Lea { dst: u8, offset: u16 },

    // ==================== Reserved ====================

    /// Return from interrupt; not implemented on this machine
    Rti,

    /// Reserved opcode 1101
    Res,
}

impl Instruction {
    /// The opcode this instruction encodes to.
    pub fn opcode(&self) -> Opcode {
        match self {
            Instruction::Br { .. } => Opcode::Br,
            Instruction::Jsr { .. } => Opcode::Jsr,
            Instruction::Jmp { .. } => Opcode::Jmp,
            Instruction::Trap { .. } => Opcode::Trap,
            Instruction::Add { .. } => Opcode::Add,
            Instruction::And { .. } => Opcode::And,
            Instruction::Not { .. } => Opcode::Not,
            Instruction::Ld { .. } => Opcode::Ld,
            Instruction::St { .. } => Opcode::St,
            Instruction::Ldi { .. } => Opcode::Ldi,
            Instruction::Sti { .. } => Opcode::Sti,
            Instruction::Ldr { .. } => Opcode::Ldr,
            Instruction::Str { .. } => Opcode::Str,
            Instruction::Lea { .. } => Opcode::Lea,
            Instruction::Rti => Opcode::Rti,
            Instruction::Res => Opcode::Res,
        }
    }
}

/// Sign-extend the low `bits` bits of `value` to 16 bits.
///
/// Bits above the field are ignored.
#[inline]
pub fn sign_extend(value: u16, bits: u32) -> u16 {
    debug_assert!((1..=16).contains(&bits));
    let shift = 16 - bits;
    (((value << shift) as i16) >> shift) as u16
}

#[inline]
fn dr(word: u16) -> u8 {
    ((word >> 9) & 0x7) as u8
}

#[inline]
fn sr1(word: u16) -> u8 {
    ((word >> 6) & 0x7) as u8
}

#[inline]
fn offset9(word: u16) -> u16 {
    sign_extend(word & 0x1FF, 9)
}

fn operand(word: u16) -> Operand {
    if (word >> 5) & 0x1 != 0 {
        Operand::Imm(sign_extend(word & 0x1F, 5))
    } else {
        Operand::Reg((word & 0x7) as u8)
    }
}

/// Decode a 16-bit instruction word.
pub fn decode(word: u16) -> Instruction {
    match Opcode::from_word(word) {
        Opcode::Br => Instruction::Br {
            nzp: (word >> 9) & 0x7,
            offset: offset9(word),
        },
        Opcode::Add => Instruction::Add {
            dst: dr(word),
            src: sr1(word),
            operand: operand(word),
        },
        Opcode::Ld => Instruction::Ld { dst: dr(word), offset: offset9(word) },
        Opcode::St => Instruction::St { src: dr(word), offset: offset9(word) },
        Opcode::Jsr => {
            let target = if (word >> 11) & 0x1 != 0 {
                JsrTarget::Offset(sign_extend(word & 0x7FF, 11))
            } else {
                JsrTarget::Base(sr1(word))
            };
            Instruction::Jsr { target }
        }
        Opcode::And => Instruction::And {
            dst: dr(word),
            src: sr1(word),
            operand: operand(word),
        },
        Opcode::Ldr => Instruction::Ldr {
            dst: dr(word),
            base: sr1(word),
            offset: sign_extend(word & 0x3F, 6),
        },
        Opcode::Str => Instruction::Str {
            src: dr(word),
            base: sr1(word),
            offset: sign_extend(word & 0x3F, 6),
        },
        Opcode::Rti => Instruction::Rti,
        Opcode::Not => Instruction::Not { dst: dr(word), src: sr1(word) },
        Opcode::Ldi => Instruction::Ldi { dst: dr(word), offset: offset9(word) },
        Opcode::Sti => Instruction::Sti { src: dr(word), offset: offset9(word) },
        Opcode::Jmp => Instruction::Jmp { base: sr1(word) },
        Opcode::Res => Instruction::Res,
        Opcode::Lea => Instruction::Lea { dst: dr(word), offset: offset9(word) },
        Opcode::Trap => Instruction::Trap { vector: (word & 0xFF) as u8 },
    }
}

/// Encode an instruction back to a 16-bit word.
///
/// Offsets and immediates are truncated to their field width, so any value
/// produced by [`decode`] encodes back to an equivalent word.
pub fn encode(instr: &Instruction) -> u16 {
    let op = (instr.opcode() as u16) << 12;
    let reg = |r: u8, shift: u32| (u16::from(r) & 0x7) << shift;
    let operand_bits = |operand: &Operand| match *operand {
        Operand::Reg(r) => reg(r, 0),
        Operand::Imm(imm) => (1 << 5) | (imm & 0x1F),
    };

    let fields = match instr {
        Instruction::Br { nzp, offset } => ((nzp & 0x7) << 9) | (offset & 0x1FF),
        Instruction::Jsr { target: JsrTarget::Offset(offset) } => (1 << 11) | (offset & 0x7FF),
        Instruction::Jsr { target: JsrTarget::Base(base) } => reg(*base, 6),
        Instruction::Jmp { base } => reg(*base, 6),
        Instruction::Trap { vector } => u16::from(*vector),
        Instruction::Add { dst, src, operand } | Instruction::And { dst, src, operand } => {
            reg(*dst, 9) | reg(*src, 6) | operand_bits(operand)
        }
        // Low six bits are all ones in the canonical NOT encoding.
        Instruction::Not { dst, src } => reg(*dst, 9) | reg(*src, 6) | 0x3F,
        Instruction::Ld { dst: r, offset }
        | Instruction::St { src: r, offset }
        | Instruction::Ldi { dst: r, offset }
        | Instruction::Sti { src: r, offset }
        | Instruction::Lea { dst: r, offset } => reg(*r, 9) | (offset & 0x1FF),
        Instruction::Ldr { dst: r, base, offset } | Instruction::Str { src: r, base, offset } => {
            reg(*r, 9) | reg(*base, 6) | (offset & 0x3F)
        }
        Instruction::Rti | Instruction::Res => 0,
    };

    op | fields
}
