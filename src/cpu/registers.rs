//! LC-3 register file.
//!
//! The LC-3 has:
//! - R0-R7: eight 16-bit general-purpose registers (R7 doubles as the link register)
//! - PC: 16-bit program counter
//! - COND: three-state condition flag (N, Z or P)

use serde::{Deserialize, Serialize};

/// Address the program counter starts at before any image is loaded.
pub const PC_START: u16 = 0x3000;

/// Number of general-purpose registers.
pub const GPR_COUNT: usize = 8;

/// Condition flag.
///
/// Exactly one flag is set at any time. The discriminants line up with the
/// `nzp` bits of a BR instruction so a branch test is a single AND.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u16)]
pub enum CondFlag {
    /// Last result was positive (P)
    Pos = 1 << 0,
    /// Last result was zero (Z)
    Zro = 1 << 1,
    /// Last result was negative (N)
    Neg = 1 << 2,
}

impl CondFlag {
    /// Classify a 16-bit value by its two's-complement sign.
    pub fn from_value(value: u16) -> Self {
        if value == 0 {
            CondFlag::Zro
        } else if value >> 15 != 0 {
            CondFlag::Neg
        } else {
            CondFlag::Pos
        }
    }

    /// The flag as its `nzp` bit.
    #[inline]
    pub const fn bits(self) -> u16 {
        self as u16
    }
}

impl Default for CondFlag {
    fn default() -> Self {
        CondFlag::Zro
    }
}

/// The LC-3 register file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registers {
    /// R0-R7
    pub gpr: [u16; GPR_COUNT],

    /// Program counter: address of the next instruction.
    pub pc: u16,

    /// Condition flag, recomputed after every register-defining instruction
    /// except AND.
    pub cond: CondFlag,
}

impl Registers {
    /// Create a new register file: all registers zeroed, PC at the origin.
    pub fn new() -> Self {
        Self {
            gpr: [0; GPR_COUNT],
            pc: PC_START,
            cond: CondFlag::default(),
        }
    }

    /// Reset to the power-on state.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Read register `r` (only the low three bits are used).
    #[inline]
    pub fn get(&self, r: u8) -> u16 {
        self.gpr[usize::from(r & 0x7)]
    }

    /// Write register `r` (only the low three bits are used).
    #[inline]
    pub fn set(&mut self, r: u8, value: u16) {
        self.gpr[usize::from(r & 0x7)] = value;
    }

    /// Recompute the condition flag from register `r`.
    pub fn update_flags(&mut self, r: u8) {
        self.cond = CondFlag::from_value(self.get(r));
    }

    /// Increment the program counter by 1 (wrapping).
    /// Returns the old value.
    pub fn advance_pc(&mut self) -> u16 {
        let old = self.pc;
        self.pc = self.pc.wrapping_add(1);
        old
    }

    /// PC-relative effective address.
    #[inline]
    pub fn pc_relative(&self, offset: u16) -> u16 {
        self.pc.wrapping_add(offset)
    }

    /// Base-register-relative effective address.
    #[inline]
    pub fn base_relative(&self, base: u8, offset: u16) -> u16 {
        self.get(base).wrapping_add(offset)
    }
}

impl Default for Registers {
    fn default() -> Self {
        Self::new()
    }
}
