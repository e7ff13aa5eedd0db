//! CPU emulation for the LC-3.
//!
//! This module implements the complete LC-3 architecture:
//! - 65,536 sixteen-bit memory cells with memory-mapped keyboard registers
//! - 8 general-purpose registers, PC and a three-state condition flag
//! - 16 opcodes (two reserved) and six trap service routines

pub mod memory;
pub mod registers;
pub mod decode;
pub mod execute;
pub mod mmio;
pub mod trap;

pub use memory::Memory;
pub use registers::{CondFlag, Registers};
pub use decode::{Instruction, Opcode, Operand, JsrTarget};
pub use execute::{Cpu, CpuState, Diagnostic, Snapshot};
pub use trap::TrapCode;
