//! # LC-3 Emulator
//!
//! An emulator of the LC-3, a 16-bit educational computer.
//!
//! The machine has 64K words of memory, eight registers, a three-state
//! condition flag, a memory-mapped keyboard and a handful of trap routines
//! for console I/O. Programs are loaded from big-endian object images.

pub mod cpu;
pub mod image;
pub mod io;

// Re-export commonly used types
pub use cpu::{Cpu, CpuState, CondFlag, Diagnostic, Instruction, Memory, Registers, Snapshot};
pub use image::{load_image, save_image, Image, ImageError};
pub use io::{Input, InputEvent, ScriptedInput, SharedBuffer, StdinInput};
