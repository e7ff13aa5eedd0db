//! Trap service routines.
//!
//! `TRAP vector` jumps into one of six built-in OS services, selected by the
//! low eight bits of the instruction. They are implemented natively here
//! rather than as LC-3 code in memory.

use crate::cpu::execute::{Cpu, CpuState, Diagnostic};
use serde::{Deserialize, Serialize};

/// Prompt printed by the IN trap.
pub const IN_PROMPT: &str = "Enter a character: ";

/// Trap vectors with a service routine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum TrapCode {
    /// Read a character, no echo
    Getc = 0x20,
    /// Write a character
    Out = 0x21,
    /// Write a string, one character per word
    Puts = 0x22,
    /// Prompt for and read a character, with echo
    In = 0x23,
    /// Write a string, two characters per word
    Putsp = 0x24,
    /// Stop the machine
    Halt = 0x25,
}

impl TrapCode {
    /// Look up the routine for a trap vector.
    pub fn from_vector(vector: u8) -> Option<Self> {
        match vector {
            0x20 => Some(TrapCode::Getc),
            0x21 => Some(TrapCode::Out),
            0x22 => Some(TrapCode::Puts),
            0x23 => Some(TrapCode::In),
            0x24 => Some(TrapCode::Putsp),
            0x25 => Some(TrapCode::Halt),
            _ => None,
        }
    }
}

impl Cpu {
    /// Dispatch a TRAP instruction.
    pub(crate) fn trap(&mut self, vector: u8) {
        let Some(code) = TrapCode::from_vector(vector) else {
            self.report(Diagnostic::UnknownTrap {
                vector,
                pc: self.regs.pc.wrapping_sub(1),
            });
            return;
        };

        match code {
            TrapCode::Getc => self.trap_getc(),
            TrapCode::Out => self.trap_out(),
            TrapCode::Puts => self.trap_puts(),
            TrapCode::In => self.trap_in(),
            TrapCode::Putsp => self.trap_putsp(),
            TrapCode::Halt => self.trap_halt(),
        }
    }

    fn trap_getc(&mut self) {
        let key = self.read_key().unwrap_or(0);
        self.regs.set(0, u16::from(key));
        self.regs.update_flags(0);
    }

    fn trap_out(&mut self) {
        let ch = (self.regs.get(0) & 0xFF) as u8;
        self.emit(&[ch]);
        self.flush_output();
    }

    fn trap_puts(&mut self) {
        let text: Vec<u8> = self
            .string_cells(self.regs.get(0))
            .into_iter()
            .map(|cell| (cell & 0xFF) as u8)
            .collect();
        self.emit(&text);
        self.flush_output();
    }

    fn trap_in(&mut self) {
        self.emit(IN_PROMPT.as_bytes());
        self.flush_output();

        let key = self.read_key();
        if let Some(key) = key {
            self.emit(&[key]);
            self.flush_output();
        }
        self.regs.set(0, u16::from(key.unwrap_or(0)));
        self.regs.update_flags(0);
    }

    fn trap_putsp(&mut self) {
        let mut text = Vec::new();
        for cell in self.string_cells(self.regs.get(0)) {
            text.push((cell & 0xFF) as u8);
            let high = (cell >> 8) as u8;
            if high != 0 {
                text.push(high);
            }
        }
        self.emit(&text);
        self.flush_output();
    }

    fn trap_halt(&mut self) {
        tracing::info!("HALT at 0x{:04X}", self.regs.pc.wrapping_sub(1));
        self.flush_output();
        self.state = CpuState::Halted;
    }

    /// Cells from `start` up to (not including) the first zero cell.
    ///
    /// Reads bypass the device hooks, and stop after one full lap of memory
    /// if no terminator is found.
    fn string_cells(&self, start: u16) -> Vec<u16> {
        let mut cells = Vec::new();
        let mut addr = start;
        for _ in 0..=u16::MAX {
            let cell = self.mem.read(addr);
            if cell == 0 {
                break;
            }
            cells.push(cell);
            addr = addr.wrapping_add(1);
        }
        cells
    }
}
