//! CPU execution engine for the LC-3.
//!
//! Implements the fetch-decode-execute cycle and all instruction behaviors.
//! Once the loop is running nothing here fails: reserved opcodes, unknown
//! traps and I/O trouble become [`Diagnostic`]s and execution carries on.

use crate::cpu::decode::{self, Instruction, JsrTarget, Opcode, Operand};
use crate::cpu::memory::Memory;
use crate::cpu::mmio;
use crate::cpu::registers::Registers;
use crate::image::Image;
use crate::io::{Input, InputEvent, ScriptedInput};
use serde::{Deserialize, Serialize};
use std::io::Write;
use thiserror::Error;

/// CPU execution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CpuState {
    /// Powered on, not started.
    Idle,
    /// Executing instructions.
    Running,
    /// Stopped by the HALT trap.
    Halted,
    /// Stopped by an interrupt observed while reading input.
    Interrupted,
}

/// A non-fatal event reported while the machine runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
pub enum Diagnostic {
    #[error("opcode {opcode:?} is not implemented (0x{word:04X} at 0x{pc:04X})")]
    ReservedOpcode { opcode: Opcode, word: u16, pc: u16 },

    #[error("trap code not implemented: 0x{vector:02X} at 0x{pc:04X}")]
    UnknownTrap { vector: u8, pc: u16 },

    #[error("error reading key: {0}")]
    InputError(String),

    #[error("error writing output: {0}")]
    OutputError(String),
}

/// The LC-3 CPU.
///
/// Owns all machine state plus the character I/O it was built with.
pub struct Cpu {
    /// CPU registers.
    pub regs: Registers,
    /// Main memory.
    pub mem: Memory,
    /// Current execution state.
    pub state: CpuState,
    /// Instruction count. Unlike the counter cell at 0xFFFF, programs
    /// cannot see or change this one.
    pub cycles: u64,
    diagnostic_count: u64,
    last_diagnostic: Option<Diagnostic>,
    input: Box<dyn Input>,
    output: Box<dyn Write>,
}

impl Cpu {
    /// Create a new CPU with zeroed state, reading keys from `input` and
    /// writing characters to `output`.
    pub fn new<I, O>(input: I, output: O) -> Self
    where
        I: Input + 'static,
        O: Write + 'static,
    {
        Self {
            regs: Registers::new(),
            mem: Memory::new(),
            state: CpuState::Idle,
            cycles: 0,
            diagnostic_count: 0,
            last_diagnostic: None,
            input: Box::new(input),
            output: Box::new(output),
        }
    }

    /// Reset the CPU to its power-on state. The I/O capabilities are kept.
    pub fn reset(&mut self) {
        self.regs.reset();
        self.mem.clear();
        self.state = CpuState::Idle;
        self.cycles = 0;
        self.diagnostic_count = 0;
        self.last_diagnostic = None;
    }

    /// Copy an image into memory at its origin.
    ///
    /// The PC is left where it is (0x3000 after power-on).
    pub fn load_image(&mut self, image: &Image) {
        self.mem.load(image.origin, &image.words);
    }

    /// Load raw words at an address.
    pub fn load_program(&mut self, origin: u16, words: &[u16]) {
        self.mem.load(origin, words);
    }

    /// Read memory the way a program does: device registers are refreshed
    /// first.
    pub fn mem_read(&mut self, addr: u16) -> u16 {
        if let Some(hook) = mmio::read_hook(addr) {
            hook(self);
        }
        self.mem.read(addr)
    }

    /// Write memory the way a program does.
    pub fn mem_write(&mut self, addr: u16, value: u16) {
        self.mem.write(addr, value);
    }

    /// Mark the machine as running.
    pub fn start(&mut self) {
        self.state = CpuState::Running;
    }

    /// Execute a single instruction.
    ///
    /// Returns the instruction that was executed.
    pub fn step(&mut self) -> Instruction {
        // Fetch
        let pc = self.regs.pc;
        let word = self.mem_read(pc);

        // Advance PC before decode (jumps and branches are relative to it)
        self.regs.advance_pc();

        // Decode
        let instr = decode::decode(word);
        tracing::trace!("0x{:04X}: 0x{:04X} {:?}", pc, word, instr);

        // Execute
        self.execute(instr, word);

        // Update state
        self.mem.tick_cycle_counter();
        self.cycles += 1;

        instr
    }

    /// Run until halted or interrupted.
    ///
    /// Returns the number of instructions executed.
    pub fn run(&mut self) -> u64 {
        let start_cycles = self.cycles;
        self.start();

        while self.is_running() {
            self.step();
        }

        self.cycles - start_cycles
    }

    /// Run for at most `max_cycles` instructions.
    ///
    /// A limit of zero executes nothing and leaves the state untouched.
    pub fn run_limited(&mut self, max_cycles: u64) -> u64 {
        if max_cycles == 0 {
            return 0;
        }

        let start_cycles = self.cycles;
        let limit = self.cycles.saturating_add(max_cycles);
        self.start();

        while self.is_running() && self.cycles < limit {
            self.step();
        }

        self.cycles - start_cycles
    }

    /// Execute a decoded instruction.
    fn execute(&mut self, instr: Instruction, word: u16) {
        match instr {
            // ==================== Control Flow ====================

            Instruction::Br { nzp, offset } => {
                if nzp & self.regs.cond.bits() != 0 {
                    self.regs.pc = self.regs.pc_relative(offset);
                }
            }

            Instruction::Jsr { target } => {
                // Read the base before R7 is overwritten so JSRR R7 works.
                let dest = match target {
                    JsrTarget::Offset(offset) => self.regs.pc_relative(offset),
                    JsrTarget::Base(base) => self.regs.get(base),
                };
                self.regs.set(7, self.regs.pc);
                self.regs.pc = dest;
            }

            Instruction::Jmp { base } => {
                self.regs.pc = self.regs.get(base);
            }

            Instruction::Trap { vector } => self.trap(vector),

            // ==================== Arithmetic / Logic ====================

            Instruction::Add { dst, src, operand } => {
                let value = self.regs.get(src).wrapping_add(self.operand_value(operand));
                self.regs.set(dst, value);
                self.regs.update_flags(dst);
            }

            // AND leaves the condition flag alone.
            Instruction::And { dst, src, operand } => {
                let value = self.regs.get(src) & self.operand_value(operand);
                self.regs.set(dst, value);
            }

            Instruction::Not { dst, src } => {
                self.regs.set(dst, !self.regs.get(src));
                self.regs.update_flags(dst);
            }

            // ==================== Data Transfer ====================

            Instruction::Ld { dst, offset } => {
                let addr = self.regs.pc_relative(offset);
                let value = self.mem_read(addr);
                self.regs.set(dst, value);
                self.regs.update_flags(dst);
            }

            Instruction::St { src, offset } => {
                let addr = self.regs.pc_relative(offset);
                self.mem_write(addr, self.regs.get(src));
            }

            Instruction::Ldi { dst, offset } => {
                let pointer = self.regs.pc_relative(offset);
                let addr = self.mem_read(pointer);
                let value = self.mem_read(addr);
                self.regs.set(dst, value);
                self.regs.update_flags(dst);
            }

            Instruction::Sti { src, offset } => {
                let pointer = self.regs.pc_relative(offset);
                let addr = self.mem_read(pointer);
                self.mem_write(addr, self.regs.get(src));
            }

            Instruction::Ldr { dst, base, offset } => {
                let addr = self.regs.base_relative(base, offset);
                let value = self.mem_read(addr);
                self.regs.set(dst, value);
                self.regs.update_flags(dst);
            }

            Instruction::Str { src, base, offset } => {
                let addr = self.regs.base_relative(base, offset);
                self.mem_write(addr, self.regs.get(src));
            }

            Instruction::Lea { dst, offset } => {
                self.regs.set(dst, self.regs.pc_relative(offset));
                self.regs.update_flags(dst);
            }

            // ==================== Reserved ====================

            Instruction::Rti | Instruction::Res => {
                self.report(Diagnostic::ReservedOpcode {
                    opcode: instr.opcode(),
                    word,
                    pc: self.regs.pc.wrapping_sub(1),
                });
            }
        }
    }

    fn operand_value(&self, operand: Operand) -> u16 {
        match operand {
            Operand::Reg(r) => self.regs.get(r),
            Operand::Imm(imm) => imm,
        }
    }

    /// Ask the input source for a key.
    ///
    /// An interrupt stops the machine once the current instruction finishes;
    /// the read itself then yields no key.
    pub(crate) fn read_key(&mut self) -> Option<u8> {
        match self.input.try_read() {
            Ok(InputEvent::Key(key)) => Some(key),
            Ok(InputEvent::NoKey) => None,
            Ok(InputEvent::Interrupted) => {
                tracing::info!("interrupt received, stopping");
                self.state = CpuState::Interrupted;
                None
            }
            Err(e) => {
                self.report(Diagnostic::InputError(e.to_string()));
                None
            }
        }
    }

    /// Write bytes to the output sink.
    pub(crate) fn emit(&mut self, bytes: &[u8]) {
        if let Err(e) = self.output.write_all(bytes) {
            self.report(Diagnostic::OutputError(e.to_string()));
        }
    }

    /// Flush the output sink.
    pub(crate) fn flush_output(&mut self) {
        if let Err(e) = self.output.flush() {
            self.report(Diagnostic::OutputError(e.to_string()));
        }
    }

    /// Record a non-fatal event.
    pub(crate) fn report(&mut self, diagnostic: Diagnostic) {
        tracing::warn!("{}", diagnostic);
        self.diagnostic_count += 1;
        self.last_diagnostic = Some(diagnostic);
    }

    /// Get the most recent diagnostic.
    pub fn last_diagnostic(&self) -> Option<&Diagnostic> {
        self.last_diagnostic.as_ref()
    }

    /// Number of diagnostics reported since power-on.
    pub fn diagnostic_count(&self) -> u64 {
        self.diagnostic_count
    }

    /// Check if the CPU is halted.
    pub fn is_halted(&self) -> bool {
        self.state == CpuState::Halted
    }

    /// Check if the CPU is running.
    pub fn is_running(&self) -> bool {
        self.state == CpuState::Running
    }

    /// Capture the observable machine state.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            registers: self.regs.clone(),
            state: self.state,
            cycles: self.cycles,
            diagnostics: self.diagnostic_count,
            memory: self.mem.non_zero(),
        }
    }
}

impl Default for Cpu {
    /// A machine with no keyboard input whose output is discarded.
    fn default() -> Self {
        Self::new(ScriptedInput::new(), std::io::sink())
    }
}

impl std::fmt::Debug for Cpu {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cpu")
            .field("state", &self.state)
            .field("cycles", &self.cycles)
            .field("regs", &self.regs)
            .field("mem", &self.mem)
            .finish()
    }
}

/// Observable machine state at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub registers: Registers,
    pub state: CpuState,
    pub cycles: u64,
    pub diagnostics: u64,
    /// Non-zero memory cells as `(address, value)`.
    pub memory: Vec<(u16, u16)>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::decode::encode;
    use crate::cpu::memory::CYCLE_COUNTER;
    use crate::cpu::registers::{CondFlag, PC_START};
    use crate::cpu::trap::TrapCode;

    const HALT: Instruction = Instruction::Trap { vector: TrapCode::Halt as u8 };

    fn make_program(instructions: &[Instruction]) -> Vec<u16> {
        instructions.iter().map(encode).collect()
    }

    fn load(cpu: &mut Cpu, instructions: &[Instruction]) {
        cpu.load_program(PC_START, &make_program(instructions));
    }

    fn imm(value: i16) -> Operand {
        Operand::Imm(value as u16)
    }

    #[test]
    fn test_cpu_halt() {
        let mut cpu = Cpu::default();
        load(&mut cpu, &[HALT]);

        let executed = cpu.run();

        assert_eq!(executed, 1);
        assert!(cpu.is_halted());
        assert!(!cpu.is_running());
    }

    #[test]
    fn test_add_add_halt() {
        let mut cpu = Cpu::default();
        load(&mut cpu, &[
            Instruction::Add { dst: 0, src: 0, operand: imm(5) },
            Instruction::Add { dst: 0, src: 0, operand: imm(3) },
            HALT,
        ]);

        cpu.run();

        assert_eq!(cpu.regs.get(0), 8);
        assert_eq!(cpu.regs.cond, CondFlag::Pos);
        assert!(!cpu.is_running());
    }

    #[test]
    fn test_add_wraps() {
        let mut cpu = Cpu::default();
        cpu.regs.set(1, 0xFFFF);
        cpu.regs.set(2, 2);
        load(&mut cpu, &[Instruction::Add { dst: 3, src: 1, operand: Operand::Reg(2) }]);

        cpu.step();

        assert_eq!(cpu.regs.get(3), 1);
        assert_eq!(cpu.regs.cond, CondFlag::Pos);
    }

    #[test]
    fn test_add_negative_immediate_sets_negative() {
        let mut cpu = Cpu::default();
        load(&mut cpu, &[Instruction::Add { dst: 0, src: 0, operand: imm(-16) }]);

        cpu.step();

        assert_eq!(cpu.regs.get(0), 0xFFF0);
        assert_eq!(cpu.regs.cond, CondFlag::Neg);
    }

    #[test]
    fn test_and_does_not_touch_flags() {
        let mut cpu = Cpu::default();
        cpu.regs.set(1, 0b1100);
        cpu.regs.cond = CondFlag::Neg;
        load(&mut cpu, &[
            Instruction::And { dst: 2, src: 1, operand: imm(0b0100) },
            Instruction::And { dst: 3, src: 1, operand: imm(0) },
        ]);

        cpu.step();
        assert_eq!(cpu.regs.get(2), 0b0100);
        assert_eq!(cpu.regs.cond, CondFlag::Neg);

        cpu.step();
        assert_eq!(cpu.regs.get(3), 0);
        assert_eq!(cpu.regs.cond, CondFlag::Neg);
    }

    #[test]
    fn test_not() {
        let mut cpu = Cpu::default();
        cpu.regs.set(1, 0x00FF);
        load(&mut cpu, &[Instruction::Not { dst: 0, src: 1 }]);

        cpu.step();

        assert_eq!(cpu.regs.get(0), 0xFF00);
        assert_eq!(cpu.regs.cond, CondFlag::Neg);
    }

    #[test]
    fn test_branch_not_taken() {
        let mut cpu = Cpu::default();
        cpu.regs.cond = CondFlag::Neg;
        load(&mut cpu, &[Instruction::Br { nzp: 0b010, offset: 5 }]);

        cpu.step();

        // Only the fetch advanced the PC
        assert_eq!(cpu.regs.pc, PC_START + 1);
    }

    #[test]
    fn test_branch_taken_backwards() {
        let mut cpu = Cpu::default();
        cpu.regs.cond = CondFlag::Zro;
        load(&mut cpu, &[Instruction::Br { nzp: 0b011, offset: 0xFFFF }]);

        cpu.step();

        // -1 relative to the incremented PC: branch to self
        assert_eq!(cpu.regs.pc, PC_START);
    }

    #[test]
    fn test_ld_st_roundtrip() {
        let mut cpu = Cpu::default();
        cpu.regs.set(2, 0x1234);
        load(&mut cpu, &[
            Instruction::St { src: 2, offset: 10 },
            Instruction::Ld { dst: 3, offset: 9 },
        ]);

        cpu.step();
        cpu.step();

        assert_eq!(cpu.mem.read(PC_START + 11), 0x1234);
        assert_eq!(cpu.regs.get(3), 0x1234);
        assert_eq!(cpu.regs.cond, CondFlag::Pos);
    }

    #[test]
    fn test_sti_ldi_roundtrip() {
        let mut cpu = Cpu::default();
        cpu.regs.set(0, 0xABCD);
        // Pointer cell right after the two instructions
        cpu.mem.write(PC_START + 2, 0x4000);
        load(&mut cpu, &[
            Instruction::Sti { src: 0, offset: 1 },
            Instruction::Ldi { dst: 1, offset: 0 },
        ]);

        cpu.step();
        cpu.step();

        assert_eq!(cpu.mem.read(0x4000), 0xABCD);
        assert_eq!(cpu.regs.get(1), 0xABCD);
        assert_eq!(cpu.regs.cond, CondFlag::Neg);
    }

    #[test]
    fn test_str_ldr_roundtrip_negative_offset() {
        let mut cpu = Cpu::default();
        cpu.regs.set(6, 0x5000);
        cpu.regs.set(1, 0);
        cpu.mem.write(0x4FFE, 77);
        load(&mut cpu, &[
            Instruction::Str { src: 1, base: 6, offset: 0xFFFE }, // -2
            Instruction::Ldr { dst: 2, base: 6, offset: 0xFFFE },
        ]);

        cpu.step();
        cpu.step();

        assert_eq!(cpu.mem.read(0x4FFE), 0);
        assert_eq!(cpu.regs.get(2), 0);
        assert_eq!(cpu.regs.cond, CondFlag::Zro);
    }

    #[test]
    fn test_lea_computes_address_only() {
        let mut cpu = Cpu::default();
        load(&mut cpu, &[Instruction::Lea { dst: 4, offset: 0xFFFF }]);

        cpu.step();

        assert_eq!(cpu.regs.get(4), PC_START);
        assert_eq!(cpu.regs.cond, CondFlag::Pos);
    }

    #[test]
    fn test_jsr_links_and_jumps() {
        let mut cpu = Cpu::default();
        load(&mut cpu, &[Instruction::Jsr { target: JsrTarget::Offset(0x10) }]);

        cpu.step();

        assert_eq!(cpu.regs.get(7), PC_START + 1);
        assert_eq!(cpu.regs.pc, PC_START + 0x11);
    }

    #[test]
    fn test_jsrr_and_ret() {
        let mut cpu = Cpu::default();
        cpu.regs.set(3, 0x4000);
        load(&mut cpu, &[Instruction::Jsr { target: JsrTarget::Base(3) }]);
        cpu.load_program(0x4000, &make_program(&[Instruction::Jmp { base: 7 }]));

        cpu.step();
        assert_eq!(cpu.regs.pc, 0x4000);
        assert_eq!(cpu.regs.get(7), PC_START + 1);

        cpu.step();
        assert_eq!(cpu.regs.pc, PC_START + 1);
    }

    #[test]
    fn test_jsrr_through_r7_uses_old_value() {
        let mut cpu = Cpu::default();
        cpu.regs.set(7, 0x4000);
        load(&mut cpu, &[Instruction::Jsr { target: JsrTarget::Base(7) }]);

        cpu.step();

        assert_eq!(cpu.regs.pc, 0x4000);
        assert_eq!(cpu.regs.get(7), PC_START + 1);
    }

    #[test]
    fn test_reserved_opcode_is_not_fatal() {
        let mut cpu = Cpu::default();
        cpu.load_program(PC_START, &[0xD000]);
        cpu.start();

        let instr = cpu.step();

        assert_eq!(instr, Instruction::Res);
        assert!(cpu.is_running());
        assert_eq!(cpu.regs.pc, PC_START + 1);
        assert_eq!(cpu.diagnostic_count(), 1);
        assert_eq!(
            cpu.last_diagnostic(),
            Some(&Diagnostic::ReservedOpcode { opcode: Opcode::Res, word: 0xD000, pc: PC_START })
        );
    }

    #[test]
    fn test_cycle_counter_cell_ticks() {
        let mut cpu = Cpu::default();
        load(&mut cpu, &[
            Instruction::Add { dst: 0, src: 0, operand: imm(1) },
            Instruction::Add { dst: 0, src: 0, operand: imm(1) },
            HALT,
        ]);

        let executed = cpu.run();

        assert_eq!(executed, 3);
        assert_eq!(cpu.cycles, 3);
        assert_eq!(cpu.mem.read(CYCLE_COUNTER), 3);
    }

    #[test]
    fn test_run_limited_stops_spinning_program() {
        let mut cpu = Cpu::default();
        // BRnzp #-1: jump to self forever
        load(&mut cpu, &[Instruction::Br { nzp: 0b111, offset: 0xFFFF }]);

        let executed = cpu.run_limited(100);

        assert_eq!(executed, 100);
        assert!(cpu.is_running());
        assert_eq!(cpu.regs.pc, PC_START);
    }

    #[test]
    fn test_run_limited_zero_does_nothing() {
        let mut cpu = Cpu::default();
        load(&mut cpu, &[HALT]);

        let executed = cpu.run_limited(0);

        assert_eq!(executed, 0);
        assert_eq!(cpu.state, CpuState::Idle);
        assert_eq!(cpu.regs.pc, PC_START);
        assert_eq!(cpu.mem.read(CYCLE_COUNTER), 0);
    }

    #[test]
    fn test_pc_wraps_at_top_of_memory() {
        let mut cpu = Cpu::default();
        cpu.regs.pc = 0xFFFE;
        // 0xFFFF holds the cycle count, which decodes as a never-taken BR
        cpu.load_program(0xFFFE, &make_program(&[Instruction::And { dst: 0, src: 0, operand: imm(0) }]));

        cpu.step();
        assert_eq!(cpu.regs.pc, 0xFFFF);

        cpu.step();
        assert_eq!(cpu.regs.pc, 0x0000);
    }

    #[test]
    fn test_reset() {
        let mut cpu = Cpu::default();
        load(&mut cpu, &[HALT]);
        cpu.run();

        cpu.reset();

        assert_eq!(cpu.state, CpuState::Idle);
        assert_eq!(cpu.regs, Registers::new());
        assert_eq!(cpu.mem.read(PC_START), 0);
        assert_eq!(cpu.cycles, 0);
    }

    #[test]
    fn test_snapshot_serializes() {
        let mut cpu = Cpu::default();
        load(&mut cpu, &[
            Instruction::Add { dst: 0, src: 0, operand: imm(5) },
            HALT,
        ]);
        cpu.run();

        let snapshot = cpu.snapshot();
        assert_eq!(snapshot.state, CpuState::Halted);
        assert_eq!(snapshot.registers.gpr[0], 5);
        assert!(snapshot.memory.contains(&(CYCLE_COUNTER, 2)));

        let json = serde_json::to_string(&snapshot).unwrap();
        let back: Snapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snapshot);
    }
}
