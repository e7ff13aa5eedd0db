//! Memory-mapped device registers.
//!
//! Reads of certain addresses refresh device state before the cell is
//! returned. The overrides live in a small table; every other address goes
//! straight to plain memory.

use crate::cpu::execute::Cpu;
use crate::cpu::memory::{KBDR, KBSR};

/// Hook run before a program-visible read of its address.
pub type ReadHook = fn(&mut Cpu);

/// Lowest address with a device hook.
const MMIO_BASE: u16 = 0xFE00;

/// Address-to-hook overrides for reads.
const READ_HOOKS: [(u16, ReadHook); 1] = [(KBSR, poll_keyboard as ReadHook)];

/// Value of KBSR when a key is waiting in KBDR.
pub const KEY_READY: u16 = 1 << 15;

/// The read hook for `addr`, if it has one.
#[inline]
pub fn read_hook(addr: u16) -> Option<ReadHook> {
    if addr < MMIO_BASE {
        return None;
    }
    READ_HOOKS
        .iter()
        .find(|(hooked, _)| *hooked == addr)
        .map(|&(_, hook)| hook)
}

/// Poll the keyboard: KBSR gets the ready bit and KBDR the key, or KBSR is
/// cleared when nothing is waiting.
fn poll_keyboard(cpu: &mut Cpu) {
    match cpu.read_key() {
        Some(key) => {
            cpu.mem.write(KBSR, KEY_READY);
            cpu.mem.write(KBDR, u16::from(key));
        }
        None => cpu.mem.write(KBSR, 0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::decode::{encode, Instruction};
    use crate::cpu::execute::CpuState;
    use crate::cpu::registers::PC_START;
    use crate::io::{InputEvent, ScriptedInput};
    use std::io::sink;

    #[test]
    fn test_only_kbsr_is_hooked() {
        assert!(read_hook(KBSR).is_some());
        assert!(read_hook(KBDR).is_none());
        assert!(read_hook(0x3000).is_none());
        assert!(read_hook(0xFFFF).is_none());
    }

    #[test]
    fn test_kbsr_read_with_key() {
        let mut cpu = Cpu::new(ScriptedInput::from_text("k"), sink());

        assert_eq!(cpu.mem_read(KBSR), KEY_READY);
        assert_eq!(cpu.mem_read(KBDR), u16::from(b'k'));
    }

    #[test]
    fn test_kbsr_read_without_key() {
        let mut input = ScriptedInput::new();
        input.push(InputEvent::NoKey);
        let mut cpu = Cpu::new(input, sink());
        cpu.mem.write(KBSR, KEY_READY);
        cpu.start();

        assert_eq!(cpu.mem_read(KBSR), 0);
        assert!(cpu.is_running());
    }

    #[test]
    fn test_kbdr_read_does_not_poll() {
        let mut cpu = Cpu::new(ScriptedInput::from_text("z"), sink());
        cpu.mem.write(KBDR, 5);

        assert_eq!(cpu.mem_read(KBDR), 5);
        // The scripted key is still there for the next status read
        assert_eq!(cpu.mem_read(KBSR), KEY_READY);
    }

    #[test]
    fn test_interrupt_during_poll_finishes_instruction() {
        let mut cpu = Cpu::new(ScriptedInput::new(), sink());
        cpu.mem.write(PC_START + 1, KBSR);
        // LDI R0, #0 -> reads through the pointer at PC_START + 1
        cpu.load_program(PC_START, &[encode(&Instruction::Ldi { dst: 0, offset: 0 })]);

        let executed = cpu.run();

        assert_eq!(executed, 1);
        assert_eq!(cpu.state, CpuState::Interrupted);
        assert_eq!(cpu.regs.get(0), 0);
    }

    #[test]
    fn test_polling_loop_sees_key() {
        // Spin on KBSR until a key arrives, then load it and halt:
        //   poll: LDI R1, KBSR_PTR
        //         BRzp poll
        //         LDI R0, KBDR_PTR
        //         TRAP x25
        //   KBSR_PTR: .FILL xFE00
        //   KBDR_PTR: .FILL xFE02
        let mut input = ScriptedInput::new();
        input.push(InputEvent::NoKey).push(InputEvent::NoKey).push(InputEvent::Key(b'q'));
        let mut cpu = Cpu::new(input, sink());
        cpu.load_program(PC_START, &[
            encode(&Instruction::Ldi { dst: 1, offset: 3 }),
            encode(&Instruction::Br { nzp: 0b011, offset: 0xFFFE }),
            encode(&Instruction::Ldi { dst: 0, offset: 2 }),
            encode(&Instruction::Trap { vector: 0x25 }),
            KBSR,
            KBDR,
        ]);

        cpu.run();

        assert!(cpu.is_halted());
        assert_eq!(cpu.regs.get(0), u16::from(b'q'));
        // Three polls, three branches (the last falls through), LDI, HALT
        assert_eq!(cpu.cycles, 3 + 3 + 1 + 1);
    }
}
