//! LC-3 memory subsystem.
//!
//! 65,536 sixteen-bit cells addressed by a `u16`, so every address is valid
//! and address arithmetic simply wraps. A handful of cells near the top of the
//! space are reserved for devices and bookkeeping; the memory itself does not
//! treat them specially; the CPU's read path does (see [`crate::cpu::mmio`]).

/// The number of memory cells.
pub const MEMORY_SIZE: usize = 1 << 16;

/// Keyboard status register.
pub const KBSR: u16 = 0xFE00;

/// Keyboard data register.
pub const KBDR: u16 = 0xFE02;

/// Instruction cycle counter, bumped once per executed instruction.
///
/// This is ordinary memory: programs can read and overwrite it.
pub const CYCLE_COUNTER: u16 = 0xFFFF;

/// LC-3 memory: 65,536 sixteen-bit cells.
#[derive(Clone, PartialEq, Eq)]
pub struct Memory {
    cells: Vec<u16>,
}

impl Memory {
    /// Create a new memory with all cells zeroed.
    pub fn new() -> Self {
        Self {
            cells: vec![0; MEMORY_SIZE],
        }
    }

    /// Read a cell. No device side effects.
    #[inline]
    pub fn read(&self, addr: u16) -> u16 {
        self.cells[usize::from(addr)]
    }

    /// Write a cell.
    #[inline]
    pub fn write(&mut self, addr: u16, value: u16) {
        self.cells[usize::from(addr)] = value;
    }

    /// Clear all memory to zeros.
    pub fn clear(&mut self) {
        self.cells.fill(0);
    }

    /// Copy `words` into memory starting at `origin`.
    ///
    /// Addresses wrap past 0xFFFF back to 0x0000.
    pub fn load(&mut self, origin: u16, words: &[u16]) {
        let mut addr = origin;
        for &word in words {
            self.write(addr, word);
            addr = addr.wrapping_add(1);
        }
    }

    /// Bump the cycle counter cell.
    pub fn tick_cycle_counter(&mut self) {
        let count = self.read(CYCLE_COUNTER);
        self.write(CYCLE_COUNTER, count.wrapping_add(1));
    }

    /// All non-zero cells as `(address, value)` pairs.
    pub fn non_zero(&self) -> Vec<(u16, u16)> {
        (0..=u16::MAX)
            .map(|addr| (addr, self.read(addr)))
            .filter(|&(_, value)| value != 0)
            .collect()
    }

    /// Dump memory contents (for debugging).
    pub fn dump(&self, start: u16, count: usize) -> Vec<(u16, u16)> {
        let mut addr = start;
        let mut out = Vec::with_capacity(count.min(MEMORY_SIZE));
        for _ in 0..count.min(MEMORY_SIZE) {
            out.push((addr, self.read(addr)));
            addr = addr.wrapping_add(1);
        }
        out
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Memory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Only show non-zero cells
        let non_zero = self.cells.iter().filter(|&&cell| cell != 0).count();

        f.debug_struct("Memory")
            .field("non_zero_cells", &non_zero)
            .field("total_cells", &MEMORY_SIZE)
            .finish()
    }
}
