//! Character I/O for the emulated machine.
//!
//! The CPU never talks to a terminal directly. It is handed:
//! - an [`Input`] source it can ask for one key at a time
//! - any [`std::io::Write`] sink it emits characters to
//!
//! Implementations provided here:
//! - [`ScriptedInput`] - a queue of keys, for tests and piped runs
//! - [`StdinInput`] - raw bytes from standard input
//! - [`SharedBuffer`] - an in-memory sink whose contents stay reachable
//! - `TerminalInput` / `TerminalOutput` - raw-mode console (feature `term`)

#[cfg(feature = "term")]
mod terminal;

#[cfg(feature = "term")]
pub use terminal::{TerminalInput, TerminalOutput};

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::rc::Rc;

/// Result of asking an input source for a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    /// A key is available.
    Key(u8),
    /// Nothing is available right now.
    NoKey,
    /// The user asked to stop the machine (Esc, Ctrl-C, end of input).
    Interrupted,
}

/// A source of keyboard input.
///
/// `try_read` may block until a key arrives; the CPU treats it as a plain
/// synchronous call either way.
pub trait Input {
    /// Read one key.
    fn try_read(&mut self) -> io::Result<InputEvent>;
}

impl<T: Input + ?Sized> Input for Box<T> {
    fn try_read(&mut self) -> io::Result<InputEvent> {
        (**self).try_read()
    }
}

/// Pre-recorded input.
///
/// Once the script runs out every read reports [`InputEvent::Interrupted`],
/// so a program waiting for input terminates instead of spinning.
#[derive(Debug, Clone, Default)]
pub struct ScriptedInput {
    events: VecDeque<InputEvent>,
}

impl ScriptedInput {
    /// Create an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Script one key per byte of `text`.
    pub fn from_text(text: &str) -> Self {
        Self {
            events: text.bytes().map(InputEvent::Key).collect(),
        }
    }

    /// Append an event.
    pub fn push(&mut self, event: InputEvent) -> &mut Self {
        self.events.push_back(event);
        self
    }

    /// Number of events not yet consumed.
    pub fn remaining(&self) -> usize {
        self.events.len()
    }
}

impl Input for ScriptedInput {
    fn try_read(&mut self) -> io::Result<InputEvent> {
        Ok(self.events.pop_front().unwrap_or(InputEvent::Interrupted))
    }
}

/// Byte-at-a-time input from any reader (standard input by default).
///
/// End of file reads as [`InputEvent::Interrupted`].
pub struct StdinInput<R = io::Stdin> {
    reader: R,
}

impl StdinInput {
    /// Read from this process's standard input.
    pub fn new() -> Self {
        Self { reader: io::stdin() }
    }
}

impl Default for StdinInput {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Read> StdinInput<R> {
    /// Read from an arbitrary byte source.
    pub fn from_reader(reader: R) -> Self {
        Self { reader }
    }
}

impl<R: Read> Input for StdinInput<R> {
    fn try_read(&mut self) -> io::Result<InputEvent> {
        let mut byte = [0u8; 1];
        loop {
            match self.reader.read(&mut byte) {
                Ok(0) => return Ok(InputEvent::Interrupted),
                Ok(_) => return Ok(InputEvent::Key(byte[0])),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }
}

/// A clonable in-memory output sink.
///
/// Every clone writes to the same buffer, so a test can hand one clone to
/// the CPU and inspect the other.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer {
    inner: Rc<RefCell<Vec<u8>>>,
}

impl SharedBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything written so far.
    pub fn contents(&self) -> Vec<u8> {
        self.inner.borrow().clone()
    }

    /// Everything written so far, lossily decoded as UTF-8.
    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.inner.borrow()).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
