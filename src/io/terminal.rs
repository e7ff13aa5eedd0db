//! Raw-mode console I/O via crossterm.

use super::{Input, InputEvent};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::io::{self, Stdout, Write};
use std::time::Duration;

/// Keeps the terminal in raw mode for as long as it lives.
struct RawMode;

impl RawMode {
    fn enable() -> io::Result<Self> {
        enable_raw_mode()?;
        Ok(RawMode)
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        if let Err(e) = disable_raw_mode() {
            tracing::warn!("failed to restore terminal mode: {}", e);
        }
    }
}

/// Keyboard input read straight from the terminal, without line buffering
/// or echo.
///
/// Esc and Ctrl-C are reported as [`InputEvent::Interrupted`]. Without a
/// timeout every read blocks until a key arrives; with one, a read that sees
/// no key within the timeout reports [`InputEvent::NoKey`].
pub struct TerminalInput {
    timeout: Option<Duration>,
    _raw: RawMode,
}

impl TerminalInput {
    /// Put the terminal in raw mode and start reading keys.
    pub fn new(timeout: Option<Duration>) -> io::Result<Self> {
        Ok(Self {
            timeout,
            _raw: RawMode::enable()?,
        })
    }
}

impl Input for TerminalInput {
    fn try_read(&mut self) -> io::Result<InputEvent> {
        loop {
            if let Some(timeout) = self.timeout {
                if !event::poll(timeout)? {
                    return Ok(InputEvent::NoKey);
                }
            }

            if let Event::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                if let Some(event) = map_key(key) {
                    return Ok(event);
                }
            }
        }
    }
}

/// Translate a terminal key press into a machine key, if it has one.
fn map_key(key: KeyEvent) -> Option<InputEvent> {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

    match key.code {
        KeyCode::Esc => Some(InputEvent::Interrupted),
        KeyCode::Char('c') | KeyCode::Char('C') if ctrl => Some(InputEvent::Interrupted),
        KeyCode::Char(c) if c.is_ascii() => {
            let byte = c as u8;
            Some(InputEvent::Key(if ctrl { byte & 0x1F } else { byte }))
        }
        KeyCode::Enter => Some(InputEvent::Key(b'\n')),
        KeyCode::Tab => Some(InputEvent::Key(b'\t')),
        KeyCode::Backspace => Some(InputEvent::Key(0x08)),
        _ => None,
    }
}

/// Terminal output that turns `\n` into `\r\n`, since raw mode disables the
/// terminal's own newline translation.
pub struct TerminalOutput<W: Write = Stdout> {
    inner: W,
}

impl TerminalOutput {
    /// Write to this process's standard output.
    pub fn new() -> Self {
        Self { inner: io::stdout() }
    }
}

impl Default for TerminalOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write> TerminalOutput<W> {
    /// Wrap an arbitrary writer.
    pub fn from_writer(inner: W) -> Self {
        Self { inner }
    }

    /// Unwrap the underlying writer.
    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for TerminalOutput<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        for (i, line) in buf.split(|&b| b == b'\n').enumerate() {
            if i > 0 {
                self.inner.write_all(b"\r\n")?;
            }
            self.inner.write_all(line)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
