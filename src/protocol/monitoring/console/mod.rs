//! Text console carried on extended identifier `0x1ffffffe`.
//!
//! Each frame holds up to eight ASCII bytes. A zero byte ends the current line; bytes
//! after it in the same frame start the next one.
use crate::protocol::transport::can_frame::CanFrame;

/// Extended identifier of console frames.
pub const CONSOLE_ID: u32 = 0x1fff_fffe;

/// Longest line kept before a forced flush.
pub const CONSOLE_LINE_CAPACITY: usize = 128;

/// One flushed console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleLine {
    buffer: [u8; CONSOLE_LINE_CAPACITY],
    len: usize,
    /// `true` when the line was cut at capacity rather than by a terminator.
    pub truncated: bool,
}

impl ConsoleLine {
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer[..self.len]
    }

    /// The line as text, `None` when it holds non UTF-8 bytes.
    pub fn as_str(&self) -> Option<&str> {
        core::str::from_utf8(self.as_bytes()).ok()
    }
}

/// Accumulates console bytes into lines.
pub struct ConsoleAssembler {
    buffer: [u8; CONSOLE_LINE_CAPACITY],
    len: usize,
}

impl Default for ConsoleAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleAssembler {
    pub const fn new() -> Self {
        Self {
            buffer: [0; CONSOLE_LINE_CAPACITY],
            len: 0,
        }
    }

    /// True when `frame` belongs to the console stream.
    pub fn is_console(frame: &CanFrame) -> bool {
        frame.id.is_extended() && frame.id.raw() == CONSOLE_ID
    }

    /// Bytes accumulated since the last flush.
    pub fn pending(&self) -> &[u8] {
        &self.buffer[..self.len]
    }

    /// Feed one frame and hand every completed line to `on_line`.
    ///
    /// Frames outside the console stream are ignored. Returns the number of lines flushed.
    pub fn push_frame<F: FnMut(&ConsoleLine)>(
        &mut self,
        frame: &CanFrame,
        mut on_line: F,
    ) -> usize {
        if !Self::is_console(frame) {
            return 0;
        }
        let mut flushed = 0;
        for &byte in frame.payload() {
            if byte == 0 {
                on_line(&self.take(false));
                flushed += 1;
                continue;
            }
            if self.len == CONSOLE_LINE_CAPACITY {
                #[cfg(feature = "defmt")]
                defmt::warn!("Console line exceeds {} bytes, flushing", CONSOLE_LINE_CAPACITY);
                on_line(&self.take(true));
                flushed += 1;
            }
            self.buffer[self.len] = byte;
            self.len += 1;
        }
        flushed
    }

    fn take(&mut self, truncated: bool) -> ConsoleLine {
        let line = ConsoleLine {
            buffer: self.buffer,
            len: self.len,
            truncated,
        };
        self.len = 0;
        line
    }
}
