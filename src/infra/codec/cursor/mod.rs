//! Byte cursors used by the codec engine.
//! Every field of a bench frame is byte aligned, so the reader/writer work in whole
//! bytes and only need to know the byte order of multi-byte integers.
use crate::core::ByteOrder;
use crate::error::CursorError;

/// Widest unsigned field handled by the cursors.
const MAX_UINT_WIDTH: u8 = 4;

/// Reader that extracts fields from a `&[u8]` without copies.
pub struct ByteReader<'a> {
    /// Shared source buffer (typically the received CAN payload).
    buffer: &'a [u8],
    /// Number of bytes consumed so far.
    cursor: usize,
}

impl<'a> ByteReader<'a> {
    /// Create a reader positioned at the start of the provided buffer.
    pub fn new(buffer: &'a [u8]) -> Self {
        Self { buffer, cursor: 0 }
    }

    /// Current position in bytes.
    pub fn position(&self) -> usize {
        self.cursor
    }

    /// Bytes left to read.
    pub fn remaining(&self) -> usize {
        self.buffer.len() - self.cursor
    }

    /// Read an unsigned integer of `width` bytes (1 to 4) in the given byte order.
    pub fn read_uint(&mut self, width: u8, order: ByteOrder) -> Result<u32, CursorError> {
        if !(1..=MAX_UINT_WIDTH).contains(&width) {
            return Err(CursorError::TooWide {
                max: MAX_UINT_WIDTH,
                asked: width,
            });
        }
        let bytes = self.read_slice(width as usize)?;
        let value = match order {
            ByteOrder::Big => bytes.iter().fold(0u32, |acc, b| (acc << 8) | *b as u32),
            ByteOrder::Little => bytes
                .iter()
                .rev()
                .fold(0u32, |acc, b| (acc << 8) | *b as u32),
        };
        Ok(value)
    }

    /// Return a slice of `len` bytes from the current position.
    pub fn read_slice(&mut self, len: usize) -> Result<&'a [u8], CursorError> {
        let end = self.cursor + len;
        if end > self.buffer.len() {
            return Err(CursorError::OutOfBounds {
                asked: len,
                available: self.remaining(),
            });
        }
        let slice = &self.buffer[self.cursor..end];
        self.cursor = end;
        Ok(slice)
    }
}

//==================================================================================BYTEWRITER

/// Writer laying fields into a `&mut [u8]`, used to rebuild payloads field by field.
pub struct ByteWriter<'a> {
    /// Target buffer (typically the CAN frame under construction).
    buffer: &'a mut [u8],
    /// Number of bytes written so far.
    cursor: usize,
}

impl<'a> ByteWriter<'a> {
    /// Create a writer positioned at the start of the buffer.
    pub fn new(buffer: &'a mut [u8]) -> Self {
        Self { buffer, cursor: 0 }
    }

    /// Expose the cursor position (final payload length once writing is done).
    pub fn position(&self) -> usize {
        self.cursor
    }

    /// Write the low `width` bytes of `value` in the given byte order.
    pub fn write_uint(
        &mut self,
        value: u32,
        width: u8,
        order: ByteOrder,
    ) -> Result<(), CursorError> {
        if !(1..=MAX_UINT_WIDTH).contains(&width) {
            return Err(CursorError::TooWide {
                max: MAX_UINT_WIDTH,
                asked: width,
            });
        }
        let width = width as usize;
        self.check_room(width)?;
        for idx in 0..width {
            let shift = match order {
                ByteOrder::Big => (width - 1 - idx) * 8,
                ByteOrder::Little => idx * 8,
            };
            self.buffer[self.cursor + idx] = (value >> shift) as u8;
        }
        self.cursor += width;
        Ok(())
    }

    /// Copy a byte slice into the buffer.
    pub fn write_slice(&mut self, slice: &[u8]) -> Result<(), CursorError> {
        self.check_room(slice.len())?;
        self.buffer[self.cursor..self.cursor + slice.len()].copy_from_slice(slice);
        self.cursor += slice.len();
        Ok(())
    }

    fn check_room(&self, len: usize) -> Result<(), CursorError> {
        let available = self.buffer.len() - self.cursor;
        if len > available {
            return Err(CursorError::OutOfBounds {
                asked: len,
                available,
            });
        }
        Ok(())
    }
}
