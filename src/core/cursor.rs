// Byte cursor over an immutable buffer: VLQ, fixed-width big-endian, and NUL-terminated text reads.
use crate::core::error::{Error, ErrorKind};

pub const DEFAULT_VLQ_MAX_BYTES: usize = 8;
pub const MAX_UNUM_BYTES: usize = 8;

#[derive(Debug)]
pub struct ByteCursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn at(buf: &'a [u8], pos: usize) -> Self {
        Self { buf, pos }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    pub fn read_byte(&mut self) -> Result<u8, Error> {
        let byte = *self
            .buf
            .get(self.pos)
            .ok_or_else(|| truncated(self.pos, "byte"))?;
        self.pos += 1;
        Ok(byte)
    }

    /// MSB-first accumulation; a clear high bit ends the value. Stops after
    /// `max_bytes` even if the last byte still has its continuation bit set.
    pub fn read_vlq(&mut self, max_bytes: usize) -> Result<u64, Error> {
        let start = self.pos;
        let mut value: u64 = 0;
        for _ in 0..max_bytes {
            let byte = self
                .read_byte()
                .map_err(|_| truncated(start, "variable-length integer"))?;
            value = (value << 7) | u64::from(byte & 0x7F);
            if byte & 0x80 == 0 {
                break;
            }
        }
        Ok(value)
    }

    pub fn read_unum(&mut self, n: usize) -> Result<u64, Error> {
        if n > MAX_UNUM_BYTES {
            return Err(Error::new(ErrorKind::Format)
                .with_message(format!("fixed-width integer of {n} bytes exceeds 64 bits"))
                .with_offset(self.pos as u64));
        }
        let bytes = self
            .buf
            .get(self.pos..self.pos + n)
            .ok_or_else(|| truncated(self.pos, "fixed-width integer"))?;
        let value = bytes
            .iter()
            .fold(0u64, |acc, byte| (acc << 8) | u64::from(*byte));
        self.pos += n;
        Ok(value)
    }

    /// Consumes through the NUL terminator; invalid UTF-8 is replaced, not rejected.
    pub fn read_text(&mut self) -> Result<String, Error> {
        let rest = self.buf.get(self.pos..).unwrap_or_default();
        let len = rest
            .iter()
            .position(|byte| *byte == 0)
            .ok_or_else(|| truncated(self.pos, "text field (missing NUL terminator)"))?;
        let text = String::from_utf8_lossy(&rest[..len]).into_owned();
        self.pos += len + 1;
        Ok(text)
    }
}

fn truncated(offset: usize, what: &str) -> Error {
    Error::new(ErrorKind::Format)
        .with_message(format!("unexpected end of BSV data while reading {what}"))
        .with_offset(offset as u64)
}
