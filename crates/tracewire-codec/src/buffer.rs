//! Cursor-style byte reader and exact-sized writer shared by the binary
//! codecs.
//!
//! Every encode runs in two passes: a size computation over the span, then a
//! single write into a buffer allocated to exactly that size. The writer
//! never grows mid-encode; a size/write mismatch is a codec bug caught by
//! the debug assertion in the encode entry points.

use crate::CodecError;

/// Exact byte count of the varint encoding of `value`.
pub fn varint64_size(value: u64) -> usize {
    let bits = 64 - (value | 1).leading_zeros() as usize;
    (bits + 6) / 7
}

pub fn varint32_size(value: u32) -> usize {
    varint64_size(u64::from(value))
}

/// Reads big and little endian scalars, varints, and UTF-8 off a byte
/// slice, failing with [`CodecError::Underflow`] instead of panicking when
/// input runs short.
pub struct ReadBuffer<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ReadBuffer<'a> {
    pub fn new(bytes: &'a [u8]) -> ReadBuffer<'a> {
        ReadBuffer { bytes, pos: 0 }
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    pub fn read_byte(&mut self) -> Result<u8, CodecError> {
        let byte = *self
            .bytes
            .get(self.pos)
            .ok_or(CodecError::Underflow(self.pos))?;
        self.pos += 1;
        Ok(byte)
    }

    pub fn read_bytes(&mut self, length: usize) -> Result<&'a [u8], CodecError> {
        if length > self.remaining() {
            return Err(CodecError::Underflow(self.pos));
        }
        let slice = &self.bytes[self.pos..self.pos + length];
        self.pos += length;
        Ok(slice)
    }

    pub fn skip(&mut self, length: usize) -> Result<(), CodecError> {
        if length > self.remaining() {
            return Err(CodecError::Underflow(self.pos));
        }
        self.pos += length;
        Ok(())
    }

    /// Reads a UTF-8 string, substituting replacement characters for any
    /// invalid sequences rather than failing the whole message.
    pub fn read_utf8(&mut self, length: usize) -> Result<String, CodecError> {
        Ok(String::from_utf8_lossy(self.read_bytes(length)?).into_owned())
    }

    pub fn read_u16_be(&mut self) -> Result<u16, CodecError> {
        let bytes = self.read_bytes(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    pub fn read_i32_be(&mut self) -> Result<i32, CodecError> {
        let bytes: [u8; 4] = self.read_bytes(4)?.try_into().unwrap();
        Ok(i32::from_be_bytes(bytes))
    }

    pub fn read_u64_be(&mut self) -> Result<u64, CodecError> {
        let bytes: [u8; 8] = self.read_bytes(8)?.try_into().unwrap();
        Ok(u64::from_be_bytes(bytes))
    }

    pub fn read_u64_le(&mut self) -> Result<u64, CodecError> {
        let bytes: [u8; 8] = self.read_bytes(8)?.try_into().unwrap();
        Ok(u64::from_le_bytes(bytes))
    }

    pub fn read_varint32(&mut self) -> Result<u32, CodecError> {
        let mut result: u32 = 0;
        for shift in (0..32).step_by(7) {
            let byte = self.read_byte()?;
            result |= u32::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return Ok(result);
            }
        }
        Err(CodecError::malformed(self.pos, "varint32 over 5 bytes"))
    }

    pub fn read_varint64(&mut self) -> Result<u64, CodecError> {
        let mut result: u64 = 0;
        for shift in (0..64).step_by(7) {
            let byte = self.read_byte()?;
            result |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return Ok(result);
            }
        }
        Err(CodecError::malformed(self.pos, "varint64 over 10 bytes"))
    }

    /// Reads a 32-bit big-endian length and rejects it when it exceeds the
    /// remaining buffer, so a corrupt header can never drive a huge
    /// allocation.
    pub fn guard_length(&mut self) -> Result<usize, CodecError> {
        let length = self.read_i32_be()?;
        if length < 0 || length as usize > self.remaining() {
            return Err(CodecError::Truncated {
                length: length.max(0) as usize,
                remaining: self.remaining(),
            });
        }
        Ok(length as usize)
    }

    /// Varint-prefixed variant of [`ReadBuffer::guard_length`] for the
    /// proto3 codec.
    pub fn guard_varint_length(&mut self) -> Result<usize, CodecError> {
        let length = self.read_varint32()? as usize;
        if length > self.remaining() {
            return Err(CodecError::Truncated {
                length,
                remaining: self.remaining(),
            });
        }
        Ok(length)
    }
}

/// Append-only writer over a pre-sized allocation.
pub struct WriteBuffer {
    bytes: Vec<u8>,
}

impl WriteBuffer {
    pub fn with_capacity(capacity: usize) -> WriteBuffer {
        WriteBuffer { bytes: Vec::with_capacity(capacity) }
    }

    pub fn pos(&self) -> usize {
        self.bytes.len()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn write_byte(&mut self, byte: u8) {
        self.bytes.push(byte);
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.bytes.extend_from_slice(bytes);
    }

    pub fn write_utf8(&mut self, value: &str) {
        self.bytes.extend_from_slice(value.as_bytes());
    }

    pub fn write_u16_be(&mut self, value: u16) {
        self.bytes.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_i32_be(&mut self, value: i32) {
        self.bytes.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_u64_be(&mut self, value: u64) {
        self.bytes.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_u64_le(&mut self, value: u64) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_varint(&mut self, mut value: u64) {
        while value >= 0x80 {
            self.bytes.push((value as u8 & 0x7f) | 0x80);
            value >>= 7;
        }
        self.bytes.push(value as u8);
    }
}
