//! Bounds-checked reader over a buffered byte slice
//!
//! Every read either consumes exactly the bytes of its field or fails
//! without moving the cursor past the end of the buffer. A short buffer is
//! reported as [`ProtocolError::Incomplete`], so callers can wait for more
//! input and retry the whole message from its first byte.

use crate::{DEFAULT_MAX_MESSAGE_SIZE, NetReference, ProtocolError, Result};

/// Cursor over a big-endian wire buffer
#[derive(Debug, Clone)]
pub struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
    max_len: usize,
}

impl<'a> WireReader<'a> {
    /// Create a reader with the default maximum message size
    pub fn new(buf: &'a [u8]) -> Self {
        Self::with_max_len(buf, DEFAULT_MAX_MESSAGE_SIZE)
    }

    /// Create a reader that rejects declared lengths above `max_len`
    pub fn with_max_len(buf: &'a [u8], max_len: usize) -> Self {
        Self {
            buf,
            pos: 0,
            max_len,
        }
    }

    /// Number of bytes consumed so far
    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Number of bytes left in the buffer
    #[inline]
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Maximum accepted length for counted fields
    #[inline]
    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// Fail with `MessageTooLarge` if a declared length exceeds the limit
    #[inline]
    pub fn check_len(&self, len: usize) -> Result<()> {
        if len > self.max_len {
            return Err(ProtocolError::message_too_large(len, self.max_len));
        }
        Ok(())
    }

    /// Take the next `len` bytes
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let remaining = self.remaining();
        if len > remaining {
            return Err(ProtocolError::incomplete(len - remaining));
        }
        let start = self.pos;
        self.pos += len;
        Ok(&self.buf[start..self.pos])
    }

    #[inline]
    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let bytes = self.read_bytes(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    #[inline]
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    #[inline]
    pub fn read_u16(&mut self) -> Result<u16> {
        self.read_array().map(u16::from_be_bytes)
    }

    #[inline]
    pub fn read_u32(&mut self) -> Result<u32> {
        self.read_array().map(u32::from_be_bytes)
    }

    #[inline]
    pub fn read_u64(&mut self) -> Result<u64> {
        self.read_array().map(u64::from_be_bytes)
    }

    #[inline]
    pub fn read_i8(&mut self) -> Result<i8> {
        self.read_array().map(i8::from_be_bytes)
    }

    #[inline]
    pub fn read_i16(&mut self) -> Result<i16> {
        self.read_array().map(i16::from_be_bytes)
    }

    #[inline]
    pub fn read_i32(&mut self) -> Result<i32> {
        self.read_array().map(i32::from_be_bytes)
    }

    #[inline]
    pub fn read_i64(&mut self) -> Result<i64> {
        self.read_array().map(i64::from_be_bytes)
    }

    #[inline]
    pub fn read_f32(&mut self) -> Result<f32> {
        self.read_u32().map(f32::from_bits)
    }

    #[inline]
    pub fn read_f64(&mut self) -> Result<f64> {
        self.read_u64().map(f64::from_bits)
    }

    /// Read a strict boolean (0 or 1)
    pub fn read_bool(&mut self) -> Result<bool> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(ProtocolError::InvalidBoolean(other)),
        }
    }

    #[inline]
    pub fn read_net_ref(&mut self) -> Result<NetReference> {
        self.read_u64().map(NetReference::from_raw)
    }

    /// Read a `u16`-length-prefixed UTF-8 string
    ///
    /// `field` names the string in the error if it is not valid UTF-8.
    pub fn read_str(&mut self, field: &'static str) -> Result<&'a str> {
        let len = self.read_u16()? as usize;
        let bytes = self.read_bytes(len)?;
        std::str::from_utf8(bytes).map_err(|_| ProtocolError::InvalidUtf8 { field })
    }

    /// Read a `u32`-length-prefixed byte block
    pub fn read_blob(&mut self) -> Result<&'a [u8]> {
        let len = self.read_u32()? as usize;
        self.check_len(len)?;
        self.read_bytes(len)
    }
}
