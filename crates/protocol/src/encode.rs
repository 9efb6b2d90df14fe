//! Writers for the variable-length wire fields
//!
//! Fixed-width fields go straight through [`BufMut`] (`put_u16`, `put_u64`,
//! ...), which is already big-endian. Only the length-prefixed fields need
//! validation.

use bytes::BufMut;

use crate::{MAX_STRING_LENGTH, NetReference, ProtocolError, Result};

/// Write a `u16`-length-prefixed UTF-8 string
pub fn put_str<B: BufMut>(buf: &mut B, value: &str) -> Result<()> {
    let len = value.len();
    if len > MAX_STRING_LENGTH {
        return Err(ProtocolError::string_too_long(len));
    }
    buf.put_u16(len as u16);
    buf.put_slice(value.as_bytes());
    Ok(())
}

/// Write a `u32`-length-prefixed byte block
pub fn put_blob<B: BufMut>(buf: &mut B, value: &[u8], max_len: usize) -> Result<()> {
    let len = value.len();
    if len > max_len || len > u32::MAX as usize {
        return Err(ProtocolError::message_too_large(len, max_len));
    }
    buf.put_u32(len as u32);
    buf.put_slice(value);
    Ok(())
}

#[inline]
pub fn put_net_ref<B: BufMut>(buf: &mut B, value: NetReference) {
    buf.put_u64(value.as_raw());
}

#[inline]
pub fn put_bool<B: BufMut>(buf: &mut B, value: bool) {
    buf.put_u8(u8::from(value));
}
