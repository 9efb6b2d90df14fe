//! ShadowVM Protocol - Wire format shared by client and server
//!
//! This crate provides the types that cross the channel between an
//! instrumented process and its shadow server:
//! - `NetReference` - Opaque 64-bit client object identifier
//! - `RequestTag` / `ArgKind` - Message tags and argument kinds
//! - `WireReader` - Bounds-checked big-endian reader
//! - Typed request payloads (`NewClass`, `ClassInfo`, `Invocation`, ...)
//!
//! # Wire Format
//!
//! A message is a one-byte tag followed by its payload. Every field is
//! fixed-width or explicitly length-prefixed, so a reader always knows how
//! many bytes a message occupies without looking ahead.
//!
//! ```text
//! [tag: u8][payload...]
//!
//! str  = [len: u16][utf-8 bytes]
//! blob = [len: u32][bytes]
//! ```
//!
//! All integers are big-endian.

mod decode;
pub mod encode;
mod error;
mod net_ref;
mod request;
mod schema;

pub use decode::WireReader;
pub use error::ProtocolError;
pub use net_ref::{MAX_CLASS_ID, MAX_OBJECT_ID, NetReference};
pub use request::{
    Argument, ClassInfo, Close, EventId, Invocation, InvocationEncoder, NewClass, ObjectFree,
    RegisterAnalysis, SpecialPayload, StringInfo, ThreadInfo,
};
pub use schema::{ArgKind, INLINE_STRING_DATA, INLINE_THREAD_DATA, RequestTag};

// Re-export bytes for convenience
pub use bytes::{Bytes, BytesMut};

/// Result type for protocol operations
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Maximum encoded string length in bytes (u16 length prefix)
pub const MAX_STRING_LENGTH: usize = u16::MAX as usize;

/// Default maximum message size (16MB)
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Maximum number of arguments in one invocation (u8 count)
pub const MAX_ARGUMENTS: usize = u8::MAX as usize;

/// Default server port
pub const DEFAULT_PORT: u16 = 11218;

#[cfg(test)]
mod net_ref_test;
#[cfg(test)]
mod schema_test;
