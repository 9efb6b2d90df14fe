//! Protocol error types
//!
//! Errors that can occur when reading or writing protocol messages.

use thiserror::Error;

use crate::NetReference;

/// Errors that can occur during protocol operations
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The buffer ended before the message did
    ///
    /// Not fatal while more input may still arrive: the reader retries once
    /// the channel delivers more bytes.
    #[error("incomplete message: need {needed} more bytes")]
    Incomplete { needed: usize },

    /// The stream ended in the middle of a message
    #[error("truncated message: stream ended with {pending} unconsumed bytes")]
    Truncated { pending: usize },

    /// No handler is registered for this request tag
    #[error("unknown request tag: {0}")]
    UnknownTag(u8),

    /// Unknown argument kind inside an analysis invocation
    #[error("unknown argument kind: {0}")]
    UnknownArgKind(u8),

    /// Boolean encoded as something other than 0 or 1
    #[error("invalid boolean value: {0}")]
    InvalidBoolean(u8),

    /// String payload is not valid UTF-8
    #[error("invalid UTF-8 in {field}")]
    InvalidUtf8 { field: &'static str },

    /// String does not fit the 16-bit length prefix
    #[error("string too long: {len} bytes exceeds maximum {max}")]
    StringTooLong { len: usize, max: usize },

    /// Declared length exceeds the configured maximum message size
    #[error("message too large: {size} bytes exceeds maximum {max}")]
    MessageTooLarge { size: usize, max: usize },

    /// Invocation carries more arguments than the count field can hold
    #[error("too many arguments: {count} (max {max})")]
    TooManyArguments { count: usize, max: usize },

    /// A reference that must name a class object does not
    #[error("not a class reference: {0}")]
    NotAClassReference(NetReference),
}

impl ProtocolError {
    /// Create an incomplete message error
    #[inline]
    pub fn incomplete(needed: usize) -> Self {
        Self::Incomplete { needed }
    }

    /// Create a truncated message error
    #[inline]
    pub fn truncated(pending: usize) -> Self {
        Self::Truncated { pending }
    }

    /// Create a string too long error
    #[inline]
    pub fn string_too_long(len: usize) -> Self {
        Self::StringTooLong {
            len,
            max: crate::MAX_STRING_LENGTH,
        }
    }

    /// Create a message too large error
    #[inline]
    pub fn message_too_large(size: usize, max: usize) -> Self {
        Self::MessageTooLarge { size, max }
    }

    /// Check whether the reader only ran out of buffered input
    ///
    /// Every other variant means the stream can no longer be trusted.
    #[inline]
    pub fn is_incomplete(&self) -> bool {
        matches!(self, Self::Incomplete { .. })
    }
}
