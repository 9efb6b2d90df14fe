//! Error types for the client
//!
//! Covers channel I/O, encoding failures and misuse of the event API.

use shadowvm_protocol::{EventId, NetReference, ProtocolError};
use thiserror::Error;

/// Result type for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur when registering or sending events
#[derive(Debug, Error)]
pub enum ClientError {
    /// Channel write or flush failed
    #[error("channel I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Message could not be encoded
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The send path was entered while the calling thread was already inside it
    #[error("event send path re-entered on the same thread")]
    Reentrant,

    /// Event id was never returned by `register_method`
    #[error("event id {0} is not registered")]
    UnknownEventId(EventId),

    /// All 65535 event ids are in use
    #[error("event id space exhausted")]
    EventIdsExhausted,

    /// Class or object id space is exhausted
    #[error("{kind} id space exhausted")]
    IdsExhausted {
        /// `class` or `object`
        kind: &'static str,
    },

    /// A reference that must name a class object does not
    #[error("not a class reference: {0}")]
    NotAClassReference(NetReference),

    /// `close` was already called
    #[error("channel is closed")]
    Closed,
}

impl ClientError {
    /// Create an id exhaustion error
    pub fn ids_exhausted(kind: &'static str) -> Self {
        Self::IdsExhausted { kind }
    }

    /// Whether the channel itself failed
    ///
    /// After such an error the server has seen an unknown prefix of the
    /// last message, so the session cannot be trusted any more.
    pub fn is_channel_failure(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_reentrant() {
        assert_eq!(
            ClientError::Reentrant.to_string(),
            "event send path re-entered on the same thread"
        );
    }

    #[test]
    fn test_error_display_unknown_event_id() {
        let err = ClientError::UnknownEventId(EventId(9));
        assert_eq!(err.to_string(), "event id 9 is not registered");
    }

    #[test]
    fn test_error_display_ids_exhausted() {
        assert_eq!(
            ClientError::ids_exhausted("class").to_string(),
            "class id space exhausted"
        );
    }

    #[test]
    fn test_protocol_error_is_transparent() {
        let err = ClientError::from(ProtocolError::string_too_long(70_000));
        assert_eq!(
            err.to_string(),
            "string too long: 70000 bytes exceeds maximum 65535"
        );
    }

    #[test]
    fn test_is_channel_failure() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone");
        assert!(ClientError::from(io).is_channel_failure());
        assert!(ClientError::Closed.is_channel_failure());
        assert!(!ClientError::Reentrant.is_channel_failure());
        assert!(!ClientError::EventIdsExhausted.is_channel_failure());
    }
}
