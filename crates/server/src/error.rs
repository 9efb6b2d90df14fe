//! Error types for the shadow server
//!
//! - [`ShadowError`] - shadow table consistency violations
//! - [`AnalysisError`] - returned by analysis callbacks, never session-fatal
//! - [`SessionError`] - anything that ends a session
//! - [`ServerError`] - listener setup and accept failures

use shadowvm_protocol::{EventId, NetReference, ProtocolError};
use thiserror::Error;

/// Result type for session operations
pub type Result<T> = std::result::Result<T, SessionError>;

/// Shadow table consistency errors
#[derive(Debug, Error)]
pub enum ShadowError {
    /// No entry exists for a reference used by the client
    #[error("unresolved reference: {0}")]
    Unresolved(NetReference),

    /// A reference changed type
    #[error("type mismatch for {net_ref}: expected {expected}, found {found}")]
    TypeMismatch {
        net_ref: NetReference,
        expected: &'static str,
        found: &'static str,
    },

    /// A class id was bound to two different classes, or a class to two ids
    #[error("class id {class_id} already bound to {existing}, cannot bind {new}")]
    ClassConflict {
        class_id: u32,
        existing: String,
        new: String,
    },

    /// Data was sent for the null reference
    #[error("null reference where an object is required")]
    NullReference,
}

impl ShadowError {
    pub fn type_mismatch(net_ref: NetReference, expected: &'static str, found: &'static str) -> Self {
        Self::TypeMismatch {
            net_ref,
            expected,
            found,
        }
    }
}

/// Error returned by an analysis callback
///
/// Logged and counted by the invoker; the session continues.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Argument value the analysis cannot work with
    #[error("bad argument {index}: {reason}")]
    BadArgument { index: usize, reason: String },

    /// Any other failure inside the analysis
    #[error("{0}")]
    Failed(String),
}

impl AnalysisError {
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }

    pub fn bad_argument(index: usize, reason: impl Into<String>) -> Self {
        Self::BadArgument {
            index,
            reason: reason.into(),
        }
    }
}

/// Errors that end a session
#[derive(Debug, Error)]
pub enum SessionError {
    /// Channel read or write failed
    #[error("channel I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed or truncated message
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Shadow table consistency violation
    #[error("shadow error: {0}")]
    Shadow(#[from] ShadowError),

    /// Invocation for an event id that was never registered
    #[error("unknown event id: {0}")]
    UnknownEventId(EventId),

    /// Event id re-registered for a different method
    #[error("event id {event_id} already bound to {existing}, cannot bind {new}")]
    DuplicateEventId {
        event_id: EventId,
        existing: String,
        new: String,
    },

    /// Qualified method name without an analysis part
    #[error("invalid analysis method name: {0:?}")]
    InvalidMethodName(String),

    /// No analysis registered under this name
    #[error("unknown analysis: {0}")]
    UnknownAnalysis(String),

    /// Analysis has no method with this name
    #[error("analysis {analysis} has no method {method}")]
    UnknownMethod { analysis: String, method: String },

    /// Invocation arguments do not match the method signature
    #[error("argument mismatch for event {event_id}: expected ({expected}), found ({found})")]
    ArgumentMismatch {
        event_id: EventId,
        expected: String,
        found: String,
    },
}

impl SessionError {
    /// Whether the stream can no longer be trusted
    ///
    /// Every variant except channel I/O failures means the client and server
    /// disagree about the stream contents. I/O failures end the session too,
    /// but say nothing about the client's behaviour.
    pub fn is_desync(&self) -> bool {
        !matches!(self, Self::Io(_))
    }

    /// Check whether the handler only ran out of buffered input
    pub fn is_incomplete(&self) -> bool {
        matches!(self, Self::Protocol(e) if e.is_incomplete())
    }
}

/// Server setup errors
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to address
    #[error("failed to bind to {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
