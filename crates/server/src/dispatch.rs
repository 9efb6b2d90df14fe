//! Request dispatch
//!
//! Maps request tags to handler functions. The table is built once and
//! shared by all sessions; per-session state travels in [`SessionState`].
//!
//! # Handler Contract
//!
//! A handler receives a reader positioned after the tag and must read its
//! whole payload before touching session state. If the buffered input runs
//! out the reader fails with `Incomplete`, the dispatcher discards any
//! reply bytes and retries the message from its tag once more input has
//! arrived. Reading too much or too little desynchronizes the stream.

use bytes::BytesMut;
use shadowvm_protocol::{ProtocolError, RequestTag, WireReader};

use crate::error::Result;
use crate::handlers;
use crate::session::SessionState;

/// Handles one request: reader after the tag, reply buffer, state, debug flag
pub type HandleFn = fn(&mut WireReader<'_>, &mut BytesMut, &mut SessionState, bool) -> Result<()>;

/// Called once per session at teardown
pub type ExitFn = fn(&mut SessionState);

/// Handler for one request tag
#[derive(Debug, Clone, Copy)]
pub struct RequestHandler {
    /// Name for logs
    pub name: &'static str,
    pub handle: HandleFn,
    pub exit: Option<ExitFn>,
}

/// Tag to handler lookup
#[derive(Debug, Clone)]
pub struct HandlerTable {
    index: [Option<usize>; 256],
    handlers: Vec<(u8, RequestHandler)>,
}

impl HandlerTable {
    /// Empty table; every tag is unknown
    pub fn new() -> Self {
        Self {
            index: [None; 256],
            handlers: Vec::new(),
        }
    }

    /// Table with the built-in request handlers
    pub fn standard() -> Self {
        let mut table = Self::new();
        for tag in RequestTag::ALL {
            table.register(tag.as_u8(), handlers::standard(tag));
        }
        table
    }

    /// Register a handler for `tag`
    ///
    /// # Panics
    /// Panics if a handler is already registered for this tag.
    /// Use `try_register` for fallible registration.
    pub fn register(&mut self, tag: u8, handler: RequestHandler) {
        if !self.try_register(tag, handler) {
            panic!("handler for tag {} already registered", tag);
        }
    }

    /// Try to register a handler
    ///
    /// Returns `false` if a handler is already registered for this tag.
    pub fn try_register(&mut self, tag: u8, handler: RequestHandler) -> bool {
        let slot = &mut self.index[usize::from(tag)];
        if slot.is_some() {
            return false;
        }
        *slot = Some(self.handlers.len());
        self.handlers.push((tag, handler));
        true
    }

    #[inline]
    pub fn get(&self, tag: u8) -> Option<&RequestHandler> {
        let index = self.index[usize::from(tag)]?;
        Some(&self.handlers[index].1)
    }

    /// Registered tags in registration order
    pub fn tags(&self) -> impl Iterator<Item = u8> + '_ {
        self.handlers.iter().map(|(tag, _)| *tag)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Dispatch the message at the start of `input`
    ///
    /// Returns the number of bytes the message occupied, or `None` if
    /// `input` holds only part of it. Reply bytes are appended to `out`.
    /// A message longer than `max_message_size` fails with
    /// `MessageTooLarge`, whether it arrived in one read or several.
    pub fn dispatch(
        &self,
        input: &[u8],
        out: &mut BytesMut,
        state: &mut SessionState,
        debug: bool,
        max_message_size: usize,
    ) -> Result<Option<usize>> {
        let Some((&tag, payload)) = input.split_first() else {
            return Ok(None);
        };
        let handler = self.get(tag).ok_or(ProtocolError::UnknownTag(tag))?;

        let mark = out.len();
        let mut reader = WireReader::with_max_len(payload, max_message_size);
        match (handler.handle)(&mut reader, out, state, debug) {
            Ok(()) => {
                let consumed = 1 + reader.position();
                if consumed > max_message_size {
                    return Err(ProtocolError::message_too_large(consumed, max_message_size).into());
                }
                Ok(Some(consumed))
            }
            Err(e) if e.is_incomplete() => {
                out.truncate(mark);
                Ok(None)
            }
            Err(e) => {
                tracing::debug!(
                    session_id = state.id,
                    tag,
                    handler = handler.name,
                    error = %e,
                    "request failed"
                );
                Err(e)
            }
        }
    }

    /// Run every exit hook once, in registration order
    pub fn exit_all(&self, state: &mut SessionState) {
        for (tag, handler) in &self.handlers {
            if let Some(exit) = handler.exit {
                tracing::trace!(session_id = state.id, tag, handler = handler.name, "handler exit");
                exit(state);
            }
        }
    }
}

impl Default for HandlerTable {
    fn default() -> Self {
        Self::new()
    }
}
