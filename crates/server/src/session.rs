//! Session worker
//!
//! One session per client connection. The worker task owns the session's
//! shadow table and analysis instances outright; nothing in here is shared
//! with other sessions except the read-only handler table and registry and
//! the metric counters.
//!
//! # Teardown
//!
//! However the read loop ends (CLOSE, end of stream, I/O error, protocol
//! error or server shutdown) every handler's exit hook runs exactly once
//! before the session state is dropped.

use std::sync::Arc;

use bytes::{Buf, BytesMut};
use shadowvm_protocol::ProtocolError;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use crate::analysis::{AnalysisInvoker, AnalysisRegistry};
use crate::dispatch::HandlerTable;
use crate::error::Result;
use crate::metrics::ServerMetrics;
use crate::shadow::ShadowTable;

/// Read headroom kept free before each read
const MIN_READ_CAPACITY: usize = 4096;

/// State owned by one session
#[derive(Debug)]
pub struct SessionState {
    /// Server-assigned session id, for logs
    pub id: u64,
    pub shadows: ShadowTable,
    pub analyses: AnalysisInvoker,
    close_requested: bool,
}

impl SessionState {
    pub fn new(id: u64, registry: Arc<AnalysisRegistry>) -> Self {
        Self {
            id,
            shadows: ShadowTable::new(),
            analyses: AnalysisInvoker::new(registry),
            close_requested: false,
        }
    }

    /// Ask the read loop to stop after the current message
    #[inline]
    pub fn request_close(&mut self) {
        self.close_requested = true;
    }

    #[inline]
    pub fn close_requested(&self) -> bool {
        self.close_requested
    }
}

/// Per-session settings
#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    /// Log every request at debug level
    pub debug: bool,
    /// Initial read buffer size
    pub buffer_size: usize,
    /// Largest accepted message
    pub max_message_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            debug: false,
            buffer_size: 64 * 1024,
            max_message_size: shadowvm_protocol::DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

/// How a session ended without error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Client sent CLOSE
    Closed,
    /// Stream ended on a message boundary
    Eof,
    /// Server shutdown
    Cancelled,
}

/// One client session
pub struct Session {
    state: SessionState,
    handlers: Arc<HandlerTable>,
    config: SessionConfig,
    metrics: Arc<ServerMetrics>,
}

impl Session {
    pub fn new(
        id: u64,
        registry: Arc<AnalysisRegistry>,
        handlers: Arc<HandlerTable>,
        config: SessionConfig,
        metrics: Arc<ServerMetrics>,
    ) -> Self {
        Self {
            state: SessionState::new(id, registry),
            handlers,
            config,
            metrics,
        }
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.state.id
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Serve the session until it ends, then run the exit hooks
    pub async fn run<S>(&mut self, mut stream: S, cancel: &CancellationToken) -> Result<SessionEnd>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let result = self.read_loop(&mut stream, cancel).await;

        self.handlers.exit_all(&mut self.state);
        self.metrics.analysis_errors(self.state.analyses.errors());

        match &result {
            Ok(end) => tracing::debug!(session_id = self.state.id, end = ?end, "session ended"),
            Err(e) => tracing::debug!(
                session_id = self.state.id,
                error = %e,
                desync = e.is_desync(),
                "session failed"
            ),
        }
        result
    }

    async fn read_loop<S>(&mut self, stream: &mut S, cancel: &CancellationToken) -> Result<SessionEnd>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let max = self.config.max_message_size;
        let mut buf = BytesMut::with_capacity(self.config.buffer_size);
        let mut out = BytesMut::new();

        loop {
            // Dispatch every complete message in the buffer
            while let Some(consumed) =
                self.handlers
                    .dispatch(&buf, &mut out, &mut self.state, self.config.debug, max)?
            {
                buf.advance(consumed);
                self.metrics.message_received();

                if self.state.close_requested() {
                    flush_replies(stream, &mut out).await?;
                    return Ok(SessionEnd::Closed);
                }
            }
            flush_replies(stream, &mut out).await?;

            if buf.len() > max {
                return Err(ProtocolError::message_too_large(buf.len(), max).into());
            }
            if buf.capacity() - buf.len() < MIN_READ_CAPACITY {
                buf.reserve(self.config.buffer_size.max(MIN_READ_CAPACITY));
            }

            let n = tokio::select! {
                _ = cancel.cancelled() => return Ok(SessionEnd::Cancelled),
                result = stream.read_buf(&mut buf) => result?,
            };

            if n == 0 {
                if buf.is_empty() {
                    return Ok(SessionEnd::Eof);
                }
                return Err(ProtocolError::truncated(buf.len()).into());
            }
            self.metrics.bytes_read(n as u64);
        }
    }
}

async fn flush_replies<S: AsyncWrite + Unpin>(stream: &mut S, out: &mut BytesMut) -> Result<()> {
    if out.is_empty() {
        return Ok(());
    }
    stream.write_all(out).await?;
    stream.flush().await?;
    out.clear();
    Ok(())
}
