//! TCP shadow server
//!
//! Accepts client connections and runs one [`Session`] task per connection.
//!
//! # Example
//!
//! ```ignore
//! use shadowvm_server::{AnalysisRegistry, ServerConfig, ShadowServer};
//! use tokio_util::sync::CancellationToken;
//!
//! let server = ShadowServer::new(ServerConfig::default(), AnalysisRegistry::with_builtins());
//! server.run(CancellationToken::new()).await?;
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use socket2::{SockRef, TcpKeepalive};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::analysis::AnalysisRegistry;
use crate::dispatch::HandlerTable;
use crate::error::ServerError;
use crate::metrics::ServerMetrics;
use crate::session::{Session, SessionConfig};

/// Default read buffer size per session (64KB)
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// Default TCP socket buffer size (256KB)
pub const DEFAULT_SOCKET_BUFFER_SIZE: usize = 256 * 1024;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (e.g., "127.0.0.1")
    pub address: String,

    /// Listen port
    pub port: u16,

    /// Log every request at debug level
    pub debug: bool,

    /// Read buffer size per session
    pub buffer_size: usize,

    /// Largest accepted message
    pub max_message_size: usize,

    /// TCP nodelay (disable Nagle's algorithm)
    pub nodelay: bool,

    /// TCP keepalive enabled
    pub keepalive: bool,

    /// TCP socket buffer size for read/write (OS level, 0 = system default)
    pub socket_buffer_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".into(),
            port: shadowvm_protocol::DEFAULT_PORT,
            debug: false,
            buffer_size: DEFAULT_BUFFER_SIZE,
            max_message_size: shadowvm_protocol::DEFAULT_MAX_MESSAGE_SIZE,
            nodelay: true,
            keepalive: true,
            socket_buffer_size: DEFAULT_SOCKET_BUFFER_SIZE,
        }
    }
}

impl ServerConfig {
    /// Create config with custom port
    pub fn with_port(port: u16) -> Self {
        Self {
            port,
            ..Default::default()
        }
    }

    /// Get the socket address to bind to
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            debug: self.debug,
            buffer_size: self.buffer_size,
            max_message_size: self.max_message_size,
        }
    }
}

/// Shadow server
///
/// Sessions share the analysis registry, the handler table and the metrics;
/// everything else belongs to the session.
pub struct ShadowServer {
    config: ServerConfig,
    registry: Arc<AnalysisRegistry>,
    handlers: Arc<HandlerTable>,
    metrics: Arc<ServerMetrics>,
    next_session: AtomicU64,
}

impl ShadowServer {
    /// Create a server with the built-in request handlers
    pub fn new(config: ServerConfig, registry: AnalysisRegistry) -> Self {
        Self {
            config,
            registry: Arc::new(registry),
            handlers: Arc::new(HandlerTable::standard()),
            metrics: Arc::new(ServerMetrics::new()),
            next_session: AtomicU64::new(1),
        }
    }

    /// Replace the request handlers, e.g. to add extension tags
    pub fn with_handlers(mut self, handlers: HandlerTable) -> Self {
        self.handlers = Arc::new(handlers);
        self
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Metrics handle, valid after `run()` consumes the server
    pub fn metrics(&self) -> Arc<ServerMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Bind to the configured address and serve until cancelled
    pub async fn run(self, cancel: CancellationToken) -> Result<(), ServerError> {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(|e| ServerError::Bind {
                address: bind_addr.clone(),
                source: e,
            })?;

        self.serve(listener, cancel).await
    }

    /// Serve connections from an already bound listener until cancelled
    ///
    /// On cancellation every session is cancelled too and allowed to run
    /// its exit hooks before this returns.
    pub async fn serve(self, listener: TcpListener, cancel: CancellationToken) -> Result<(), ServerError> {
        let local_addr = listener.local_addr()?;
        tracing::info!(
            address = %local_addr,
            analyses = ?self.registry.available(),
            debug = self.config.debug,
            "shadow server listening"
        );

        let server = Arc::new(self);
        let mut sessions = JoinSet::new();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                result = listener.accept() => match result {
                    Ok((stream, peer)) => {
                        server.metrics.connection_opened();
                        let server = Arc::clone(&server);
                        let token = cancel.child_token();
                        sessions.spawn(async move {
                            server.handle_connection(stream, peer, token).await;
                            server.metrics.connection_closed();
                        });
                    }
                    Err(e) => {
                        // Transient accept errors - log and continue
                        tracing::warn!(error = %e, "accept error");
                    }
                },
                Some(joined) = sessions.join_next(), if !sessions.is_empty() => {
                    log_join_error(joined);
                }
            }
        }

        if !sessions.is_empty() {
            tracing::info!(sessions = sessions.len(), "waiting for sessions to finish");
        }
        while let Some(joined) = sessions.join_next().await {
            log_join_error(joined);
        }

        let snapshot = server.metrics.snapshot();
        tracing::info!(
            connections = snapshot.connections_total,
            failed = snapshot.sessions_failed,
            messages = snapshot.messages_received,
            bytes = snapshot.bytes_received,
            "shadow server stopped"
        );
        Ok(())
    }

    async fn handle_connection(&self, stream: TcpStream, peer: SocketAddr, cancel: CancellationToken) {
        self.configure_socket(&stream);

        let id = self.next_session.fetch_add(1, Ordering::Relaxed);
        tracing::info!(session_id = id, peer = %peer, "session started");

        let mut session = Session::new(
            id,
            Arc::clone(&self.registry),
            Arc::clone(&self.handlers),
            self.config.session_config(),
            Arc::clone(&self.metrics),
        );

        match session.run(stream, &cancel).await {
            Ok(end) => tracing::info!(
                session_id = id,
                peer = %peer,
                end = ?end,
                objects = session.state().shadows.object_count(),
                "session finished"
            ),
            Err(e) => {
                self.metrics.session_failed();
                tracing::warn!(
                    session_id = id,
                    peer = %peer,
                    error = %e,
                    desync = e.is_desync(),
                    "session failed"
                );
            }
        }
    }

    /// Configure socket options not exposed by tokio
    fn configure_socket(&self, stream: &TcpStream) {
        if self.config.nodelay
            && let Err(e) = stream.set_nodelay(true)
        {
            tracing::debug!(error = %e, "failed to set TCP_NODELAY");
        }

        let socket = SockRef::from(stream);

        if self.config.socket_buffer_size > 0 {
            if let Err(e) = socket.set_recv_buffer_size(self.config.socket_buffer_size) {
                tracing::debug!(error = %e, "failed to set SO_RCVBUF");
            }
            if let Err(e) = socket.set_send_buffer_size(self.config.socket_buffer_size) {
                tracing::debug!(error = %e, "failed to set SO_SNDBUF");
            }
        }

        if self.config.keepalive {
            let keepalive = TcpKeepalive::new()
                .with_time(Duration::from_secs(60))
                .with_interval(Duration::from_secs(10));

            if let Err(e) = socket.set_tcp_keepalive(&keepalive) {
                tracing::debug!(error = %e, "failed to set TCP keepalive");
            }
        }
    }
}

fn log_join_error(joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined
        && e.is_panic()
    {
        tracing::error!(error = %e, "session task panicked");
    }
}
