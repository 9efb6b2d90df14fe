//! Server and client sections

use serde::Deserialize;
use shadowvm_protocol::{DEFAULT_MAX_MESSAGE_SIZE, DEFAULT_PORT};

/// `[server]` section
///
/// ```toml
/// [server]
/// address = "0.0.0.0"
/// port = 11218
/// debug = true
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// Bind address
    /// Default: "127.0.0.1"
    pub address: String,

    /// Listen port
    /// Default: 11218
    pub port: u16,

    /// Log every request at debug level
    pub debug: bool,

    /// Read buffer size per session (bytes)
    /// Default: 65536
    pub buffer_size: usize,

    /// Largest accepted message (bytes)
    /// Default: 16MB
    pub max_message_size: usize,

    /// Enable TCP_NODELAY
    /// Default: true
    pub nodelay: bool,

    /// Enable TCP keepalive
    /// Default: true
    pub keepalive: bool,

    /// OS socket buffer size, 0 keeps the system default
    /// Default: 262144
    pub socket_buffer_size: usize,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".into(),
            port: DEFAULT_PORT,
            debug: false,
            buffer_size: 64 * 1024,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            nodelay: true,
            keepalive: true,
            socket_buffer_size: 256 * 1024,
        }
    }
}

/// `[client]` section, used by the `demo` command
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientSection {
    /// Server to connect to, `host:port`
    pub address: String,

    /// Write buffer size (bytes)
    pub buffer_size: usize,

    /// Flush after every event instead of when the buffer fills
    pub flush_each_event: bool,
}

impl Default for ClientSection {
    fn default() -> Self {
        Self {
            address: format!("127.0.0.1:{DEFAULT_PORT}"),
            buffer_size: 64 * 1024,
            flush_each_event: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_defaults() {
        let server = ServerSection::default();
        assert_eq!(server.address, "127.0.0.1");
        assert_eq!(server.port, 11218);
        assert!(!server.debug);
        assert!(server.nodelay);
        assert!(server.keepalive);
        assert_eq!(server.max_message_size, DEFAULT_MAX_MESSAGE_SIZE);
    }

    #[test]
    fn test_partial_server_section() {
        let server: ServerSection = toml::from_str("port = 9000\ndebug = true").unwrap();
        assert_eq!(server.port, 9000);
        assert!(server.debug);
        assert_eq!(server.buffer_size, 64 * 1024);
    }

    #[test]
    fn test_client_defaults() {
        let client = ClientSection::default();
        assert_eq!(client.address, "127.0.0.1:11218");
        assert!(!client.flush_each_event);
    }
}
