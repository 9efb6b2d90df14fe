//! Configuration validation
//!
//! Rejects values the server or client would fail on at runtime:
//! - Empty addresses
//! - Buffers too small to hold a message header
//! - Message limits smaller than the minimum buffer

use crate::Config;
use crate::error::{ConfigError, Result};

/// Smallest read or write buffer accepted
pub const MIN_BUFFER_SIZE: usize = 1024;

/// Validate the entire configuration
pub fn validate_config(config: &Config) -> Result<()> {
    validate_server(config)?;
    validate_client(config)?;
    Ok(())
}

fn validate_server(config: &Config) -> Result<()> {
    let server = &config.server;

    if server.address.trim().is_empty() {
        return Err(ConfigError::invalid_value("server", "address", "must not be empty"));
    }

    if server.buffer_size < MIN_BUFFER_SIZE {
        return Err(ConfigError::invalid_value(
            "server",
            "buffer_size",
            format!("must be at least {MIN_BUFFER_SIZE}, got {}", server.buffer_size),
        ));
    }

    if server.max_message_size < MIN_BUFFER_SIZE {
        return Err(ConfigError::invalid_value(
            "server",
            "max_message_size",
            format!(
                "must be at least {MIN_BUFFER_SIZE}, got {}",
                server.max_message_size
            ),
        ));
    }

    Ok(())
}

fn validate_client(config: &Config) -> Result<()> {
    let client = &config.client;

    match client.address.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {}
        _ => {
            return Err(ConfigError::invalid_value(
                "client",
                "address",
                format!("expected host:port, got '{}'", client.address),
            ));
        }
    }

    if client.buffer_size < MIN_BUFFER_SIZE {
        return Err(ConfigError::invalid_value(
            "client",
            "buffer_size",
            format!("must be at least {MIN_BUFFER_SIZE}, got {}", client.buffer_size),
        ));
    }

    Ok(())
}
