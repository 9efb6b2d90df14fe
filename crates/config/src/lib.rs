//! ShadowVM Configuration
//!
//! TOML-based configuration loading with defaults for every field. An empty
//! file runs a server on 127.0.0.1:11218.
//!
//! # Parsing
//!
//! ```
//! use shadowvm_config::Config;
//! use std::str::FromStr;
//!
//! let config = Config::from_str("[server]\nport = 9000").unwrap();
//! assert_eq!(config.server.port, 9000);
//! ```
//!
//! # Example Config
//!
//! ```toml
//! [server]
//! address = "0.0.0.0"
//! port = 11218
//! debug = false
//!
//! [client]
//! address = "127.0.0.1:11218"
//! flush_each_event = true
//!
//! [log]
//! level = "info"
//! format = "json"
//! ```

mod error;
mod logging;
mod server;
mod validation;

use std::fs;
use std::path::Path;
use std::str::FromStr;

pub use error::{ConfigError, Result};
pub use logging::{LogConfig, LogFormat, LogLevel, LogOutput};
pub use server::{ClientSection, ServerSection};
pub use validation::MIN_BUFFER_SIZE;

use serde::Deserialize;

/// Main configuration structure
///
/// All sections are optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Shadow server listener and session settings
    pub server: ServerSection,

    /// Client settings for the demo command
    pub client: ClientSection,

    /// Logging configuration
    pub log: LogConfig,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read, is not valid TOML, or
    /// fails validation.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::IoError {
            path: path.display().to_string(),
            source: e,
        })?;

        Self::from_str(&contents)
    }

    fn parse(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate field values
    pub fn validate(&self) -> Result<()> {
        validation::validate_config(self)
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
